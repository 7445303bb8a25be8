//! Work item rows.

use super::{Database, now_ms};
use crate::store::StoreError;
use crate::types::{ItemKind, NewWorkItem, WorkItem};
use anyhow::Result;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};

pub(crate) const ITEM_COLUMNS: &str = "key, kind, title, status, priority, execution_order, \
     parent_key, progress, status_override, created_at, updated_at";

pub(crate) fn row_to_item(row: &Row) -> rusqlite::Result<WorkItem> {
    let kind: String = row.get(1)?;
    let kind = ItemKind::from_str(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            1,
            Type::Text,
            format!("unknown item kind '{}'", kind).into(),
        )
    })?;
    Ok(WorkItem {
        key: row.get(0)?,
        kind,
        title: row.get(2)?,
        status: row.get(3)?,
        priority: row.get(4)?,
        execution_order: row.get(5)?,
        parent: row.get(6)?,
        progress: row.get(7)?,
        status_override: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

pub(crate) fn get_item_in(conn: &Connection, key: &str) -> Result<Option<WorkItem>> {
    let item = conn
        .query_row(
            &format!("SELECT {} FROM work_items WHERE key = ?1", ITEM_COLUMNS),
            params![key],
            row_to_item,
        )
        .optional()?;
    Ok(item)
}

impl Database {
    /// Insert a new work item.
    pub fn insert_item(&self, item: NewWorkItem) -> Result<WorkItem> {
        self.with_conn(|conn| {
            if get_item_in(conn, &item.key)?.is_some() {
                return Err(StoreError::AlreadyExists(item.key).into());
            }
            if let Some(parent) = &item.parent
                && get_item_in(conn, parent)?.is_none()
            {
                return Err(StoreError::ItemNotFound(parent.clone()).into());
            }

            let now = now_ms();
            conn.execute(
                "INSERT INTO work_items
                 (key, kind, title, status, priority, execution_order, parent_key, progress,
                  status_override, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0.0, ?8, ?9, ?9)",
                params![
                    item.key,
                    item.kind.as_str(),
                    item.title,
                    item.status,
                    item.priority,
                    item.execution_order,
                    item.parent,
                    item.status_override,
                    now,
                ],
            )?;

            Ok(WorkItem {
                key: item.key,
                kind: item.kind,
                title: item.title,
                status: item.status,
                priority: item.priority,
                execution_order: item.execution_order,
                parent: item.parent,
                progress: 0.0,
                status_override: item.status_override,
                created_at: now,
                updated_at: now,
            })
        })
    }

    /// Get a work item by key.
    pub fn get_item(&self, key: &str) -> Result<Option<WorkItem>> {
        self.with_conn(|conn| get_item_in(conn, key))
    }

    /// All work items, oldest first.
    pub fn list_items(&self) -> Result<Vec<WorkItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM work_items ORDER BY created_at ASC, key ASC",
                ITEM_COLUMNS
            ))?;
            let items = stmt
                .query_map([], row_to_item)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
    }

    /// Direct children of a container, oldest first.
    pub fn list_children(&self, parent: &str) -> Result<Vec<WorkItem>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM work_items WHERE parent_key = ?1 ORDER BY created_at ASC, key ASC",
                ITEM_COLUMNS
            ))?;
            let items = stmt
                .query_map(params![parent], row_to_item)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
    }

    /// Pin or release a container's status.
    pub fn set_status_override(&self, key: &str, status_override: bool) -> Result<WorkItem> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE work_items SET status_override = ?1, updated_at = ?2 WHERE key = ?3",
                params![status_override, now_ms(), key],
            )?;
            if updated == 0 {
                return Err(StoreError::ItemNotFound(key.to_string()).into());
            }
            get_item_in(conn, key)?.ok_or_else(|| StoreError::ItemNotFound(key.to_string()).into())
        })
    }

    /// Store a recomputed container progress.
    pub fn set_progress(&self, key: &str, progress: f64) -> Result<()> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE work_items SET progress = ?1, updated_at = ?2 WHERE key = ?3",
                params![progress, now_ms(), key],
            )?;
            if updated == 0 {
                return Err(StoreError::ItemNotFound(key.to_string()).into());
            }
            Ok(())
        })
    }
}
