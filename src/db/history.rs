//! Status updates and the append-only transition log.

use super::items::get_item_in;
use super::{Database, now_ms};
use crate::store::StoreError;
use crate::types::{HistoryEntry, NewHistoryEntry, TransitionKind, WorkItem};
use anyhow::Result;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};

fn row_to_entry(row: &Row) -> rusqlite::Result<HistoryEntry> {
    let kind: String = row.get(8)?;
    let kind = TransitionKind::from_str(&kind).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            8,
            Type::Text,
            format!("unknown transition kind '{}'", kind).into(),
        )
    })?;
    Ok(HistoryEntry {
        id: row.get(0)?,
        item_key: row.get(1)?,
        old_status: row.get(2)?,
        new_status: row.get(3)?,
        timestamp: row.get(4)?,
        agent: row.get(5)?,
        notes: row.get(6)?,
        forced: row.get(7)?,
        kind,
        rejection_reason: row.get(9)?,
        reason_doc: row.get(10)?,
    })
}

impl Database {
    /// Compare-and-swap the status of `key` and append one history row, in
    /// a single immediate transaction.
    pub fn apply_transition(
        &self,
        key: &str,
        expected: &str,
        entry: NewHistoryEntry,
    ) -> Result<(WorkItem, HistoryEntry)> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let actual: Option<String> = tx
                .query_row(
                    "SELECT status FROM work_items WHERE key = ?1",
                    params![key],
                    |row| row.get(0),
                )
                .optional()?;
            let actual = actual.ok_or_else(|| StoreError::ItemNotFound(key.to_string()))?;
            if actual != expected {
                return Err(StoreError::StaleStatus {
                    key: key.to_string(),
                    expected: Some(expected.to_string()),
                    actual,
                }
                .into());
            }

            let now = now_ms();
            tx.execute(
                "UPDATE work_items SET status = ?1, updated_at = ?2 WHERE key = ?3 AND status = ?4",
                params![entry.new_status, now, key, expected],
            )?;
            tx.execute(
                "INSERT INTO transition_history
                 (item_key, old_status, new_status, timestamp, agent, notes, forced, kind, rejection_reason, reason_doc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    key,
                    entry.old_status,
                    entry.new_status,
                    now,
                    entry.agent,
                    entry.notes,
                    entry.forced,
                    entry.kind.as_str(),
                    entry.rejection_reason,
                    entry.reason_doc,
                ],
            )?;
            let id = tx.last_insert_rowid();

            let item = get_item_in(&tx, key)?
                .ok_or_else(|| StoreError::ItemNotFound(key.to_string()))?;
            tx.commit()?;

            let record = HistoryEntry {
                id,
                item_key: key.to_string(),
                old_status: entry.old_status,
                new_status: entry.new_status,
                timestamp: now,
                agent: entry.agent,
                notes: entry.notes,
                forced: entry.forced,
                kind: entry.kind,
                rejection_reason: entry.rejection_reason,
                reason_doc: entry.reason_doc,
            };
            Ok((item, record))
        })
    }

    /// Transition history of an item, oldest first.
    pub fn history(&self, key: &str) -> Result<Vec<HistoryEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, item_key, old_status, new_status, timestamp, agent, notes,
                        forced, kind, rejection_reason, reason_doc
                 FROM transition_history
                 WHERE item_key = ?1
                 ORDER BY id ASC",
            )?;
            let entries = stmt
                .query_map(params![key], row_to_entry)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
    }
}
