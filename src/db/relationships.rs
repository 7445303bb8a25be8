//! Typed relationship rows.

use super::items::get_item_in;
use super::{Database, now_ms};
use crate::store::StoreError;
use crate::types::{Relationship, RelationshipType};
use anyhow::Result;
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

fn row_to_relationship(row: &Row) -> rusqlite::Result<Relationship> {
    let rel_type: String = row.get(3)?;
    let rel_type = RelationshipType::from_str(&rel_type).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("unknown relationship type '{}'", rel_type).into(),
        )
    })?;
    Ok(Relationship {
        id: row.get(0)?,
        from_key: row.get(1)?,
        to_key: row.get(2)?,
        rel_type,
        created_at: row.get(4)?,
    })
}

/// Query edges where `column` equals `key`, optionally filtered by type.
fn query_edges(
    conn: &Connection,
    column: &str,
    key: &str,
    types: &[RelationshipType],
) -> Result<Vec<Relationship>> {
    let mut sql = format!(
        "SELECT id, from_key, to_key, rel_type, created_at FROM task_relationships WHERE {} = ?1",
        column
    );
    let mut values: Vec<Value> = vec![Value::Text(key.to_string())];
    if !types.is_empty() {
        let placeholders: Vec<String> = (0..types.len()).map(|i| format!("?{}", i + 2)).collect();
        sql.push_str(&format!(" AND rel_type IN ({})", placeholders.join(", ")));
        values.extend(types.iter().map(|t| Value::Text(t.as_str().to_string())));
    }
    sql.push_str(" ORDER BY id ASC");

    let mut stmt = conn.prepare(&sql)?;
    let edges = stmt
        .query_map(params_from_iter(values), row_to_relationship)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(edges)
}

impl Database {
    /// Create a typed edge. Both endpoints must exist.
    pub fn create_relationship(
        &self,
        from: &str,
        to: &str,
        rel_type: RelationshipType,
    ) -> Result<Relationship> {
        self.with_conn(|conn| {
            for key in [from, to] {
                if get_item_in(conn, key)?.is_none() {
                    return Err(StoreError::ItemNotFound(key.to_string()).into());
                }
            }
            let now = now_ms();
            conn.execute(
                "INSERT INTO task_relationships (from_key, to_key, rel_type, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![from, to, rel_type.as_str(), now],
            )?;
            Ok(Relationship {
                id: conn.last_insert_rowid(),
                from_key: from.to_string(),
                to_key: to.to_string(),
                rel_type,
                created_at: now,
            })
        })
    }

    pub fn get_relationship(&self, id: i64) -> Result<Option<Relationship>> {
        self.with_conn(|conn| {
            let rel = conn
                .query_row(
                    "SELECT id, from_key, to_key, rel_type, created_at
                     FROM task_relationships WHERE id = ?1",
                    params![id],
                    row_to_relationship,
                )
                .optional()?;
            Ok(rel)
        })
    }

    /// Delete one edge by id.
    pub fn delete_relationship(&self, id: i64) -> Result<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM task_relationships WHERE id = ?1", params![id])?;
            if deleted == 0 {
                return Err(StoreError::RelationshipNotFound(id).into());
            }
            Ok(())
        })
    }

    /// Delete every `from -> to` edge of the given type.
    pub fn delete_relationship_by_pair(
        &self,
        from: &str,
        to: &str,
        rel_type: RelationshipType,
    ) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM task_relationships
                 WHERE from_key = ?1 AND to_key = ?2 AND rel_type = ?3",
                params![from, to, rel_type.as_str()],
            )?;
            if deleted == 0 {
                return Err(StoreError::EdgeNotFound {
                    from: from.to_string(),
                    to: to.to_string(),
                    rel_type,
                }
                .into());
            }
            Ok(deleted)
        })
    }

    /// Edges leaving `key`.
    pub fn outgoing(&self, key: &str, types: &[RelationshipType]) -> Result<Vec<Relationship>> {
        self.with_conn(|conn| query_edges(conn, "from_key", key, types))
    }

    /// Edges arriving at `key`.
    pub fn incoming(&self, key: &str, types: &[RelationshipType]) -> Result<Vec<Relationship>> {
        self.with_conn(|conn| query_edges(conn, "to_key", key, types))
    }
}
