//! Persistence interface consumed by the engine.
//!
//! The engine never talks to SQLite directly. Anything that implements
//! [`WorkStore`] can back it; this crate ships [`crate::db::Database`]
//! (SQLite) and [`MemoryStore`].

mod memory;

pub use memory::MemoryStore;

use crate::types::{
    HistoryEntry, NewHistoryEntry, NewWorkItem, Relationship, RelationshipType, WorkItem,
};
use thiserror::Error;

/// Errors reported by a store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("work item '{0}' not found")]
    ItemNotFound(String),

    #[error("relationship {0} not found")]
    RelationshipNotFound(i64),

    #[error("no {rel_type} relationship from '{from}' to '{to}'")]
    EdgeNotFound {
        from: String,
        to: String,
        rel_type: RelationshipType,
    },

    #[error("work item '{0}' already exists")]
    AlreadyExists(String),

    /// The compare-and-swap in `apply_transition` saw a different status.
    #[error("status of {key} changed concurrently (found '{actual}')")]
    StaleStatus {
        key: String,
        expected: Option<String>,
        actual: String,
    },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Storage operations the engine needs.
///
/// `apply_transition` is the only write that must be atomic: the status
/// update and the history append either both land or neither does.
pub trait WorkStore: Send + Sync {
    fn insert_item(&self, item: NewWorkItem) -> StoreResult<WorkItem>;

    fn get_item(&self, key: &str) -> StoreResult<Option<WorkItem>>;

    /// All items, ordered by creation time then key.
    fn list_items(&self) -> StoreResult<Vec<WorkItem>>;

    /// Direct children of a container, ordered by creation time then key.
    fn list_children(&self, parent: &str) -> StoreResult<Vec<WorkItem>>;

    /// Set `key` to `entry.new_status` if its status is still `expected`,
    /// and append `entry` to its history, atomically.
    fn apply_transition(
        &self,
        key: &str,
        expected: &str,
        entry: NewHistoryEntry,
    ) -> StoreResult<(WorkItem, HistoryEntry)>;

    fn set_progress(&self, key: &str, progress: f64) -> StoreResult<()>;

    /// Pin or release a container's status; returns the updated item.
    fn set_status_override(&self, key: &str, status_override: bool) -> StoreResult<WorkItem>;

    /// History of an item, oldest first.
    fn history(&self, key: &str) -> StoreResult<Vec<HistoryEntry>>;

    fn create_relationship(
        &self,
        from: &str,
        to: &str,
        rel_type: RelationshipType,
    ) -> StoreResult<Relationship>;

    fn get_relationship(&self, id: i64) -> StoreResult<Option<Relationship>>;

    fn delete_relationship(&self, id: i64) -> StoreResult<()>;

    /// Delete every edge `from -> to` of `rel_type`; returns how many went.
    /// Fails with [`StoreError::EdgeNotFound`] when there was none.
    fn delete_relationship_by_pair(
        &self,
        from: &str,
        to: &str,
        rel_type: RelationshipType,
    ) -> StoreResult<usize>;

    /// Edges leaving `key`, filtered to `types` (all types when empty),
    /// in creation order.
    fn outgoing(&self, key: &str, types: &[RelationshipType]) -> StoreResult<Vec<Relationship>>;

    /// Edges arriving at `key`, filtered like [`WorkStore::outgoing`].
    fn incoming(&self, key: &str, types: &[RelationshipType]) -> StoreResult<Vec<Relationship>>;
}
