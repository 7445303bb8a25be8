//! [`WorkStore`] implementation for [`Database`].

use super::Database;
use crate::store::{StoreError, StoreResult, WorkStore};
use crate::types::{
    HistoryEntry, NewHistoryEntry, NewWorkItem, Relationship, RelationshipType, WorkItem,
};

/// Recover the typed error the inherent methods raised, if any.
fn typed(err: anyhow::Error) -> StoreError {
    match err.downcast::<StoreError>() {
        Ok(store_err) => store_err,
        Err(other) => StoreError::Backend(other),
    }
}

impl WorkStore for Database {
    fn insert_item(&self, item: NewWorkItem) -> StoreResult<WorkItem> {
        Database::insert_item(self, item).map_err(typed)
    }

    fn get_item(&self, key: &str) -> StoreResult<Option<WorkItem>> {
        Database::get_item(self, key).map_err(typed)
    }

    fn list_items(&self) -> StoreResult<Vec<WorkItem>> {
        Database::list_items(self).map_err(typed)
    }

    fn list_children(&self, parent: &str) -> StoreResult<Vec<WorkItem>> {
        Database::list_children(self, parent).map_err(typed)
    }

    fn apply_transition(
        &self,
        key: &str,
        expected: &str,
        entry: NewHistoryEntry,
    ) -> StoreResult<(WorkItem, HistoryEntry)> {
        Database::apply_transition(self, key, expected, entry).map_err(typed)
    }

    fn set_progress(&self, key: &str, progress: f64) -> StoreResult<()> {
        Database::set_progress(self, key, progress).map_err(typed)
    }

    fn set_status_override(&self, key: &str, status_override: bool) -> StoreResult<WorkItem> {
        Database::set_status_override(self, key, status_override).map_err(typed)
    }

    fn history(&self, key: &str) -> StoreResult<Vec<HistoryEntry>> {
        Database::history(self, key).map_err(typed)
    }

    fn create_relationship(
        &self,
        from: &str,
        to: &str,
        rel_type: RelationshipType,
    ) -> StoreResult<Relationship> {
        Database::create_relationship(self, from, to, rel_type).map_err(typed)
    }

    fn get_relationship(&self, id: i64) -> StoreResult<Option<Relationship>> {
        Database::get_relationship(self, id).map_err(typed)
    }

    fn delete_relationship(&self, id: i64) -> StoreResult<()> {
        Database::delete_relationship(self, id).map_err(typed)
    }

    fn delete_relationship_by_pair(
        &self,
        from: &str,
        to: &str,
        rel_type: RelationshipType,
    ) -> StoreResult<usize> {
        Database::delete_relationship_by_pair(self, from, to, rel_type).map_err(typed)
    }

    fn outgoing(&self, key: &str, types: &[RelationshipType]) -> StoreResult<Vec<Relationship>> {
        Database::outgoing(self, key, types).map_err(typed)
    }

    fn incoming(&self, key: &str, types: &[RelationshipType]) -> StoreResult<Vec<Relationship>> {
        Database::incoming(self, key, types).map_err(typed)
    }
}
