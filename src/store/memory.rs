//! In-process store behind a single `RwLock`.

use super::{StoreError, StoreResult, WorkStore};
use crate::db::now_ms;
use crate::types::{
    HistoryEntry, NewHistoryEntry, NewWorkItem, Relationship, RelationshipType, WorkItem,
};
use anyhow::anyhow;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct State {
    items: BTreeMap<String, WorkItem>,
    history: Vec<HistoryEntry>,
    relationships: BTreeMap<i64, Relationship>,
    next_history_id: i64,
    next_relationship_id: i64,
}

/// Store keeping everything in memory. Useful for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    fail_history: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following history append fail, leaving state untouched.
    pub fn fail_history_appends(&self, fail: bool) {
        self.fail_history.store(fail, Ordering::SeqCst);
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| StoreError::Backend(anyhow!("memory store lock poisoned")))
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| StoreError::Backend(anyhow!("memory store lock poisoned")))
    }
}

fn sorted_by_creation(mut items: Vec<WorkItem>) -> Vec<WorkItem> {
    items.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
    items
}

fn type_matches(rel: &Relationship, types: &[RelationshipType]) -> bool {
    types.is_empty() || types.contains(&rel.rel_type)
}

impl WorkStore for MemoryStore {
    fn insert_item(&self, item: NewWorkItem) -> StoreResult<WorkItem> {
        let mut state = self.write()?;
        if state.items.contains_key(&item.key) {
            return Err(StoreError::AlreadyExists(item.key));
        }
        if let Some(parent) = &item.parent
            && !state.items.contains_key(parent)
        {
            return Err(StoreError::ItemNotFound(parent.clone()));
        }
        let now = now_ms();
        let record = WorkItem {
            key: item.key.clone(),
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
        };
        state.items.insert(item.key, record.clone());
        Ok(record)
    }

    fn get_item(&self, key: &str) -> StoreResult<Option<WorkItem>> {
        Ok(self.read()?.items.get(key).cloned())
    }

    fn list_items(&self) -> StoreResult<Vec<WorkItem>> {
        Ok(sorted_by_creation(
            self.read()?.items.values().cloned().collect(),
        ))
    }

    fn list_children(&self, parent: &str) -> StoreResult<Vec<WorkItem>> {
        let state = self.read()?;
        let children = state
            .items
            .values()
            .filter(|item| item.parent.as_deref() == Some(parent))
            .cloned()
            .collect();
        Ok(sorted_by_creation(children))
    }

    fn apply_transition(
        &self,
        key: &str,
        expected: &str,
        entry: NewHistoryEntry,
    ) -> StoreResult<(WorkItem, HistoryEntry)> {
        let mut state = self.write()?;
        let current = state
            .items
            .get(key)
            .ok_or_else(|| StoreError::ItemNotFound(key.to_string()))?;
        if current.status != expected {
            return Err(StoreError::StaleStatus {
                key: key.to_string(),
                expected: Some(expected.to_string()),
                actual: current.status.clone(),
            });
        }
        if self.fail_history.load(Ordering::SeqCst) {
            return Err(StoreError::Backend(anyhow!(
                "history append failed for {}",
                key
            )));
        }

        let now = now_ms();
        state.next_history_id += 1;
        let record = HistoryEntry {
            id: state.next_history_id,
            item_key: key.to_string(),
            old_status: entry.old_status,
            new_status: entry.new_status.clone(),
            timestamp: now,
            agent: entry.agent,
            notes: entry.notes,
            forced: entry.forced,
            kind: entry.kind,
            rejection_reason: entry.rejection_reason,
            reason_doc: entry.reason_doc,
        };
        state.history.push(record.clone());

        let item = state
            .items
            .get_mut(key)
            .ok_or_else(|| StoreError::ItemNotFound(key.to_string()))?;
        item.status = entry.new_status;
        item.updated_at = now;
        Ok((item.clone(), record))
    }

    fn set_progress(&self, key: &str, progress: f64) -> StoreResult<()> {
        let mut state = self.write()?;
        let item = state
            .items
            .get_mut(key)
            .ok_or_else(|| StoreError::ItemNotFound(key.to_string()))?;
        item.progress = progress;
        Ok(())
    }

    fn set_status_override(&self, key: &str, status_override: bool) -> StoreResult<WorkItem> {
        let mut state = self.write()?;
        let item = state
            .items
            .get_mut(key)
            .ok_or_else(|| StoreError::ItemNotFound(key.to_string()))?;
        item.status_override = status_override;
        item.updated_at = now_ms();
        Ok(item.clone())
    }

    fn history(&self, key: &str) -> StoreResult<Vec<HistoryEntry>> {
        let state = self.read()?;
        Ok(state
            .history
            .iter()
            .filter(|h| h.item_key == key)
            .cloned()
            .collect())
    }

    fn create_relationship(
        &self,
        from: &str,
        to: &str,
        rel_type: RelationshipType,
    ) -> StoreResult<Relationship> {
        let mut state = self.write()?;
        for key in [from, to] {
            if !state.items.contains_key(key) {
                return Err(StoreError::ItemNotFound(key.to_string()));
            }
        }
        state.next_relationship_id += 1;
        let rel = Relationship {
            id: state.next_relationship_id,
            from_key: from.to_string(),
            to_key: to.to_string(),
            rel_type,
            created_at: now_ms(),
        };
        state.relationships.insert(rel.id, rel.clone());
        Ok(rel)
    }

    fn get_relationship(&self, id: i64) -> StoreResult<Option<Relationship>> {
        Ok(self.read()?.relationships.get(&id).cloned())
    }

    fn delete_relationship(&self, id: i64) -> StoreResult<()> {
        match self.write()?.relationships.remove(&id) {
            Some(_) => Ok(()),
            None => Err(StoreError::RelationshipNotFound(id)),
        }
    }

    fn delete_relationship_by_pair(
        &self,
        from: &str,
        to: &str,
        rel_type: RelationshipType,
    ) -> StoreResult<usize> {
        let mut state = self.write()?;
        let before = state.relationships.len();
        state
            .relationships
            .retain(|_, r| !(r.from_key == from && r.to_key == to && r.rel_type == rel_type));
        match before - state.relationships.len() {
            0 => Err(StoreError::EdgeNotFound {
                from: from.to_string(),
                to: to.to_string(),
                rel_type,
            }),
            removed => Ok(removed),
        }
    }

    fn outgoing(&self, key: &str, types: &[RelationshipType]) -> StoreResult<Vec<Relationship>> {
        let state = self.read()?;
        Ok(state
            .relationships
            .values()
            .filter(|r| r.from_key == key && type_matches(r, types))
            .cloned()
            .collect())
    }

    fn incoming(&self, key: &str, types: &[RelationshipType]) -> StoreResult<Vec<Relationship>> {
        let state = self.read()?;
        Ok(state
            .relationships
            .values()
            .filter(|r| r.to_key == key && type_matches(r, types))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ItemKind, TransitionKind};

    fn entry(old: &str, new: &str) -> NewHistoryEntry {
        NewHistoryEntry {
            old_status: Some(old.to_string()),
            new_status: new.to_string(),
            agent: None,
            notes: None,
            forced: false,
            kind: TransitionKind::Forward,
            rejection_reason: None,
            reason_doc: None,
        }
    }

    #[test]
    fn stale_expected_status_is_refused() {
        let store = MemoryStore::new();
        store
            .insert_item(NewWorkItem::new("T-1", ItemKind::Task, "todo"))
            .unwrap();

        let err = store
            .apply_transition("T-1", "in_progress", entry("in_progress", "done"))
            .unwrap_err();
        assert!(matches!(err, StoreError::StaleStatus { ref actual, .. } if actual == "todo"));
        assert!(store.history("T-1").unwrap().is_empty());
    }

    #[test]
    fn injected_failure_leaves_status_and_history_unchanged() {
        let store = MemoryStore::new();
        store
            .insert_item(NewWorkItem::new("T-1", ItemKind::Task, "todo"))
            .unwrap();
        store.fail_history_appends(true);

        assert!(
            store
                .apply_transition("T-1", "todo", entry("todo", "in_progress"))
                .is_err()
        );
        assert_eq!(store.get_item("T-1").unwrap().unwrap().status, "todo");
        assert!(store.history("T-1").unwrap().is_empty());
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let store = MemoryStore::new();
        store
            .insert_item(NewWorkItem::new("E-1", ItemKind::Epic, "todo"))
            .unwrap();
        assert!(matches!(
            store.insert_item(NewWorkItem::new("E-1", ItemKind::Epic, "todo")),
            Err(StoreError::AlreadyExists(_))
        ));
    }
}
