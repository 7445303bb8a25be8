//! Typed relationships between tasks.

use crate::cancel::CancelToken;
use crate::error::{EngineError, EngineResult, NotFoundTarget};
use crate::store::WorkStore;
use crate::types::{Relationship, RelationshipType};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use tracing::info;

/// Directed multigraph of typed edges over work items.
///
/// Cycles are allowed on write; [`RelationshipGraph::would_create_cycle`]
/// lets a caller ask before linking.
#[derive(Clone)]
pub struct RelationshipGraph {
    store: Arc<dyn WorkStore>,
}

impl RelationshipGraph {
    pub fn new(store: Arc<dyn WorkStore>) -> Self {
        Self { store }
    }

    fn require_item(&self, key: &str) -> EngineResult<()> {
        match self.store.get_item(key)? {
            Some(_) => Ok(()),
            None => Err(EngineError::NotFound(NotFoundTarget::Item(key.to_string()))),
        }
    }

    /// Link `from -> to`. Both tasks must exist and differ.
    pub fn create(
        &self,
        from: &str,
        to: &str,
        rel_type: RelationshipType,
        cancel: &CancelToken,
    ) -> EngineResult<Relationship> {
        cancel.check()?;
        if from == to {
            return Err(EngineError::SelfRelationship(from.to_string()));
        }
        self.require_item(from)?;
        self.require_item(to)?;

        cancel.check()?;
        let rel = self.store.create_relationship(from, to, rel_type)?;
        info!(id = rel.id, from = %from, to = %to, rel_type = %rel_type, "Created relationship");
        Ok(rel)
    }

    pub fn get(&self, id: i64) -> EngineResult<Relationship> {
        self.store
            .get_relationship(id)?
            .ok_or(EngineError::NotFound(NotFoundTarget::Relationship(id)))
    }

    /// Remove a single edge by id.
    pub fn delete(&self, id: i64, cancel: &CancelToken) -> EngineResult<()> {
        cancel.check()?;
        self.store.delete_relationship(id)?;
        info!(id, "Deleted relationship");
        Ok(())
    }

    /// Remove every `from -> to` edge of `rel_type`; returns how many.
    /// No matching edge is `NotFound`.
    pub fn delete_by_pair(
        &self,
        from: &str,
        to: &str,
        rel_type: RelationshipType,
        cancel: &CancelToken,
    ) -> EngineResult<usize> {
        cancel.check()?;
        let removed = self.store.delete_relationship_by_pair(from, to, rel_type)?;
        info!(from = %from, to = %to, rel_type = %rel_type, removed, "Deleted relationships");
        Ok(removed)
    }

    /// Edges leaving `key`, restricted to `types` unless empty.
    pub fn outgoing(
        &self,
        key: &str,
        types: &[RelationshipType],
    ) -> EngineResult<Vec<Relationship>> {
        self.require_item(key)?;
        Ok(self.store.outgoing(key, types)?)
    }

    /// Edges arriving at `key`, restricted to `types` unless empty.
    pub fn incoming(
        &self,
        key: &str,
        types: &[RelationshipType],
    ) -> EngineResult<Vec<Relationship>> {
        self.require_item(key)?;
        Ok(self.store.incoming(key, types)?)
    }

    /// Whether adding `from -> to` of `rel_type` would close a cycle, i.e.
    /// `to` already reaches `from` over edges of that type.
    pub fn would_create_cycle(
        &self,
        from: &str,
        to: &str,
        rel_type: RelationshipType,
        cancel: &CancelToken,
    ) -> EngineResult<bool> {
        if from == to {
            return Ok(true);
        }

        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        queue.push_back(to.to_string());

        while let Some(current) = queue.pop_front() {
            cancel.check()?;
            if current == from {
                return Ok(true);
            }
            if !visited.insert(current.clone()) {
                continue;
            }
            for edge in self.store.outgoing(&current, &[rel_type])? {
                if !visited.contains(&edge.to_key) {
                    queue.push_back(edge.to_key);
                }
            }
        }

        Ok(false)
    }
}
