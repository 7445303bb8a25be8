//! Dependency trees over `depends_on` edges.

use crate::cancel::CancelToken;
use crate::config::DEFAULT_MAX_TREE_DEPTH;
use crate::error::{EngineError, EngineResult, NotFoundTarget};
use crate::store::WorkStore;
use crate::types::{RelationshipType, WorkItem};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// One node of a dependency tree.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DependencyTreeNode {
    pub item: WorkItem,
    pub dependencies: Vec<DependencyTreeNode>,
    /// An edge from this node led back to one of its ancestors.
    pub has_cycle: bool,
    /// The node had edges that were not expanded because of the depth cap.
    pub truncated: bool,
    pub depth: usize,
}

impl DependencyTreeNode {
    /// Number of nodes in the tree.
    pub fn node_count(&self) -> usize {
        1 + self
            .dependencies
            .iter()
            .map(|d| d.node_count())
            .sum::<usize>()
    }

    /// Number of nodes flagged with a cycle.
    pub fn cycle_count(&self) -> usize {
        usize::from(self.has_cycle)
            + self
                .dependencies
                .iter()
                .map(|d| d.cycle_count())
                .sum::<usize>()
    }

    /// Deepest level present in the tree.
    pub fn max_depth(&self) -> usize {
        self.dependencies
            .iter()
            .map(|d| d.max_depth())
            .max()
            .unwrap_or(self.depth)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    /// What the root depends on.
    Dependencies,
    /// What depends on the root.
    Dependents,
}

/// Builds dependency trees with cycle flagging and a depth cap.
#[derive(Clone)]
pub struct DependencyTreeBuilder {
    store: Arc<dyn WorkStore>,
    max_depth: usize,
}

impl DependencyTreeBuilder {
    pub fn new(store: Arc<dyn WorkStore>) -> Self {
        Self {
            store,
            max_depth: DEFAULT_MAX_TREE_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Tree of everything `root` depends on.
    pub fn build_tree(
        &self,
        root: &str,
        cancel: &CancelToken,
    ) -> EngineResult<DependencyTreeNode> {
        self.build_from(root, Direction::Dependencies, cancel)
    }

    /// Tree of everything that depends on `root`.
    pub fn build_dependents_tree(
        &self,
        root: &str,
        cancel: &CancelToken,
    ) -> EngineResult<DependencyTreeNode> {
        self.build_from(root, Direction::Dependents, cancel)
    }

    fn build_from(
        &self,
        root: &str,
        direction: Direction,
        cancel: &CancelToken,
    ) -> EngineResult<DependencyTreeNode> {
        cancel.check()?;
        let item = self
            .store
            .get_item(root)?
            .ok_or_else(|| EngineError::NotFound(NotFoundTarget::Item(root.to_string())))?;
        self.build_node(item, HashSet::new(), 0, direction, cancel)
    }

    /// `ancestors` holds the keys on the path from the root to `item`. It
    /// is owned per call so sibling subtrees never see each other's nodes.
    fn build_node(
        &self,
        item: WorkItem,
        mut ancestors: HashSet<String>,
        depth: usize,
        direction: Direction,
        cancel: &CancelToken,
    ) -> EngineResult<DependencyTreeNode> {
        cancel.check()?;
        ancestors.insert(item.key.clone());

        let next_keys: Vec<String> = match direction {
            Direction::Dependencies => self
                .store
                .outgoing(&item.key, &[RelationshipType::DependsOn])?
                .into_iter()
                .map(|e| e.to_key)
                .collect(),
            Direction::Dependents => self
                .store
                .incoming(&item.key, &[RelationshipType::DependsOn])?
                .into_iter()
                .map(|e| e.from_key)
                .collect(),
        };

        let mut node = DependencyTreeNode {
            item,
            dependencies: Vec::new(),
            has_cycle: false,
            truncated: false,
            depth,
        };

        if depth >= self.max_depth {
            node.truncated = !next_keys.is_empty();
            return Ok(node);
        }

        for key in next_keys {
            if ancestors.contains(&key) {
                node.has_cycle = true;
                continue;
            }
            let Some(next) = self.store.get_item(&key)? else {
                debug!(from = %node.item.key, to = %key, "Skipping edge to missing item");
                continue;
            };
            let child = self.build_node(next, ancestors.clone(), depth + 1, direction, cancel)?;
            node.dependencies.push(child);
        }

        Ok(node)
    }
}
