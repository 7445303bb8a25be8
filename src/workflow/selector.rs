//! Picking the next unit(s) of work.
//!
//! Ordering, most significant first:
//! 1. items with an execution order come before items without one;
//! 2. lower execution order first;
//! 3. lower priority value first;
//! 4. earlier creation time first;
//! 5. key, so the result never depends on input order.
//!
//! Items sharing the front execution order form a parallel batch and are all
//! returned. Unordered work is handed out one item at a time.

use super::handle::WorkflowHandle;
use crate::cancel::CancelToken;
use crate::store::WorkStore;
use crate::types::{ItemKind, RelationshipType, WorkItem};
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Total order used for next-work selection.
pub fn compare(a: &WorkItem, b: &WorkItem) -> Ordering {
    let order = match (a.execution_order, b.execution_order) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    order
        .then_with(|| a.priority.cmp(&b.priority))
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.key.cmp(&b.key))
}

/// The next batch of work from `candidates`.
///
/// Returns every item sharing the smallest execution order, or the single
/// best unordered item when none has an order. Empty input gives an empty
/// batch.
pub fn select_next(candidates: &[WorkItem]) -> Vec<WorkItem> {
    let mut sorted: Vec<&WorkItem> = candidates.iter().collect();
    sorted.sort_by(|a, b| compare(a, b));

    let Some(first) = sorted.first() else {
        return Vec::new();
    };
    match first.execution_order {
        Some(order) => sorted
            .into_iter()
            .take_while(|item| item.execution_order == Some(order))
            .cloned()
            .collect(),
        None => vec![(*first).clone()],
    }
}

/// Finds tasks ready to start and applies [`select_next`] to them.
#[derive(Clone)]
pub struct NextWorkSelector {
    store: Arc<dyn WorkStore>,
    workflow: WorkflowHandle,
}

impl NextWorkSelector {
    pub fn new(store: Arc<dyn WorkStore>, workflow: WorkflowHandle) -> Self {
        Self { store, workflow }
    }

    /// Tasks in a start status whose `depends_on` targets are all complete
    /// and that no unfinished task `blocks`.
    pub fn eligible(&self, cancel: &CancelToken) -> crate::error::EngineResult<Vec<WorkItem>> {
        let graph = self.workflow.load();
        let mut ready = Vec::new();

        for item in self.store.list_items()? {
            cancel.check()?;
            if item.kind != ItemKind::Task || !graph.is_start(&item.status) {
                continue;
            }

            let mut waiting_on = None;
            for edge in self.store.outgoing(&item.key, &[RelationshipType::DependsOn])? {
                match self.store.get_item(&edge.to_key)? {
                    Some(dep) if !graph.is_complete(&dep.status) => {
                        waiting_on = Some(dep.key);
                        break;
                    }
                    _ => {}
                }
            }
            if waiting_on.is_none() {
                for edge in self.store.incoming(&item.key, &[RelationshipType::Blocks])? {
                    match self.store.get_item(&edge.from_key)? {
                        Some(blocker) if !graph.is_complete(&blocker.status) => {
                            waiting_on = Some(blocker.key);
                            break;
                        }
                        _ => {}
                    }
                }
            }

            match waiting_on {
                Some(other) => debug!(key = %item.key, waiting_on = %other, "Task not eligible"),
                None => ready.push(item),
            }
        }

        Ok(ready)
    }

    /// The next batch among eligible tasks.
    pub fn next(&self, cancel: &CancelToken) -> crate::error::EngineResult<Vec<WorkItem>> {
        Ok(select_next(&self.eligible(cancel)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(key: &str, order: Option<i32>, priority: i32, created_at: i64) -> WorkItem {
        WorkItem {
            key: key.to_string(),
            kind: ItemKind::Task,
            title: key.to_string(),
            status: "todo".to_string(),
            priority,
            execution_order: order,
            parent: None,
            progress: 0.0,
            status_override: false,
            created_at,
            updated_at: created_at,
        }
    }

    fn keys(items: &[WorkItem]) -> Vec<&str> {
        items.iter().map(|i| i.key.as_str()).collect()
    }

    #[test]
    fn order_beats_priority_and_equal_order_is_a_batch() {
        let items = vec![
            task("T-1", Some(2), 5, 1),
            task("T-2", Some(1), 3, 2),
            task("T-3", Some(1), 1, 3),
        ];
        assert_eq!(keys(&select_next(&items)), vec!["T-3", "T-2"]);
    }

    #[test]
    fn any_order_outranks_unordered_priority() {
        let items = vec![
            task("T-1", None, 2, 1),
            task("T-2", Some(5), 10, 2),
            task("T-3", None, 1, 3),
            task("T-4", None, 3, 4),
        ];
        assert_eq!(keys(&select_next(&items)), vec!["T-2"]);
    }

    #[test]
    fn unordered_pool_yields_single_best() {
        let items = vec![
            task("T-1", None, 2, 1),
            task("T-2", None, 1, 5),
            task("T-3", None, 1, 3),
        ];
        assert_eq!(keys(&select_next(&items)), vec!["T-3"]);
    }

    #[test]
    fn full_ties_fall_back_to_key() {
        let forward = vec![task("T-b", Some(1), 1, 1), task("T-a", Some(1), 1, 1)];
        let mut backward = forward.clone();
        backward.reverse();
        assert_eq!(keys(&select_next(&forward)), vec!["T-a", "T-b"]);
        assert_eq!(select_next(&forward), select_next(&backward));
    }

    #[test]
    fn empty_input_gives_empty_batch() {
        assert!(select_next(&[]).is_empty());
    }
}
