//! Completion cascade and container progress.
//!
//! A container (epic or feature) that reaches a complete status drags every
//! unfinished descendant along with it. Progress of a container is the
//! share of its direct children that are complete; an empty container sits
//! at 0.0. When the workflow declares `container_status` rules, every child
//! change also re-derives the status of each ancestor.

use super::graph::StatusGraph;
use super::handle::WorkflowHandle;
use crate::cancel::CancelToken;
use crate::error::{EngineError, EngineResult, NotFoundTarget};
use crate::store::WorkStore;
use crate::types::{NewHistoryEntry, TransitionKind, WorkItem};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Aggregate progress of one container.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Progress {
    pub total: usize,
    pub completed: usize,
    /// `completed / total * 100`, 0.0 with no children.
    pub percent: f64,
    /// Mean `progress_weight` of the children, times 100.
    pub weighted_percent: f64,
}

impl Progress {
    pub fn of(children: &[WorkItem], graph: &StatusGraph) -> Self {
        let total = children.len();
        if total == 0 {
            return Self {
                total,
                completed: 0,
                percent: 0.0,
                weighted_percent: 0.0,
            };
        }
        let completed = children
            .iter()
            .filter(|c| graph.is_complete(&c.status))
            .count();
        let weight: f64 = children
            .iter()
            .map(|c| graph.progress_weight(&c.status))
            .sum();
        Self {
            total,
            completed,
            percent: completed as f64 / total as f64 * 100.0,
            weighted_percent: weight / total as f64 * 100.0,
        }
    }

    pub fn all_complete(&self) -> bool {
        self.total > 0 && self.completed == self.total
    }
}

/// Result of cascading completion through a container.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeReport {
    pub root: String,
    /// Number of descendants whose status changed.
    pub updated: usize,
    pub updated_keys: Vec<String>,
    /// Progress of the root after the cascade.
    pub progress: Progress,
}

/// Progress recomputed for an ancestor after a child changed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub key: String,
    pub progress: Progress,
    /// The ancestor was completed because all its children were.
    pub auto_completed: bool,
    /// New status derived from the children, when it changed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_status: Option<String>,
    /// Derivation was skipped because the ancestor pins its status.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub overridden: bool,
}

/// Propagates completion downward and progress upward.
#[derive(Clone)]
pub struct CascadeCoordinator {
    store: Arc<dyn WorkStore>,
    workflow: WorkflowHandle,
}

impl CascadeCoordinator {
    pub fn new(store: Arc<dyn WorkStore>, workflow: WorkflowHandle) -> Self {
        Self { store, workflow }
    }

    /// Force every unfinished descendant of `container` into the cascade
    /// status and recompute progress along the way.
    ///
    /// Running it again on an already cascaded container writes no history.
    pub fn cascade_complete(
        &self,
        container: &WorkItem,
        cancel: &CancelToken,
    ) -> EngineResult<CascadeReport> {
        let graph = self.workflow.load();
        let mut report = CascadeReport {
            root: container.key.clone(),
            updated: 0,
            updated_keys: Vec::new(),
            progress: Progress::of(&[], &graph),
        };
        let progress =
            self.cascade_into(&container.key, &container.key, &graph, cancel, &mut report)?;
        report.progress = progress;
        if report.updated > 0 {
            info!(
                root = %container.key,
                updated = report.updated,
                "Cascaded completion to descendants"
            );
        }
        Ok(report)
    }

    fn cascade_into(
        &self,
        key: &str,
        root: &str,
        graph: &StatusGraph,
        cancel: &CancelToken,
        report: &mut CascadeReport,
    ) -> EngineResult<Progress> {
        let target = graph.cascade_status();
        for child in self.store.list_children(key)? {
            cancel.check()?;
            if !graph.is_complete(&child.status) {
                let entry = NewHistoryEntry {
                    old_status: Some(child.status.clone()),
                    new_status: target.to_string(),
                    agent: None,
                    notes: Some(format!("cascaded from {}", root)),
                    forced: true,
                    kind: TransitionKind::Forward,
                    rejection_reason: None,
                    reason_doc: None,
                };
                self.store.apply_transition(&child.key, &child.status, entry)?;
                debug!(key = %child.key, from = %child.status, to = %target, "Cascaded status");
                report.updated += 1;
                report.updated_keys.push(child.key.clone());
            }
            if child.kind.is_container() {
                self.cascade_into(&child.key, root, graph, cancel, report)?;
            }
        }

        cancel.check()?;
        let children = self.store.list_children(key)?;
        let progress = Progress::of(&children, graph);
        self.store.set_progress(key, progress.percent)?;
        Ok(progress)
    }

    /// Recompute the progress of a container from its current children.
    pub fn recompute_progress(&self, key: &str, cancel: &CancelToken) -> EngineResult<Progress> {
        cancel.check()?;
        let graph = self.workflow.load();
        let children = self.store.list_children(key)?;
        let progress = Progress::of(&children, &graph);
        self.store.set_progress(key, progress.percent)?;
        Ok(progress)
    }

    /// Walk up from `item`, refreshing each ancestor's progress and status.
    ///
    /// With `container_status` rules each ancestor takes the status derived
    /// from its children unless it has `status_override` set. Without rules,
    /// `auto_complete_containers` completes ancestors whose children are all
    /// complete.
    pub fn refresh_ancestors(
        &self,
        item: &WorkItem,
        cancel: &CancelToken,
    ) -> EngineResult<Vec<ProgressUpdate>> {
        let graph = self.workflow.load();
        let mut updates = Vec::new();
        let mut next = item.parent.clone();

        while let Some(parent_key) = next {
            cancel.check()?;
            let parent = self.store.get_item(&parent_key)?.ok_or_else(|| {
                EngineError::NotFound(NotFoundTarget::Item(parent_key.clone()))
            })?;
            let children = self.store.list_children(&parent.key)?;
            let progress = Progress::of(&children, &graph);
            self.store.set_progress(&parent.key, progress.percent)?;

            let mut update = ProgressUpdate {
                key: parent.key.clone(),
                progress,
                auto_completed: false,
                derived_status: None,
                overridden: false,
            };

            match graph.derive_container_status(&children) {
                Some(_) if parent.status_override => {
                    debug!(key = %parent.key, "Status override set, keeping container status");
                    update.overridden = true;
                }
                Some(derived) if derived != parent.status => {
                    cancel.check()?;
                    let kind = graph.classify(Some(&parent.status), derived);
                    let entry = NewHistoryEntry {
                        old_status: Some(parent.status.clone()),
                        new_status: derived.to_string(),
                        agent: None,
                        notes: Some("derived from children".to_string()),
                        forced: true,
                        kind,
                        rejection_reason: match kind {
                            TransitionKind::Rejection => Some("child work reopened".to_string()),
                            TransitionKind::Forward => None,
                        },
                        reason_doc: None,
                    };
                    self.store.apply_transition(&parent.key, &parent.status, entry)?;
                    info!(
                        key = %parent.key,
                        from = %parent.status,
                        to = %derived,
                        "Derived container status"
                    );
                    update.auto_completed = graph.is_complete(derived);
                    update.derived_status = Some(derived.to_string());
                }
                Some(_) => {}
                None => {
                    if graph.settings().auto_complete_containers
                        && progress.all_complete()
                        && !graph.is_complete(&parent.status)
                    {
                        let entry = NewHistoryEntry {
                            old_status: Some(parent.status.clone()),
                            new_status: graph.cascade_status().to_string(),
                            agent: None,
                            notes: Some("all children complete".to_string()),
                            forced: true,
                            kind: TransitionKind::Forward,
                            rejection_reason: None,
                            reason_doc: None,
                        };
                        self.store.apply_transition(&parent.key, &parent.status, entry)?;
                        info!(key = %parent.key, "Auto-completed container");
                        update.auto_completed = true;
                    }
                }
            }

            updates.push(update);
            next = parent.parent;
        }

        Ok(updates)
    }
}
