//! Status transitions: legality, classification, atomic persistence, and
//! the follow-up cascade.

use super::action::PopulatedAction;
use super::cascade::{CascadeCoordinator, CascadeReport, ProgressUpdate};
use super::handle::WorkflowHandle;
use crate::cancel::CancelToken;
use crate::error::{EngineError, EngineResult, NotFoundTarget};
use crate::store::WorkStore;
use crate::types::{
    HistoryEntry, ItemKind, NewHistoryEntry, NewWorkItem, TransitionKind, WorkItem,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A request to move one item to a new status.
#[derive(Debug, Clone, Default)]
pub struct TransitionRequest {
    pub key: String,
    pub to: String,
    pub agent: Option<String>,
    pub notes: Option<String>,
    /// Required for rejections unless the workflow turns that off.
    pub reason: Option<String>,
    /// Relative path to a document backing the reason.
    pub reason_doc: Option<String>,
    /// Skip the allowed-successor check. Everything else still applies.
    pub force: bool,
}

impl TransitionRequest {
    pub fn new(key: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            to: to.into(),
            ..Default::default()
        }
    }

    pub fn agent(mut self, agent: impl Into<String>) -> Self {
        self.agent = Some(agent.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn reason_doc(mut self, path: impl Into<String>) -> Self {
        self.reason_doc = Some(path.into());
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Everything that happened because of one accepted transition.
#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub item: WorkItem,
    pub entry: HistoryEntry,
    /// Orchestrator action of the new status, template filled in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<PopulatedAction>,
    /// Present when a container reached a complete status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cascade: Option<CascadeReport>,
    /// Ancestors whose progress was recomputed.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ancestors: Vec<ProgressUpdate>,
}

/// Filters for reading history.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryQuery {
    /// Newest first.
    pub reverse: bool,
    pub rejections_only: bool,
}

/// Drives status changes for work items.
#[derive(Clone)]
pub struct TransitionEngine {
    store: Arc<dyn WorkStore>,
    workflow: WorkflowHandle,
}

impl TransitionEngine {
    pub fn new(store: Arc<dyn WorkStore>, workflow: WorkflowHandle) -> Self {
        Self { store, workflow }
    }

    pub fn workflow(&self) -> &WorkflowHandle {
        &self.workflow
    }

    fn cascade(&self) -> CascadeCoordinator {
        CascadeCoordinator::new(Arc::clone(&self.store), self.workflow.clone())
    }

    fn require_item(&self, key: &str) -> EngineResult<WorkItem> {
        self.store
            .get_item(key)?
            .ok_or_else(|| EngineError::NotFound(NotFoundTarget::Item(key.to_string())))
    }

    /// Create a work item in `status`, or the first start status.
    ///
    /// Features must sit under an epic and tasks under a feature.
    pub fn create_item(
        &self,
        mut item: NewWorkItem,
        cancel: &CancelToken,
    ) -> EngineResult<WorkItem> {
        cancel.check()?;
        let graph = self.workflow.load();
        if item.status.is_empty() {
            item.status = graph.initial_status().to_string();
        }
        if !graph.contains(&item.status) {
            return Err(EngineError::UnknownStatus(item.status));
        }

        let expected_parent = match item.kind {
            ItemKind::Epic => None,
            ItemKind::Feature => Some(ItemKind::Epic),
            ItemKind::Task => Some(ItemKind::Feature),
        };
        match (&item.parent, expected_parent) {
            (None, _) => {}
            (Some(_), None) => {
                return Err(EngineError::InvalidParent {
                    key: item.key,
                    reason: "epics cannot have a parent".to_string(),
                });
            }
            (Some(parent_key), Some(kind)) => {
                let parent = self.require_item(parent_key)?;
                if parent.kind != kind {
                    return Err(EngineError::InvalidParent {
                        key: item.key,
                        reason: format!(
                            "a {} must belong to a {}, not a {}",
                            item.kind.as_str(),
                            kind.as_str(),
                            parent.kind.as_str()
                        ),
                    });
                }
            }
        }

        cancel.check()?;
        let created = self.store.insert_item(item)?;
        info!(
            key = %created.key,
            kind = created.kind.as_str(),
            status = %created.status,
            "Created work item"
        );
        if created.parent.is_some() {
            self.cascade().refresh_ancestors(&created, cancel)?;
        }
        Ok(created)
    }

    /// Move an item to a new status.
    pub fn transition(
        &self,
        request: &TransitionRequest,
        cancel: &CancelToken,
    ) -> EngineResult<TransitionOutcome> {
        cancel.check()?;
        let graph = self.workflow.load();
        let key = request.key.as_str();
        let to = request.to.as_str();

        if !graph.contains(to) {
            return Err(EngineError::UnknownStatus(to.to_string()));
        }

        let item = self.require_item(key)?;
        let from = item.status.clone();

        if !request.force && !graph.can_transition(&from, to) {
            return Err(EngineError::InvalidTransition {
                key: key.to_string(),
                from,
                to: to.to_string(),
                allowed: graph.successors(&item.status).to_vec(),
            });
        }

        let kind = graph.classify(Some(&from), to);
        let reason = non_blank(request.reason.as_deref());
        if kind == TransitionKind::Rejection
            && graph.settings().require_rejection_reason
            && reason.is_none()
        {
            return Err(EngineError::MissingRejectionReason {
                key: key.to_string(),
                from,
                to: to.to_string(),
            });
        }
        if let Some(path) = &request.reason_doc {
            validate_reason_doc(path)?;
        }

        if request.force {
            warn!(
                key = %key,
                from = %from,
                to = %to,
                agent = request.agent.as_deref().unwrap_or("-"),
                "Forcing transition outside the workflow"
            );
        }

        let entry = NewHistoryEntry {
            old_status: Some(from.clone()),
            new_status: to.to_string(),
            agent: non_blank(request.agent.as_deref()),
            notes: non_blank(request.notes.as_deref()),
            forced: request.force,
            kind,
            rejection_reason: match kind {
                TransitionKind::Rejection => reason,
                TransitionKind::Forward => None,
            },
            reason_doc: request.reason_doc.clone(),
        };

        cancel.check()?;
        let (item, entry) = self.store.apply_transition(key, &from, entry)?;
        info!(
            key = %key,
            from = %from,
            to = %to,
            kind = kind.as_str(),
            forced = request.force,
            "Transition applied"
        );

        let action = graph.action(to).map(|a| a.populate(key));
        if let Some(action) = &action {
            debug!(key = %key, action = %action.action, "Orchestrator action for new status");
        }

        let coordinator = self.cascade();
        let cascade = if graph.is_complete(to) && item.kind.is_container() {
            Some(coordinator.cascade_complete(&item, cancel)?)
        } else {
            None
        };
        let ancestors = coordinator.refresh_ancestors(&item, cancel)?;

        // Cascade may have rewritten progress
        let item = self.require_item(key)?;

        Ok(TransitionOutcome {
            item,
            entry,
            action,
            cascade,
            ancestors,
        })
    }

    /// Pin (or release) a container's status so child changes no longer
    /// derive it.
    pub fn set_status_override(
        &self,
        key: &str,
        status_override: bool,
        cancel: &CancelToken,
    ) -> EngineResult<WorkItem> {
        cancel.check()?;
        let item = self.store.set_status_override(key, status_override)?;
        info!(key = %key, status_override, "Updated status override");
        Ok(item)
    }

    /// Transition history of an item, oldest first unless reversed.
    pub fn history(&self, key: &str, query: HistoryQuery) -> EngineResult<Vec<HistoryEntry>> {
        self.require_item(key)?;
        let mut entries = self.store.history(key)?;
        if query.rejections_only {
            entries.retain(|e| e.kind == TransitionKind::Rejection);
        }
        if query.reverse {
            entries.reverse();
        }
        Ok(entries)
    }

    /// How many times an item has been sent back.
    pub fn rejection_count(&self, key: &str) -> EngineResult<usize> {
        Ok(self
            .history(
                key,
                HistoryQuery {
                    rejections_only: true,
                    ..Default::default()
                },
            )?
            .len())
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

/// Reject reason-document paths that are empty, absolute, or climb out of
/// the project with `..`.
pub fn validate_reason_doc(path: &str) -> EngineResult<()> {
    let invalid = |reason| EngineError::InvalidDocumentPath {
        path: path.to_string(),
        reason,
    };

    if path.trim().is_empty() {
        return Err(invalid("path is empty"));
    }
    let has_drive = path.len() >= 2
        && path.as_bytes()[0].is_ascii_alphabetic()
        && path.as_bytes()[1] == b':';
    if path.starts_with('/')
        || path.starts_with('\\')
        || has_drive
        || std::path::Path::new(path).is_absolute()
    {
        return Err(invalid("path must be relative"));
    }
    if path.split(['/', '\\']).any(|segment| segment == "..") {
        return Err(invalid("path must not contain '..' segments"));
    }
    Ok(())
}
