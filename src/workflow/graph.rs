//! The validated status graph.

use super::action::OrchestratorAction;
use super::validator::{ValidationMode, ValidationReport, bfs_depths, validate};
use crate::config::{StatusMetadata, WorkflowConfig, WorkflowSettings};
use crate::error::EngineError;
use crate::types::{TransitionKind, WorkItem};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;

/// Status graph that passed validation.
///
/// Only [`StatusGraph::from_config`] constructs one, so every holder can rely
/// on non-empty start/complete sets, no dangling successors, and every
/// status reachable from start with a path to completion.
#[derive(Debug, Clone)]
pub struct StatusGraph {
    flow: BTreeMap<String, Vec<String>>,
    start: Vec<String>,
    complete: Vec<String>,
    metadata: BTreeMap<String, StatusMetadata>,
    actions: BTreeMap<String, OrchestratorAction>,
    settings: WorkflowSettings,
    /// BFS distance from the nearest start status.
    depth: HashMap<String, usize>,
    /// 1-based rank of each ranked phase.
    phase_rank: HashMap<String, usize>,
}

impl StatusGraph {
    /// Validate `config` and build the graph.
    ///
    /// Warnings are logged and returned alongside the graph; any error
    /// yields [`EngineError::Configuration`] carrying the full report.
    pub fn from_config(
        config: WorkflowConfig,
        mode: ValidationMode,
    ) -> Result<(Self, ValidationReport), EngineError> {
        let report = validate(&config, mode);
        if !report.is_valid() {
            return Err(EngineError::Configuration(report));
        }
        for warning in report.warnings() {
            warn!(warning = %warning, "Workflow validation warning");
        }

        let roots: Vec<&str> = config
            .special_statuses
            .start
            .iter()
            .map(String::as_str)
            .collect();
        let depth = bfs_depths(&config.status_flow, &roots)
            .into_iter()
            .map(|(status, d)| (status.to_string(), d))
            .collect();

        // Validation already rejected malformed actions
        let actions = config
            .status_metadata
            .iter()
            .filter_map(|(status, meta)| {
                let spec = meta.orchestrator_action.as_ref()?;
                OrchestratorAction::from_spec(spec)
                    .ok()
                    .map(|action| (status.clone(), action))
            })
            .collect();

        let phase_rank = config
            .settings
            .phase_order
            .iter()
            .enumerate()
            .map(|(i, phase)| (phase.clone(), i + 1))
            .collect();

        let graph = Self {
            flow: config.status_flow,
            start: config.special_statuses.start,
            complete: config.special_statuses.complete,
            metadata: config.status_metadata,
            actions,
            settings: config.settings,
            depth,
            phase_rank,
        };
        Ok((graph, report))
    }

    pub fn statuses(&self) -> impl Iterator<Item = &str> {
        self.flow.keys().map(String::as_str)
    }

    pub fn contains(&self, status: &str) -> bool {
        self.flow.contains_key(status)
    }

    /// Allowed next statuses, in declared order.
    pub fn successors(&self, status: &str) -> &[String] {
        self.flow.get(status).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn can_transition(&self, from: &str, to: &str) -> bool {
        self.successors(from).iter().any(|s| s == to)
    }

    pub fn start_statuses(&self) -> &[String] {
        &self.start
    }

    pub fn complete_statuses(&self) -> &[String] {
        &self.complete
    }

    pub fn is_start(&self, status: &str) -> bool {
        self.start.iter().any(|s| s == status)
    }

    pub fn is_complete(&self, status: &str) -> bool {
        self.complete.iter().any(|s| s == status)
    }

    /// Initial status for new items.
    pub fn initial_status(&self) -> &str {
        self.start.first().map(String::as_str).unwrap_or_default()
    }

    /// Status children are forced into when their container completes.
    pub fn cascade_status(&self) -> &str {
        self.settings
            .cascade_status
            .as_deref()
            .or_else(|| self.complete.first().map(String::as_str))
            .unwrap_or_default()
    }

    /// Status a container should hold given its direct children, or `None`
    /// when the workflow does not derive container status.
    pub fn derive_container_status(&self, children: &[WorkItem]) -> Option<&str> {
        let rules = self.settings.container_status.as_ref()?;
        let completed = rules.completed.as_deref().unwrap_or(self.cascade_status());

        let total = children.len();
        let done = children
            .iter()
            .filter(|c| self.is_complete(&c.status))
            .count();
        let active = children
            .iter()
            .filter(|c| {
                !self.is_complete(&c.status) && !self.is_start(&c.status) && c.status != rules.draft
            })
            .count();

        let status = if total == 0 {
            rules.draft.as_str()
        } else if done == total {
            completed
        } else if active > 0 || done > 0 {
            rules.active.as_str()
        } else {
            rules.draft.as_str()
        };
        Some(status)
    }

    pub fn settings(&self) -> &WorkflowSettings {
        &self.settings
    }

    pub fn metadata(&self, status: &str) -> Option<&StatusMetadata> {
        self.metadata.get(status)
    }

    pub fn phase(&self, status: &str) -> Option<&str> {
        self.metadata
            .get(status)
            .and_then(|m| m.phase.as_deref())
            .filter(|p| !p.is_empty())
    }

    /// Rank of a phase, 0 for phases outside `phase_order`.
    pub fn phase_rank(&self, phase: &str) -> usize {
        self.phase_rank.get(phase).copied().unwrap_or(0)
    }

    pub fn depth(&self, status: &str) -> Option<usize> {
        self.depth.get(status).copied()
    }

    pub fn action(&self, status: &str) -> Option<&OrchestratorAction> {
        self.actions.get(status)
    }

    /// Weight of a status for weighted progress. Complete statuses weigh
    /// 1.0 unless configured otherwise, everything else 0.0.
    pub fn progress_weight(&self, status: &str) -> f64 {
        match self.metadata(status).and_then(|m| m.progress_weight) {
            Some(w) => w.clamp(0.0, 1.0),
            None if self.is_complete(status) => 1.0,
            None => 0.0,
        }
    }

    /// Classify a move as forward or rejection.
    ///
    /// In priority order:
    /// 1. no previous status, or a same-status move, is forward;
    /// 2. an edge listed in `settings.reject_transitions` is a rejection;
    /// 3. when both statuses have a phase, moving to a lower-ranked phase is
    ///    a rejection (unranked phases such as `blocked` never count);
    /// 4. otherwise declared edges are forward and an undeclared move to a
    ///    status closer to start is a rejection.
    pub fn classify(&self, from: Option<&str>, to: &str) -> TransitionKind {
        let Some(from) = from else {
            return TransitionKind::Forward;
        };
        if from == to {
            return TransitionKind::Forward;
        }

        if self
            .settings
            .reject_transitions
            .get(from)
            .is_some_and(|targets| targets.iter().any(|t| t == to))
        {
            return TransitionKind::Rejection;
        }

        if let (Some(from_phase), Some(to_phase)) = (self.phase(from), self.phase(to)) {
            let current = self.phase_rank(from_phase);
            let next = self.phase_rank(to_phase);
            return if next < current && next > 0 {
                TransitionKind::Rejection
            } else {
                TransitionKind::Forward
            };
        }

        if self.can_transition(from, to) {
            return TransitionKind::Forward;
        }
        match (self.depth(from), self.depth(to)) {
            (Some(current), Some(next)) if next < current => TransitionKind::Rejection,
            _ => TransitionKind::Forward,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpecialStatuses;

    fn bare(flow: &[(&str, &[&str])], start: &[&str], complete: &[&str]) -> WorkflowConfig {
        WorkflowConfig {
            status_flow: flow
                .iter()
                .map(|(s, next)| (s.to_string(), next.iter().map(|n| n.to_string()).collect()))
                .collect(),
            status_metadata: BTreeMap::new(),
            special_statuses: SpecialStatuses {
                start: start.iter().map(|s| s.to_string()).collect(),
                complete: complete.iter().map(|s| s.to_string()).collect(),
            },
            settings: WorkflowSettings::default(),
            ..WorkflowConfig::default()
        }
    }

    fn default_graph() -> StatusGraph {
        StatusGraph::from_config(WorkflowConfig::default(), ValidationMode::Normal)
            .unwrap()
            .0
    }

    #[test]
    fn invalid_config_is_a_configuration_error() {
        let config = bare(&[("a", &["b"])], &["a"], &["a"]);
        let err = StatusGraph::from_config(config, ValidationMode::Normal).unwrap_err();
        match err {
            EngineError::Configuration(report) => assert!(!report.is_valid()),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn phase_order_drives_classification() {
        let graph = default_graph();
        assert_eq!(
            graph.classify(Some("ready_for_review"), "in_progress"),
            TransitionKind::Rejection
        );
        assert_eq!(
            graph.classify(Some("in_progress"), "ready_for_review"),
            TransitionKind::Forward
        );
        // blocked carries an unranked phase
        assert_eq!(
            graph.classify(Some("blocked"), "todo"),
            TransitionKind::Forward
        );
        assert_eq!(graph.classify(None, "todo"), TransitionKind::Forward);
    }

    #[test]
    fn structural_fallback_without_phases() {
        let config = bare(
            &[
                ("todo", &["in_progress"]),
                ("in_progress", &["done", "blocked"]),
                ("blocked", &["in_progress"]),
                ("done", &[]),
            ],
            &["todo"],
            &["done"],
        );
        let (graph, _) = StatusGraph::from_config(config, ValidationMode::Normal).unwrap();
        assert_eq!(
            graph.classify(Some("in_progress"), "todo"),
            TransitionKind::Rejection
        );
        assert_eq!(
            graph.classify(Some("blocked"), "in_progress"),
            TransitionKind::Forward
        );
        assert_eq!(graph.classify(Some("todo"), "done"), TransitionKind::Forward);
    }

    #[test]
    fn backward_within_one_phase_is_forward() {
        let mut config = bare(
            &[
                ("todo", &["coding"]),
                ("coding", &["testing"]),
                ("testing", &["done"]),
                ("done", &[]),
            ],
            &["todo"],
            &["done"],
        );
        for status in ["coding", "testing"] {
            config.status_metadata.insert(
                status.to_string(),
                StatusMetadata {
                    phase: Some("development".to_string()),
                    ..StatusMetadata::default()
                },
            );
        }
        let (graph, _) = StatusGraph::from_config(config, ValidationMode::Normal).unwrap();
        // Undeclared and shallower, but the phase rank is unchanged
        assert_eq!(
            graph.classify(Some("testing"), "coding"),
            TransitionKind::Forward
        );
        assert_eq!(
            graph.classify(Some("testing"), "todo"),
            TransitionKind::Rejection
        );
    }

    #[test]
    fn explicit_reject_tag_wins() {
        let mut config = WorkflowConfig::default();
        config
            .settings
            .reject_transitions
            .insert("blocked".into(), vec!["todo".into()]);
        let (graph, _) = StatusGraph::from_config(config, ValidationMode::Normal).unwrap();
        assert_eq!(
            graph.classify(Some("blocked"), "todo"),
            TransitionKind::Rejection
        );
    }

    #[test]
    fn weights_default_by_completeness() {
        let config = bare(&[("a", &["b"]), ("b", &[])], &["a"], &["b"]);
        let (graph, _) = StatusGraph::from_config(config, ValidationMode::Normal).unwrap();
        assert_eq!(graph.progress_weight("a"), 0.0);
        assert_eq!(graph.progress_weight("b"), 1.0);
        assert_eq!(default_graph().progress_weight("in_progress"), 0.5);
    }

    fn child(status: &str) -> WorkItem {
        WorkItem {
            key: format!("T-{}", status),
            kind: crate::types::ItemKind::Task,
            title: status.to_string(),
            status: status.to_string(),
            priority: 3,
            execution_order: None,
            parent: Some("F-1".to_string()),
            progress: 0.0,
            status_override: false,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn container_status_follows_children() {
        let graph = default_graph();
        let derive = |statuses: &[&str]| {
            let children: Vec<WorkItem> = statuses.iter().map(|s| child(s)).collect();
            graph.derive_container_status(&children).map(String::from)
        };
        assert_eq!(derive(&[]).as_deref(), Some("todo"));
        assert_eq!(derive(&["todo", "todo"]).as_deref(), Some("todo"));
        assert_eq!(derive(&["todo", "blocked"]).as_deref(), Some("in_progress"));
        assert_eq!(derive(&["todo", "completed"]).as_deref(), Some("in_progress"));
        assert_eq!(derive(&["completed", "completed"]).as_deref(), Some("completed"));

        let (bare_graph, _) = StatusGraph::from_config(
            bare(&[("a", &["b"]), ("b", &[])], &["a"], &["b"]),
            ValidationMode::Normal,
        )
        .unwrap();
        assert_eq!(bare_graph.derive_container_status(&[child("a")]), None);
    }

    #[test]
    fn cascade_status_defaults_to_first_complete() {
        let graph = default_graph();
        assert_eq!(graph.cascade_status(), "completed");
        assert_eq!(graph.initial_status(), "todo");
    }
}
