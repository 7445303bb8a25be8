//! Structural soundness checks for a workflow definition.
//!
//! [`validate`] never stops at the first problem: every violation is
//! collected into a [`ValidationReport`] so a user can fix a workflow file in
//! one pass. Checks run in a fixed order (dangling successors, start set,
//! complete set, reachability, paths to completion, orchestrator actions)
//! followed by the lint-style checks.

use super::action::{OrchestratorAction, lint_template};
use crate::config::{SUPPORTED_WORKFLOW_VERSION, WorkflowConfig};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

/// How hard the validator should be on missing orchestrator actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ValidationMode {
    #[default]
    Normal,
    /// Every non-terminal reachable status must declare an action.
    Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    UnsupportedVersion,
    DanglingReference,
    MissingStartStatuses,
    UndefinedStartStatus,
    MissingCompleteStatuses,
    UndefinedCompleteStatus,
    UnreachableStatus,
    DeadEndStatus,
    InvalidOrchestratorAction,
    MissingOrchestratorAction,
    TemplateWarning,
    UndefinedMetadataStatus,
    InvalidCascadeStatus,
    InvalidContainerStatus,
    UndefinedRejectTransition,
}

/// One problem found in a workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub severity: Severity,
    pub kind: ViolationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix: Option<String>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            Some(status) => write!(f, "[{}] {}", status, self.message)?,
            None => write!(f, "{}", self.message)?,
        }
        if let Some(fix) = &self.fix {
            write!(f, " (fix: {})", fix)?;
        }
        Ok(())
    }
}

/// Every violation found, in check order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations
            .iter()
            .filter(|v| v.severity == Severity::Warning)
    }

    pub fn has_kind(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }

    fn push(
        &mut self,
        severity: Severity,
        kind: ViolationKind,
        status: Option<&str>,
        message: impl Into<String>,
        fix: Option<&str>,
    ) {
        self.violations.push(Violation {
            severity,
            kind,
            status: status.map(String::from),
            message: message.into(),
            fix: fix.map(String::from),
        });
    }

    fn error(
        &mut self,
        kind: ViolationKind,
        status: Option<&str>,
        message: impl Into<String>,
        fix: Option<&str>,
    ) {
        self.push(Severity::Error, kind, status, message, fix);
    }

    fn warning(
        &mut self,
        kind: ViolationKind,
        status: Option<&str>,
        message: impl Into<String>,
        fix: Option<&str>,
    ) {
        self.push(Severity::Warning, kind, status, message, fix);
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let errors: Vec<String> = self.errors().map(|v| v.to_string()).collect();
        if errors.is_empty() {
            return write!(f, "no errors");
        }
        write!(f, "{} error(s): {}", errors.len(), errors.join("; "))
    }
}

/// Validate a workflow definition.
pub fn validate(config: &WorkflowConfig, mode: ValidationMode) -> ValidationReport {
    let mut report = ValidationReport::default();
    let flow = &config.status_flow;

    if config.version != SUPPORTED_WORKFLOW_VERSION {
        report.error(
            ViolationKind::UnsupportedVersion,
            None,
            format!("unsupported workflow version \"{}\"", config.version),
            Some("set version: \"1.0\""),
        );
    }

    // Dangling successors
    for (status, next) in flow {
        for target in next {
            if !flow.contains_key(target) {
                report.error(
                    ViolationKind::DanglingReference,
                    Some(status.as_str()),
                    format!("transitions to undefined status \"{}\"", target),
                    Some("define the target under status_flow or remove the transition"),
                );
            }
        }
    }

    // Start and complete sets
    let start = &config.special_statuses.start;
    if start.is_empty() {
        report.error(
            ViolationKind::MissingStartStatuses,
            None,
            "no start statuses defined",
            Some("list at least one status under special_statuses._start_"),
        );
    }
    for status in start {
        if !flow.contains_key(status) {
            report.error(
                ViolationKind::UndefinedStartStatus,
                Some(status.as_str()),
                "start status is not defined in status_flow",
                None,
            );
        }
    }

    let complete = &config.special_statuses.complete;
    if complete.is_empty() {
        report.error(
            ViolationKind::MissingCompleteStatuses,
            None,
            "no complete statuses defined",
            Some("list at least one status under special_statuses._complete_"),
        );
    }
    for status in complete {
        if !flow.contains_key(status) {
            report.error(
                ViolationKind::UndefinedCompleteStatus,
                Some(status.as_str()),
                "complete status is not defined in status_flow",
                None,
            );
        }
    }

    // Reachability from start
    let roots: Vec<&str> = start
        .iter()
        .filter(|s| flow.contains_key(*s))
        .map(String::as_str)
        .collect();
    let reachable = if roots.is_empty() {
        None
    } else {
        let depths = bfs_depths(flow, &roots);
        for status in flow.keys() {
            if !depths.contains_key(status.as_str()) {
                report.error(
                    ViolationKind::UnreachableStatus,
                    Some(status.as_str()),
                    "not reachable from any start status",
                    Some("add a transition into this status or remove it"),
                );
            }
        }
        Some(depths)
    };

    // Path to completion, walking the reversed graph from complete statuses
    let sinks: Vec<&str> = complete
        .iter()
        .filter(|s| flow.contains_key(*s))
        .map(String::as_str)
        .collect();
    if !sinks.is_empty() {
        let reversed = reverse(flow);
        let finishing = bfs_depths(&reversed, &sinks);
        for status in flow.keys() {
            if !finishing.contains_key(status.as_str()) {
                report.error(
                    ViolationKind::DeadEndStatus,
                    Some(status.as_str()),
                    "no path to any complete status",
                    Some("add a transition leading toward a complete status"),
                );
            }
        }
    }

    // Orchestrator actions
    for (status, meta) in &config.status_metadata {
        let Some(spec) = &meta.orchestrator_action else {
            continue;
        };
        match OrchestratorAction::from_spec(spec) {
            Ok(action) => {
                for warning in lint_template(action.instruction_template()) {
                    report.warning(
                        ViolationKind::TemplateWarning,
                        Some(status.as_str()),
                        warning,
                        None,
                    );
                }
            }
            Err(problems) => {
                for p in problems {
                    report.error(
                        ViolationKind::InvalidOrchestratorAction,
                        Some(status.as_str()),
                        format!("orchestrator_action.{}: {}", p.field, p.problem),
                        Some(p.fix.as_str()),
                    );
                }
            }
        }
    }

    if let Some(reachable) = &reachable {
        let complete: HashSet<&str> = complete.iter().map(String::as_str).collect();
        let severity = match mode {
            ValidationMode::Strict => Severity::Error,
            ValidationMode::Normal => Severity::Warning,
        };
        for status in flow.keys() {
            let declared = config
                .status_metadata
                .get(status)
                .is_some_and(|m| m.orchestrator_action.is_some());
            if reachable.contains_key(status.as_str())
                && !complete.contains(status.as_str())
                && !declared
            {
                report.push(
                    severity,
                    ViolationKind::MissingOrchestratorAction,
                    Some(status.as_str()),
                    "no orchestrator action declared",
                    Some("add status_metadata.<status>.orchestrator_action"),
                );
            }
        }
    }

    for status in config.status_metadata.keys() {
        if !flow.contains_key(status) {
            report.warning(
                ViolationKind::UndefinedMetadataStatus,
                Some(status.as_str()),
                "metadata declared for a status missing from status_flow",
                None,
            );
        }
    }

    if let Some(cascade) = &config.settings.cascade_status
        && !complete.contains(cascade)
    {
        report.error(
            ViolationKind::InvalidCascadeStatus,
            Some(cascade.as_str()),
            "cascade_status must be one of the complete statuses",
            None,
        );
    }

    if let Some(rules) = &config.settings.container_status {
        for (field, status) in [("draft", &rules.draft), ("active", &rules.active)] {
            if !flow.contains_key(status) {
                report.error(
                    ViolationKind::InvalidContainerStatus,
                    Some(status.as_str()),
                    format!("container_status.{} is missing from status_flow", field),
                    None,
                );
            } else if complete.contains(status) {
                report.error(
                    ViolationKind::InvalidContainerStatus,
                    Some(status.as_str()),
                    format!("container_status.{} must not be a complete status", field),
                    None,
                );
            }
        }
        if let Some(done) = &rules.completed
            && !complete.contains(done)
        {
            report.error(
                ViolationKind::InvalidContainerStatus,
                Some(done.as_str()),
                "container_status.completed must be one of the complete statuses",
                None,
            );
        }
    }

    for (from, targets) in &config.settings.reject_transitions {
        for to in std::iter::once(from).chain(targets) {
            if !flow.contains_key(to) {
                report.warning(
                    ViolationKind::UndefinedRejectTransition,
                    Some(to.as_str()),
                    "reject_transitions names a status missing from status_flow",
                    None,
                );
            }
        }
    }

    report
}

/// Breadth-first distance from the nearest root. Successors that are not
/// graph keys are not followed.
pub(crate) fn bfs_depths<'a>(
    flow: &'a BTreeMap<String, Vec<String>>,
    roots: &[&'a str],
) -> HashMap<&'a str, usize> {
    let mut depths: HashMap<&str, usize> = HashMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    for root in roots {
        if let Some((key, _)) = flow.get_key_value(*root)
            && !depths.contains_key(key.as_str())
        {
            depths.insert(key.as_str(), 0);
            queue.push_back(key.as_str());
        }
    }

    while let Some(current) = queue.pop_front() {
        let depth = depths.get(current).copied().unwrap_or(0);
        let Some(next) = flow.get(current) else {
            continue;
        };
        for target in next {
            if let Some((key, _)) = flow.get_key_value(target)
                && !depths.contains_key(key.as_str())
            {
                depths.insert(key.as_str(), depth + 1);
                queue.push_back(key.as_str());
            }
        }
    }

    depths
}

fn reverse(flow: &BTreeMap<String, Vec<String>>) -> BTreeMap<String, Vec<String>> {
    let mut reversed: BTreeMap<String, Vec<String>> =
        flow.keys().map(|k| (k.clone(), Vec::new())).collect();
    for (status, next) in flow {
        for target in next {
            if let Some(sources) = reversed.get_mut(target) {
                sources.push(status.clone());
            }
        }
    }
    reversed
}
