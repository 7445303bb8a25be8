//! Workflow definition: status flow, status metadata, special statuses and
//! behavior settings.
//!
//! A workflow file is YAML or JSON:
//!
//! ```yaml
//! version: "1.0"
//! status_flow:
//!   todo: [in_progress]
//!   in_progress: [done]
//!   done: []
//! special_statuses:
//!   _start_: [todo]
//!   _complete_: [done]
//! status_metadata:
//!   in_progress:
//!     phase: development
//!     orchestrator_action:
//!       action: spawn_agent
//!       agent_type: developer
//!       skills: [implementation]
//!       instruction_template: "Implement {task_id}"
//! ```
//!
//! This module only describes the shape. Soundness checks live in
//! [`crate::workflow::validator`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The only workflow schema version understood by this crate.
pub const SUPPORTED_WORKFLOW_VERSION: &str = "1.0";

/// Raw orchestrator action as written in the workflow file.
///
/// Kept loose so that a misspelled action or a missing field becomes a
/// validation violation instead of a parse failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActionSpec {
    #[serde(default)]
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    #[serde(default)]
    pub instruction_template: String,
}

/// Display and behavior metadata for one status.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusMetadata {
    /// Free-form grouping label; also drives forward/rejection classification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Contribution (0.0-1.0) of an item in this status to weighted progress.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_weight: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestrator_action: Option<ActionSpec>,
}

/// The `_start_` and `_complete_` status sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpecialStatuses {
    #[serde(rename = "_start_", default)]
    pub start: Vec<String>,

    #[serde(rename = "_complete_", default)]
    pub complete: Vec<String>,
}

/// Statuses a container takes when derived from its children.
///
/// A child counts as idle in a start status or in `draft`, as done in a
/// complete status, and as active otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatusRules {
    /// No children, or every child idle.
    pub draft: String,
    /// Some child active, or some but not all children done.
    pub active: String,
    /// Every child done. Defaults to the cascade status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<String>,
}

/// Settings for workflow behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Rejections must carry a non-empty reason.
    #[serde(default = "default_true")]
    pub require_rejection_reason: bool,

    /// Ranked phases, earliest first. Phases not listed carry no rank.
    #[serde(default = "default_phase_order")]
    pub phase_order: Vec<String>,

    /// Transitions that are always rejections, keyed by source status.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub reject_transitions: BTreeMap<String, Vec<String>>,

    /// Status children are forced into when their container completes.
    /// Defaults to the first `_complete_` status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cascade_status: Option<String>,

    /// Complete a container automatically once all its children are complete.
    /// Only consulted when `container_status` is not set.
    #[serde(default)]
    pub auto_complete_containers: bool,

    /// Derive container status from children after every child change.
    /// Items with `status_override` set keep their status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_status: Option<ContainerStatusRules>,
}

fn default_true() -> bool {
    true
}

fn default_phase_order() -> Vec<String> {
    ["planning", "development", "review", "qa", "approval", "done"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            require_rejection_reason: true,
            phase_order: default_phase_order(),
            reject_transitions: BTreeMap::new(),
            cascade_status: None,
            auto_complete_containers: false,
            container_status: None,
        }
    }
}

/// A complete workflow definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_version")]
    pub version: String,

    /// Status → allowed next statuses.
    #[serde(default)]
    pub status_flow: BTreeMap<String, Vec<String>>,

    #[serde(default)]
    pub status_metadata: BTreeMap<String, StatusMetadata>,

    #[serde(default)]
    pub special_statuses: SpecialStatuses,

    #[serde(default)]
    pub settings: WorkflowSettings,
}

fn default_version() -> String {
    SUPPORTED_WORKFLOW_VERSION.to_string()
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            status_flow: default_status_flow(),
            status_metadata: default_status_metadata(),
            special_statuses: SpecialStatuses {
                start: vec!["todo".to_string()],
                complete: vec!["completed".to_string()],
            },
            settings: WorkflowSettings {
                container_status: Some(ContainerStatusRules {
                    draft: "todo".to_string(),
                    active: "in_progress".to_string(),
                    completed: None,
                }),
                ..WorkflowSettings::default()
            },
        }
    }
}

fn default_status_flow() -> BTreeMap<String, Vec<String>> {
    let flow: [(&str, &[&str]); 5] = [
        ("todo", &["in_progress", "blocked"]),
        ("in_progress", &["ready_for_review", "blocked"]),
        ("ready_for_review", &["completed", "in_progress"]),
        ("completed", &[]),
        ("blocked", &["todo", "in_progress"]),
    ];
    flow.into_iter()
        .map(|(status, next)| {
            (
                status.to_string(),
                next.iter().map(|s| s.to_string()).collect(),
            )
        })
        .collect()
}

fn default_status_metadata() -> BTreeMap<String, StatusMetadata> {
    let rows = [
        ("todo", "planning", "gray", "Task is ready to be worked on", 0.0),
        ("in_progress", "development", "blue", "Task is actively being worked on", 0.5),
        ("ready_for_review", "review", "yellow", "Task is awaiting review", 0.75),
        ("completed", "done", "green", "Task is complete", 1.0),
        ("blocked", "blocked", "red", "Task is blocked by an external dependency", 0.0),
    ];
    rows.into_iter()
        .map(|(status, phase, color, description, weight)| {
            (
                status.to_string(),
                StatusMetadata {
                    phase: Some(phase.to_string()),
                    color: Some(color.to_string()),
                    description: Some(description.to_string()),
                    progress_weight: Some(weight),
                    orchestrator_action: None,
                },
            )
        })
        .collect()
}

impl WorkflowConfig {
    /// Parse a YAML workflow document.
    pub fn from_yaml_str(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Parse a JSON document holding a workflow.
    ///
    /// The workflow keys may sit next to unrelated configuration; a document
    /// without `status_flow` yields the built-in default workflow.
    pub fn from_json_str(content: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(content)?;
        if value.get("status_flow").is_none() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
    }

    /// Metadata for a status, if declared.
    pub fn metadata(&self, status: &str) -> Option<&StatusMetadata> {
        self.status_metadata.get(status)
    }
}
