//! Orchestrator actions attached to statuses.

use crate::config::ActionSpec;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Placeholder substituted with the item key.
pub const TASK_ID_PLACEHOLDER: &str = "{task_id}";

/// Templates longer than this produce a lint warning.
pub const MAX_TEMPLATE_LEN: usize = 2000;

/// What an orchestrator should do when an item enters a status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum OrchestratorAction {
    SpawnAgent {
        agent_type: String,
        skills: Vec<String>,
        instruction_template: String,
    },
    Pause {
        instruction_template: String,
    },
    WaitForTriage {
        instruction_template: String,
    },
    Archive {
        instruction_template: String,
    },
}

/// A problem with one field of an action declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionProblem {
    pub field: String,
    pub problem: String,
    pub fix: String,
}

impl ActionProblem {
    fn new(field: impl Into<String>, problem: impl Into<String>, fix: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            problem: problem.into(),
            fix: fix.into(),
        }
    }
}

impl OrchestratorAction {
    pub const NAMES: [&'static str; 4] = ["spawn_agent", "pause", "wait_for_triage", "archive"];

    /// Build a typed action, reporting every missing or blank field.
    pub fn from_spec(spec: &ActionSpec) -> Result<Self, Vec<ActionProblem>> {
        let mut problems = Vec::new();
        let template = spec.instruction_template.clone();

        if !Self::NAMES.contains(&spec.action.as_str()) {
            problems.push(ActionProblem::new(
                "action",
                format!("invalid action type \"{}\"", spec.action),
                format!("use one of: {}", Self::NAMES.join(", ")),
            ));
            return Err(problems);
        }

        if template.trim().is_empty() {
            problems.push(ActionProblem::new(
                "instruction_template",
                "missing required field",
                "add instruction_template with a {task_id} placeholder",
            ));
        }

        let action = match spec.action.as_str() {
            "spawn_agent" => {
                let agent_type = spec.agent_type.clone().unwrap_or_default();
                if agent_type.trim().is_empty() {
                    problems.push(ActionProblem::new(
                        "agent_type",
                        "missing required field for spawn_agent action",
                        "add agent_type (e.g. \"developer\")",
                    ));
                }
                if spec.skills.is_empty() {
                    problems.push(ActionProblem::new(
                        "skills",
                        "empty or missing skills list for spawn_agent action",
                        "add at least one skill",
                    ));
                }
                for (i, skill) in spec.skills.iter().enumerate() {
                    if skill.trim().is_empty() {
                        problems.push(ActionProblem::new(
                            format!("skills[{}]", i),
                            "empty skill name",
                            "remove the entry or name the skill",
                        ));
                    }
                }
                OrchestratorAction::SpawnAgent {
                    agent_type,
                    skills: spec.skills.clone(),
                    instruction_template: template,
                }
            }
            "pause" => OrchestratorAction::Pause {
                instruction_template: template,
            },
            "wait_for_triage" => OrchestratorAction::WaitForTriage {
                instruction_template: template,
            },
            _ => OrchestratorAction::Archive {
                instruction_template: template,
            },
        };

        if problems.is_empty() {
            Ok(action)
        } else {
            Err(problems)
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OrchestratorAction::SpawnAgent { .. } => "spawn_agent",
            OrchestratorAction::Pause { .. } => "pause",
            OrchestratorAction::WaitForTriage { .. } => "wait_for_triage",
            OrchestratorAction::Archive { .. } => "archive",
        }
    }

    pub fn instruction_template(&self) -> &str {
        match self {
            OrchestratorAction::SpawnAgent {
                instruction_template,
                ..
            }
            | OrchestratorAction::Pause {
                instruction_template,
            }
            | OrchestratorAction::WaitForTriage {
                instruction_template,
            }
            | OrchestratorAction::Archive {
                instruction_template,
            } => instruction_template,
        }
    }

    /// Substitute every `{task_id}` with `key`.
    pub fn populate(&self, key: &str) -> PopulatedAction {
        let (agent_type, skills) = match self {
            OrchestratorAction::SpawnAgent {
                agent_type, skills, ..
            } => (Some(agent_type.clone()), skills.clone()),
            _ => (None, Vec::new()),
        };
        PopulatedAction {
            action: self.name().to_string(),
            agent_type,
            skills,
            instruction: self.instruction_template().replace(TASK_ID_PLACEHOLDER, key),
        }
    }
}

/// An action ready to hand to an orchestrator, template already filled in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulatedAction {
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    pub instruction: String,
}

fn placeholder_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[a-zA-Z_][a-zA-Z0-9_]*\}").ok())
        .as_ref()
}

/// Non-fatal template problems.
pub fn lint_template(template: &str) -> Vec<String> {
    let mut warnings = Vec::new();

    if !template.contains(TASK_ID_PLACEHOLDER) {
        warnings.push("template does not contain {task_id} placeholder".to_string());
    }

    if template.contains('{') && !template.contains('}') {
        warnings.push("malformed placeholder: unclosed brace {".to_string());
    }

    if let Some(re) = placeholder_regex() {
        for m in re.find_iter(template) {
            if m.as_str() != TASK_ID_PLACEHOLDER {
                warnings.push(format!(
                    "unknown placeholder {} (only {{task_id}} is supported)",
                    m.as_str()
                ));
            }
        }
    }

    if template.chars().count() > MAX_TEMPLATE_LEN {
        warnings.push(format!(
            "template exceeds {} character limit",
            MAX_TEMPLATE_LEN
        ));
    }

    warnings
}
