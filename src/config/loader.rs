//! Configuration loader with tier-based merging.
//!
//! `config.yaml` is merged field-by-field across tiers. Workflow files are
//! first-found-wins: a workflow is a single graph, so tiers never mix.

use super::merge::deep_merge_all;
use super::types::Config;
use super::workflows::WorkflowConfig;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File names searched for a workflow, in order.
pub const WORKFLOW_FILE_NAMES: [&str; 3] = ["workflow.yaml", "workflow.yml", "workflow.json"];

/// Configuration tier priority (lowest to highest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigTier {
    Defaults = 0,
    /// `$CWD/taskflow/`
    Project = 1,
    /// `~/.taskflow/`
    User = 2,
    Environment = 3,
}

impl std::fmt::Display for ConfigTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigTier::Defaults => write!(f, "defaults"),
            ConfigTier::Project => write!(f, "project"),
            ConfigTier::User => write!(f, "user"),
            ConfigTier::Environment => write!(f, "environment"),
        }
    }
}

/// Directories searched for each tier.
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub project_dir: Option<PathBuf>,
    pub user_dir: Option<PathBuf>,
}

impl Default for ConfigPaths {
    fn default() -> Self {
        Self::discover()
    }
}

impl ConfigPaths {
    /// Discover tier directories from the environment and defaults.
    pub fn discover() -> Self {
        let user_dir = std::env::var("TASKFLOW_USER_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(".taskflow")));

        let project_dir = std::env::var("TASKFLOW_PROJECT_DIR")
            .ok()
            .map(PathBuf::from)
            .or_else(|| Some(PathBuf::from("taskflow")));

        Self {
            project_dir,
            user_dir,
        }
    }

    /// Create paths with explicit directories.
    pub fn with_dirs(project_dir: Option<PathBuf>, user_dir: Option<PathBuf>) -> Self {
        Self {
            project_dir,
            user_dir,
        }
    }

    /// Tier directories in lookup order for first-found-wins files.
    fn search_dirs(&self) -> impl Iterator<Item = (ConfigTier, &Path)> {
        let project = self
            .project_dir
            .as_deref()
            .map(|dir| (ConfigTier::Project, dir));
        let user = self.user_dir.as_deref().map(|dir| (ConfigTier::User, dir));
        project.into_iter().chain(user)
    }
}

/// Where the active workflow was loaded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowSource {
    File { tier: ConfigTier, path: PathBuf },
    BuiltIn,
}

impl std::fmt::Display for WorkflowSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkflowSource::File { tier, path } => write!(f, "{} ({})", path.display(), tier),
            WorkflowSource::BuiltIn => write!(f, "built-in default"),
        }
    }
}

/// Configuration loader that handles tier-based merging.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    pub paths: ConfigPaths,
    config: Config,
    /// Highest-priority config file that contributed, if any.
    config_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Load configuration from all tiers.
    pub fn load() -> Result<Self> {
        Self::load_with_paths(ConfigPaths::discover())
    }

    /// Load configuration with explicit tier directories.
    pub fn load_with_paths(paths: ConfigPaths) -> Result<Self> {
        if let Ok(explicit) = std::env::var("TASKFLOW_CONFIG_PATH") {
            let path = PathBuf::from(explicit);
            let mut config = Config::load(&path)
                .with_context(|| format!("failed to load config file {}", path.display()))?;
            Self::apply_env_overrides(&mut config);
            return Ok(Self {
                paths,
                config,
                config_path: Some(path),
            });
        }

        let mut tiers: Vec<Value> = vec![serde_json::to_value(Config::default())?];
        let mut config_path = None;

        // Later tiers override earlier ones: project, then user
        for (tier, dir) in paths.search_dirs() {
            let file = dir.join("config.yaml");
            if !file.exists() {
                continue;
            }
            match read_yaml_value(&file) {
                Ok(Some(value)) => {
                    debug!(tier = %tier, path = %file.display(), "Loaded config tier");
                    tiers.push(value);
                    config_path = Some(file);
                }
                Ok(None) => {}
                Err(e) => warn!(path = %file.display(), error = %e, "Skipping unreadable config file"),
            }
        }

        let mut config: Config = serde_json::from_value(deep_merge_all(tiers))?;
        Self::apply_env_overrides(&mut config);

        Ok(Self {
            paths,
            config,
            config_path,
        })
    }

    fn apply_env_overrides(config: &mut Config) {
        if let Ok(db_path) = std::env::var("TASKFLOW_DB_PATH") {
            config.store.db_path = PathBuf::from(db_path);
        }
        if let Ok(workflow_path) = std::env::var("TASKFLOW_WORKFLOW_PATH") {
            config.workflow.path = Some(PathBuf::from(workflow_path));
        }
    }

    /// Load the active workflow definition.
    ///
    /// An explicitly configured path must load; otherwise the first workflow
    /// file found in the project then user directory wins, falling back to
    /// the built-in default.
    pub fn load_workflow(&self) -> Result<(WorkflowConfig, WorkflowSource)> {
        if let Some(path) = &self.config.workflow.path {
            let workflow = load_workflow_file(path)?;
            return Ok((
                workflow,
                WorkflowSource::File {
                    tier: ConfigTier::Environment,
                    path: path.clone(),
                },
            ));
        }

        for (tier, dir) in self.paths.search_dirs() {
            for name in WORKFLOW_FILE_NAMES {
                let path = dir.join(name);
                if path.exists() {
                    let workflow = load_workflow_file(&path)?;
                    return Ok((workflow, WorkflowSource::File { tier, path }));
                }
            }
        }

        Ok((WorkflowConfig::default(), WorkflowSource::BuiltIn))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    pub fn into_config(self) -> Config {
        self.config
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }
}

fn read_yaml_value(path: &Path) -> Result<Option<Value>> {
    let content = std::fs::read_to_string(path)?;
    let value: Option<Value> = serde_yaml::from_str(&content)?;
    Ok(value)
}

/// Load a workflow file, choosing the parser by extension.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read workflow file {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let workflow = if is_json {
        WorkflowConfig::from_json_str(&content)
            .with_context(|| format!("failed to parse workflow file {}", path.display()))?
    } else {
        WorkflowConfig::from_yaml_str(&content)
            .with_context(|| format!("failed to parse workflow file {}", path.display()))?
    };
    Ok(workflow)
}
