//! Configuration system.
//!
//! Engine settings (`config.yaml`) are merged field-by-field from three tiers:
//! 1. **Defaults** - compiled in
//! 2. **Project** - `$CWD/taskflow/`
//! 3. **User** - `~/.taskflow/`, then environment variables
//!
//! The workflow definition (`workflow.yaml`, `workflow.yml` or `workflow.json`)
//! is first-found-wins: explicit path, project, user, built-in default.
//!
//! ## Environment Variables
//! - `TASKFLOW_CONFIG_PATH` - Explicit config file (skips tier merging)
//! - `TASKFLOW_DB_PATH` - Database path
//! - `TASKFLOW_WORKFLOW_PATH` - Workflow file
//! - `TASKFLOW_USER_DIR` - User config dir (default: `~/.taskflow`)
//! - `TASKFLOW_PROJECT_DIR` - Project config dir (default: `./taskflow`)

mod loader;
mod merge;
mod types;
pub mod workflows;

pub use loader::{
    ConfigLoader, ConfigPaths, ConfigTier, WORKFLOW_FILE_NAMES, WorkflowSource,
    load_workflow_file,
};
pub use merge::{deep_merge, deep_merge_all};
pub use types::*;
pub use workflows::{
    ActionSpec, ContainerStatusRules, SUPPORTED_WORKFLOW_VERSION, SpecialStatuses,
    StatusMetadata, WorkflowConfig, WorkflowSettings,
};
