//! CLI command definitions for taskflow.
//!
//! The entry point is [`Cli`]; each subcommand maps onto one engine
//! operation and prints its result as JSON.

use crate::types::{ItemKind, Priority, RelationshipType};
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Kind of work item, as accepted on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Epic,
    Feature,
    Task,
}

impl From<KindArg> for ItemKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Epic => ItemKind::Epic,
            KindArg::Feature => ItemKind::Feature,
            KindArg::Task => ItemKind::Task,
        }
    }
}

/// Parse a relationship type name such as `depends_on`.
pub fn parse_relationship_type(s: &str) -> Result<RelationshipType, String> {
    RelationshipType::from_str(s).ok_or_else(|| {
        let known: Vec<&str> = RelationshipType::ALL.iter().map(|t| t.as_str()).collect();
        format!("unknown relationship type '{}' (expected one of: {})", s, known.join(", "))
    })
}

/// Workflow-driven work tracking
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Path to database file (overrides config)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Path to workflow file (overrides config)
    #[arg(short, long, global = true)]
    pub workflow: Option<String>,

    /// Abort the operation after this many milliseconds
    #[arg(long, global = true, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: String,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check the workflow definition and print every violation
    Validate(ValidateArgs),

    /// Create an epic, feature or task
    Create(CreateArgs),

    /// Move a work item to another status
    Transition(TransitionArgs),

    /// Show the transition history of a work item
    History(HistoryArgs),

    /// Add a typed relationship between two tasks
    Link(LinkArgs),

    /// Remove relationships by id or by endpoints and type
    Unlink(UnlinkArgs),

    /// Print the dependency tree of a task
    Deps(DepsArgs),

    /// List the next batch of work ready to start
    Next,

    /// Complete a work item, cascading to its descendants
    Complete(CompleteArgs),

    /// Pin a container's status so child changes no longer derive it
    Pin(PinArgs),
}

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Require an orchestrator action on every reachable non-terminal status
    #[arg(long)]
    pub strict: bool,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Unique key, e.g. TASK-12
    pub key: String,

    #[arg(short, long, value_enum)]
    pub kind: KindArg,

    /// Title (default: the key)
    #[arg(short, long)]
    pub title: Option<String>,

    /// Initial status (default: first start status)
    #[arg(short, long)]
    pub status: Option<String>,

    /// Lower values are more urgent
    #[arg(short, long)]
    pub priority: Option<Priority>,

    /// Execution order; equal values run in parallel
    #[arg(short, long)]
    pub order: Option<i32>,

    /// Key of the parent epic or feature
    #[arg(long)]
    pub parent: Option<String>,

    /// Keep the status of this container instead of deriving it
    #[arg(long)]
    pub status_override: bool,
}

#[derive(Args, Debug)]
pub struct PinArgs {
    pub key: String,

    /// Release the pin so the status follows the children again
    #[arg(long)]
    pub release: bool,
}

#[derive(Args, Debug)]
pub struct TransitionArgs {
    pub key: String,

    /// Target status
    pub status: String,

    #[arg(short, long)]
    pub agent: Option<String>,

    #[arg(short, long)]
    pub notes: Option<String>,

    /// Why the item is being sent back
    #[arg(short, long)]
    pub reason: Option<String>,

    /// Relative path to a document backing the reason
    #[arg(long, value_name = "PATH")]
    pub reason_doc: Option<String>,

    /// Allow a move the workflow does not declare
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    pub key: String,

    /// Newest first
    #[arg(long)]
    pub reverse: bool,

    /// Only rejections
    #[arg(long)]
    pub rejections: bool,
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    pub from: String,
    pub to: String,

    #[arg(short = 't', long = "type", default_value = "depends_on", value_parser = parse_relationship_type)]
    pub rel_type: RelationshipType,
}

#[derive(Args, Debug)]
pub struct UnlinkArgs {
    /// Relationship id
    #[arg(long, conflicts_with_all = ["from", "to"])]
    pub id: Option<i64>,

    #[arg(required_unless_present = "id")]
    pub from: Option<String>,

    #[arg(required_unless_present = "id")]
    pub to: Option<String>,

    #[arg(short = 't', long = "type", default_value = "depends_on", value_parser = parse_relationship_type)]
    pub rel_type: RelationshipType,
}

#[derive(Args, Debug)]
pub struct DepsArgs {
    pub key: String,

    /// Show what depends on the task instead of what it depends on
    #[arg(long)]
    pub dependents: bool,

    /// Maximum depth (overrides config)
    #[arg(long)]
    pub max_depth: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CompleteArgs {
    pub key: String,

    #[arg(short, long)]
    pub agent: Option<String>,

    #[arg(short, long)]
    pub notes: Option<String>,

    /// Complete even if the workflow has no edge from the current status
    #[arg(short, long)]
    pub force: bool,
}
