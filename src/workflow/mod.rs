//! Workflow engine: status graph validation, transitions, cascades,
//! relationships and work selection.

pub mod action;
pub mod cascade;
pub mod graph;
pub mod handle;
pub mod relationships;
pub mod selector;
pub mod transition;
pub mod tree;
pub mod validator;

pub use action::{OrchestratorAction, PopulatedAction};
pub use cascade::{CascadeCoordinator, CascadeReport, Progress, ProgressUpdate};
pub use graph::StatusGraph;
pub use handle::WorkflowHandle;
pub use relationships::RelationshipGraph;
pub use selector::{NextWorkSelector, compare, select_next};
pub use transition::{
    HistoryQuery, TransitionEngine, TransitionOutcome, TransitionRequest, validate_reason_doc,
};
pub use tree::{DependencyTreeBuilder, DependencyTreeNode};
pub use validator::{
    Severity, ValidationMode, ValidationReport, Violation, ViolationKind, validate,
};
