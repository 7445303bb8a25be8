//! Engine error taxonomy and its serializable presentation form.

use crate::store::StoreError;
use crate::types::RelationshipType;
use crate::workflow::ValidationReport;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// What a `NotFound` error refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotFoundTarget {
    Item(String),
    Relationship(i64),
    Edge {
        from: String,
        to: String,
        rel_type: RelationshipType,
    },
}

impl fmt::Display for NotFoundTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFoundTarget::Item(key) => write!(f, "work item '{}'", key),
            NotFoundTarget::Relationship(id) => write!(f, "relationship {}", id),
            NotFoundTarget::Edge { from, to, rel_type } => {
                write!(f, "{} relationship {} -> {}", rel_type, from, to)
            }
        }
    }
}

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The workflow graph failed validation. Fatal at load time.
    #[error("invalid workflow configuration: {0}")]
    Configuration(ValidationReport),

    #[error("status '{0}' is not defined in the workflow")]
    UnknownStatus(String),

    #[error("cannot move {key} from '{from}' to '{to}' (allowed: {})", format_allowed(.allowed))]
    InvalidTransition {
        key: String,
        from: String,
        to: String,
        allowed: Vec<String>,
    },

    #[error("moving {key} from '{from}' back to '{to}' requires a rejection reason")]
    MissingRejectionReason { key: String, from: String, to: String },

    #[error("invalid reason document path '{path}': {reason}")]
    InvalidDocumentPath { path: String, reason: &'static str },

    #[error("{0} not found")]
    NotFound(NotFoundTarget),

    #[error("work item '{0}' already exists")]
    AlreadyExists(String),

    #[error("invalid parent for {key}: {reason}")]
    InvalidParent { key: String, reason: String },

    #[error("task '{0}' cannot have a relationship with itself")]
    SelfRelationship(String),

    #[error("status of {key} changed concurrently (expected '{expected}', found '{actual}')")]
    StaleStatus {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("store failure: {0}")]
    Store(StoreError),
}

fn format_allowed(allowed: &[String]) -> String {
    if allowed.is_empty() {
        "none".to_string()
    } else {
        allowed.join(", ")
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::ItemNotFound(key) => EngineError::NotFound(NotFoundTarget::Item(key)),
            StoreError::RelationshipNotFound(id) => {
                EngineError::NotFound(NotFoundTarget::Relationship(id))
            }
            StoreError::EdgeNotFound { from, to, rel_type } => {
                EngineError::NotFound(NotFoundTarget::Edge { from, to, rel_type })
            }
            StoreError::AlreadyExists(key) => EngineError::AlreadyExists(key),
            StoreError::StaleStatus {
                key,
                expected,
                actual,
            } => EngineError::StaleStatus {
                key,
                expected: expected.unwrap_or_else(|| "<none>".to_string()),
                actual,
            },
            other => EngineError::Store(other),
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration
    InvalidWorkflow,
    ConfigError,

    // Validation
    UnknownStatus,
    InvalidTransition,
    MissingRejectionReason,
    InvalidDocumentPath,
    SelfRelationship,
    InvalidParent,

    // Lookup
    ItemNotFound,
    RelationshipNotFound,

    // Conflict
    AlreadyExists,
    StaleStatus,

    Cancelled,
    StoreError,
    IoError,
    Internal,
}

impl EngineError {
    pub fn code(&self) -> ErrorCode {
        match self {
            EngineError::Configuration(_) => ErrorCode::InvalidWorkflow,
            EngineError::UnknownStatus(_) => ErrorCode::UnknownStatus,
            EngineError::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            EngineError::MissingRejectionReason { .. } => ErrorCode::MissingRejectionReason,
            EngineError::InvalidDocumentPath { .. } => ErrorCode::InvalidDocumentPath,
            EngineError::NotFound(NotFoundTarget::Item(_)) => ErrorCode::ItemNotFound,
            EngineError::NotFound(
                NotFoundTarget::Relationship(_) | NotFoundTarget::Edge { .. },
            ) => ErrorCode::RelationshipNotFound,
            EngineError::AlreadyExists(_) => ErrorCode::AlreadyExists,
            EngineError::SelfRelationship(_) => ErrorCode::SelfRelationship,
            EngineError::InvalidParent { .. } => ErrorCode::InvalidParent,
            EngineError::StaleStatus { .. } => ErrorCode::StaleStatus,
            EngineError::Cancelled => ErrorCode::Cancelled,
            EngineError::Store(_) => ErrorCode::StoreError,
        }
    }
}

/// Structured error for JSON output.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    fn with_message(mut self, message: String) -> Self {
        self.message = message;
        self
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<&EngineError> for ErrorResponse {
    fn from(err: &EngineError) -> Self {
        let response = ErrorResponse::new(err.code(), err.to_string());
        match err {
            EngineError::Configuration(report) => match serde_json::to_value(report) {
                Ok(details) => response.with_details(details),
                Err(_) => response,
            },
            EngineError::InvalidTransition { allowed, .. } => {
                response.with_details(serde_json::json!({ "allowed": allowed }))
            }
            _ => response,
        }
    }
}

impl From<&anyhow::Error> for ErrorResponse {
    /// Classify a boundary error by the first recognizable cause in its chain.
    fn from(err: &anyhow::Error) -> Self {
        let message = format!("{:#}", err);
        for cause in err.chain() {
            if let Some(engine_err) = cause.downcast_ref::<EngineError>() {
                return ErrorResponse::from(engine_err).with_message(message);
            }
            let code = if cause.is::<serde_yaml::Error>() || cause.is::<serde_json::Error>() {
                ErrorCode::ConfigError
            } else if cause.is::<std::io::Error>() {
                ErrorCode::IoError
            } else if cause.is::<StoreError>()
                || cause.is::<rusqlite::Error>()
                || cause.is::<refinery::Error>()
            {
                ErrorCode::StoreError
            } else {
                continue;
            };
            return ErrorResponse::new(code, message);
        }
        ErrorResponse::new(ErrorCode::Internal, message)
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.code, self.message)
    }
}
