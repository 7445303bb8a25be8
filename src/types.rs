//! Core record types shared by the engine, the stores and the CLI.

use serde::{Deserialize, Serialize};

/// Priority as an integer (lower = more urgent).
pub type Priority = i32;

/// Default priority for new items.
pub const DEFAULT_PRIORITY: Priority = 3;

/// Level of a work item in the epic → feature → task hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Epic,
    Feature,
    Task,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Epic => "epic",
            ItemKind::Feature => "feature",
            ItemKind::Task => "task",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "epic" => Some(ItemKind::Epic),
            "feature" => Some(ItemKind::Feature),
            "task" => Some(ItemKind::Task),
            _ => None,
        }
    }

    /// Containers hold children and carry aggregate progress.
    pub fn is_container(&self) -> bool {
        matches!(self, ItemKind::Epic | ItemKind::Feature)
    }
}

/// A unit of work (epic, feature or task).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub key: String,
    pub kind: ItemKind,
    pub title: String,
    pub status: String,
    pub priority: Priority,
    /// Explicit sequencing; `None` means unordered.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_order: Option<i32>,
    /// Key of the containing feature or epic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    /// Completion percentage (0-100), meaningful for containers only.
    pub progress: f64,
    /// Keep this container's status instead of deriving it from children.
    #[serde(default)]
    pub status_override: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Input for creating a work item.
#[derive(Debug, Clone)]
pub struct NewWorkItem {
    pub key: String,
    pub kind: ItemKind,
    pub title: String,
    pub status: String,
    pub priority: Priority,
    pub execution_order: Option<i32>,
    pub parent: Option<String>,
    pub status_override: bool,
}

impl NewWorkItem {
    pub fn new(key: impl Into<String>, kind: ItemKind, status: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            title: key.clone(),
            key,
            kind,
            status: status.into(),
            priority: DEFAULT_PRIORITY,
            execution_order: None,
            parent: None,
            status_override: false,
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn execution_order(mut self, order: Option<i32>) -> Self {
        self.execution_order = order;
        self
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn status_override(mut self, status_override: bool) -> Self {
        self.status_override = status_override;
        self
    }
}

/// Whether a transition moves work forward or sends it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    Forward,
    Rejection,
}

impl TransitionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionKind::Forward => "forward",
            TransitionKind::Rejection => "rejection",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "forward" => Some(TransitionKind::Forward),
            "rejection" => Some(TransitionKind::Rejection),
            _ => None,
        }
    }
}

/// One accepted status change. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i64,
    pub item_key: String,
    /// `None` for the very first transition of an item.
    pub old_status: Option<String>,
    pub new_status: String,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub forced: bool,
    pub kind: TransitionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason_doc: Option<String>,
}

/// A history entry before the store assigns its id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewHistoryEntry {
    pub old_status: Option<String>,
    pub new_status: String,
    pub agent: Option<String>,
    pub notes: Option<String>,
    pub forced: bool,
    pub kind: TransitionKind,
    pub rejection_reason: Option<String>,
    pub reason_doc: Option<String>,
}

/// Typed edge between two tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipType {
    DependsOn,
    Blocks,
    RelatedTo,
    Follows,
    SpawnedFrom,
    Duplicates,
    References,
}

impl RelationshipType {
    pub const ALL: [RelationshipType; 7] = [
        RelationshipType::DependsOn,
        RelationshipType::Blocks,
        RelationshipType::RelatedTo,
        RelationshipType::Follows,
        RelationshipType::SpawnedFrom,
        RelationshipType::Duplicates,
        RelationshipType::References,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipType::DependsOn => "depends_on",
            RelationshipType::Blocks => "blocks",
            RelationshipType::RelatedTo => "related_to",
            RelationshipType::Follows => "follows",
            RelationshipType::SpawnedFrom => "spawned_from",
            RelationshipType::Duplicates => "duplicates",
            RelationshipType::References => "references",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for RelationshipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, typed relationship between two tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: i64,
    pub from_key: String,
    pub to_key: String,
    pub rel_type: RelationshipType,
    pub created_at: i64,
}
