use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::key::{ItemKey, ItemKind};
use super::status::{Priority, Status};

/// Remote tracker identifier (an issue number).
pub type RemoteRef = i64;

/// A node in the epic / story / task / subtask tree.
///
/// All four kinds share this record. Fields a kind does not carry are always
/// `None`: subtasks have no description, priority or `started_at`, and only
/// tasks carry effort estimates. The parent is fixed at creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkItem {
    pub key: ItemKey,
    pub parent: Option<ItemKey>,
    pub title: String,
    pub description: Option<String>,
    pub status: Status,
    pub priority: Option<Priority>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    /// Set at most once, when the item is first mirrored remotely.
    pub remote_ref: Option<RemoteRef>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl WorkItem {
    pub fn kind(&self) -> ItemKind {
        self.key.kind()
    }
}

/// Input for creating a new item.
///
/// The kind comes from the key. `parent` is required for everything but epics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateItemInput {
    pub key: ItemKey,
    /// Expected kind. When given it must agree with the key's shape.
    #[serde(default)]
    pub kind: Option<ItemKind>,
    pub parent: Option<ItemKey>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to `Backlog`.
    #[serde(default)]
    pub status: Option<Status>,
    /// Defaults to `High` for epics and `Medium` for stories and tasks.
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
}

impl CreateItemInput {
    /// Minimal input: key, parent and title.
    pub fn new(key: ItemKey, parent: Option<ItemKey>, title: impl Into<String>) -> Self {
        Self {
            key,
            kind: None,
            parent,
            title: title.into(),
            description: None,
            status: None,
            priority: None,
            estimated_hours: None,
        }
    }
}

/// Partial update as written to the store. Only the fields that are `Some`
/// are written.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UpdateItemInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl UpdateItemInput {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.status.is_none()
            && self.priority.is_none()
            && self.estimated_hours.is_none()
            && self.actual_hours.is_none()
            && self.started_at.is_none()
            && self.completed_at.is_none()
    }
}

/// Caller-facing patch. Timestamps are absent: they only move through status
/// transitions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ItemPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<Status>,
    pub priority: Option<Priority>,
    pub estimated_hours: Option<f64>,
    pub actual_hours: Option<f64>,
}

impl ItemPatch {
    pub fn status(status: Status) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }
}

impl From<ItemPatch> for UpdateItemInput {
    fn from(patch: ItemPatch) -> Self {
        Self {
            title: patch.title,
            description: patch.description,
            status: patch.status,
            priority: patch.priority,
            estimated_hours: patch.estimated_hours,
            actual_hours: patch.actual_hours,
            started_at: None,
            completed_at: None,
        }
    }
}

/// Filters for listing items of one kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ItemFilter {
    pub parent: Option<ItemKey>,
    pub status: Option<Status>,
}

/// An item together with its direct children, used for detail responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemDetail {
    #[serde(flatten)]
    pub item: WorkItem,
    pub children: Vec<WorkItem>,
}
