//! Remote issue tracker seam.
//!
//! The coordinator in [`sync`] talks to the tracker only through
//! [`IssueTracker`]. [`GitHubClient`] is the production implementation and
//! [`MemoryTracker`] backs the tests.

pub mod client;
pub mod memory;
pub mod payload;
pub mod sync;

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::models::{ItemKind, Priority, RemoteRef, Status, WorkItem};

pub use client::{ClientError, GitHubClient};
pub use memory::{MemoryIssue, MemoryTracker};
pub use payload::{IssueContext, IssuePayload};
pub use sync::{Pacer, SyncCoordinator, SyncFailure, SyncReport, SyncScope, Synced};

/// Operations the sync coordinator needs from an issue tracker.
///
/// Every failure is a [`ClientError`]; callers treat them all alike.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Open a new issue and return its number.
    async fn create_issue(
        &self,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<RemoteRef, ClientError>;

    /// Replace the whole body of an issue.
    async fn edit_issue(&self, number: RemoteRef, body: &str) -> Result<(), ClientError>;

    async fn add_label(&self, number: RemoteRef, label: &str) -> Result<(), ClientError>;

    /// Removing a label the issue does not carry succeeds.
    async fn remove_label(&self, number: RemoteRef, label: &str) -> Result<(), ClientError>;

    /// Closing an already closed issue succeeds.
    async fn close_issue(&self, number: RemoteRef) -> Result<(), ClientError>;

    async fn list_labels(&self, number: RemoteRef) -> Result<BTreeSet<String>, ClientError>;

    /// Create a repository label, or update its colour and description if it
    /// already exists.
    async fn ensure_label(&self, label: &LabelSpec) -> Result<(), ClientError>;

    /// Create a milestone, or update the description of the one with the
    /// same title.
    async fn ensure_milestone(&self, milestone: &MilestoneSpec) -> Result<(), ClientError>;
}

/// A repository label definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSpec {
    pub name: String,
    pub description: String,
    /// Six hex digits, no leading `#`.
    pub color: String,
}

impl LabelSpec {
    pub fn new(name: impl Into<String>, description: impl Into<String>, color: &str) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            color: color.to_string(),
        }
    }
}

/// A repository milestone, one per epic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MilestoneSpec {
    pub title: String,
    pub description: String,
}

impl MilestoneSpec {
    /// `E<n>: <title>`, described by the epic's description.
    pub fn for_epic(epic: &WorkItem) -> Self {
        Self {
            title: format!("{}: {}", epic.key, epic.title),
            description: epic.description.clone().unwrap_or_default(),
        }
    }
}

const EPIC_COLORS: [&str; 7] = [
    "7057ff", "0052cc", "008672", "d93f0b", "e99695", "fbca04", "c5def5",
];

/// Every label the sync passes attach: kind, priority and status labels, plus
/// one `epic:E<n>` label per epic.
pub fn label_catalogue(epics: &[WorkItem]) -> Vec<LabelSpec> {
    let mut labels = Vec::new();

    for epic in epics.iter().filter(|e| e.kind() == ItemKind::Epic) {
        let number = epic.key.epic_number();
        let color = EPIC_COLORS[(number as usize).saturating_sub(1) % EPIC_COLORS.len()];
        labels.push(LabelSpec::new(
            epic_label(epic.key.epic_number()),
            format!("Epic {}: {}", number, epic.title),
            color,
        ));
    }

    for kind in ItemKind::ALL {
        let (description, color) = match kind {
            ItemKind::Epic => ("Epic - Major feature", "7057ff"),
            ItemKind::Story => ("Story - User-facing feature", "0e8a16"),
            ItemKind::Task => ("Task - Development work", "1d76db"),
            ItemKind::Subtask => ("Subtask - Checklist item", "bfdadc"),
        };
        labels.push(LabelSpec::new(type_label(kind), description, color));
    }

    for priority in Priority::ALL {
        let (description, color) = match priority {
            Priority::Critical => ("Critical priority", "b60205"),
            Priority::High => ("High priority", "d93f0b"),
            Priority::Medium => ("Medium priority", "fbca04"),
            Priority::Low => ("Low priority", "0e8a16"),
        };
        labels.push(LabelSpec::new(priority.label(), description, color));
    }

    for status in Status::ALL {
        let (description, color) = match status {
            Status::Backlog => ("In backlog", "ededed"),
            Status::Todo => ("Scheduled", "c5def5"),
            Status::InProgress => ("In progress", "fbca04"),
            Status::Done => ("Completed", "0e8a16"),
        };
        labels.push(LabelSpec::new(status.label(), description, color));
    }

    labels
}

pub fn type_label(kind: ItemKind) -> String {
    format!("type:{}", kind)
}

pub fn epic_label(number: u32) -> String {
    format!("epic:E{}", number)
}
