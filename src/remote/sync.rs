//! Remote Sync Coordinator.
//!
//! Each pass walks the store in ascending key order, one remote call at a
//! time. A remote failure is logged and recorded against the item, and the
//! pass moves on; nothing is retried. Local state is never rolled back
//! because a remote call failed.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use super::payload::IssueContext;
use super::{label_catalogue, ClientError, IssueTracker, MilestoneSpec};
use crate::db::Database;
use crate::error::Result;
use crate::models::{ItemFilter, ItemKey, ItemKind, RemoteRef, Status, WorkItem, STATUS_LABEL_PREFIX};
use crate::plan::PlanDocument;

/// Narrows a pass to some kinds, one epic, or the first `limit` items.
#[derive(Debug, Clone)]
pub struct SyncScope {
    pub kinds: Vec<ItemKind>,
    pub epic: Option<ItemKey>,
    pub limit: Option<usize>,
}

impl Default for SyncScope {
    fn default() -> Self {
        Self {
            kinds: ItemKind::ALL.to_vec(),
            epic: None,
            limit: None,
        }
    }
}

impl SyncScope {
    pub fn includes(&self, item: &WorkItem) -> bool {
        self.kinds.contains(&item.kind())
            && self
                .epic
                .as_ref()
                .map_or(true, |epic| item.key.is_within(epic))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Synced {
    pub target: String,
    pub issue: Option<RemoteRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    pub target: String,
    pub message: String,
}

/// Outcome of one pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub succeeded: Vec<Synced>,
    pub failed: Vec<SyncFailure>,
    pub skipped: Vec<String>,
}

impl SyncReport {
    fn success(&mut self, target: impl ToString, issue: Option<RemoteRef>) {
        self.succeeded.push(Synced {
            target: target.to_string(),
            issue,
        });
    }

    fn failure(&mut self, target: impl ToString, message: impl ToString) {
        let target = target.to_string();
        let message = message.to_string();
        tracing::warn!("{}: {}", target, message);
        self.failed.push(SyncFailure { target, message });
    }

    /// Fold another pass's outcome into this one.
    pub fn merge(&mut self, other: SyncReport) {
        self.succeeded.extend(other.succeeded);
        self.failed.extend(other.failed);
        self.skipped.extend(other.skipped);
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} succeeded, {} failed, {} skipped",
            self.succeeded.len(),
            self.failed.len(),
            self.skipped.len()
        )
    }
}

/// Enforces a minimum gap between consecutive remote calls.
#[derive(Debug)]
pub struct Pacer {
    delay: Duration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, last: None }
    }

    /// Wait until `delay` has passed since the previous call, then mark now.
    pub async fn wait(&mut self) {
        if let Some(last) = self.last {
            tokio::time::sleep_until(last + self.delay).await;
        }
        self.last = Some(Instant::now());
    }
}

pub struct SyncCoordinator<'a, T: IssueTracker + ?Sized> {
    db: &'a Database,
    plan: &'a PlanDocument,
    tracker: &'a T,
    pacer: Pacer,
}

impl<'a, T: IssueTracker + ?Sized> SyncCoordinator<'a, T> {
    pub fn new(db: &'a Database, plan: &'a PlanDocument, tracker: &'a T, delay: Duration) -> Self {
        Self {
            db,
            plan,
            tracker,
            pacer: Pacer::new(delay),
        }
    }

    /// Create or update every label the other passes attach.
    pub async fn ensure_labels(&mut self) -> Result<SyncReport> {
        let epics = self.db.list_items(ItemKind::Epic, &ItemFilter::default())?;
        let mut report = SyncReport::default();

        for label in label_catalogue(&epics) {
            self.pacer.wait().await;
            match self.tracker.ensure_label(&label).await {
                Ok(()) => report.success(&label.name, None),
                Err(e) => report.failure(&label.name, e),
            }
        }

        tracing::info!("Labels: {}", report.summary());
        Ok(report)
    }

    /// Create or update one milestone per epic, titled `E<n>: <title>`.
    pub async fn ensure_milestones(&mut self) -> Result<SyncReport> {
        let epics = self.db.list_items(ItemKind::Epic, &ItemFilter::default())?;
        let mut report = SyncReport::default();

        for epic in &epics {
            let milestone = MilestoneSpec::for_epic(epic);
            self.pacer.wait().await;
            match self.tracker.ensure_milestone(&milestone).await {
                Ok(()) => report.success(&milestone.title, None),
                Err(e) => report.failure(&milestone.title, e),
            }
        }

        tracing::info!("Milestones: {}", report.summary());
        Ok(report)
    }

    /// Labels, then milestones, then issues for everything in scope.
    pub async fn run_all(&mut self, scope: &SyncScope) -> Result<SyncReport> {
        let mut report = self.ensure_labels().await?;
        report.merge(self.ensure_milestones().await?);
        report.merge(self.create_missing(scope).await?);
        Ok(report)
    }

    /// Open an issue for every in-scope item that has none yet.
    ///
    /// The issue number is written back through a conditional claim, so an
    /// item is never linked twice. If another pass linked the item while this
    /// one was creating, the new issue is reported as a duplicate.
    pub async fn create_missing(&mut self, scope: &SyncScope) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let mut pending = Vec::new();

        for item in self.db.all_items()? {
            if !scope.includes(&item) {
                continue;
            }
            if item.remote_ref.is_some() {
                report.skipped.push(item.key.to_string());
            } else {
                pending.push(item);
            }
        }
        if let Some(limit) = scope.limit {
            pending.truncate(limit);
        }

        tracing::info!("Creating {} issues", pending.len());
        for item in pending {
            let payload = IssueContext::load(self.db, self.plan, &item)?.payload();

            self.pacer.wait().await;
            let number = match self
                .tracker
                .create_issue(&payload.title, &payload.body, &payload.labels)
                .await
            {
                Ok(number) => number,
                Err(e) => {
                    report.failure(&item.key, e);
                    continue;
                }
            };

            if self.db.link_remote(&item.key, number)? {
                tracing::info!("{} -> #{}", item.key, number);
                report.success(&item.key, Some(number));
            } else {
                report.failure(
                    &item.key,
                    format!("already linked elsewhere; issue #{} is a duplicate", number),
                );
            }
        }

        tracing::info!("Create: {}", report.summary());
        Ok(report)
    }

    /// Mirror each linked item's status onto its issue's labels, closing the
    /// issue when the item is done.
    pub async fn mirror_status(&mut self, scope: &SyncScope) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let items = self.linked_in_scope(scope, &mut report)?;

        tracing::info!("Syncing status of {} issues", items.len());
        for (item, number) in items {
            match self.mirror_one(number, item.status).await {
                Ok(()) => report.success(&item.key, Some(number)),
                Err(e) => report.failure(&item.key, e),
            }
        }

        tracing::info!("Status: {}", report.summary());
        Ok(report)
    }

    async fn mirror_one(&mut self, number: RemoteRef, status: Status) -> std::result::Result<(), ClientError> {
        let canonical = status.label();

        self.pacer.wait().await;
        let current = self.tracker.list_labels(number).await?;

        for stale in current
            .iter()
            .filter(|label| label.starts_with(STATUS_LABEL_PREFIX) && **label != canonical)
        {
            self.pacer.wait().await;
            self.tracker.remove_label(number, stale).await?;
        }
        if !current.contains(&canonical) {
            self.pacer.wait().await;
            self.tracker.add_label(number, &canonical).await?;
        }
        if status == Status::Done {
            self.pacer.wait().await;
            self.tracker.close_issue(number).await?;
        }
        Ok(())
    }

    /// Replace each linked issue's body with a fresh rendering.
    pub async fn refresh_content(&mut self, scope: &SyncScope) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let items = self.linked_in_scope(scope, &mut report)?;

        tracing::info!("Refreshing {} issue bodies", items.len());
        for (item, number) in items {
            let payload = IssueContext::load(self.db, self.plan, &item)?.payload();

            self.pacer.wait().await;
            match self.tracker.edit_issue(number, &payload.body).await {
                Ok(()) => report.success(&item.key, Some(number)),
                Err(e) => report.failure(&item.key, e),
            }
        }

        tracing::info!("Content: {}", report.summary());
        Ok(report)
    }

    /// Linked items in scope; unlinked ones are recorded as skipped.
    fn linked_in_scope(
        &self,
        scope: &SyncScope,
        report: &mut SyncReport,
    ) -> Result<Vec<(WorkItem, RemoteRef)>> {
        let mut linked = Vec::new();
        for item in self.db.all_items()? {
            if !scope.includes(&item) {
                continue;
            }
            match item.remote_ref {
                Some(number) => linked.push((item, number)),
                None => report.skipped.push(item.key.to_string()),
            }
        }
        if let Some(limit) = scope.limit {
            linked.truncate(limit);
        }
        Ok(linked)
    }
}
