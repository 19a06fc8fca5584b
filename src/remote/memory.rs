//! In-memory issue tracker.
//!
//! Keeps issues and labels in a map and records every call, so sync passes
//! can be exercised without a network. Failures can be injected per item key
//! or for the whole tracker.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ClientError, IssueTracker, LabelSpec, MilestoneSpec};
use crate::models::RemoteRef;

/// A stored issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryIssue {
    pub number: RemoteRef,
    pub title: String,
    pub body: String,
    pub labels: BTreeSet<String>,
    pub closed: bool,
}

#[derive(Debug, Default)]
struct State {
    next_number: RemoteRef,
    issues: BTreeMap<RemoteRef, MemoryIssue>,
    labels: BTreeMap<String, LabelSpec>,
    milestones: BTreeMap<String, MilestoneSpec>,
    calls: Vec<String>,
    failing: BTreeSet<String>,
    unavailable: bool,
}

#[derive(Debug, Default)]
pub struct MemoryTracker {
    state: Mutex<State>,
}

impl MemoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call that concerns the issue titled `[<key>] ...`.
    pub fn fail_on(&self, key: &str) {
        self.lock().failing.insert(format!("[{}]", key));
    }

    /// Fail every call until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    pub fn issue(&self, number: RemoteRef) -> Option<MemoryIssue> {
        self.lock().issues.get(&number).cloned()
    }

    pub fn issues(&self) -> Vec<MemoryIssue> {
        self.lock().issues.values().cloned().collect()
    }

    pub fn label(&self, name: &str) -> Option<LabelSpec> {
        self.lock().labels.get(name).cloned()
    }

    pub fn milestone(&self, title: &str) -> Option<MilestoneSpec> {
        self.lock().milestones.get(title).cloned()
    }

    pub fn milestones(&self) -> Vec<MilestoneSpec> {
        self.lock().milestones.values().cloned().collect()
    }

    /// Calls made so far, as `"<operation> <target>"` strings.
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().expect("tracker lock poisoned")
    }
}

impl State {
    fn check_title(&self, title: &str) -> Result<(), ClientError> {
        if self.unavailable {
            return Err(ClientError::Unavailable("tracker offline".to_string()));
        }
        if let Some(marker) = self.failing.iter().find(|m| title.starts_with(m.as_str())) {
            return Err(ClientError::Unavailable(format!("injected failure for {}", marker)));
        }
        Ok(())
    }

    fn issue_mut(&mut self, number: RemoteRef) -> Result<&mut MemoryIssue, ClientError> {
        let title = self
            .issues
            .get(&number)
            .map(|issue| issue.title.clone())
            .ok_or_else(|| ClientError::NotFound(format!("issue #{}", number)))?;
        self.check_title(&title)?;
        self.issues
            .get_mut(&number)
            .ok_or_else(|| ClientError::NotFound(format!("issue #{}", number)))
    }
}

#[async_trait]
impl IssueTracker for MemoryTracker {
    async fn create_issue(
        &self,
        title: &str,
        body: &str,
        labels: &[String],
    ) -> Result<RemoteRef, ClientError> {
        let mut state = self.lock();
        state.calls.push(format!("create {}", title));
        state.check_title(title)?;

        state.next_number += 1;
        let number = state.next_number;
        state.issues.insert(
            number,
            MemoryIssue {
                number,
                title: title.to_string(),
                body: body.to_string(),
                labels: labels.iter().cloned().collect(),
                closed: false,
            },
        );
        Ok(number)
    }

    async fn edit_issue(&self, number: RemoteRef, body: &str) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.calls.push(format!("edit #{}", number));
        state.issue_mut(number)?.body = body.to_string();
        Ok(())
    }

    async fn add_label(&self, number: RemoteRef, label: &str) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.calls.push(format!("add-label #{} {}", number, label));
        state.issue_mut(number)?.labels.insert(label.to_string());
        Ok(())
    }

    async fn remove_label(&self, number: RemoteRef, label: &str) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.calls.push(format!("remove-label #{} {}", number, label));
        state.issue_mut(number)?.labels.remove(label);
        Ok(())
    }

    async fn close_issue(&self, number: RemoteRef) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.calls.push(format!("close #{}", number));
        state.issue_mut(number)?.closed = true;
        Ok(())
    }

    async fn list_labels(&self, number: RemoteRef) -> Result<BTreeSet<String>, ClientError> {
        let mut state = self.lock();
        state.calls.push(format!("list-labels #{}", number));
        Ok(state.issue_mut(number)?.labels.clone())
    }

    async fn ensure_label(&self, label: &LabelSpec) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.calls.push(format!("ensure-label {}", label.name));
        if state.unavailable {
            return Err(ClientError::Unavailable("tracker offline".to_string()));
        }
        state.labels.insert(label.name.clone(), label.clone());
        Ok(())
    }

    async fn ensure_milestone(&self, milestone: &MilestoneSpec) -> Result<(), ClientError> {
        let mut state = self.lock();
        state.calls.push(format!("ensure-milestone {}", milestone.title));
        state.check_title(&milestone.title)?;
        state
            .milestones
            .insert(milestone.title.clone(), milestone.clone());
        Ok(())
    }
}
