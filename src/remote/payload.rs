//! Issue title, body and label rendering.

use std::fmt::Write;

use crate::db::Database;
use crate::error::Result;
use crate::models::{EpicProgress, ItemKind, Status, WorkItem};
use crate::plan::PlanDocument;

use super::{epic_label, type_label};

/// What gets sent when an issue is created or refreshed.
#[derive(Debug, Clone, PartialEq)]
pub struct IssuePayload {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Everything needed to render one item's issue.
#[derive(Debug, Clone)]
pub struct IssueContext {
    pub item: WorkItem,
    /// Enclosing items, outermost first.
    pub ancestors: Vec<WorkItem>,
    pub children: Vec<WorkItem>,
    /// Only set for epics.
    pub progress: Option<EpicProgress>,
    /// Extracted plan body, falling back to the stored description.
    pub description: Option<String>,
}

impl IssueContext {
    pub fn load(db: &Database, plan: &PlanDocument, item: &WorkItem) -> Result<Self> {
        let mut ancestors = Vec::new();
        let mut parent = item.parent.clone();
        while let Some(key) = parent {
            let ancestor = db.get(&key)?;
            parent = ancestor.parent.clone();
            ancestors.push(ancestor);
        }
        ancestors.reverse();

        let progress = match item.kind() {
            ItemKind::Epic => Some(db.epic_progress_for(&item.key)?),
            _ => None,
        };

        let description = plan
            .body(&item.key)
            .map(str::to_string)
            .or_else(|| item.description.clone());

        Ok(Self {
            item: item.clone(),
            ancestors,
            children: db.list_children(&item.key)?,
            progress,
            description,
        })
    }

    pub fn payload(&self) -> IssuePayload {
        IssuePayload {
            title: issue_title(&self.item),
            body: self.body(),
            labels: self.labels(),
        }
    }

    pub fn labels(&self) -> Vec<String> {
        let item = &self.item;
        let mut labels = vec![
            type_label(item.kind()),
            epic_label(item.key.epic_number()),
        ];
        if matches!(item.kind(), ItemKind::Task | ItemKind::Subtask) {
            if let Some(story) = self.ancestor(ItemKind::Story) {
                labels.push(format!("story:{}", story.key));
            }
        }
        if let Some(priority) = item.priority {
            labels.push(priority.label());
        }
        labels.push(item.status.label());
        labels
    }

    pub fn body(&self) -> String {
        match self.item.kind() {
            ItemKind::Epic => self.epic_body(),
            ItemKind::Story => self.story_body(),
            ItemKind::Task => self.task_body(),
            ItemKind::Subtask => self.subtask_body(),
        }
    }

    fn ancestor(&self, kind: ItemKind) -> Option<&WorkItem> {
        self.ancestors.iter().find(|a| a.kind() == kind)
    }

    fn lineage(&self, out: &mut String) {
        for ancestor in &self.ancestors {
            let label = match ancestor.kind() {
                ItemKind::Epic => "Epic",
                ItemKind::Story => "Story",
                ItemKind::Task => "Task",
                ItemKind::Subtask => "Subtask",
            };
            let _ = writeln!(out, "**{}:** {} - {}", label, ancestor.key, ancestor.title);
        }
    }

    fn epic_body(&self) -> String {
        let item = &self.item;
        let mut out = String::new();
        let _ = writeln!(out, "# {}\n", item.title);
        let _ = writeln!(out, "## Overview");
        let _ = writeln!(out, "{}\n", self.description.as_deref().unwrap_or("No description"));

        if let Some(ref p) = self.progress {
            let _ = writeln!(out, "## Scope");
            let _ = writeln!(out, "- **Stories:** {}", p.total_stories);
            let _ = writeln!(out, "- **Tasks:** {}", p.total_tasks);
            let _ = writeln!(out, "- **Completed:** {}", p.done_tasks);
            let _ = writeln!(
                out,
                "- **Progress:** {}%\n",
                floor_percent(p.done_tasks, p.total_tasks)
            );
        }

        let _ = writeln!(out, "## Stories in this Epic");
        if self.children.is_empty() {
            let _ = writeln!(out, "No stories defined");
        }
        for story in &self.children {
            let _ = writeln!(out, "- **{}**: {}", story.key, story.title);
        }

        let _ = writeln!(out, "\n---\n");
        let _ = writeln!(out, "### Progress Tracking");
        let _ = writeln!(out, "```bash\ntracker show {}\n```", item.key);
        let _ = writeln!(out, "\n---");
        let _ = write!(
            out,
            "*This issue tracks the overall Epic. Stories and tasks have their own issues.*"
        );
        out
    }

    fn story_body(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## {}\n", self.item.title);
        self.lineage(&mut out);
        let _ = writeln!(out, "\n### Description");
        let _ = writeln!(out, "{}\n", self.description.as_deref().unwrap_or("No description"));
        let _ = writeln!(out, "### Tasks");
        if self.children.is_empty() {
            let _ = writeln!(out, "No tasks defined");
        }
        for task in &self.children {
            let _ = writeln!(out, "- {} **{}**: {}", checkbox(task.status), task.key, task.title);
        }
        out.truncate(out.trim_end().len());
        out
    }

    fn task_body(&self) -> String {
        let item = &self.item;
        let mut out = String::new();
        let _ = writeln!(out, "## {}\n", item.title);
        self.lineage(&mut out);
        let estimate = item
            .estimated_hours
            .map(|h| h.to_string())
            .unwrap_or_else(|| "TBD".to_string());
        let _ = writeln!(out, "**Estimated:** {} hours\n", estimate);
        let _ = writeln!(out, "---\n");
        let _ = writeln!(
            out,
            "{}\n",
            self.description
                .as_deref()
                .unwrap_or("See detailed implementation plan.")
        );
        let _ = writeln!(out, "---\n");
        let _ = writeln!(out, "### Subtasks Checklist");
        if self.children.is_empty() {
            let _ = writeln!(out, "No subtasks defined");
        }
        for subtask in &self.children {
            let _ = writeln!(out, "- {} {}", checkbox(subtask.status), subtask.title);
        }
        let _ = writeln!(out, "\n### Tracker Commands");
        let _ = write!(
            out,
            "```bash\ntracker start {key}\ntracker done {key}\ntracker sync status\n```",
            key = item.key
        );
        out
    }

    fn subtask_body(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "## {}\n", self.item.title);
        self.lineage(&mut out);
        let _ = write!(
            out,
            "\n```bash\ntracker done {}\n```",
            self.item.key
        );
        out
    }
}

/// `[<key>] <title>`
pub fn issue_title(item: &WorkItem) -> String {
    format!("[{}] {}", item.key, item.title)
}

/// Whole-number percentage, rounded down. Zero when there is nothing to count.
pub fn floor_percent(done: u32, total: u32) -> u32 {
    if total == 0 {
        return 0;
    }
    done.min(total) * 100 / total
}

fn checkbox(status: Status) -> &'static str {
    if status == Status::Done {
        "[x]"
    } else {
        "[ ]"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ItemKey, Priority};
    use chrono::Utc;

    fn item(key: &str, title: &str) -> WorkItem {
        let key = ItemKey::parse(key).unwrap();
        WorkItem {
            parent: key.implied_parent(),
            priority: key.kind().is_detailed().then_some(Priority::Medium),
            key,
            title: title.to_string(),
            description: None,
            status: Status::Backlog,
            estimated_hours: None,
            actual_hours: None,
            remote_ref: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn task_context() -> IssueContext {
        let mut task = item("T1.2.3", "Wire the router");
        task.estimated_hours = Some(4.0);
        task.status = Status::InProgress;
        let mut done = item("T1.2.3.1", "Pick a crate");
        done.status = Status::Done;

        IssueContext {
            item: task,
            ancestors: vec![item("E1", "Setup"), item("S1.2", "Server")],
            children: vec![done, item("T1.2.3.2", "Write handlers")],
            progress: None,
            description: Some("Route everything.".to_string()),
        }
    }

    #[test]
    fn test_task_labels() {
        assert_eq!(
            task_context().labels(),
            vec![
                "type:task",
                "epic:E1",
                "story:S1.2",
                "priority:medium",
                "status:in-progress"
            ]
        );
    }

    #[test]
    fn test_subtask_labels_skip_priority() {
        let ctx = IssueContext {
            item: item("T1.2.3.1", "Pick a crate"),
            ancestors: vec![item("E1", "Setup"), item("S1.2", "Server"), item("T1.2.3", "Wire")],
            children: vec![],
            progress: None,
            description: None,
        };
        assert_eq!(
            ctx.labels(),
            vec!["type:subtask", "epic:E1", "story:S1.2", "status:backlog"]
        );
        assert!(ctx.body().contains("**Task:** T1.2.3 - Wire"));
    }

    #[test]
    fn test_task_body_sections() {
        let payload = task_context().payload();
        assert_eq!(payload.title, "[T1.2.3] Wire the router");
        assert!(payload.body.contains("**Epic:** E1 - Setup"));
        assert!(payload.body.contains("**Story:** S1.2 - Server"));
        assert!(payload.body.contains("**Estimated:** 4 hours"));
        assert!(payload.body.contains("Route everything."));
        assert!(payload.body.contains("- [x] Pick a crate"));
        assert!(payload.body.contains("- [ ] Write handlers"));
        assert!(payload.body.contains("tracker done T1.2.3"));
    }

    #[test]
    fn test_epic_body_uses_floored_progress() {
        let epic = item("E1", "Setup");
        let ctx = IssueContext {
            progress: Some(EpicProgress {
                key: epic.key.clone(),
                title: epic.title.clone(),
                status: Status::InProgress,
                priority: Priority::High,
                total_stories: 1,
                done_stories: 0,
                total_tasks: 3,
                done_tasks: 2,
                percent: 66.7,
            }),
            item: epic,
            ancestors: vec![],
            children: vec![item("S1.1", "Scaffold")],
            description: None,
        };
        let body = ctx.body();
        assert!(body.starts_with("# Setup"));
        assert!(body.contains("No description"));
        assert!(body.contains("- **Progress:** 66%"));
        assert!(body.contains("- **S1.1**: Scaffold"));
    }

    #[test]
    fn test_floor_percent() {
        assert_eq!(floor_percent(0, 0), 0);
        assert_eq!(floor_percent(1, 3), 33);
        assert_eq!(floor_percent(3, 3), 100);
        assert_eq!(floor_percent(5, 3), 100);
    }
}
