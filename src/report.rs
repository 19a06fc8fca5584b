//! Flat export of every task with its labels and lineage.

use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::db::Database;
use crate::error::Result;
use crate::models::{ItemKey, ItemKind, WorkItem};

pub fn export(db: &Database) -> Result<String> {
    export_at(db, Utc::now())
}

/// Render the export with an explicit generation time.
pub fn export_at(db: &Database, generated: DateTime<Utc>) -> Result<String> {
    let items = db.all_items()?;
    let by_key: HashMap<&ItemKey, &WorkItem> = items.iter().map(|i| (&i.key, i)).collect();
    let tasks: Vec<&WorkItem> = items.iter().filter(|i| i.kind() == ItemKind::Task).collect();

    let mut out = String::new();
    let _ = writeln!(out, "# Issue Export");
    let _ = writeln!(out, "# Generated: {}", generated.to_rfc3339());
    let _ = writeln!(out, "# Total tasks: {}", tasks.len());

    for task in tasks {
        let story = task.parent.as_ref().and_then(|k| by_key.get(k).copied());
        let epic = story
            .and_then(|s| s.parent.as_ref())
            .and_then(|k| by_key.get(k).copied());

        let mut labels = Vec::new();
        if let Some(epic) = epic {
            labels.push(format!("epic:{}", epic.key));
        }
        if let Some(story) = story {
            labels.push(format!("story:{}", story.key));
        }
        if let Some(hours) = task.estimated_hours.filter(|h| *h > 0.0) {
            labels.push(format!("estimate:{}h", hours));
        }

        let _ = writeln!(out);
        let _ = writeln!(out, "## {}: {}", task.key, task.title);
        let _ = writeln!(out, "Labels: {}", labels.join(","));
        let _ = writeln!(out, "Epic: {}", epic.map(|e| e.title.as_str()).unwrap_or("-"));
        let _ = writeln!(out, "Story: {}", story.map(|s| s.title.as_str()).unwrap_or("-"));
    }

    Ok(out)
}
