//! Plan document section extractor.
//!
//! Plan documents are markdown files whose headings carry item keys:
//!
//! ```text
//! # EPIC 1: Foundation
//! **ID:** E1
//! ## Story S1.1: Project scaffold
//! ### Task T1.1.1 - Initialise repository
//! ```
//!
//! Headings are tokenised once, ranked by the kind of key they carry, and
//! each body is sliced between its heading and the next heading that closes
//! it. Epic and story bodies stop at the first nested item heading, so they
//! hold only their own preamble. Task and subtask bodies run until the next
//! heading of equal or higher rank.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Context;
use serde::Serialize;

use crate::db::Database;
use crate::models::{ItemKey, ItemKind, UpdateItemInput};

const ID_MARKER: &str = "**ID:**";

/// Title and body extracted for one item key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub key: ItemKey,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Default)]
pub struct PlanDocument {
    sections: BTreeMap<ItemKey, Section>,
}

struct Heading {
    line: usize,
    key: ItemKey,
    title: String,
}

impl PlanDocument {
    pub fn parse(text: &str) -> Self {
        let lines: Vec<&str> = text.lines().collect();
        let headings = scan_headings(&lines);
        let mut sections = BTreeMap::new();

        for (i, heading) in headings.iter().enumerate() {
            let kind = heading.key.kind();
            let end = headings[i + 1..]
                .iter()
                .find(|next| closes(kind, next.key.kind()))
                .map(|next| next.line)
                .unwrap_or(lines.len());

            let mut key = heading.key.clone();
            let mut start = heading.line + 1;
            if kind == ItemKind::Epic {
                if let Some((offset, id)) = find_epic_id(&lines[start..end]) {
                    key = id;
                    start += offset + 1;
                }
            }

            sections.entry(key.clone()).or_insert_with(|| Section {
                key,
                title: heading.title.clone(),
                body: clean_body(&lines[start..end]),
            });
        }

        Self { sections }
    }

    /// Read and concatenate plan files in order. Missing files are skipped.
    pub fn load(paths: &[PathBuf]) -> anyhow::Result<Self> {
        let mut text = String::new();
        for path in paths {
            match std::fs::read_to_string(path) {
                Ok(content) => {
                    tracing::info!("Loaded plan file {}", path.display());
                    text.push_str(&content);
                    text.push_str("\n\n");
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!("Plan file {} not found, skipping", path.display());
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to read plan file {}", path.display()))
                }
            }
        }
        Ok(Self::parse(&text))
    }

    pub fn section(&self, key: &ItemKey) -> Option<&Section> {
        self.sections.get(key)
    }

    /// The extracted body, when there is a non-empty one.
    pub fn body(&self, key: &ItemKey) -> Option<&str> {
        self.section(key)
            .map(|s| s.body.as_str())
            .filter(|body| !body.is_empty())
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.values()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

/// Write extracted bodies into the stored descriptions of epics, stories and
/// tasks. Items whose description already matches are left alone. Returns the
/// number of items updated.
pub fn apply_descriptions(db: &Database, plan: &PlanDocument) -> crate::error::Result<usize> {
    let mut updated = 0;
    for item in db.all_items()? {
        if !item.kind().is_detailed() {
            continue;
        }
        let Some(body) = plan.body(&item.key) else {
            continue;
        };
        if item.description.as_deref() == Some(body) {
            continue;
        }
        db.update(
            &item.key,
            UpdateItemInput {
                description: Some(body.to_string()),
                ..Default::default()
            },
        )?;
        updated += 1;
    }
    tracing::info!("Updated {} descriptions from plan documents", updated);
    Ok(updated)
}

/// Whether a heading of kind `next` ends the body of a section of kind `open`.
fn closes(open: ItemKind, next: ItemKind) -> bool {
    match open {
        ItemKind::Epic | ItemKind::Story => true,
        ItemKind::Task | ItemKind::Subtask => next.rank() <= open.rank(),
    }
}

fn scan_headings(lines: &[&str]) -> Vec<Heading> {
    let mut headings = Vec::new();
    let mut fence: Option<&str> = None;

    for (line, text) in lines.iter().enumerate() {
        let trimmed = text.trim_start();
        if let Some(marker) = fence {
            if trimmed.starts_with(marker) {
                fence = None;
            }
            continue;
        }
        if trimmed.starts_with("```") {
            fence = Some("```");
            continue;
        }
        if trimmed.starts_with("~~~") {
            fence = Some("~~~");
            continue;
        }
        if let Some((key, title)) = parse_heading(trimmed) {
            headings.push(Heading { line, key, title });
        }
    }

    headings
}

/// Parse `#... [Keyword] <key><sep><title>`. Headings that do not carry an
/// item key yield `None` and stay part of the surrounding body.
fn parse_heading(line: &str) -> Option<(ItemKey, String)> {
    let rest = line.trim_start_matches('#');
    if rest.len() == line.len() || !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let rest = rest.trim_start();

    let (keyword, rest) = split_keyword(rest);
    let token_end = rest
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '.'))
        .unwrap_or(rest.len());
    let (token, after) = rest.split_at(token_end);

    let key = match keyword {
        Some(ItemKind::Epic) if !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit()) => {
            ItemKey::epic(token.parse().ok()?)
        }
        _ => ItemKey::parse(token).ok()?,
    };
    if keyword.is_some_and(|kind| kind != key.kind()) {
        return None;
    }
    if !after.is_empty() && !after.starts_with(is_separator) {
        return None;
    }

    let title = after.trim_start_matches(is_separator).trim_end();
    Some((key, title.to_string()))
}

fn split_keyword(text: &str) -> (Option<ItemKind>, &str) {
    let Some((word, rest)) = text.split_once(char::is_whitespace) else {
        return (None, text);
    };
    let kind = ItemKind::ALL
        .into_iter()
        .find(|kind| word.eq_ignore_ascii_case(kind.as_str()));
    match kind {
        Some(kind) => (Some(kind), rest.trim_start()),
        None => (None, text),
    }
}

fn is_separator(c: char) -> bool {
    matches!(c, ':' | '-' | '–' | '—') || c.is_whitespace()
}

/// Locate an `**ID:** E<n>` line. Returns its offset and the epic key.
fn find_epic_id(lines: &[&str]) -> Option<(usize, ItemKey)> {
    lines.iter().enumerate().find_map(|(offset, line)| {
        let (_, rest) = line.split_once(ID_MARKER)?;
        let rest = rest.trim_start();
        let end = rest
            .find(|c: char| !c.is_ascii_alphanumeric())
            .unwrap_or(rest.len());
        let key = ItemKey::parse(&rest[..end]).ok()?;
        (key.kind() == ItemKind::Epic).then_some((offset, key))
    })
}

fn is_rule(line: &str) -> bool {
    line.len() >= 3
        && ['-', '*', '_']
            .iter()
            .any(|&c| line.chars().all(|ch| ch == c))
}

fn clean_body(lines: &[&str]) -> String {
    let mut end = lines.len();
    while end > 0 {
        let line = lines[end - 1].trim();
        if line.is_empty() || is_rule(line) {
            end -= 1;
        } else {
            break;
        }
    }
    lines[..end].join("\n").trim().to_string()
}
