//! Status Engine: lifecycle transitions and their timestamp side effects.
//!
//! Every transition between two distinct statuses is allowed. The rules only
//! decide which timestamps move:
//!
//! - entering `IN_PROGRESS` from `BACKLOG` sets `started_at`
//! - entering `IN_PROGRESS` from `TODO` leaves `started_at` as it was
//! - entering `DONE` always sets `completed_at`
//!
//! Moving an item to the status it already has changes nothing, except that
//! repeating `DONE` refreshes `completed_at`.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::Database;
use crate::error::Result;
use crate::models::{ItemKey, ItemPatch, Status, UpdateItemInput, WorkItem};

/// Outcome of a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum Transition {
    Changed { from: Status, to: Status },
    Unchanged { status: Status },
}

impl Transition {
    pub fn is_changed(&self) -> bool {
        matches!(self, Self::Changed { .. })
    }

    /// Status the item holds after the request.
    pub fn status(&self) -> Status {
        match *self {
            Self::Changed { to, .. } => to,
            Self::Unchanged { status } => status,
        }
    }
}

pub struct StatusEngine<'a> {
    db: &'a Database,
}

impl<'a> StatusEngine<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn transition(&self, key: &ItemKey, target: Status) -> Result<Transition> {
        self.transition_at(key, target, Utc::now())
    }

    /// Transition with an explicit clock reading.
    pub fn transition_at(
        &self,
        key: &ItemKey,
        target: Status,
        now: DateTime<Utc>,
    ) -> Result<Transition> {
        let (_, transition) = self.apply_at(key, ItemPatch::status(target), now)?;
        Ok(transition.unwrap_or(Transition::Unchanged { status: target }))
    }

    /// Apply a field patch, routing any status change through the transition
    /// rules. Fields and status land in one store update, so a patch the
    /// store rejects changes nothing.
    pub fn apply(&self, key: &ItemKey, patch: ItemPatch) -> Result<(WorkItem, Option<Transition>)> {
        self.apply_at(key, patch, Utc::now())
    }

    pub fn apply_at(
        &self,
        key: &ItemKey,
        patch: ItemPatch,
        now: DateTime<Utc>,
    ) -> Result<(WorkItem, Option<Transition>)> {
        let from = self.db.get(key)?.status;
        let target = patch.status;
        let mut input = UpdateItemInput::from(patch);

        let transition = target.map(|target| {
            if from == target {
                input.status = None;
                if target == Status::Done {
                    input.completed_at = Some(now);
                }
                return Transition::Unchanged { status: from };
            }
            match target {
                Status::InProgress if from == Status::Backlog && key.kind().is_detailed() => {
                    input.started_at = Some(now);
                }
                Status::Done => input.completed_at = Some(now),
                _ => {}
            }
            Transition::Changed { from, to: target }
        });

        let item = self.db.update(key, input)?;
        match transition {
            Some(Transition::Changed { from, to }) => tracing::info!("{}: {} -> {}", key, from, to),
            Some(Transition::Unchanged { status }) => tracing::debug!("{} is already {}", key, status),
            None => {}
        }
        Ok((item, transition))
    }

    pub fn start(&self, key: &ItemKey) -> Result<Transition> {
        self.transition(key, Status::InProgress)
    }

    pub fn complete(&self, key: &ItemKey) -> Result<Transition> {
        self.transition(key, Status::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CreateItemInput;
    use chrono::TimeZone;

    fn setup() -> Database {
        let db = Database::open_memory().unwrap();
        db.migrate().unwrap();
        for (key, title) in [
            ("E1", "Setup"),
            ("S1.1", "Scaffold"),
            ("T1.1.1", "Init repo"),
            ("T1.1.1.1", "Pick a name"),
        ] {
            db.create(CreateItemInput::new(ItemKey::parse(key).unwrap(), None, title))
                .unwrap();
        }
        db
    }

    fn key(raw: &str) -> ItemKey {
        ItemKey::parse(raw).unwrap()
    }

    #[test]
    fn test_same_status_is_a_no_op() {
        let db = setup();
        let engine = StatusEngine::new(&db);
        let before = db.get(&key("T1.1.1")).unwrap();

        let result = engine.transition(&key("T1.1.1"), Status::Backlog).unwrap();

        assert_eq!(result, Transition::Unchanged { status: Status::Backlog });
        assert_eq!(db.get(&key("T1.1.1")).unwrap(), before);
    }

    #[test]
    fn test_repeated_done_refreshes_completed_at() {
        let db = setup();
        let engine = StatusEngine::new(&db);
        let first = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2025, 3, 2, 9, 0, 0).unwrap();

        engine.transition_at(&key("E1"), Status::Done, first).unwrap();
        let result = engine.transition_at(&key("E1"), Status::Done, second).unwrap();

        assert_eq!(result, Transition::Unchanged { status: Status::Done });
        assert_eq!(db.get(&key("E1")).unwrap().completed_at, Some(second));
    }

    #[test]
    fn test_subtask_start_changes_status_only() {
        let db = setup();
        let engine = StatusEngine::new(&db);
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();

        engine
            .transition_at(&key("T1.1.1.1"), Status::InProgress, now)
            .unwrap();

        let subtask = db.get(&key("T1.1.1.1")).unwrap();
        assert_eq!(subtask.status, Status::InProgress);
        assert!(subtask.started_at.is_none());
    }

    #[test]
    fn test_transition_reports_from_and_to() {
        let db = setup();
        let result = StatusEngine::new(&db).start(&key("S1.1")).unwrap();
        assert!(result.is_changed());
        assert_eq!(
            result,
            Transition::Changed {
                from: Status::Backlog,
                to: Status::InProgress
            }
        );
        assert_eq!(result.status(), Status::InProgress);
    }

    #[test]
    fn test_rejected_patch_leaves_status_alone() {
        let db = setup();
        let engine = StatusEngine::new(&db);
        let patch = ItemPatch {
            priority: Some(crate::models::Priority::High),
            ..ItemPatch::status(Status::Done)
        };

        let result = engine.apply(&key("T1.1.1.1"), patch);

        assert!(matches!(
            result,
            Err(crate::error::TrackerError::FieldNotSupported { field: "priority", .. })
        ));
        let subtask = db.get(&key("T1.1.1.1")).unwrap();
        assert_eq!(subtask.status, Status::Backlog);
        assert!(subtask.completed_at.is_none());
    }

    #[test]
    fn test_patch_fields_and_status_together() {
        let db = setup();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        let patch = ItemPatch {
            actual_hours: Some(4.0),
            ..ItemPatch::status(Status::InProgress)
        };

        let (task, transition) = StatusEngine::new(&db)
            .apply_at(&key("T1.1.1"), patch, now)
            .unwrap();

        assert!(transition.is_some_and(|t| t.is_changed()));
        assert_eq!(task.actual_hours, Some(4.0));
        assert_eq!(task.started_at, Some(now));
    }
}
