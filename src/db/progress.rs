//! Rollup queries over the derived progress views.
//!
//! Nothing here is cached; every call recomputes from the current rows.

use crate::error::{Result, TrackerError};
use crate::models::*;

use super::Database;

struct RawEpicProgress {
    id: String,
    title: String,
    status: String,
    priority: String,
    counts: [u32; 4],
}

struct RawCurrentWork {
    id: String,
    title: String,
    parent_title: String,
    epic_title: Option<String>,
    estimated_hours: Option<f64>,
}

impl Database {
    /// Per-epic rollups, in ascending key order.
    pub fn epic_progress(&self) -> Result<Vec<EpicProgress>> {
        let raw = {
            let conn = self.conn.lock().expect("database lock poisoned");
            let mut stmt = conn.prepare(
                "SELECT id, title, status, priority, total_stories, done_stories, total_tasks, done_tasks
                 FROM epic_progress",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(RawEpicProgress {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        status: row.get(2)?,
                        priority: row.get(3)?,
                        counts: [row.get(4)?, row.get(5)?, row.get(6)?, row.get(7)?],
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        let mut epics = raw
            .into_iter()
            .map(|r| {
                let [total_stories, done_stories, total_tasks, done_tasks] = r.counts;
                Ok(EpicProgress {
                    key: ItemKey::parse(&r.id)?,
                    title: r.title,
                    status: r.status.parse::<Status>()?,
                    priority: r.priority.parse::<Priority>()?,
                    total_stories,
                    done_stories,
                    total_tasks,
                    done_tasks,
                    percent: completion_percent(done_tasks, total_tasks),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        epics.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(epics)
    }

    /// Rollup for a single epic.
    pub fn epic_progress_for(&self, key: &ItemKey) -> Result<EpicProgress> {
        self.epic_progress()?
            .into_iter()
            .find(|p| &p.key == key)
            .ok_or_else(|| TrackerError::ItemNotFound(key.to_string()))
    }

    /// Whole-tree rollup. The percentage counts tasks only; subtasks are
    /// reported but never enter it.
    pub fn overall_progress(&self) -> Result<OverallProgress> {
        let conn = self.conn.lock().expect("database lock poisoned");
        let counts: [u32; 8] = conn.query_row(
            "SELECT total_epics, done_epics, total_stories, done_stories,
                    total_tasks, done_tasks, total_subtasks, done_subtasks
             FROM overall_progress",
            [],
            |row| {
                Ok([
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                    row.get(7)?,
                ])
            },
        )?;

        let [total_epics, done_epics, total_stories, done_stories, total_tasks, done_tasks, total_subtasks, done_subtasks] =
            counts;

        Ok(OverallProgress {
            total_epics,
            done_epics,
            total_stories,
            done_stories,
            total_tasks,
            done_tasks,
            total_subtasks,
            done_subtasks,
            percent: completion_percent(done_tasks, total_tasks),
        })
    }

    /// Stories and tasks currently in progress, in ascending key order.
    pub fn current_work(&self) -> Result<Vec<CurrentWork>> {
        let raw = {
            let conn = self.conn.lock().expect("database lock poisoned");
            let mut stmt = conn.prepare(
                "SELECT id, title, parent_title, epic_title, estimated_hours FROM current_work",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(RawCurrentWork {
                        id: row.get(0)?,
                        title: row.get(1)?,
                        parent_title: row.get(2)?,
                        epic_title: row.get(3)?,
                        estimated_hours: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows
        };

        let mut work = raw
            .into_iter()
            .map(|r| {
                let key = ItemKey::parse(&r.id)?;
                Ok(CurrentWork {
                    kind: key.kind(),
                    key,
                    title: r.title,
                    parent_title: r.parent_title,
                    epic_title: r.epic_title,
                    estimated_hours: r.estimated_hours,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        work.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(work)
    }
}
