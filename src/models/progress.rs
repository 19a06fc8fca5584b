use serde::{Deserialize, Serialize};

use super::key::{ItemKey, ItemKind};
use super::status::{Priority, Status};

/// Completion percentage in `[0, 100]`, rounded to one decimal place.
/// Zero when there is nothing to complete.
pub fn completion_percent(done: u32, total: u32) -> f64 {
    if total == 0 {
        return 0.0;
    }
    let pct = f64::from(done.min(total)) * 100.0 / f64::from(total);
    (pct * 10.0).round() / 10.0
}

/// Rollup for a single epic. The percentage counts tasks only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpicProgress {
    pub key: ItemKey,
    pub title: String,
    pub status: Status,
    pub priority: Priority,
    pub total_stories: u32,
    pub done_stories: u32,
    pub total_tasks: u32,
    pub done_tasks: u32,
    pub percent: f64,
}

/// Rollup across the whole tree.
///
/// Subtasks are counted for display, but `percent` is computed from task
/// counts alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OverallProgress {
    pub total_epics: u32,
    pub done_epics: u32,
    pub total_stories: u32,
    pub done_stories: u32,
    pub total_tasks: u32,
    pub done_tasks: u32,
    pub total_subtasks: u32,
    pub done_subtasks: u32,
    pub percent: f64,
}

/// A story or task currently in progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CurrentWork {
    pub kind: ItemKind,
    pub key: ItemKey,
    pub title: String,
    pub parent_title: String,
    /// Only set for tasks.
    pub epic_title: Option<String>,
    pub estimated_hours: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_total_is_zero_percent() {
        assert_eq!(completion_percent(0, 0), 0.0);
    }

    #[test]
    fn test_percent_bounds_and_rounding() {
        assert_eq!(completion_percent(1, 1), 100.0);
        assert_eq!(completion_percent(1, 3), 33.3);
        assert_eq!(completion_percent(2, 3), 66.7);
        assert_eq!(completion_percent(5, 3), 100.0);
    }
}
