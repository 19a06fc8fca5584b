use serde::{Deserialize, Serialize};

use super::key::ItemKey;
use super::status::Priority;

/// A nested batch of items to create in one go.
///
/// Subtasks are given as bare titles; their keys are generated from the
/// owning task key (`T1.1.1` -> `T1.1.1.1`, `T1.1.1.2`, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedPlan {
    pub epics: Vec<SeedEpic>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedEpic {
    pub id: ItemKey,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub stories: Vec<SeedStory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedStory {
    pub id: ItemKey,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub tasks: Vec<SeedTask>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedTask {
    pub id: ItemKey,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub subtasks: Vec<String>,
}

/// Counts of items created by a seed run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeedSummary {
    pub epics: usize,
    pub stories: usize,
    pub tasks: usize,
    pub subtasks: usize,
}

impl SeedSummary {
    pub fn total(&self) -> usize {
        self.epics + self.stories + self.tasks + self.subtasks
    }
}
