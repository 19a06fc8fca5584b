//! Hierarchical implementation tracker.
//!
//! Work is broken down into epics, stories, tasks and subtasks, stored in
//! SQLite, rolled up into progress figures, described from markdown plan
//! documents and mirrored to a remote issue tracker.

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod models;
pub mod plan;
pub mod remote;
pub mod report;

pub use error::{Result, TrackerError};
