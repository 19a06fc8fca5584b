//! Domain models for the implementation tracker.
//!
//! # Core Concepts
//!
//! - [`ItemKey`]: A validated identifier (`E1`, `S1.2`, `T1.2.3`, `T1.2.3.4`)
//!   whose shape determines the [`ItemKind`].
//! - [`WorkItem`]: One node of the four-level breakdown
//!   (epic → story → task → subtask), with lifecycle [`Status`] and timestamps.
//! - [`EpicProgress`] / [`OverallProgress`]: Read-only rollups over the tree.
//! - [`SeedPlan`]: Nested input for batch creation.

mod item;
mod key;
mod progress;
mod seed;
mod status;

pub use item::*;
pub use key::*;
pub use progress::*;
pub use seed::*;
pub use status::*;
