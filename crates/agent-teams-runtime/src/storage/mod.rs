//! Persistent storage (§3, §6): team/run indexing and pattern extraction,
//! both backed by atomic JSON-file writes under a caller-supplied base
//! directory (the companion binary points this at `.pi/agent-teams` and
//! `.pi/memory`, matching the reference tree).

mod pattern_store;
mod run_store;

pub use pattern_store::{Pattern, PatternStore, PatternsDocument};
pub use run_store::{RunArtifact, RunStore, StorageDocument};
