//! Loads a [`TeamDefinition`] from a JSON file on disk.
//!
//! Markdown-frontmatter team definitions are an out-of-scope external
//! collaborator (the reference codebase's own definition parser); this
//! binary instead reads the same `TeamDefinition` shape the runtime already
//! serializes to `storage.json`, so a team produced by one run can be fed
//! straight back in for the next.

use std::path::Path;

use agent_teams_runtime::TeamDefinition;
use anyhow::{Context, Result};

pub fn load_team(path: &Path) -> Result<TeamDefinition> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading team definition at {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing team definition at {}", path.display()))
}
