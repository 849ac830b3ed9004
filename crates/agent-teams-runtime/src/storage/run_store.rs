//! Run/team storage (§3, §6): `storage.json` holds team definitions and a
//! truncated run-record history; each run's full artifact is written
//! separately to `runs/{runId}.json`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::constants::MAX_RUNS_TO_KEEP;
use crate::model::{CommunicationAuditEntry, MemberResult, TeamDefinition, TeamRunRecord};

const STORAGE_VERSION: u32 = 1;
const DEFAULTS_VERSION: u32 = 1;

/// The full JSON body of `storage.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageDocument {
    pub version: u32,
    pub defaults_version: u32,
    pub current_team_id: Option<String>,
    pub teams: Vec<TeamDefinition>,
    pub runs: Vec<TeamRunRecord>,
}

impl Default for StorageDocument {
    fn default() -> Self {
        Self {
            version: STORAGE_VERSION,
            defaults_version: DEFAULTS_VERSION,
            current_team_id: None,
            teams: Vec::new(),
            runs: Vec::new(),
        }
    }
}

/// The complete artifact written to `runs/{runId}.json`: the record plus
/// everything needed to replay or audit the run later (§4.1 phase 6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunArtifact {
    pub record: TeamRunRecord,
    pub team: TeamDefinition,
    pub task: String,
    pub member_results: Vec<MemberResult>,
    pub audit: Vec<CommunicationAuditEntry>,
    pub shared_context: Option<serde_json::Value>,
}

fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        use io::Write;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Persists team definitions, a truncated run-record index, and per-run
/// artifacts under a base directory laid out as the reference tree:
/// `<base>/storage.json` and `<base>/runs/{runId}.json`.
pub struct RunStore {
    storage_path: PathBuf,
    runs_dir: PathBuf,
    document: Mutex<StorageDocument>,
}

impl RunStore {
    /// Opens (or initializes) a store rooted at `base_dir`, reading any
    /// existing `storage.json` found there.
    pub fn open(base_dir: impl AsRef<Path>) -> io::Result<Self> {
        let base_dir = base_dir.as_ref();
        let storage_path = base_dir.join("storage.json");
        let runs_dir = base_dir.join("runs");

        let document = if storage_path.exists() {
            let raw = fs::read_to_string(&storage_path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            StorageDocument::default()
        };

        Ok(Self {
            storage_path,
            runs_dir,
            document: Mutex::new(document),
        })
    }

    fn save_locked(&self, document: &StorageDocument) -> io::Result<()> {
        let rendered = serde_json::to_string_pretty(document)?;
        write_atomic(&self.storage_path, &rendered)
    }

    pub fn teams(&self) -> Vec<TeamDefinition> {
        self.document.lock().unwrap().teams.clone()
    }

    pub fn get_team(&self, team_id: &str) -> Option<TeamDefinition> {
        self.document.lock().unwrap().teams.iter().find(|t| t.id == team_id).cloned()
    }

    pub fn current_team_id(&self) -> Option<String> {
        self.document.lock().unwrap().current_team_id.clone()
    }

    pub fn set_current_team(&self, team_id: impl Into<String>) -> io::Result<()> {
        let mut document = self.document.lock().unwrap();
        document.current_team_id = Some(team_id.into());
        self.save_locked(&document)
    }

    /// Inserts or replaces a team definition by id.
    pub fn upsert_team(&self, team: TeamDefinition) -> io::Result<()> {
        let mut document = self.document.lock().unwrap();
        if let Some(existing) = document.teams.iter_mut().find(|t| t.id == team.id) {
            *existing = team;
        } else {
            document.teams.push(team);
        }
        self.save_locked(&document)
    }

    pub fn runs(&self) -> Vec<TeamRunRecord> {
        self.document.lock().unwrap().runs.clone()
    }

    /// Writes the run artifact to `runs/{runId}.json`, appends the record to
    /// `storage.json`, and truncates the run history to `MAX_RUNS_TO_KEEP`
    /// (§6's filesystem layout note).
    pub fn persist_run(&self, artifact: &RunArtifact) -> io::Result<()> {
        let run_path = self.runs_dir.join(format!("{}.json", artifact.record.run_id));
        let rendered = serde_json::to_string_pretty(artifact)?;
        write_atomic(&run_path, &rendered)?;

        let mut document = self.document.lock().unwrap();
        document.runs.push(artifact.record.clone());
        if document.runs.len() > MAX_RUNS_TO_KEEP {
            let excess = document.runs.len() - MAX_RUNS_TO_KEEP;
            document.runs.drain(0..excess);
        }
        self.save_locked(&document)
    }

    /// Reads back a previously persisted run artifact.
    pub fn load_run(&self, run_id: &str) -> io::Result<RunArtifact> {
        let run_path = self.runs_dir.join(format!("{run_id}.json"));
        let raw = fs::read_to_string(run_path)?;
        serde_json::from_str(&raw).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::judge;
    use crate::model::{EnabledState, RunStatus, Strategy};
    use chrono::Utc;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn sample_record(run_id: &str) -> TeamRunRecord {
        TeamRunRecord {
            run_id: run_id.to_string(),
            team_id: "team-1".to_string(),
            strategy: Strategy::Sequential,
            task: "task".to_string(),
            communication_rounds: 0,
            failed_member_retry_rounds_configured: 0,
            failed_member_retry_rounds_applied: 0,
            recovered_members: vec![],
            communication_links: HashMap::new(),
            summary: "done".to_string(),
            status: RunStatus::Completed,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            member_count: 1,
            output_file: format!("{run_id}.json"),
            final_judge: judge::fallback_judge(&[]),
        }
    }

    fn sample_team() -> TeamDefinition {
        TeamDefinition {
            id: "team-1".to_string(),
            name: "Team One".to_string(),
            description: String::new(),
            state: EnabledState::Enabled,
            skill_tags: vec![],
            members: vec![],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn persisted_run_is_readable_back_and_indexed() {
        let dir = tempdir().unwrap();
        let store = RunStore::open(dir.path()).unwrap();
        let artifact = RunArtifact {
            record: sample_record("run-1"),
            team: sample_team(),
            task: "task".to_string(),
            member_results: vec![],
            audit: vec![],
            shared_context: None,
        };
        store.persist_run(&artifact).unwrap();

        let reopened = RunStore::open(dir.path()).unwrap();
        assert_eq!(reopened.runs().len(), 1);
        let loaded = reopened.load_run("run-1").unwrap();
        assert_eq!(loaded.record.run_id, "run-1");
    }

    #[test]
    fn run_history_is_truncated_to_max_runs_to_keep() {
        let dir = tempdir().unwrap();
        let store = RunStore::open(dir.path()).unwrap();
        for i in 0..(MAX_RUNS_TO_KEEP + 5) {
            let artifact = RunArtifact {
                record: sample_record(&format!("run-{i}")),
                team: sample_team(),
                task: "task".to_string(),
                member_results: vec![],
                audit: vec![],
                shared_context: None,
            };
            store.persist_run(&artifact).unwrap();
        }
        assert_eq!(store.runs().len(), MAX_RUNS_TO_KEEP);
        assert_eq!(store.runs().first().unwrap().run_id, "run-5");
    }

    #[test]
    fn upsert_team_replaces_existing_entry_by_id() {
        let dir = tempdir().unwrap();
        let store = RunStore::open(dir.path()).unwrap();
        store.upsert_team(sample_team()).unwrap();
        let mut renamed = sample_team();
        renamed.name = "Renamed".to_string();
        store.upsert_team(renamed).unwrap();

        let teams = store.teams();
        assert_eq!(teams.len(), 1);
        assert_eq!(teams[0].name, "Renamed");
    }

    #[test]
    fn missing_storage_file_starts_with_an_empty_document() {
        let dir = tempdir().unwrap();
        let store = RunStore::open(dir.path()).unwrap();
        assert!(store.teams().is_empty());
        assert!(store.runs().is_empty());
    }
}
