//! Pattern extraction (§3, §6): a minimal notification sink that turns a
//! finished run into a `Pattern` entry in `patterns.json`, grouped by a
//! coarse task-type key.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{TeamRunRecord, Verdict};

const PATTERNS_VERSION: u32 = 1;

/// One extracted pattern: a compact summary of a finished run, keyed by a
/// coarse task-type classification for later retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub task_type: String,
    pub run_id: String,
    pub team_id: String,
    pub summary: String,
    pub verdict: Verdict,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternsDocument {
    pub version: u32,
    pub last_updated: DateTime<Utc>,
    pub patterns: Vec<Pattern>,
    pub patterns_by_task_type: HashMap<String, Vec<String>>,
}

impl Default for PatternsDocument {
    fn default() -> Self {
        Self {
            version: PATTERNS_VERSION,
            last_updated: Utc::now(),
            patterns: Vec::new(),
            patterns_by_task_type: HashMap::new(),
        }
    }
}

/// A coarse task-type classifier: the first whitespace-delimited word of
/// the task, lowercased, falling back to "general" for an empty task. This
/// mirrors how little signal is available at this layer — callers needing
/// richer classification should tag tasks themselves before dispatch.
fn classify_task_type(task: &str) -> String {
    task.split_whitespace()
        .next()
        .map(|w| w.to_lowercase())
        .filter(|w| !w.is_empty())
        .unwrap_or_else(|| "general".to_string())
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

/// Persists extracted patterns to `patterns.json` under a base directory.
pub struct PatternStore {
    path: PathBuf,
    document: Mutex<PatternsDocument>,
}

impl PatternStore {
    pub fn open(base_dir: impl AsRef<Path>) -> io::Result<Self> {
        let path = base_dir.as_ref().join("patterns.json");
        let document = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            PatternsDocument::default()
        };
        Ok(Self {
            path,
            document: Mutex::new(document),
        })
    }

    fn save_locked(&self, document: &PatternsDocument) -> io::Result<()> {
        let rendered = serde_json::to_string_pretty(document)?;
        write_atomic(&self.path, &rendered)
    }

    pub fn patterns(&self) -> Vec<Pattern> {
        self.document.lock().unwrap().patterns.clone()
    }

    pub fn patterns_for_task_type(&self, task_type: &str) -> Vec<Pattern> {
        let document = self.document.lock().unwrap();
        let Some(ids) = document.patterns_by_task_type.get(task_type) else {
            return Vec::new();
        };
        document
            .patterns
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect()
    }

    /// Extracts a pattern from a finished run record and persists it. Only
    /// runs that produced at least a partial verdict are worth indexing;
    /// a wholly failed run carries no reusable signal.
    pub fn notify_run_finished(&self, record: &TeamRunRecord) -> io::Result<Option<Pattern>> {
        if matches!(record.final_judge.verdict, Verdict::Failed) {
            return Ok(None);
        }

        let task_type = classify_task_type(&record.task);
        let pattern = Pattern {
            id: format!("{}-{}", record.run_id, task_type),
            task_type: task_type.clone(),
            run_id: record.run_id.clone(),
            team_id: record.team_id.clone(),
            summary: record.summary.clone(),
            verdict: record.final_judge.verdict,
            confidence: record.final_judge.confidence,
            created_at: Utc::now(),
        };

        let mut document = self.document.lock().unwrap();
        document.patterns.push(pattern.clone());
        document
            .patterns_by_task_type
            .entry(task_type)
            .or_default()
            .push(pattern.id.clone());
        document.last_updated = Utc::now();
        self.save_locked(&document)?;

        Ok(Some(pattern))
    }
}
