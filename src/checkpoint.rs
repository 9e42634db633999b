use crate::error::{PipelineError, Result};
use crate::store::write_json_atomic;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const CHECKPOINT_FILE: &str = "pipeline_state.json";

/// Pipeline stages in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Generate,
    Audit,
    Regenerate,
    Synthesize,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Generate,
        Stage::Audit,
        Stage::Regenerate,
        Stage::Synthesize,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Generate => "generate",
            Stage::Audit => "audit",
            Stage::Regenerate => "regenerate",
            Stage::Synthesize => "synthesize",
        }
    }

    pub fn from_str_loose(s: &str) -> std::result::Result<Self, String> {
        match s.to_lowercase().as_str() {
            "generate" | "generation" => Ok(Stage::Generate),
            "audit" => Ok(Stage::Audit),
            "regenerate" | "regeneration" => Ok(Stage::Regenerate),
            "synthesize" | "synthesis" | "tts" => Ok(Stage::Synthesize),
            _ => Err(format!(
                "Unknown stage '{}'. Expected: generate, audit, regenerate, synthesize",
                s
            )),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageState {
    #[serde(default)]
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Local>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Local>>,
    #[serde(default)]
    pub counters: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub run_id: String,
    pub timestamp: DateTime<Local>,
    #[serde(default)]
    pub stages: BTreeMap<Stage, StageState>,
}

impl CheckpointState {
    pub fn fresh() -> Self {
        let now = Local::now();
        CheckpointState {
            run_id: format!("run_{}", now.format("%Y%m%d_%H%M%S")),
            timestamp: now,
            stages: BTreeMap::new(),
        }
    }
}

/// Durable per-run stage state. Every mutation rewrites the whole file.
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    state: CheckpointState,
}

impl CheckpointStore {
    /// Load the checkpoint at `path`, or start fresh if it is missing or
    /// unreadable. A fresh state is written immediately.
    pub fn load_or_init(path: &Path) -> Result<Self> {
        let state = match fs::read_to_string(path) {
            Ok(data) => match serde_json::from_str::<CheckpointState>(&data) {
                Ok(state) => {
                    debug!(target: "voice_flow::checkpoint", run_id = %state.run_id, "resuming checkpoint");
                    Some(state)
                }
                Err(e) => {
                    warn!(target: "voice_flow::checkpoint", path = %path.display(), error = %e, "corrupt checkpoint, starting fresh");
                    None
                }
            },
            Err(_) => None,
        };
        let fresh = state.is_none();
        let store = CheckpointStore {
            path: path.to_path_buf(),
            state: state.unwrap_or_else(CheckpointState::fresh),
        };
        if fresh {
            store.save()?;
        }
        Ok(store)
    }

    /// Discard all stage progress and start a new run id.
    pub fn reset(&mut self) -> Result<()> {
        self.state = CheckpointState::fresh();
        self.save()
    }

    pub fn state(&self) -> &CheckpointState {
        &self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageState> {
        self.state.stages.get(&stage)
    }

    pub fn status(&self, stage: Stage) -> StageStatus {
        self.stage(stage).map(|s| s.status).unwrap_or_default()
    }

    pub fn is_completed(&self, stage: Stage) -> bool {
        self.status(stage) == StageStatus::Completed
    }

    pub fn counter(&self, stage: Stage, name: &str) -> u64 {
        self.stage(stage)
            .and_then(|s| s.counters.get(name).copied())
            .unwrap_or(0)
    }

    /// Mark a stage in progress. A completed stage stays completed.
    pub fn mark_started(&mut self, stage: Stage) -> Result<()> {
        let entry = self.state.stages.entry(stage).or_default();
        if entry.status == StageStatus::Completed {
            return Ok(());
        }
        if entry.status == StageStatus::NotStarted {
            entry.started_at = Some(Local::now());
        }
        entry.status = StageStatus::InProgress;
        self.save()
    }

    pub fn mark_completed(&mut self, stage: Stage, counters: &[(&str, u64)]) -> Result<()> {
        let entry = self.state.stages.entry(stage).or_default();
        entry.status = StageStatus::Completed;
        entry.completed_at = Some(Local::now());
        if entry.started_at.is_none() {
            entry.started_at = entry.completed_at;
        }
        for (name, value) in counters {
            entry.counters.insert((*name).to_string(), *value);
        }
        self.save()
    }

    /// Record counters without touching the status.
    pub fn update_progress(&mut self, stage: Stage, counters: &[(&str, u64)]) -> Result<()> {
        let entry = self.state.stages.entry(stage).or_default();
        for (name, value) in counters {
            entry.counters.insert((*name).to_string(), *value);
        }
        self.save()
    }

    fn save(&self) -> Result<()> {
        let mut snapshot = self.state.clone();
        snapshot.timestamp = Local::now();
        write_json_atomic(&self.path, &snapshot).map_err(|e| PipelineError::io(&self.path, e))
    }
}
