//! Pipeline orchestrator.
//!
//! Runs generate → audit → regenerate → synthesize strictly in order on the
//! calling thread, consulting the checkpoint to skip stages that already
//! completed. Per-item failures end up in the reports; structural errors
//! (checkpoint or status-file I/O) propagate.

use crate::checkpoint::{CheckpointStore, Stage, StageStatus, CHECKPOINT_FILE};
use crate::config::PipelineConfig;
use crate::content::{ContentType, VoiceProfile, WorkItem};
use crate::error::{ItemFailure, Result};
use crate::item_index::ItemIndex;
use crate::services::Services;
use crate::store::ContentStore;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{info, warn};

pub const SCRIPTS_GENERATED: &str = "scripts_generated";
pub const SCRIPTS_NEW: &str = "scripts_new";
pub const SCRIPTS_REJECTED: &str = "scripts_rejected";
pub const SCRIPTS_PASSED: &str = "scripts_passed";
pub const SCRIPTS_FAILED: &str = "scripts_failed";
pub const ROUNDS_COMPLETED: &str = "rounds_completed";
pub const SCRIPTS_REGENERATED: &str = "scripts_regenerated";
pub const SCRIPTS_REAUDITED: &str = "scripts_reaudited";
pub const SCRIPTS_UNAUDITED: &str = "scripts_unaudited";
pub const AUDIO_SYNTHESIZED: &str = "audio_synthesized";
pub const AUDIO_SKIPPED: &str = "audio_skipped";

/// Outcome counters of one stage run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StageReport {
    /// (item, voice) pairs looked at.
    pub processed: usize,
    /// Pairs that got new output this run.
    pub produced: usize,
    /// Pairs left alone because their output already existed.
    pub skipped: usize,
    /// Audit verdicts known at the end of the stage.
    pub passed: usize,
    pub failed: usize,
    /// Per-item failures, one line each.
    pub errors: Vec<String>,
}

impl StageReport {
    pub(crate) fn record_failure(&mut self, stage: Stage, item: &WorkItem, voice: &str, err: &ItemFailure) {
        warn!(target: "voice_flow::pipeline", %stage, item = %item, voice, error = %err, "item failed");
        self.errors.push(format!("[{}] {} ({}): {}", stage, item, voice, err));
    }
}

/// Outcome of the regeneration loop.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegenerationReport {
    /// Rounds executed by this call.
    pub rounds: usize,
    /// Scripts rewritten and re-audited.
    pub regenerated: usize,
    /// Scripts whose earlier audit had errored and got a verdict this time.
    pub reaudited: usize,
    pub passed: usize,
    pub failed: usize,
    /// Scripts still without a verdict at the end.
    pub unaudited: usize,
    pub errors: Vec<String>,
}

/// What the caller sees after a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineSummary {
    pub run_id: String,
    pub generated: u64,
    pub rejected: u64,
    pub passed: u64,
    pub failed: u64,
    /// Scripts left without an audit verdict by audit service errors.
    pub unaudited: u64,
    pub regenerated: u64,
    pub regeneration_rounds: u64,
    pub synthesized: u64,
    pub synthesis_skipped: u64,
    /// Stages skipped because the checkpoint had them completed.
    pub resumed_stages: Vec<Stage>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub overwrite: bool,
    pub max_retries: usize,
    /// Stages to run, in pipeline order regardless of the order given.
    pub stages: Vec<Stage>,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            overwrite: false,
            max_retries: 3,
            stages: Stage::ALL.to_vec(),
        }
    }
}

impl RunOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        RunOptions {
            overwrite: config.overwrite,
            max_retries: config.max_retries,
            stages: Stage::ALL.to_vec(),
        }
    }
}

/// One pipeline run: its storage, status book, checkpoint and collaborators.
pub struct Pipeline<'a> {
    pub(crate) store: ContentStore,
    pub(crate) index: ItemIndex,
    pub(crate) checkpoint: CheckpointStore,
    pub(crate) services: Services<'a>,
    pub(crate) voices: Vec<VoiceProfile>,
    pub(crate) voice_reference_dir: PathBuf,
}

impl<'a> Pipeline<'a> {
    /// Open the run described by `config` over `items`.
    pub fn open(config: &PipelineConfig, items: Vec<WorkItem>, services: Services<'a>) -> Result<Self> {
        let checkpoint = CheckpointStore::load_or_init(&config.run_root.join(CHECKPOINT_FILE))?;
        let items = items
            .into_iter()
            .filter(|i| config.content_types.contains(&i.content_type))
            .collect();
        Ok(Pipeline {
            store: ContentStore::new(&config.content_root, &config.audit_root),
            index: ItemIndex::open(&config.run_root, items),
            checkpoint,
            services,
            voices: config.voices.clone(),
            voice_reference_dir: config.voice_reference_dir.clone(),
        })
    }

    pub fn store(&self) -> &ContentStore {
        &self.store
    }

    pub fn index(&self) -> &ItemIndex {
        &self.index
    }

    pub fn checkpoint(&self) -> &CheckpointStore {
        &self.checkpoint
    }

    pub fn checkpoint_mut(&mut self) -> &mut CheckpointStore {
        &mut self.checkpoint
    }

    pub fn voices(&self) -> &[VoiceProfile] {
        &self.voices
    }

    /// Snapshot of the (item, voice) work list, voices outermost.
    pub(crate) fn work_list(&self) -> Vec<(VoiceProfile, WorkItem)> {
        self.voices
            .iter()
            .flat_map(|v| self.index.items().iter().map(move |i| (v.clone(), i.clone())))
            .collect()
    }

    /// Current pass/fail tally over every (item, voice) with an audit record.
    pub fn verdict_counts(&self) -> (usize, usize) {
        let mut passed = 0;
        let mut failed = 0;
        for (voice, item) in self.work_list() {
            match self.store.load_audit(&item, &voice.name) {
                Some(r) if r.passed => passed += 1,
                Some(_) => failed += 1,
                None => {}
            }
        }
        (passed, failed)
    }

    /// Number of items of one content type, for status output.
    pub fn item_count(&self, content_type: ContentType) -> usize {
        self.index
            .items()
            .iter()
            .filter(|i| i.content_type == content_type)
            .count()
    }

    /// Run the selected stages, resuming from the checkpoint.
    pub fn run(&mut self, options: &RunOptions) -> Result<PipelineSummary> {
        let mut summary = PipelineSummary {
            run_id: self.checkpoint.state().run_id.clone(),
            ..Default::default()
        };
        info!(
            target: "voice_flow::pipeline",
            run_id = %summary.run_id,
            items = self.index.items().len(),
            voices = self.voices.len(),
            "pipeline run starting"
        );

        for stage in Stage::ALL {
            if !options.stages.contains(&stage) {
                continue;
            }
            if self.checkpoint.is_completed(stage) {
                info!(target: "voice_flow::pipeline", %stage, "stage already completed, skipping");
                summary.resumed_stages.push(stage);
                self.fill_from_checkpoint(stage, &mut summary);
                continue;
            }

            let resuming = self.checkpoint.status(stage) == StageStatus::InProgress;
            self.checkpoint.mark_started(stage)?;
            info!(target: "voice_flow::pipeline", %stage, resuming, "stage starting");

            match stage {
                Stage::Generate => {
                    let report = self.run_generation(options.overwrite)?;
                    let scripts = (report.produced + report.skipped) as u64;
                    self.checkpoint.mark_completed(
                        stage,
                        &[
                            (SCRIPTS_GENERATED, scripts),
                            (SCRIPTS_NEW, report.produced as u64),
                            (SCRIPTS_REJECTED, report.errors.len() as u64),
                        ],
                    )?;
                    summary.generated = scripts;
                    summary.rejected = report.errors.len() as u64;
                    summary.errors.extend(report.errors);
                }
                Stage::Audit => {
                    let report = self.run_audit()?;
                    let unaudited = self.unaudited_items().len() as u64;
                    self.checkpoint.mark_completed(
                        stage,
                        &[
                            (SCRIPTS_PASSED, report.passed as u64),
                            (SCRIPTS_FAILED, report.failed as u64),
                            (SCRIPTS_UNAUDITED, unaudited),
                        ],
                    )?;
                    summary.passed = report.passed as u64;
                    summary.failed = report.failed as u64;
                    summary.unaudited = unaudited;
                    summary.errors.extend(report.errors);
                }
                Stage::Regenerate => {
                    let done = if resuming {
                        self.checkpoint.counter(stage, ROUNDS_COMPLETED) as usize
                    } else {
                        0
                    };
                    let prior_regenerated = if resuming {
                        self.checkpoint.counter(stage, SCRIPTS_REGENERATED)
                    } else {
                        0
                    };
                    let report = self.run_regeneration(options.max_retries, done)?;
                    let rounds = (done + report.rounds) as u64;
                    let regenerated = prior_regenerated + report.regenerated as u64;
                    self.checkpoint.mark_completed(
                        stage,
                        &[
                            (ROUNDS_COMPLETED, rounds),
                            (SCRIPTS_REGENERATED, regenerated),
                            (SCRIPTS_REAUDITED, report.reaudited as u64),
                            (SCRIPTS_PASSED, report.passed as u64),
                            (SCRIPTS_FAILED, report.failed as u64),
                            (SCRIPTS_UNAUDITED, report.unaudited as u64),
                        ],
                    )?;
                    summary.regeneration_rounds = rounds;
                    summary.regenerated = regenerated;
                    summary.passed = report.passed as u64;
                    summary.failed = report.failed as u64;
                    summary.unaudited = report.unaudited as u64;
                    summary.errors.extend(report.errors);
                }
                Stage::Synthesize => {
                    let report = self.run_synthesis()?;
                    self.checkpoint.mark_completed(
                        stage,
                        &[
                            (AUDIO_SYNTHESIZED, report.produced as u64),
                            (AUDIO_SKIPPED, report.errors.len() as u64),
                        ],
                    )?;
                    summary.synthesized = report.produced as u64;
                    summary.synthesis_skipped = report.errors.len() as u64;
                    summary.errors.extend(report.errors);
                }
            }
            info!(target: "voice_flow::pipeline", %stage, "stage completed");
        }

        Ok(summary)
    }

    fn fill_from_checkpoint(&self, stage: Stage, summary: &mut PipelineSummary) {
        let c = |name: &str| self.checkpoint.counter(stage, name);
        match stage {
            Stage::Generate => {
                summary.generated = c(SCRIPTS_GENERATED);
                summary.rejected = c(SCRIPTS_REJECTED);
            }
            Stage::Audit => {
                summary.passed = c(SCRIPTS_PASSED);
                summary.failed = c(SCRIPTS_FAILED);
                summary.unaudited = c(SCRIPTS_UNAUDITED);
            }
            Stage::Regenerate => {
                summary.regeneration_rounds = c(ROUNDS_COMPLETED);
                summary.regenerated = c(SCRIPTS_REGENERATED);
                summary.passed = c(SCRIPTS_PASSED);
                summary.failed = c(SCRIPTS_FAILED);
                summary.unaudited = c(SCRIPTS_UNAUDITED);
            }
            Stage::Synthesize => {
                summary.synthesized = c(AUDIO_SYNTHESIZED);
                summary.synthesis_skipped = c(AUDIO_SKIPPED);
            }
        }
    }
}
