//! Bounded feedback-driven regeneration of failed scripts.
//!
//! Each round first re-audits scripts left without a verdict by an audit
//! service error, then rewrites every failed script with the audit findings
//! appended to the prompt and re-audits it on the spot. The newest attempt
//! always replaces the previous one.

use crate::audit::AuditRecord;
use crate::checkpoint::Stage;
use crate::content::{VoiceProfile, WorkItem};
use crate::error::{ItemFailure, Result};
use crate::item_index::ItemStatus;
use crate::pipeline::{Pipeline, RegenerationReport, ROUNDS_COMPLETED, SCRIPTS_REGENERATED};
use tracing::{debug, info, warn};

fn verdict_status(record: &AuditRecord) -> ItemStatus {
    if record.passed {
        ItemStatus::Passed
    } else {
        ItemStatus::Failed
    }
}

fn record_error(report: &mut RegenerationReport, item: &WorkItem, voice: &str, err: &ItemFailure) {
    warn!(target: "voice_flow::regeneration", item = %item, voice, error = %err, "regeneration failed");
    report
        .errors
        .push(format!("[{}] {} ({}): {}", Stage::Regenerate, item, voice, err));
}

impl Pipeline<'_> {
    /// Every (voice, item, record) whose current audit failed.
    pub fn failed_items(&self) -> Vec<(VoiceProfile, WorkItem, AuditRecord)> {
        self.work_list()
            .into_iter()
            .filter_map(|(voice, item)| {
                let record = self.store.load_audit(&item, &voice.name)?;
                (!record.passed).then_some((voice, item, record))
            })
            .collect()
    }

    /// Every (voice, item) with a script but no audit record, i.e. the
    /// audit service failed on its newest script.
    pub fn unaudited_items(&self) -> Vec<(VoiceProfile, WorkItem)> {
        self.work_list()
            .into_iter()
            .filter(|(voice, item)| {
                self.store.has_script(item, &voice.name) && !self.store.has_audit(item, &voice.name)
            })
            .collect()
    }

    /// Run rounds `rounds_done..max_rounds`, stopping early once nothing is
    /// failing or unaudited. Progress is written to the checkpoint after
    /// every round.
    pub fn run_regeneration(&mut self, max_rounds: usize, rounds_done: usize) -> Result<RegenerationReport> {
        let mut report = RegenerationReport::default();
        let mut regenerated_total = self.checkpoint.counter(Stage::Regenerate, SCRIPTS_REGENERATED);

        for round in rounds_done..max_rounds {
            let unaudited = self.unaudited_items();
            let failed = self.failed_items();
            if unaudited.is_empty() && failed.is_empty() {
                info!(target: "voice_flow::regeneration", round, "no failed or unaudited items left");
                break;
            }
            info!(
                target: "voice_flow::regeneration",
                round = round + 1,
                max_rounds,
                unaudited = unaudited.len(),
                failed = failed.len(),
                "regeneration round starting"
            );

            for (voice, item) in unaudited {
                match self.audit_item(&item, &voice) {
                    Ok(record) => {
                        report.reaudited += 1;
                        self.index.set(&item, &voice.name, verdict_status(&record))?;
                    }
                    Err(e) => record_error(&mut report, &item, &voice.name, &e),
                }
            }

            for (voice, item, record) in failed {
                match self.regenerate_item(&item, &voice, &record) {
                    Ok(new_record) => {
                        report.regenerated += 1;
                        regenerated_total += 1;
                        self.index.set(&item, &voice.name, verdict_status(&new_record))?;
                    }
                    Err(e) => record_error(&mut report, &item, &voice.name, &e),
                }
            }

            report.rounds += 1;
            self.checkpoint.update_progress(
                Stage::Regenerate,
                &[
                    (ROUNDS_COMPLETED, (round + 1) as u64),
                    (SCRIPTS_REGENERATED, regenerated_total),
                ],
            )?;
        }

        let (passed, failed) = self.verdict_counts();
        report.passed = passed;
        report.failed = failed;
        report.unaudited = self.unaudited_items().len();
        info!(
            target: "voice_flow::regeneration",
            rounds = report.rounds,
            regenerated = report.regenerated,
            reaudited = report.reaudited,
            passed,
            failed,
            unaudited = report.unaudited,
            "regeneration finished"
        );
        Ok(report)
    }

    /// Rewrite one failed script using the failed record's findings, then
    /// audit the new script immediately.
    ///
    /// The feedback is taken before anything is deleted. The old script and
    /// record are only removed once a replacement draft exists, so a failed
    /// draft leaves the item in the failed set for the next round. If the
    /// audit of the new script fails, the item is left unaudited and the
    /// next round re-audits it.
    pub fn regenerate_item(
        &self,
        item: &WorkItem,
        voice: &VoiceProfile,
        failed: &AuditRecord,
    ) -> std::result::Result<AuditRecord, ItemFailure> {
        let feedback = failed.feedback();
        let draft = self.draft_script(item, voice, Some(&feedback))?;

        let version = self
            .store
            .latest_version(item, &voice.name)
            .unwrap_or(failed.script_version);
        self.store.delete_script(item, &voice.name, version)?;
        self.store.delete_audit(item, &voice.name)?;
        self.persist_script(item, &voice.name, Some(version), &draft)?;
        debug!(target: "voice_flow::regeneration", item = %item, voice = %voice.name, version, "script rewritten");

        self.audit_item(item, voice)
    }
}
