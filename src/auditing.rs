use crate::audit::{self, AuditRecord};
use crate::checkpoint::Stage;
use crate::content::{VoiceProfile, WorkItem};
use crate::error::{ItemFailure, Result};
use crate::item_index::ItemStatus;
use crate::pipeline::{Pipeline, StageReport};
use tracing::{debug, info};

impl Pipeline<'_> {
    /// Audit the newest script of every item that has no current record.
    ///
    /// An existing record in either partition short-circuits the item, so a
    /// crashed run resumes without re-auditing. `passed`/`failed` in the
    /// report cover every audited item, including skipped ones. An audit
    /// service error leaves the item without a record; regeneration rounds
    /// pick it up again.
    pub fn run_audit(&mut self) -> Result<StageReport> {
        let mut report = StageReport::default();

        for (voice, item) in self.work_list() {
            if let Some(existing) = self.store.load_audit(&item, &voice.name) {
                debug!(target: "voice_flow::auditing", item = %item, voice = %voice.name, "already audited, skipping");
                report.processed += 1;
                report.skipped += 1;
                self.tally(&mut report, &item, &voice.name, &existing)?;
                continue;
            }
            if !self.store.has_script(&item, &voice.name) {
                // Never generated (or rejected); nothing to audit.
                continue;
            }

            report.processed += 1;
            match self.audit_item(&item, &voice) {
                Ok(record) => {
                    report.produced += 1;
                    self.tally(&mut report, &item, &voice.name, &record)?;
                }
                Err(e) => report.record_failure(Stage::Audit, &item, &voice.name, &e),
            }
        }

        info!(
            target: "voice_flow::auditing",
            audited = report.produced,
            skipped = report.skipped,
            passed = report.passed,
            failed = report.failed,
            errors = report.errors.len(),
            "audit finished"
        );
        Ok(report)
    }

    /// Audit the newest script of one item and persist the record into the
    /// passed or failed partition.
    pub fn audit_item(&self, item: &WorkItem, voice: &VoiceProfile) -> std::result::Result<AuditRecord, ItemFailure> {
        let (version, text) = self.store.read_latest(item, &voice.name)?;
        let record = audit::audit_script(&self.services, item, voice, version, &text)?;
        self.store.save_audit(item, &voice.name, &record)?;
        Ok(record)
    }

    fn tally(&mut self, report: &mut StageReport, item: &WorkItem, voice: &str, record: &AuditRecord) -> Result<()> {
        let status = self.index.status(item, voice);
        if record.passed {
            report.passed += 1;
            if status != ItemStatus::Synthesized {
                self.index.set(item, voice, ItemStatus::Passed)?;
            }
        } else {
            report.failed += 1;
            self.index.set(item, voice, ItemStatus::Failed)?;
        }
        Ok(())
    }
}
