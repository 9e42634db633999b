use crate::checkpoint::Stage;
use crate::content::{VoiceProfile, WorkItem};
use crate::error::{ItemFailure, Result};
use crate::item_index::ItemStatus;
use crate::pipeline::{Pipeline, StageReport};
use tracing::{debug, info};

impl Pipeline<'_> {
    /// Produce one script per (item, voice).
    ///
    /// Items that already have a script are skipped unless `overwrite` is
    /// set, in which case a new version is appended. A rejected or failed
    /// generation is recorded and the batch moves on.
    pub fn run_generation(&mut self, overwrite: bool) -> Result<StageReport> {
        let mut report = StageReport::default();

        for (voice, item) in self.work_list() {
            report.processed += 1;
            let status = self.index.status(&item, &voice.name);
            let has_script = self.store.has_script(&item, &voice.name);

            if has_script && !overwrite {
                debug!(target: "voice_flow::generation", item = %item, voice = %voice.name, "script exists, skipping");
                if status == ItemStatus::NotStarted {
                    self.index.set(&item, &voice.name, ItemStatus::Generated)?;
                }
                report.skipped += 1;
                continue;
            }

            match self.generate_item(&item, &voice, None, None) {
                Ok(version) => {
                    self.index.set(&item, &voice.name, ItemStatus::Generated)?;
                    report.produced += 1;
                    debug!(target: "voice_flow::generation", item = %item, voice = %voice.name, version, "script generated");
                }
                Err(e) => report.record_failure(Stage::Generate, &item, &voice.name, &e),
            }
        }

        info!(
            target: "voice_flow::generation",
            processed = report.processed,
            generated = report.produced,
            skipped = report.skipped,
            failed = report.errors.len(),
            "generation finished"
        );
        Ok(report)
    }

    /// Ask the generator for a script and run it through the sanitizer.
    /// Nothing is persisted.
    pub fn draft_script(
        &self,
        item: &WorkItem,
        voice: &VoiceProfile,
        feedback: Option<&str>,
    ) -> std::result::Result<String, ItemFailure> {
        let prompt = self.services.prompts.generation_prompt(item, voice, feedback);
        let raw = self
            .services
            .generator
            .generate(&prompt)
            .map_err(ItemFailure::Generation)?;
        let text = self.services.sanitizer.sanitize(&raw, item.content_type);
        if text.trim().is_empty() {
            return Err(ItemFailure::Rejected);
        }
        Ok(text)
    }

    /// Generate and persist one script as `version` (default: next free
    /// version). Any audit record is dropped since it described an older
    /// script. Returns the version written.
    pub fn generate_item(
        &self,
        item: &WorkItem,
        voice: &VoiceProfile,
        feedback: Option<&str>,
        version: Option<u32>,
    ) -> std::result::Result<u32, ItemFailure> {
        let text = self.draft_script(item, voice, feedback)?;
        self.persist_script(item, &voice.name, version, &text)
    }

    pub(crate) fn persist_script(
        &self,
        item: &WorkItem,
        voice: &str,
        version: Option<u32>,
        text: &str,
    ) -> std::result::Result<u32, ItemFailure> {
        let version = version.unwrap_or_else(|| self.store.next_version(item, voice));
        self.store.write_script(item, voice, version, text)?;
        self.store.delete_audit(item, voice)?;
        Ok(version)
    }
}
