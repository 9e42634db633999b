use crate::checkpoint::Stage;
use crate::content::WorkItem;
use crate::error::{ItemFailure, Result, ServiceError};
use crate::item_index::ItemStatus;
use crate::pipeline::{Pipeline, StageReport};
use crate::voice_ref;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

impl Pipeline<'_> {
    /// Turn every passed script without audio into audio.
    ///
    /// Items whose audio already exists are skipped. Every passed item ends
    /// up either with audio or with an entry in the report's errors.
    pub fn run_synthesis(&mut self) -> Result<StageReport> {
        let mut report = StageReport::default();

        for voice in self.voices.clone() {
            let reference = voice_ref::find_reference(&self.voice_reference_dir, &voice.name);
            if reference.is_none() {
                warn!(
                    target: "voice_flow::synthesis",
                    voice = %voice.name,
                    dir = %self.voice_reference_dir.display(),
                    "no voice reference clip found"
                );
            }

            for item in self.index.items().to_vec() {
                let passed = self
                    .store
                    .load_audit(&item, &voice.name)
                    .is_some_and(|r| r.passed);
                if !passed {
                    continue;
                }
                report.processed += 1;
                report.passed += 1;

                match self.synthesize_item(&item, &voice.name, reference.as_deref()) {
                    Ok(Some(path)) => {
                        report.produced += 1;
                        debug!(target: "voice_flow::synthesis", item = %item, voice = %voice.name, path = %path.display(), "audio written");
                        self.index.set(&item, &voice.name, ItemStatus::Synthesized)?;
                    }
                    Ok(None) => {
                        report.skipped += 1;
                        self.index.set(&item, &voice.name, ItemStatus::Synthesized)?;
                    }
                    Err(e) => report.record_failure(Stage::Synthesize, &item, &voice.name, &e),
                }
            }
        }

        info!(
            target: "voice_flow::synthesis",
            synthesized = report.produced,
            skipped = report.skipped,
            errors = report.errors.len(),
            "synthesis finished"
        );
        Ok(report)
    }

    /// Synthesize the newest script of one passed item. Returns `None` if
    /// its audio already exists.
    pub fn synthesize_item(
        &self,
        item: &WorkItem,
        voice: &str,
        reference: Option<&Path>,
    ) -> std::result::Result<Option<PathBuf>, ItemFailure> {
        let (version, text) = self.store.read_latest(item, voice)?;
        if self.store.has_audio(item, voice, version) {
            return Ok(None);
        }
        let reference = reference.ok_or_else(|| ItemFailure::MissingVoiceReference(voice.to_string()))?;
        let audio = self
            .services
            .synthesizer
            .synthesize(&text, reference)
            .map_err(ItemFailure::Synthesis)?;
        if audio.is_empty() {
            return Err(ItemFailure::Synthesis(ServiceError::Empty));
        }
        let path = self.store.write_audio(item, voice, version, &audio)?;
        Ok(Some(path))
    }
}
