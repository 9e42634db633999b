//! Seams to the external collaborators: text generation, quality audit,
//! speech synthesis, output sanitizing and prompt construction.
//!
//! All calls are synchronous and block for their full duration.

use crate::content::{ContentType, VoiceProfile, WorkItem};
use crate::error::ServiceError;
use std::path::Path;

/// Text-generation service: prompt in, raw text out.
pub trait TextGenerator {
    fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}

/// Quality-audit service. Expected to answer with JSON
/// `{criteria_scores, issues, notes}` but nothing is enforced here.
/// Should be backed by a different model than the generator.
pub trait AuditService {
    fn audit(&self, prompt: &str) -> Result<String, ServiceError>;
}

/// Speech-synthesis service.
pub trait SpeechSynthesizer {
    fn synthesize(&self, text: &str, voice_reference: &Path) -> Result<Vec<u8>, ServiceError>;
}

/// Cleans raw generator output. An empty return value means "reject".
pub trait Sanitizer {
    fn sanitize(&self, raw: &str, content_type: ContentType) -> String;
}

pub trait PromptBuilder {
    /// Prompt for one item in one voice. `feedback` carries the findings of
    /// a failed audit when regenerating.
    fn generation_prompt(&self, item: &WorkItem, voice: &VoiceProfile, feedback: Option<&str>) -> String;

    /// Prompt asking the auditor to score `script`.
    fn audit_prompt(&self, item: &WorkItem, voice: &VoiceProfile, script: &str) -> String;
}

/// The collaborators a pipeline run talks to.
#[derive(Clone, Copy)]
pub struct Services<'a> {
    pub generator: &'a dyn TextGenerator,
    pub auditor: &'a dyn AuditService,
    pub synthesizer: &'a dyn SpeechSynthesizer,
    pub sanitizer: &'a dyn Sanitizer,
    pub prompts: &'a dyn PromptBuilder,
}
