//! Headless integration tests for voice_flow.
//!
//! These run the pipeline end-to-end against in-process fake services:
//! no model server, no TTS server, only a temp directory.

use serde_json::json;
use std::cell::Cell;
use std::fs;
use std::path::Path;
use voice_flow::checkpoint::{CheckpointStore, Stage, CHECKPOINT_FILE};
use voice_flow::config::PipelineConfig;
use voice_flow::content::{ContentType, VoiceProfile, WorkItem};
use voice_flow::error::ServiceError;
use voice_flow::item_index::ItemStatus;
use voice_flow::pipeline::{Pipeline, RunOptions};
use voice_flow::services::{
    AuditService, PromptBuilder, Sanitizer, Services, SpeechSynthesizer, TextGenerator,
};

const BANNED: &str = "BANNED";
const VOICE: &str = "julie";

// ── Fakes ─────────────────────────────────────────────────────────────────

/// Prompts in a shape the fakes can parse back.
struct FakePrompts;

impl PromptBuilder for FakePrompts {
    fn generation_prompt(&self, item: &WorkItem, _voice: &VoiceProfile, feedback: Option<&str>) -> String {
        format!("GEN {} || feedback: {}", item.label(), feedback.unwrap_or(""))
    }

    fn audit_prompt(&self, item: &WorkItem, _voice: &VoiceProfile, script: &str) -> String {
        format!("AUDIT {} || {}", item.content_type, script)
    }
}

fn prompt_label(prompt: &str) -> &str {
    prompt
        .strip_prefix("GEN ")
        .and_then(|rest| rest.split(" || ").next())
        .unwrap_or("")
}

fn prompt_feedback(prompt: &str) -> &str {
    prompt.split("feedback: ").nth(1).unwrap_or("")
}

/// Emits a banned token for the listed items. If `feedback_aware`, the
/// token is dropped once feedback mentioning it arrives.
struct FakeGenerator {
    banned_labels: Vec<String>,
    feedback_aware: bool,
    calls: Cell<usize>,
}

impl FakeGenerator {
    fn clean() -> Self {
        Self::banning(&[], false)
    }

    fn banning(labels: &[String], feedback_aware: bool) -> Self {
        FakeGenerator {
            banned_labels: labels.to_vec(),
            feedback_aware,
            calls: Cell::new(0),
        }
    }
}

impl TextGenerator for FakeGenerator {
    fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        self.calls.set(self.calls.get() + 1);
        let label = prompt_label(prompt);
        let banned = self.banned_labels.iter().any(|l| l == label);
        let corrected = self.feedback_aware && prompt_feedback(prompt).contains(BANNED);
        if banned && !corrected {
            Ok(format!("Coming up, {} {} on the radio.", label, BANNED))
        } else {
            Ok(format!("Coming up, {} on the radio.", label))
        }
    }
}

#[derive(Clone, Copy)]
enum AuditMode {
    /// Fail scripts containing the banned token, pass everything else.
    BannedToken,
    AlwaysFail,
    Garbage,
}

struct FakeAuditor {
    mode: AuditMode,
    calls: Cell<usize>,
}

impl FakeAuditor {
    fn new(mode: AuditMode) -> Self {
        FakeAuditor {
            mode,
            calls: Cell::new(0),
        }
    }
}

fn song_scores(value: u32) -> serde_json::Value {
    json!({
        "character_voice": value,
        "era_appropriateness": value,
        "forbidden_elements": value,
        "natural_flow": value,
        "length": value,
        "past_tense_usage": value,
        "brevity": value,
        "subtlety": value,
    })
}

impl AuditService for FakeAuditor {
    fn audit(&self, prompt: &str) -> Result<String, ServiceError> {
        self.calls.set(self.calls.get() + 1);
        let failing = match self.mode {
            AuditMode::Garbage => return Ok("I liked it a lot!".to_string()),
            AuditMode::AlwaysFail => true,
            AuditMode::BannedToken => prompt.contains(BANNED),
        };
        Ok(audit_body(failing))
    }
}

fn audit_body(failing: bool) -> String {
    let body = if failing {
        json!({
            "criteria_scores": song_scores(3),
            "issues": [format!("contains {} token", BANNED)],
            "notes": "remove the token",
        })
    } else {
        json!({ "criteria_scores": song_scores(9), "issues": [], "notes": "" })
    };
    body.to_string()
}

#[derive(Clone, Copy)]
enum Verdict {
    Pass,
    Fail,
    Error,
}

/// Answers audit calls in order from `script`; the last entry repeats.
struct ScriptedAuditor {
    script: Vec<Verdict>,
    calls: Cell<usize>,
}

impl ScriptedAuditor {
    fn new(script: &[Verdict]) -> Self {
        ScriptedAuditor {
            script: script.to_vec(),
            calls: Cell::new(0),
        }
    }
}

impl AuditService for ScriptedAuditor {
    fn audit(&self, _prompt: &str) -> Result<String, ServiceError> {
        let n = self.calls.get();
        self.calls.set(n + 1);
        match self.script.get(n).or(self.script.last()).copied() {
            Some(Verdict::Error) => Err(ServiceError::Request("timeout".to_string())),
            Some(Verdict::Fail) => Ok(audit_body(true)),
            Some(Verdict::Pass) | None => Ok(audit_body(false)),
        }
    }
}

/// Answers generation calls in order from `script`, `None` meaning a
/// service error; the last entry repeats.
struct ScriptedGenerator {
    script: Vec<Option<String>>,
    calls: Cell<usize>,
}

impl ScriptedGenerator {
    fn new(script: &[Option<&str>]) -> Self {
        ScriptedGenerator {
            script: script.iter().map(|s| s.map(String::from)).collect(),
            calls: Cell::new(0),
        }
    }
}

impl TextGenerator for ScriptedGenerator {
    fn generate(&self, _prompt: &str) -> Result<String, ServiceError> {
        let n = self.calls.get();
        self.calls.set(n + 1);
        match self.script.get(n).or(self.script.last()) {
            Some(Some(text)) => Ok(text.clone()),
            _ => Err(ServiceError::Request("connection refused".to_string())),
        }
    }
}

struct FakeSynth {
    calls: Cell<usize>,
}

impl FakeSynth {
    fn new() -> Self {
        FakeSynth { calls: Cell::new(0) }
    }
}

impl SpeechSynthesizer for FakeSynth {
    fn synthesize(&self, text: &str, voice_reference: &Path) -> Result<Vec<u8>, ServiceError> {
        self.calls.set(self.calls.get() + 1);
        assert!(voice_reference.is_file());
        Ok(format!("RIFF{}", text).into_bytes())
    }
}

/// Rejects text containing `reject`; passes the rest through trimmed.
struct FakeSanitizer {
    reject: Option<String>,
}

impl Sanitizer for FakeSanitizer {
    fn sanitize(&self, raw: &str, _content_type: ContentType) -> String {
        match &self.reject {
            Some(needle) if raw.contains(needle.as_str()) => String::new(),
            _ => raw.trim().to_string(),
        }
    }
}

// ── Harness ───────────────────────────────────────────────────────────────

struct Harness {
    _dir: tempfile::TempDir,
    config: PipelineConfig,
    items: Vec<WorkItem>,
}

fn harness(n: usize) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    let voices_dir = root.join("voices");
    fs::create_dir_all(&voices_dir).unwrap();
    fs::write(voices_dir.join("julie.wav"), b"RIFF").unwrap();

    let config = PipelineConfig {
        content_root: root.join("content"),
        audit_root: root.join("audits"),
        run_root: root.join("run"),
        voice_reference_dir: voices_dir,
        catalog: root.join("catalog.json"),
        voices: vec![VoiceProfile::new(VOICE)],
        ..Default::default()
    };
    let items = (0..n)
        .map(|i| {
            WorkItem::song(
                ContentType::SongIntro,
                &format!("Artist {}", i),
                &format!("Song {}", i),
            )
            .unwrap()
        })
        .collect();
    Harness {
        _dir: dir,
        config,
        items,
    }
}

fn labels(items: &[WorkItem], idx: &[usize]) -> Vec<String> {
    idx.iter().map(|i| items[*i].label()).collect()
}

fn services<'a>(
    generator: &'a dyn TextGenerator,
    auditor: &'a dyn AuditService,
    synth: &'a FakeSynth,
    sanitizer: &'a FakeSanitizer,
) -> Services<'a> {
    Services {
        generator,
        auditor,
        synthesizer: synth,
        sanitizer,
        prompts: &FakePrompts,
    }
}

fn pass_through() -> FakeSanitizer {
    FakeSanitizer { reject: None }
}

fn only(stages: &[Stage]) -> RunOptions {
    RunOptions {
        stages: stages.to_vec(),
        ..Default::default()
    }
}

// ── Generation ────────────────────────────────────────────────────────────

#[test]
fn generation_is_idempotent_without_overwrite() {
    let h = harness(4);
    let generator = FakeGenerator::clean();
    let auditor = FakeAuditor::new(AuditMode::BannedToken);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    let first = p.run(&only(&[Stage::Generate])).unwrap();
    assert_eq!(first.generated, 4);
    assert_eq!(generator.calls.get(), 4);

    // Same work again on a reset checkpoint: nothing new is produced
    p.checkpoint_mut().reset().unwrap();
    let second = p.run(&only(&[Stage::Generate])).unwrap();
    assert_eq!(second.generated, 4);
    assert_eq!(generator.calls.get(), 4);
    for item in &h.items {
        assert_eq!(p.store().versions(item, VOICE), vec![0]);
        assert_eq!(p.index().status(item, VOICE), ItemStatus::Generated);
    }
}

#[test]
fn overwrite_appends_version_and_drops_stale_audit() {
    let h = harness(1);
    let generator = FakeGenerator::clean();
    let auditor = FakeAuditor::new(AuditMode::BannedToken);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    p.run_generation(false).unwrap();
    p.run_audit().unwrap();
    assert!(p.store().has_audit(&h.items[0], VOICE));

    let report = p.run_generation(true).unwrap();
    assert_eq!(report.produced, 1);
    assert_eq!(p.store().versions(&h.items[0], VOICE), vec![0, 1]);
    assert!(!p.store().has_audit(&h.items[0], VOICE));
}

#[test]
fn rejected_generation_does_not_stop_the_batch() {
    let h = harness(6);
    let generator = FakeGenerator::clean();
    let auditor = FakeAuditor::new(AuditMode::BannedToken);
    let synth = FakeSynth::new();
    let sanitizer = FakeSanitizer {
        reject: Some("Song 4".to_string()),
    };
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    let report = p.run_generation(false).unwrap();
    assert_eq!(report.processed, 6);
    assert_eq!(report.produced, 5);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].contains("rejected"));
    assert!(!p.store().has_script(&h.items[4], VOICE));
    assert!(p.store().has_script(&h.items[5], VOICE));

    // The rejected item has nothing to audit
    let audit = p.run_audit().unwrap();
    assert_eq!(audit.passed, 5);
    assert_eq!(audit.failed, 0);
}

// ── Audit ─────────────────────────────────────────────────────────────────

#[test]
fn audit_partitions_records_by_verdict() {
    let h = harness(3);
    let generator = FakeGenerator::banning(&labels(&h.items, &[1]), false);
    let auditor = FakeAuditor::new(AuditMode::BannedToken);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    p.run_generation(false).unwrap();
    let report = p.run_audit().unwrap();
    assert_eq!((report.passed, report.failed), (2, 1));
    assert!(p.store().audit_path(&h.items[0], VOICE, true).is_file());
    assert!(p.store().audit_path(&h.items[1], VOICE, false).is_file());
    assert_eq!(p.index().status(&h.items[1], VOICE), ItemStatus::Failed);

    let record = p.store().load_audit(&h.items[1], VOICE).unwrap();
    assert!(!record.passed);
    assert!(record.issues[0].contains(BANNED));
}

#[test]
fn existing_records_short_circuit_reaudit() {
    let h = harness(3);
    let generator = FakeGenerator::clean();
    let auditor = FakeAuditor::new(AuditMode::BannedToken);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    p.run_generation(false).unwrap();
    p.run_audit().unwrap();
    assert_eq!(auditor.calls.get(), 3);

    let again = p.run_audit().unwrap();
    assert_eq!(auditor.calls.get(), 3);
    assert_eq!(again.skipped, 3);
    assert_eq!(again.passed, 3);
}

#[test]
fn unparseable_audit_is_a_failed_record_not_an_error() {
    let h = harness(2);
    let generator = FakeGenerator::clean();
    let auditor = FakeAuditor::new(AuditMode::Garbage);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    p.run_generation(false).unwrap();
    let report = p.run_audit().unwrap();
    assert!(report.errors.is_empty());
    assert_eq!(report.failed, 2);
    let record = p.store().load_audit(&h.items[0], VOICE).unwrap();
    assert_eq!(record.overall_score, 1.0);
    assert_eq!(record.issues, vec!["parse error".to_string()]);
}

// ── Regeneration ──────────────────────────────────────────────────────────

#[test]
fn regeneration_is_bounded_by_max_retries() {
    let h = harness(2);
    let generator = FakeGenerator::clean();
    let auditor = FakeAuditor::new(AuditMode::AlwaysFail);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    p.run_generation(false).unwrap();
    p.run_audit().unwrap();
    assert_eq!(generator.calls.get(), 2);

    let report = p.run_regeneration(3, 0).unwrap();
    assert_eq!(report.rounds, 3);
    assert_eq!(report.regenerated, 6);
    assert_eq!(report.failed, 2);
    assert_eq!(generator.calls.get(), 2 + 2 * 3);
    assert_eq!(auditor.calls.get(), 2 + 2 * 3);
    // Overwrite policy: the rewritten script keeps version 0
    assert_eq!(p.store().versions(&h.items[0], VOICE), vec![0]);
}

#[test]
fn regeneration_feedback_reaches_the_generator() {
    let h = harness(1);
    let generator = FakeGenerator::banning(&labels(&h.items, &[0]), true);
    let auditor = FakeAuditor::new(AuditMode::BannedToken);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    p.run_generation(false).unwrap();
    p.run_audit().unwrap();
    let failed = p.failed_items();
    assert_eq!(failed.len(), 1);
    let feedback = failed[0].2.feedback();
    assert!(feedback.contains(BANNED));
    assert!(feedback.contains("character_voice=3.0"));

    let record = p.regenerate_item(&failed[0].1, &failed[0].0, &failed[0].2).unwrap();
    assert!(record.passed);
    let (_, text) = p.store().read_latest(&h.items[0], VOICE).unwrap();
    assert!(!text.contains(BANNED));
}

#[test]
fn end_to_end_banned_tokens_fixed_in_one_round() {
    let h = harness(10);
    let generator = FakeGenerator::banning(&labels(&h.items, &[2, 7]), true);
    let auditor = FakeAuditor::new(AuditMode::BannedToken);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    let generated = p.run_generation(false).unwrap();
    assert_eq!(generated.produced, 10);
    let audit = p.run_audit().unwrap();
    assert_eq!((audit.passed, audit.failed), (8, 2));

    let regen = p.run_regeneration(5, 0).unwrap();
    assert_eq!(regen.rounds, 1);
    assert_eq!(regen.regenerated, 2);
    assert_eq!((regen.passed, regen.failed), (10, 0));
    assert!(p.failed_items().is_empty());

    let synth_report = p.run_synthesis().unwrap();
    assert_eq!(synth_report.produced, 10);
    assert_eq!(synth.calls.get(), 10);
    for item in &h.items {
        assert!(p.store().has_audio(item, VOICE, 0));
        assert_eq!(p.index().status(item, VOICE), ItemStatus::Synthesized);
    }
}

// ── Synthesis ─────────────────────────────────────────────────────────────

#[test]
fn synthesis_only_touches_passed_items_and_is_idempotent() {
    let h = harness(3);
    let generator = FakeGenerator::banning(&labels(&h.items, &[0]), false);
    let auditor = FakeAuditor::new(AuditMode::BannedToken);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    p.run_generation(false).unwrap();
    p.run_audit().unwrap();
    let first = p.run_synthesis().unwrap();
    assert_eq!(first.produced, 2);
    assert!(!p.store().has_audio(&h.items[0], VOICE, 0));

    let second = p.run_synthesis().unwrap();
    assert_eq!(second.produced, 0);
    assert_eq!(second.skipped, 2);
    assert_eq!(synth.calls.get(), 2);
}

#[test]
fn missing_voice_reference_is_reported_per_item() {
    let h = harness(3);
    fs::remove_file(h.config.voice_reference_dir.join("julie.wav")).unwrap();
    let generator = FakeGenerator::clean();
    let auditor = FakeAuditor::new(AuditMode::BannedToken);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    p.run_generation(false).unwrap();
    p.run_audit().unwrap();
    let report = p.run_synthesis().unwrap();
    assert_eq!(report.passed, 3);
    assert_eq!(report.produced, 0);
    // Every passed item is accounted for
    assert_eq!(report.produced + report.skipped + report.errors.len(), report.passed);
    assert!(report.errors.iter().all(|e| e.contains("no voice reference")));
    assert_eq!(synth.calls.get(), 0);
}

// ── Orchestrator & checkpoint ─────────────────────────────────────────────

#[test]
fn completed_generate_stage_is_not_rerun() {
    let h = harness(5);
    let mut checkpoint =
        CheckpointStore::load_or_init(&h.config.run_root.join(CHECKPOINT_FILE)).unwrap();
    checkpoint
        .mark_completed(Stage::Generate, &[("scripts_generated", 7)])
        .unwrap();

    let generator = FakeGenerator::clean();
    let auditor = FakeAuditor::new(AuditMode::BannedToken);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    let summary = p.run(&only(&[Stage::Generate])).unwrap();
    assert_eq!(generator.calls.get(), 0);
    assert_eq!(summary.generated, 7);
    assert_eq!(summary.resumed_stages, vec![Stage::Generate]);
}

#[test]
fn full_run_then_resume_makes_no_service_calls() {
    let h = harness(4);
    let generator = FakeGenerator::banning(&labels(&h.items, &[1]), true);
    let auditor = FakeAuditor::new(AuditMode::BannedToken);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();

    let summary = {
        let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();
        p.run(&RunOptions::default()).unwrap()
    };
    assert_eq!(summary.generated, 4);
    assert_eq!(summary.regeneration_rounds, 1);
    assert_eq!(summary.regenerated, 1);
    assert_eq!((summary.passed, summary.failed), (4, 0));
    assert_eq!(summary.synthesized, 4);
    assert!(summary.errors.is_empty());

    let calls = (generator.calls.get(), auditor.calls.get(), synth.calls.get());
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();
    let resumed = p.run(&RunOptions::default()).unwrap();
    assert_eq!(resumed.resumed_stages, Stage::ALL.to_vec());
    assert_eq!(resumed.generated, 4);
    assert_eq!(resumed.synthesized, 4);
    assert_eq!(resumed.run_id, summary.run_id);
    assert_eq!(
        (generator.calls.get(), auditor.calls.get(), synth.calls.get()),
        calls
    );
}

#[test]
fn in_progress_regeneration_resumes_remaining_rounds() {
    let h = harness(2);
    let generator = FakeGenerator::clean();
    let auditor = FakeAuditor::new(AuditMode::AlwaysFail);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    p.run(&only(&[Stage::Generate, Stage::Audit])).unwrap();
    p.checkpoint_mut().mark_started(Stage::Regenerate).unwrap();
    p.checkpoint_mut()
        .update_progress(Stage::Regenerate, &[("rounds_completed", 2)])
        .unwrap();
    let before = generator.calls.get();

    let options = RunOptions {
        max_retries: 3,
        stages: vec![Stage::Regenerate],
        ..Default::default()
    };
    let summary = p.run(&options).unwrap();
    assert_eq!(summary.regeneration_rounds, 3);
    assert_eq!(generator.calls.get() - before, 2);
    assert!(p.checkpoint().is_completed(Stage::Regenerate));
}

#[test]
fn pipeline_only_keeps_configured_content_types() {
    let mut h = harness(2);
    h.config.content_types = vec![ContentType::Time];
    let mut items = h.items.clone();
    items.push(WorkItem::slot(ContentType::Time, Some(7), Some(30)).unwrap());

    let generator = FakeGenerator::clean();
    let auditor = FakeAuditor::new(AuditMode::BannedToken);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let p = Pipeline::open(&h.config, items, services(&generator, &auditor, &synth, &sanitizer)).unwrap();
    assert_eq!(p.index().items().len(), 1);
    assert_eq!(p.item_count(ContentType::Time), 1);
    assert_eq!(p.item_count(ContentType::SongIntro), 0);
}

// ── Service errors ────────────────────────────────────────────────────────

#[test]
fn audit_service_error_leaves_item_for_regeneration() {
    let h = harness(2);
    let generator = FakeGenerator::clean();
    let auditor = ScriptedAuditor::new(&[Verdict::Error, Verdict::Pass]);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    p.run_generation(false).unwrap();
    let audit = p.run_audit().unwrap();
    assert_eq!(audit.errors.len(), 1);
    assert!(audit.errors[0].contains("audit service failed"));
    assert_eq!((audit.passed, audit.failed), (1, 0));
    assert!(!p.store().has_audit(&h.items[0], VOICE));
    assert_eq!(p.unaudited_items().len(), 1);

    let regen = p.run_regeneration(3, 0).unwrap();
    assert_eq!(regen.rounds, 1);
    assert_eq!(regen.reaudited, 1);
    assert_eq!(regen.regenerated, 0);
    assert_eq!((regen.passed, regen.failed, regen.unaudited), (2, 0, 0));
    // Re-auditing does not rewrite the script
    assert_eq!(generator.calls.get(), 2);
    assert_eq!(p.index().status(&h.items[0], VOICE), ItemStatus::Passed);
}

#[test]
fn audit_error_after_rewrite_is_retried_next_round() {
    let h = harness(1);
    let generator = FakeGenerator::clean();
    let auditor = ScriptedAuditor::new(&[Verdict::Fail, Verdict::Error, Verdict::Pass]);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    p.run_generation(false).unwrap();
    assert_eq!(p.run_audit().unwrap().failed, 1);

    let regen = p.run_regeneration(3, 0).unwrap();
    assert_eq!(regen.rounds, 2);
    assert_eq!(regen.regenerated, 0);
    assert_eq!(regen.reaudited, 1);
    assert_eq!((regen.passed, regen.failed, regen.unaudited), (1, 0, 0));
    assert_eq!(regen.errors.len(), 1);
    assert_eq!(auditor.calls.get(), 3);
    assert!(p.store().has_audit(&h.items[0], VOICE));

    let synth_report = p.run_synthesis().unwrap();
    assert_eq!(synth_report.produced, 1);
}

#[test]
fn persistent_audit_errors_are_counted_as_unaudited() {
    let h = harness(1);
    let generator = FakeGenerator::clean();
    let auditor = ScriptedAuditor::new(&[Verdict::Fail, Verdict::Error]);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    let options = RunOptions {
        max_retries: 2,
        stages: vec![Stage::Generate, Stage::Audit, Stage::Regenerate],
        ..Default::default()
    };
    let summary = p.run(&options).unwrap();
    assert_eq!(summary.regeneration_rounds, 2);
    assert_eq!((summary.passed, summary.failed, summary.unaudited), (0, 0, 1));
    assert_eq!(summary.errors.len(), 2);
    assert!(summary.errors.iter().all(|e| e.contains("audit service failed")));
}

#[test]
fn generator_error_during_regeneration_keeps_failed_record() {
    let h = harness(1);
    let generator = ScriptedGenerator::new(&[Some("Coming up, BANNED tunes on the radio."), None]);
    let auditor = FakeAuditor::new(AuditMode::BannedToken);
    let synth = FakeSynth::new();
    let sanitizer = pass_through();
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    p.run_generation(false).unwrap();
    assert_eq!(p.run_audit().unwrap().failed, 1);

    let regen = p.run_regeneration(2, 0).unwrap();
    assert_eq!(regen.rounds, 2);
    assert_eq!(regen.regenerated, 0);
    assert_eq!(regen.failed, 1);
    assert_eq!(regen.errors.len(), 2);
    assert!(regen.errors.iter().all(|e| e.contains("generation failed")));
    assert_eq!(generator.calls.get(), 3);

    // The old script and its failed record are untouched
    assert_eq!(p.store().versions(&h.items[0], VOICE), vec![0]);
    let (_, text) = p.store().read_latest(&h.items[0], VOICE).unwrap();
    assert!(text.contains(BANNED));
    assert!(!p.store().load_audit(&h.items[0], VOICE).unwrap().passed);
    assert_eq!(p.failed_items().len(), 1);
}

#[test]
fn sanitizer_rejection_during_regeneration_keeps_failed_record() {
    let h = harness(1);
    let generator = ScriptedGenerator::new(&[
        Some("Coming up, BANNED tunes on the radio."),
        Some("REJECT this draft"),
    ]);
    let auditor = FakeAuditor::new(AuditMode::BannedToken);
    let synth = FakeSynth::new();
    let sanitizer = FakeSanitizer {
        reject: Some("REJECT".to_string()),
    };
    let mut p = Pipeline::open(&h.config, h.items.clone(), services(&generator, &auditor, &synth, &sanitizer)).unwrap();

    p.run_generation(false).unwrap();
    p.run_audit().unwrap();

    let regen = p.run_regeneration(1, 0).unwrap();
    assert_eq!(regen.errors.len(), 1);
    assert!(regen.errors[0].contains("rejected"));
    assert_eq!(regen.failed, 1);
    let (_, text) = p.store().read_latest(&h.items[0], VOICE).unwrap();
    assert!(text.contains(BANNED));
    assert_eq!(p.failed_items().len(), 1);
}
