//! Audit scoring: parse the auditor's JSON, normalize criteria, weight them
//! into one overall score and decide pass/fail per content type.

use crate::content::{ContentType, VoiceProfile, WorkItem};
use crate::error::ItemFailure;
use crate::services::Services;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Score assigned to a criterion the auditor did not return.
pub const MISSING_CRITERION_SCORE: f64 = 1.0;
pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 10.0;
/// Criteria below this are quoted back to the generator as feedback.
pub const FEEDBACK_SCORE_THRESHOLD: f64 = 8.0;
pub const PARSE_ERROR_ISSUE: &str = "parse error";
/// Absorbs float noise in weighted sums; far below the 0.01 score resolution.
const SCORE_EPSILON: f64 = 1e-9;

const SONG_INTRO_WEIGHTS: [(&str, f64); 5] = [
    ("character_voice", 0.30),
    ("era_appropriateness", 0.25),
    ("forbidden_elements", 0.20),
    ("natural_flow", 0.15),
    ("length", 0.10),
];

const SONG_OUTRO_WEIGHTS: [(&str, f64); 5] = [
    ("character_voice", 0.30),
    ("era_appropriateness", 0.25),
    ("forbidden_elements", 0.20),
    ("natural_flow", 0.15),
    ("past_tense_usage", 0.10),
];

const TIME_CRITERIA: [&str; 3] = ["character_voice", "natural_flow", "brevity"];
const WEATHER_CRITERIA: [&str; 4] = ["character_voice", "natural_flow", "length", "subtlety"];

const SONG_INTRO_CRITERIA: [&str; 5] = [
    SONG_INTRO_WEIGHTS[0].0,
    SONG_INTRO_WEIGHTS[1].0,
    SONG_INTRO_WEIGHTS[2].0,
    SONG_INTRO_WEIGHTS[3].0,
    SONG_INTRO_WEIGHTS[4].0,
];

const SONG_OUTRO_CRITERIA: [&str; 5] = [
    SONG_OUTRO_WEIGHTS[0].0,
    SONG_OUTRO_WEIGHTS[1].0,
    SONG_OUTRO_WEIGHTS[2].0,
    SONG_OUTRO_WEIGHTS[3].0,
    SONG_OUTRO_WEIGHTS[4].0,
];

/// Criteria the auditor is asked to score for a content type.
pub fn criteria(content_type: ContentType) -> &'static [&'static str] {
    match content_type {
        ContentType::SongIntro => &SONG_INTRO_CRITERIA,
        ContentType::SongOutro => &SONG_OUTRO_CRITERIA,
        ContentType::Time => &TIME_CRITERIA,
        ContentType::Weather => &WEATHER_CRITERIA,
    }
}

/// Minimum overall score for a pass.
pub fn pass_threshold(content_type: ContentType) -> f64 {
    match content_type {
        ContentType::SongIntro | ContentType::SongOutro => 7.5,
        ContentType::Weather => 6.5,
        ContentType::Time => 6.0,
    }
}

/// Weighted overall score, rounded to two decimals.
///
/// Songs use fixed weights; time and weather use an unweighted mean.
/// `scores` is expected to be normalized already.
pub fn overall_score(content_type: ContentType, scores: &BTreeMap<String, f64>) -> f64 {
    round2(raw_score(content_type, scores))
}

/// Whether an unrounded overall score clears the content type's threshold.
pub fn passes(content_type: ContentType, raw: f64) -> bool {
    raw + SCORE_EPSILON >= pass_threshold(content_type)
}

fn raw_score(content_type: ContentType, scores: &BTreeMap<String, f64>) -> f64 {
    let get = |name: &str| scores.get(name).copied().unwrap_or(MISSING_CRITERION_SCORE);
    match content_type {
        ContentType::SongIntro => weighted_sum(&SONG_INTRO_WEIGHTS, get),
        ContentType::SongOutro => weighted_sum(&SONG_OUTRO_WEIGHTS, get),
        ContentType::Time => mean(&TIME_CRITERIA, get),
        ContentType::Weather => mean(&WEATHER_CRITERIA, get),
    }
}

fn weighted_sum(weights: &[(&str, f64)], get: impl Fn(&str) -> f64) -> f64 {
    weights.iter().map(|(name, w)| get(name) * w).sum()
}

fn mean(names: &[&str], get: impl Fn(&str) -> f64) -> f64 {
    names.iter().map(|n| get(n)).sum::<f64>() / names.len() as f64
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Normalize the auditor's raw `criteria_scores` object for a content type.
///
/// Keys are matched ignoring case and `-`/`_`/space differences. Missing or
/// non-numeric criteria score 1.0. If any returned value exceeds 10 the
/// whole set is taken to be on a 0-100 scale and divided by 10. Every value
/// is then clamped to [1, 10].
pub fn normalize_scores(
    content_type: ContentType,
    raw: &serde_json::Map<String, Value>,
) -> BTreeMap<String, f64> {
    let lookup: BTreeMap<String, f64> = raw
        .iter()
        .filter_map(|(k, v)| numeric(v).map(|n| (normalize_key(k), n)))
        .collect();

    let found: Vec<(&str, Option<f64>)> = criteria(content_type)
        .iter()
        .map(|name| (*name, lookup.get(*name).copied()))
        .collect();

    let hundred_scale = found.iter().any(|(_, v)| v.is_some_and(|v| v > MAX_SCORE));

    found
        .into_iter()
        .map(|(name, value)| {
            let value = match value {
                Some(v) if hundred_scale => v / 10.0,
                Some(v) => v,
                None => MISSING_CRITERION_SCORE,
            };
            (name.to_string(), value.clamp(MIN_SCORE, MAX_SCORE))
        })
        .collect()
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace(['-', ' '], "_")
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// The auditor's answer after JSON extraction, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAudit {
    pub criteria_scores: serde_json::Map<String, Value>,
    pub issues: Vec<String>,
    pub notes: String,
}

/// Extract and parse the JSON object from an auditor response. Tolerates
/// markdown fences and prose around the object. Returns `None` if no object
/// with a `criteria_scores` map can be found.
pub fn parse_response(response: &str) -> Option<RawAudit> {
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end < start {
        return None;
    }
    let value: Value = serde_json::from_str(&response[start..=end]).ok()?;
    let obj = value.as_object()?;
    let criteria_scores = obj.get("criteria_scores")?.as_object()?.clone();

    let issues = match obj.get("issues") {
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .filter(|s| !s.trim().is_empty())
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.clone()],
        _ => Vec::new(),
    };
    let notes = obj
        .get("notes")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(RawAudit {
        criteria_scores,
        issues,
        notes,
    })
}

/// The current quality verdict for one item's script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub content_type: ContentType,
    pub item_key: String,
    pub voice: String,
    /// Script version the verdict applies to.
    pub script_version: u32,
    pub criteria_scores: BTreeMap<String, f64>,
    pub overall_score: f64,
    pub passed: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    #[serde(default)]
    pub notes: String,
    pub audited_at: DateTime<Local>,
}

impl AuditRecord {
    /// Score a raw auditor response. A malformed response yields a failed
    /// record with every criterion at 1.0.
    pub fn from_response(item: &WorkItem, voice: &str, script_version: u32, response: &str) -> Self {
        match parse_response(response) {
            Some(raw) => Self::from_raw(item, voice, script_version, raw),
            None => Self::parse_error(item, voice, script_version),
        }
    }

    pub fn from_raw(item: &WorkItem, voice: &str, script_version: u32, raw: RawAudit) -> Self {
        let ct = item.content_type;
        let criteria_scores = normalize_scores(ct, &raw.criteria_scores);
        let unrounded = raw_score(ct, &criteria_scores);
        AuditRecord {
            content_type: ct,
            item_key: item.key(),
            voice: voice.to_string(),
            script_version,
            passed: passes(ct, unrounded),
            criteria_scores,
            overall_score: round2(unrounded),
            issues: raw.issues,
            notes: raw.notes,
            audited_at: Local::now(),
        }
    }

    pub fn parse_error(item: &WorkItem, voice: &str, script_version: u32) -> Self {
        let ct = item.content_type;
        AuditRecord {
            content_type: ct,
            item_key: item.key(),
            voice: voice.to_string(),
            script_version,
            criteria_scores: criteria(ct)
                .iter()
                .map(|name| (name.to_string(), MIN_SCORE))
                .collect(),
            overall_score: MIN_SCORE,
            passed: false,
            issues: vec![PARSE_ERROR_ISSUE.to_string()],
            notes: String::new(),
            audited_at: Local::now(),
        }
    }

    pub fn score(&self, criterion: &str) -> Option<f64> {
        self.criteria_scores.get(criterion).copied()
    }

    /// Feedback for regeneration: the issues, the notes, then every
    /// criterion below 8 as `key=value`.
    pub fn feedback(&self) -> String {
        let mut parts = Vec::new();
        if !self.issues.is_empty() {
            parts.push(format!("Issues: {}", self.issues.join("; ")));
        }
        if !self.notes.trim().is_empty() {
            parts.push(format!("Notes: {}", self.notes.trim()));
        }
        let low: Vec<String> = self
            .criteria_scores
            .iter()
            .filter(|(_, v)| **v < FEEDBACK_SCORE_THRESHOLD)
            .map(|(k, v)| format!("{}={:.1}", k, v))
            .collect();
        if !low.is_empty() {
            parts.push(format!("Low scores: {}", low.join(", ")));
        }
        parts.join("\n")
    }
}

/// Run one script past the audit service and score the answer.
///
/// A service error is a per-item failure and leaves the item unaudited.
/// An unparseable answer is not an error: it becomes a failed record.
pub fn audit_script(
    services: &Services<'_>,
    item: &WorkItem,
    voice: &VoiceProfile,
    script_version: u32,
    script: &str,
) -> Result<AuditRecord, ItemFailure> {
    let prompt = services.prompts.audit_prompt(item, voice, script);
    let response = services.auditor.audit(&prompt).map_err(ItemFailure::Audit)?;
    let record = AuditRecord::from_response(item, &voice.name, script_version, &response);
    if record.issues.iter().any(|i| i == PARSE_ERROR_ISSUE) {
        warn!(target: "voice_flow::audit", item = %item, voice = %voice.name, "unparseable audit response");
    } else {
        debug!(
            target: "voice_flow::audit",
            item = %item,
            voice = %voice.name,
            overall = record.overall_score,
            passed = record.passed,
            "audit scored"
        );
    }
    Ok(record)
}
