//! Multi-candidate ranking ("cherry picking") of script variants for one
//! item. Pure: nothing is read from or written to disk here.

use crate::audit::AuditRecord;
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;

const OVERRIDE_WINNER: &str = "selected (user override)";
const OVERRIDE_LOSER: &str = "not selected (user override)";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidelineWeights {
    pub clarity: f64,
    pub style: f64,
    pub creativity: f64,
    pub conciseness: f64,
    pub tts_safety: f64,
    pub novelty: f64,
}

impl Default for GuidelineWeights {
    fn default() -> Self {
        GuidelineWeights {
            clarity: 0.20,
            style: 0.20,
            creativity: 0.15,
            conciseness: 0.15,
            tts_safety: 0.15,
            novelty: 0.15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    pub weights: GuidelineWeights,
    /// Characters allowed before the conciseness penalty starts.
    pub char_limit: usize,
    /// Case-insensitive substrings that cost 2 clarity points per match.
    pub forbidden_patterns: Vec<String>,
    /// Words or phrases that cost 0.5 conciseness points per occurrence.
    pub filler_words: Vec<String>,
    /// Voice-specific words that earn the style bonus.
    pub marker_words: Vec<String>,
    /// Drop candidates whose audit did not pass before scoring.
    pub require_audit_pass: bool,
    /// Candidate id that wins regardless of score.
    #[serde(skip)]
    pub forced_pick: Option<String>,
}

impl Default for RankerConfig {
    fn default() -> Self {
        RankerConfig {
            weights: GuidelineWeights::default(),
            char_limit: 400,
            forbidden_patterns: ["as an ai", "http", "*", "#"].map(String::from).to_vec(),
            filler_words: ["um", "uh", "you know", "basically", "literally"]
                .map(String::from)
                .to_vec(),
            marker_words: Vec::new(),
            require_audit_pass: false,
            forced_pick: None,
        }
    }
}

/// One variant of a script. `text` is `None` if it could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub text: Option<String>,
    pub audit: Option<AuditRecord>,
}

impl Candidate {
    pub fn new(id: &str, text: &str) -> Self {
        Candidate {
            id: id.to_string(),
            text: Some(text.to_string()),
            audit: None,
        }
    }

    pub fn unreadable(id: &str) -> Self {
        Candidate {
            id: id.to_string(),
            text: None,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditRecord) -> Self {
        self.audit = Some(audit);
        self
    }

    fn audit_score(&self, criterion: &str) -> Option<f64> {
        self.audit.as_ref().and_then(|a| a.score(criterion))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SubScores {
    pub clarity: f64,
    pub style: f64,
    pub creativity: f64,
    pub conciseness: f64,
    pub tts_safety: f64,
    pub novelty: f64,
}

impl SubScores {
    fn weighted(&self, w: &GuidelineWeights) -> f64 {
        self.clarity * w.clarity
            + self.style * w.style
            + self.creativity * w.creativity
            + self.conciseness * w.conciseness
            + self.tts_safety * w.tts_safety
            + self.novelty * w.novelty
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub id: String,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_scores: Option<SubScores>,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ranking {
    /// Best first.
    pub ranked: Vec<RankedCandidate>,
    pub winner: String,
}

/// Rank candidates and pick a winner.
///
/// Errors on an empty list, on a forced pick that is not among the inputs,
/// when no candidate can be read, and when `require_audit_pass` leaves
/// nothing to rank. Ties keep input order.
pub fn rank(candidates: &[Candidate], config: &RankerConfig) -> Result<Ranking> {
    if candidates.is_empty() {
        return Err(PipelineError::EmptyCandidates);
    }

    if let Some(pick) = &config.forced_pick {
        if !candidates.iter().any(|c| &c.id == pick) {
            return Err(PipelineError::ForcedPickNotFound(pick.clone()));
        }
        return Ok(forced(candidates, pick));
    }

    let readable: Vec<(&Candidate, &str)> = candidates
        .iter()
        .filter_map(|c| c.text.as_deref().map(|t| (c, t)))
        .collect();
    if readable.is_empty() {
        return Err(PipelineError::NoReadableCandidates(candidates.len()));
    }

    let pool: Vec<(&Candidate, &str)> = if config.require_audit_pass {
        readable
            .into_iter()
            .filter(|(c, _)| c.audit.as_ref().is_some_and(|a| a.passed))
            .collect()
    } else {
        readable
    };
    if pool.is_empty() {
        return Err(PipelineError::NoPassingCandidates);
    }

    let word_sets: Vec<HashSet<String>> = pool
        .iter()
        .map(|(_, text)| words(text).into_iter().collect())
        .collect();

    let mut ranked: Vec<RankedCandidate> = pool
        .iter()
        .enumerate()
        .map(|(i, (candidate, text))| {
            let sub = SubScores {
                clarity: clarity(candidate, text, config),
                style: style(candidate, text, config),
                creativity: creativity(candidate, text),
                conciseness: conciseness(candidate, text, config),
                tts_safety: tts_safety(text),
                novelty: novelty(i, &word_sets),
            };
            RankedCandidate {
                id: candidate.id.clone(),
                score: sub.weighted(&config.weights),
                rationale: rationale(&sub),
                sub_scores: Some(sub),
            }
        })
        .collect();

    // sort_by is stable: equal scores keep input order
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));

    let winner = ranked[0].id.clone();
    Ok(Ranking { ranked, winner })
}

fn forced(candidates: &[Candidate], pick: &str) -> Ranking {
    let mut ranked = Vec::with_capacity(candidates.len());
    ranked.push(RankedCandidate {
        id: pick.to_string(),
        score: 10.0,
        sub_scores: None,
        rationale: OVERRIDE_WINNER.to_string(),
    });
    ranked.extend(candidates.iter().filter(|c| c.id != pick).map(|c| RankedCandidate {
        id: c.id.clone(),
        score: 0.0,
        sub_scores: None,
        rationale: OVERRIDE_LOSER.to_string(),
    }));
    Ranking {
        ranked,
        winner: pick.to_string(),
    }
}

fn rationale(s: &SubScores) -> String {
    format!(
        "clarity {:.1}, style {:.1}, creativity {:.1}, conciseness {:.1}, tts {:.1}, novelty {:.1}",
        s.clarity, s.style, s.creativity, s.conciseness, s.tts_safety, s.novelty
    )
}

fn clamp10(x: f64) -> f64 {
    x.clamp(0.0, 10.0)
}

/// Lowercase word tokens; apostrophes stay inside words.
fn words(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|w| w.trim_matches('\''))
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn count_phrase(tokens: &[String], phrase: &str) -> usize {
    let needle = words(phrase);
    if needle.is_empty() || needle.len() > tokens.len() {
        return 0;
    }
    tokens.windows(needle.len()).filter(|w| *w == needle.as_slice()).count()
}

fn has_punctuation_run(text: &str) -> bool {
    let mut run = 0;
    for c in text.chars() {
        if c == '!' || c == '?' {
            run += 1;
            if run >= 3 {
                return true;
            }
        } else {
            run = 0;
        }
    }
    false
}

fn clarity(candidate: &Candidate, text: &str, config: &RankerConfig) -> f64 {
    let lower = text.to_lowercase();
    let matches: usize = config
        .forbidden_patterns
        .iter()
        .filter(|p| !p.is_empty())
        .map(|p| lower.matches(p.to_lowercase().as_str()).count())
        .sum();
    let mut score = candidate.audit_score("natural_flow").unwrap_or(10.0);
    score -= 2.0 * matches as f64;
    if has_punctuation_run(text) {
        score -= 1.0;
    }
    clamp10(score)
}

fn style(candidate: &Candidate, text: &str, config: &RankerConfig) -> f64 {
    let voice = candidate.audit_score("character_voice").unwrap_or(8.0);
    let era = candidate.audit_score("era_appropriateness").unwrap_or(8.0);
    let mut score = (voice + era) / 2.0;
    let tokens = words(text);
    if config.marker_words.iter().any(|m| count_phrase(&tokens, m) > 0) {
        score += 0.5;
    }
    clamp10(score)
}

fn creativity(candidate: &Candidate, text: &str) -> f64 {
    let mut score = candidate.audit_score("character_voice").unwrap_or(7.0);
    let tokens = words(text);
    if !tokens.is_empty() {
        let unique: HashSet<&String> = tokens.iter().collect();
        if unique.len() as f64 / tokens.len() as f64 > 0.8 {
            score += 0.5;
        }
    }
    clamp10(score)
}

fn conciseness(candidate: &Candidate, text: &str, config: &RankerConfig) -> f64 {
    let over = text.chars().count().saturating_sub(config.char_limit);
    let mut score = 10.0 - (over as f64 / 100.0) * 2.0;
    for criterion in ["length", "brevity"] {
        if let Some(audit) = candidate.audit_score(criterion) {
            score = score.min(audit);
        }
    }
    let tokens = words(text);
    let fillers: usize = config
        .filler_words
        .iter()
        .map(|f| count_phrase(&tokens, f))
        .sum();
    score -= 0.5 * fillers as f64;
    clamp10(score)
}

fn tts_safety(text: &str) -> f64 {
    let mut score: f64 = 9.0;
    if text.contains("...") || text.contains('\u{2026}') {
        score -= 0.5;
    }
    if text.contains('\u{2014}') || text.contains('\u{2013}') {
        score -= 0.5;
    }
    if text.contains('(') {
        score -= 1.0;
    }
    let all_caps = text.split_whitespace().any(|token| {
        let letters: Vec<char> = token.chars().filter(|c| c.is_alphabetic()).collect();
        letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase())
    });
    if all_caps {
        score -= 0.5;
    }
    if text.chars().any(|c| c.is_ascii_digit()) {
        score -= 0.3;
    }
    clamp10(score)
}

/// Word-set Jaccard similarity.
fn overlap(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

fn novelty(index: usize, word_sets: &[HashSet<String>]) -> f64 {
    let mut score = 10.0;
    for (j, other) in word_sets.iter().enumerate() {
        if j == index {
            continue;
        }
        let r = overlap(&word_sets[index], other);
        if r > 0.9 {
            score -= 3.0;
        } else if r > 0.7 {
            score -= 1.5;
        }
    }
    clamp10(score)
}
