use crate::content::ContentType;
use crate::services::Sanitizer;

/// Phrases that mark an answer as the model talking about itself rather
/// than a script.
const META_PHRASES: &[&str] = &["as an ai", "language model", "i cannot", "i can't help"];

/// Leading lines that introduce the script instead of being part of it.
const PREAMBLE_PREFIXES: &[&str] = &["here is", "here's", "sure", "certainly", "okay,"];

/// Light cleanup of generator output: trims, drops a preamble line,
/// strips markdown emphasis and wrapping quotes, collapses whitespace.
#[derive(Debug, Clone)]
pub struct BasicSanitizer {
    /// Scripts with fewer words are rejected.
    pub min_words: usize,
}

impl Default for BasicSanitizer {
    fn default() -> Self {
        Self { min_words: 3 }
    }
}

impl Sanitizer for BasicSanitizer {
    fn sanitize(&self, raw: &str, _content_type: ContentType) -> String {
        let mut lines: Vec<&str> = raw.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
        if lines.len() > 1 {
            let first = lines[0].to_lowercase();
            if PREAMBLE_PREFIXES.iter().any(|p| first.starts_with(p)) && first.ends_with(':') {
                lines.remove(0);
            }
        }

        let joined = lines
            .join(" ")
            .replace("**", "")
            .replace('*', "")
            .replace('#', "");
        let collapsed = joined.split_whitespace().collect::<Vec<_>>().join(" ");
        let text = strip_wrapping_quotes(&collapsed).trim().to_string();

        let lower = text.to_lowercase();
        if META_PHRASES.iter().any(|p| lower.contains(p)) {
            return String::new();
        }
        if text.split_whitespace().count() < self.min_words {
            return String::new();
        }
        text
    }
}

fn strip_wrapping_quotes(s: &str) -> &str {
    for (open, close) in [('"', '"'), ('\u{201c}', '\u{201d}'), ('\'', '\'')] {
        if let Some(inner) = s.strip_prefix(open).and_then(|r| r.strip_suffix(close)) {
            if !inner.contains(open) && !inner.contains(close) {
                return inner;
            }
        }
    }
    s
}
