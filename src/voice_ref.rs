use std::path::{Path, PathBuf};

/// Audio extensions accepted as voice reference clips.
const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "flac", "ogg"];

/// Find a voice reference clip for `voice` in `reference_dir`.
///
/// Matches files whose stem starts with the voice name (case-insensitive),
/// where any remaining characters are non-alphabetic, so `julie.wav`,
/// `julie2.wav` and `julie_3.wav` all match. With several matches one is
/// picked at random.
pub fn find_reference(reference_dir: &Path, voice: &str) -> Option<PathBuf> {
    let mut candidates = find_all_references(reference_dir, voice);
    match candidates.len() {
        0 => None,
        1 => candidates.pop(),
        n => Some(candidates.swap_remove(fastrand::usize(..n))),
    }
}

/// All reference clips for a voice, sorted by path.
pub fn find_all_references(reference_dir: &Path, voice: &str) -> Vec<PathBuf> {
    if voice.trim().is_empty() {
        return Vec::new();
    }
    let entries = match std::fs::read_dir(reference_dir) {
        Ok(e) => e,
        Err(_) => return Vec::new(),
    };
    let voice_lower = voice.to_lowercase();

    let mut matches: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .filter(|path| {
            let ext = match path.extension() {
                Some(e) => e.to_string_lossy().to_lowercase(),
                None => return false,
            };
            if !AUDIO_EXTENSIONS.contains(&ext.as_str()) {
                return false;
            }
            let stem = match path.file_stem() {
                Some(s) => s.to_string_lossy().to_lowercase(),
                None => return false,
            };
            match stem.strip_prefix(&voice_lower) {
                Some(suffix) => !suffix.chars().any(|c| c.is_alphabetic()),
                None => false,
            }
        })
        .collect();
    matches.sort();
    matches
}
