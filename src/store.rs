//! Persisted layout for scripts, audio and audit records.
//!
//! ```text
//! {content_root}/{content_type}/{voice}/{item_key}/{voice}_{version}.txt
//! {content_root}/{content_type}/{voice}/{item_key}/{voice}_{version}.wav
//! {audit_root}/{voice}/{passed|failed}/{item_key}_{content_type}_audit.json
//! ```

use crate::audit::AuditRecord;
use crate::content::WorkItem;
use crate::error::ItemFailure;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const SCRIPT_EXT: &str = "txt";
const AUDIO_EXT: &str = "wav";

#[derive(Debug, Clone)]
pub struct ContentStore {
    content_root: PathBuf,
    audit_root: PathBuf,
}

impl ContentStore {
    pub fn new(content_root: &Path, audit_root: &Path) -> Self {
        Self {
            content_root: content_root.to_path_buf(),
            audit_root: audit_root.to_path_buf(),
        }
    }

    pub fn item_dir(&self, item: &WorkItem, voice: &str) -> PathBuf {
        self.content_root
            .join(item.content_type.as_str())
            .join(voice)
            .join(item.key())
    }

    pub fn script_path(&self, item: &WorkItem, voice: &str, version: u32) -> PathBuf {
        self.item_dir(item, voice)
            .join(format!("{}_{}.{}", voice, version, SCRIPT_EXT))
    }

    pub fn audio_path(&self, item: &WorkItem, voice: &str, version: u32) -> PathBuf {
        self.item_dir(item, voice)
            .join(format!("{}_{}.{}", voice, version, AUDIO_EXT))
    }

    /// All script versions on disk for an item, ascending.
    pub fn versions(&self, item: &WorkItem, voice: &str) -> Vec<u32> {
        let entries = match fs::read_dir(self.item_dir(item, voice)) {
            Ok(e) => e,
            Err(_) => return Vec::new(),
        };
        let prefix = format!("{}_", voice);
        let mut versions: Vec<u32> = entries
            .flatten()
            .filter_map(|entry| {
                let path = entry.path();
                let ext = path.extension()?.to_string_lossy().to_lowercase();
                if ext != SCRIPT_EXT {
                    return None;
                }
                let stem = path.file_stem()?.to_string_lossy().to_string();
                stem.strip_prefix(&prefix)?.parse::<u32>().ok()
            })
            .collect();
        versions.sort_unstable();
        versions
    }

    pub fn latest_version(&self, item: &WorkItem, voice: &str) -> Option<u32> {
        self.versions(item, voice).last().copied()
    }

    pub fn next_version(&self, item: &WorkItem, voice: &str) -> u32 {
        self.latest_version(item, voice).map_or(0, |v| v + 1)
    }

    pub fn has_script(&self, item: &WorkItem, voice: &str) -> bool {
        self.latest_version(item, voice).is_some()
    }

    pub fn read_script(&self, item: &WorkItem, voice: &str, version: u32) -> Result<String, ItemFailure> {
        let path = self.script_path(item, voice, version);
        fs::read_to_string(&path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => {
                ItemFailure::MissingScript(format!("{} ({} v{})", item, voice, version))
            }
            _ => ItemFailure::storage(path, e),
        })
    }

    /// Newest script for an item as `(version, text)`.
    pub fn read_latest(&self, item: &WorkItem, voice: &str) -> Result<(u32, String), ItemFailure> {
        let version = self
            .latest_version(item, voice)
            .ok_or_else(|| ItemFailure::MissingScript(format!("{} ({})", item, voice)))?;
        let text = self.read_script(item, voice, version)?;
        Ok((version, text))
    }

    pub fn write_script(
        &self,
        item: &WorkItem,
        voice: &str,
        version: u32,
        text: &str,
    ) -> Result<PathBuf, ItemFailure> {
        let path = self.script_path(item, voice, version);
        write_atomic(&path, text.as_bytes()).map_err(|e| ItemFailure::storage(&path, e))?;
        Ok(path)
    }

    /// Remove a script version (and its audio, if any). Missing files are fine.
    pub fn delete_script(&self, item: &WorkItem, voice: &str, version: u32) -> Result<(), ItemFailure> {
        for path in [
            self.script_path(item, voice, version),
            self.audio_path(item, voice, version),
        ] {
            remove_if_exists(&path).map_err(|e| ItemFailure::storage(&path, e))?;
        }
        Ok(())
    }

    pub fn has_audio(&self, item: &WorkItem, voice: &str, version: u32) -> bool {
        self.audio_path(item, voice, version).is_file()
    }

    pub fn write_audio(
        &self,
        item: &WorkItem,
        voice: &str,
        version: u32,
        audio: &[u8],
    ) -> Result<PathBuf, ItemFailure> {
        let path = self.audio_path(item, voice, version);
        write_atomic(&path, audio).map_err(|e| ItemFailure::storage(&path, e))?;
        Ok(path)
    }

    // --- Audit records ---

    pub fn audit_path(&self, item: &WorkItem, voice: &str, passed: bool) -> PathBuf {
        let partition = if passed { "passed" } else { "failed" };
        self.audit_root.join(voice).join(partition).join(format!(
            "{}_{}_audit.json",
            item.key(),
            item.content_type.as_str()
        ))
    }

    /// Current audit record from either partition. A passed record wins if
    /// both somehow exist. Unreadable records count as absent.
    pub fn load_audit(&self, item: &WorkItem, voice: &str) -> Option<AuditRecord> {
        [true, false]
            .into_iter()
            .find_map(|passed| load_json(&self.audit_path(item, voice, passed)))
    }

    pub fn has_audit(&self, item: &WorkItem, voice: &str) -> bool {
        self.audit_path(item, voice, true).is_file() || self.audit_path(item, voice, false).is_file()
    }

    /// Persist the current record, replacing any record in either partition.
    pub fn save_audit(&self, item: &WorkItem, voice: &str, record: &AuditRecord) -> Result<PathBuf, ItemFailure> {
        self.delete_audit(item, voice)?;
        let path = self.audit_path(item, voice, record.passed);
        write_json_atomic(&path, record).map_err(|e| ItemFailure::storage(&path, e))?;
        Ok(path)
    }

    pub fn delete_audit(&self, item: &WorkItem, voice: &str) -> Result<(), ItemFailure> {
        for passed in [true, false] {
            let path = self.audit_path(item, voice, passed);
            remove_if_exists(&path).map_err(|e| ItemFailure::storage(&path, e))?;
        }
        Ok(())
    }
}

/// Load JSON from a file, returning `None` on missing or corrupt files.
pub(crate) fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Option<T> {
    let content = fs::read_to_string(path).ok()?;
    serde_json::from_str(&content).ok()
}

/// Serialize `data` and write it in full via a sibling temp file and rename,
/// so readers never see a partially written file.
pub(crate) fn write_json_atomic<T: Serialize>(path: &Path, data: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(data).map_err(io::Error::other)?;
    write_atomic(path, json.as_bytes())
}

pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
