//! Per-item status book and the run's work-item list.
//!
//! Built once per run and passed through the pipeline by reference. Status
//! is persisted alongside the checkpoint so stage idempotency does not hinge
//! on file existence alone.

use crate::content::WorkItem;
use crate::error::{PipelineError, Result};
use crate::store::{load_json, write_json_atomic};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const INDEX_FILE: &str = "item_status.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    #[default]
    NotStarted,
    Generated,
    Passed,
    Failed,
    Synthesized,
}

#[derive(Debug)]
pub struct ItemIndex {
    path: PathBuf,
    items: Vec<WorkItem>,
    statuses: BTreeMap<String, ItemStatus>,
}

impl ItemIndex {
    /// Open the status book in `run_root` for the given items. A missing or
    /// corrupt file starts with every item `NotStarted`.
    pub fn open(run_root: &Path, items: Vec<WorkItem>) -> Self {
        let path = run_root.join(INDEX_FILE);
        let statuses = load_json(&path).unwrap_or_default();
        ItemIndex {
            path,
            items,
            statuses,
        }
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    pub fn status_key(item: &WorkItem, voice: &str) -> String {
        format!("{}/{}/{}", voice, item.content_type.as_str(), item.key())
    }

    pub fn status(&self, item: &WorkItem, voice: &str) -> ItemStatus {
        self.statuses
            .get(&Self::status_key(item, voice))
            .copied()
            .unwrap_or_default()
    }

    pub fn set(&mut self, item: &WorkItem, voice: &str, status: ItemStatus) -> Result<()> {
        let key = Self::status_key(item, voice);
        if self.statuses.get(&key) == Some(&status) {
            return Ok(());
        }
        self.statuses.insert(key, status);
        self.save()
    }

    /// Count of entries per status, for status reporting.
    pub fn counts(&self) -> BTreeMap<ItemStatus, usize> {
        let mut counts = BTreeMap::new();
        for status in self.statuses.values() {
            *counts.entry(*status).or_default() += 1;
        }
        counts
    }

    fn save(&self) -> Result<()> {
        write_json_atomic(&self.path, &self.statuses).map_err(|e| PipelineError::io(&self.path, e))
    }
}
