use crate::content::{ContentType, WorkItem};
use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SongEntry {
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlotEntry {
    #[serde(default)]
    pub hour: Option<u8>,
    #[serde(default)]
    pub minute: Option<u8>,
}

/// What the station wants narrated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub songs: Vec<SongEntry>,
    #[serde(default)]
    pub time_slots: Vec<SlotEntry>,
    #[serde(default)]
    pub weather_slots: Vec<SlotEntry>,
}

impl Catalog {
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Expand the catalog into work items for the given content types, in
    /// content-type order. Songs feed both intros and outros. Items that
    /// map to the same storage key are collapsed onto the first one, with a
    /// warning when they were not identical. Entries missing a required
    /// field are an error.
    pub fn work_items(&self, content_types: &[ContentType]) -> Result<Vec<WorkItem>> {
        let mut seen: HashMap<(ContentType, String), WorkItem> = HashMap::new();
        let mut items = Vec::new();
        for ct in content_types {
            let batch = match ct {
                ContentType::SongIntro | ContentType::SongOutro => self
                    .songs
                    .iter()
                    .map(|s| WorkItem::song(*ct, &s.artist, &s.title))
                    .collect::<Result<Vec<_>>>()?,
                ContentType::Time => self
                    .time_slots
                    .iter()
                    .map(|s| WorkItem::slot(*ct, s.hour, s.minute))
                    .collect::<Result<Vec<_>>>()?,
                ContentType::Weather => self
                    .weather_slots
                    .iter()
                    .map(|s| WorkItem::slot(*ct, s.hour, s.minute))
                    .collect::<Result<Vec<_>>>()?,
            };
            for item in batch {
                let key = (item.content_type, item.key());
                match seen.get(&key) {
                    Some(first) if *first != item => {
                        warn!(
                            target: "voice_flow::catalog",
                            kept = %first,
                            dropped = %item,
                            key = %key.1,
                            "catalog entries share a storage key"
                        );
                    }
                    Some(_) => {}
                    None => {
                        seen.insert(key, item.clone());
                        items.push(item);
                    }
                }
            }
        }
        Ok(items)
    }
}
