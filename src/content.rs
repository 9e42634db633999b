use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of narrated segment. Routes prompt construction and audit weighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    SongIntro,
    SongOutro,
    Time,
    Weather,
}

impl ContentType {
    pub const ALL: [ContentType; 4] = [
        ContentType::SongIntro,
        ContentType::SongOutro,
        ContentType::Time,
        ContentType::Weather,
    ];

    /// Short name used in directory and audit file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::SongIntro => "intro",
            ContentType::SongOutro => "outro",
            ContentType::Time => "time",
            ContentType::Weather => "weather",
        }
    }

    pub fn is_song(&self) -> bool {
        matches!(self, ContentType::SongIntro | ContentType::SongOutro)
    }

    /// Parse a content type (case-insensitive, accepts hyphens or underscores).
    pub fn from_str_loose(s: &str) -> Result<Self, String> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "intro" | "song_intro" | "intros" => Ok(ContentType::SongIntro),
            "outro" | "song_outro" | "outros" => Ok(ContentType::SongOutro),
            "time" | "time_announcement" => Ok(ContentType::Time),
            "weather" | "weather_announcement" => Ok(ContentType::Weather),
            _ => Err(format!(
                "Unknown content type '{}'. Expected: intro, outro, time, weather",
                s
            )),
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a work item narrates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Subject {
    Song { artist: String, title: String },
    Slot { hour: u8, minute: Option<u8> },
}

/// One unit of content to narrate. Identity is immutable and maps
/// deterministically to a storage key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub content_type: ContentType,
    pub subject: Subject,
}

impl WorkItem {
    pub fn song(content_type: ContentType, artist: &str, title: &str) -> Result<Self, PipelineError> {
        if !content_type.is_song() {
            return Err(PipelineError::InvalidParameter {
                param: "content_type",
                reason: format!("{} is not a song content type", content_type),
            });
        }
        if artist.trim().is_empty() {
            return Err(PipelineError::MissingParameter {
                param: "artist",
                content_type: content_type.as_str(),
            });
        }
        if title.trim().is_empty() {
            return Err(PipelineError::MissingParameter {
                param: "title",
                content_type: content_type.as_str(),
            });
        }
        Ok(WorkItem {
            content_type,
            subject: Subject::Song {
                artist: artist.trim().to_string(),
                title: title.trim().to_string(),
            },
        })
    }

    /// Build a time or weather slot. Time announcements require a minute.
    pub fn slot(
        content_type: ContentType,
        hour: Option<u8>,
        minute: Option<u8>,
    ) -> Result<Self, PipelineError> {
        if content_type.is_song() {
            return Err(PipelineError::InvalidParameter {
                param: "content_type",
                reason: format!("{} is not a slot content type", content_type),
            });
        }
        let hour = hour.ok_or(PipelineError::MissingParameter {
            param: "hour",
            content_type: content_type.as_str(),
        })?;
        if hour > 23 {
            return Err(PipelineError::InvalidParameter {
                param: "hour",
                reason: format!("{} is out of range 0-23", hour),
            });
        }
        if content_type == ContentType::Time && minute.is_none() {
            return Err(PipelineError::MissingParameter {
                param: "minute",
                content_type: content_type.as_str(),
            });
        }
        if let Some(m) = minute {
            if m > 59 {
                return Err(PipelineError::InvalidParameter {
                    param: "minute",
                    reason: format!("{} is out of range 0-59", m),
                });
            }
        }
        Ok(WorkItem {
            content_type,
            subject: Subject::Slot { hour, minute },
        })
    }

    /// Filesystem-safe key, e.g. `Queen-Bohemian_Rhapsody` or `14-30`.
    pub fn key(&self) -> String {
        match &self.subject {
            Subject::Song { artist, title } => {
                format!("{}-{}", safe_component(artist), safe_component(title))
            }
            Subject::Slot { hour, minute: Some(m) } => format!("{:02}-{:02}", hour, m),
            Subject::Slot { hour, minute: None } => format!("{:02}", hour),
        }
    }

    /// Human-readable label for logs and prompts.
    pub fn label(&self) -> String {
        match &self.subject {
            Subject::Song { artist, title } => format!("{} - {}", artist, title),
            Subject::Slot { hour, minute: Some(m) } => format!("{:02}:{:02}", hour, m),
            Subject::Slot { hour, minute: None } => format!("{:02}:00", hour),
        }
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.label(), self.content_type)
    }
}

/// Replace anything outside `[A-Za-z0-9]` with `_`, collapsing runs.
fn safe_component(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_underscore = false;
    for c in s.trim().chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c);
            last_underscore = false;
        } else if !last_underscore {
            out.push('_');
            last_underscore = true;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "untitled".to_string()
    } else {
        trimmed.to_string()
    }
}

/// A narrator persona.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub name: String,
    /// Free-form description of how this voice talks.
    #[serde(default)]
    pub style: String,
    /// Example lines in this voice, shown to the generator and the auditor.
    #[serde(default)]
    pub exemplars: Vec<String>,
    /// Words characteristic of this voice (ranker style bonus).
    #[serde(default)]
    pub marker_words: Vec<String>,
}

impl VoiceProfile {
    pub fn new(name: &str) -> Self {
        VoiceProfile {
            name: name.to_string(),
            ..Default::default()
        }
    }
}
