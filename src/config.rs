use crate::content::{ContentType, VoiceProfile};
use crate::error::{PipelineError, Result};
use crate::ranker::RankerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const CONFIG_ENV: &str = "VOICEFLOW_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "voiceflow.toml";

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn data_root() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("voiceflow")
}

/// A text-model endpoint (generation or audit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelEndpoint {
    pub base_url: String,
    pub model: String,
    pub timeout_ms: u64,
    pub temperature: f32,
}

impl ModelEndpoint {
    fn generation() -> Self {
        ModelEndpoint {
            base_url: env_or("VOICEFLOW_GEN_URL", "http://localhost:11434"),
            model: env_or("VOICEFLOW_GEN_MODEL", "llama3.1:8b"),
            timeout_ms: 120_000,
            temperature: 0.8,
        }
    }

    fn audit() -> Self {
        ModelEndpoint {
            base_url: env_or("VOICEFLOW_AUDIT_URL", "http://localhost:11434"),
            model: env_or("VOICEFLOW_AUDIT_MODEL", "qwen2.5:14b"),
            timeout_ms: 120_000,
            temperature: 0.1,
        }
    }
}

impl Default for ModelEndpoint {
    fn default() -> Self {
        Self::generation()
    }
}

fn default_audit_endpoint() -> ModelEndpoint {
    ModelEndpoint::audit()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisEndpoint {
    pub url: String,
    pub timeout_ms: u64,
}

impl Default for SynthesisEndpoint {
    fn default() -> Self {
        SynthesisEndpoint {
            url: env_or("VOICEFLOW_TTS_URL", "http://localhost:8004/tts"),
            timeout_ms: 300_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub station: String,
    pub content_root: PathBuf,
    pub audit_root: PathBuf,
    pub run_root: PathBuf,
    pub voice_reference_dir: PathBuf,
    /// JSON catalog of songs and time/weather slots.
    pub catalog: PathBuf,
    pub max_retries: usize,
    pub overwrite: bool,
    pub content_types: Vec<ContentType>,
    pub voices: Vec<VoiceProfile>,
    pub generation: ModelEndpoint,
    #[serde(default = "default_audit_endpoint")]
    pub audit: ModelEndpoint,
    pub synthesis: SynthesisEndpoint,
    pub ranker: RankerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let root = data_root();
        PipelineConfig {
            station: String::new(),
            content_root: root.join("content"),
            audit_root: root.join("audits"),
            run_root: root.join("run"),
            voice_reference_dir: root.join("voices"),
            catalog: root.join("catalog.json"),
            max_retries: 3,
            overwrite: false,
            content_types: ContentType::ALL.to_vec(),
            voices: Vec::new(),
            generation: ModelEndpoint::generation(),
            audit: ModelEndpoint::audit(),
            synthesis: SynthesisEndpoint::default(),
            ranker: RankerConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from `path`, else `$VOICEFLOW_CONFIG`, else `./voiceflow.toml`.
    /// A missing file gives the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(env_or(CONFIG_ENV, DEFAULT_CONFIG_FILE)),
        };
        if !path.exists() {
            info!(target: "voice_flow::config", path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path).map_err(|e| PipelineError::io(&path, e))?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: PipelineConfig =
            toml::from_str(text).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.content_types.is_empty() {
            return Err(PipelineError::Config("content_types must not be empty".to_string()));
        }
        for (i, voice) in self.voices.iter().enumerate() {
            if voice.name.trim().is_empty() {
                return Err(PipelineError::Config(format!("voice #{} has no name", i + 1)));
            }
            if self.voices[..i].iter().any(|v| v.name == voice.name) {
                return Err(PipelineError::Config(format!("voice '{}' is listed twice", voice.name)));
            }
        }
        Ok(())
    }

    pub fn voice(&self, name: &str) -> Option<&VoiceProfile> {
        self.voices.iter().find(|v| v.name == name)
    }
}
