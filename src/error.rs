use std::path::PathBuf;
use thiserror::Error;

/// Error returned by an external service client (generation, audit, synthesis).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("service returned an empty response")]
    Empty,

    #[error("{0}")]
    Other(String),
}

/// Per-item failure. Caught at the stage boundary, logged and counted;
/// never aborts the batch.
#[derive(Debug, Error)]
pub enum ItemFailure {
    #[error("generation failed: {0}")]
    Generation(#[source] ServiceError),

    #[error("generated text rejected by sanitizer")]
    Rejected,

    #[error("audit service failed: {0}")]
    Audit(#[source] ServiceError),

    #[error("no voice reference found for voice '{0}'")]
    MissingVoiceReference(String),

    #[error("no script found for {0}")]
    MissingScript(String),

    #[error("synthesis failed: {0}")]
    Synthesis(#[source] ServiceError),

    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ItemFailure {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ItemFailure::Storage {
            path: path.into(),
            source,
        }
    }
}

/// Structural error. Propagates to the caller instead of being absorbed
/// into per-item bookkeeping.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("candidate list is empty")]
    EmptyCandidates,

    #[error("none of the {0} candidates could be read")]
    NoReadableCandidates(usize),

    #[error("forced pick '{0}' is not among the candidates")]
    ForcedPickNotFound(String),

    #[error("no candidate passed its audit")]
    NoPassingCandidates,

    #[error("missing required parameter '{param}' for {content_type} content")]
    MissingParameter {
        param: &'static str,
        content_type: &'static str,
    },

    #[error("invalid parameter '{param}': {reason}")]
    InvalidParameter { param: &'static str, reason: String },

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
