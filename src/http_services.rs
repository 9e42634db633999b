//! HTTP-backed service clients. Blocking; the client timeout is the only
//! bound on how long a call may take.

use crate::config::{ModelEndpoint, SynthesisEndpoint};
use crate::error::ServiceError;
use crate::services::{AuditService, SpeechSynthesizer, TextGenerator};
use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error};

fn build_client(timeout_ms: u64) -> Result<Client, ServiceError> {
    Client::builder()
        .timeout(Duration::from_millis(timeout_ms))
        .build()
        .map_err(|e| ServiceError::Other(format!("failed to build HTTP client: {e}")))
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Client for an Ollama-style `/api/generate` endpoint. One instance per
/// model; the generator and the auditor should use different models.
#[derive(Clone)]
pub struct OllamaClient {
    http: Client,
    endpoint: ModelEndpoint,
}

impl OllamaClient {
    pub fn new(endpoint: ModelEndpoint) -> Result<Self, ServiceError> {
        Ok(Self {
            http: build_client(endpoint.timeout_ms)?,
            endpoint,
        })
    }

    fn complete(&self, prompt: &str) -> Result<String, ServiceError> {
        let url = format!("{}/api/generate", self.endpoint.base_url.trim_end_matches('/'));
        debug!(target: "voice_flow::http", url = %url, model = %self.endpoint.model, "POST generate");

        let body = json!({
            "model": self.endpoint.model,
            "prompt": prompt,
            "stream": false,
            "options": { "temperature": self.endpoint.temperature },
        });
        let resp = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .map_err(|e| ServiceError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            error!(target: "voice_flow::http", %status, body = %body, "generate request failed");
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let parsed: GenerateResponse = resp
            .json()
            .map_err(|e| ServiceError::Other(format!("failed to parse generate response: {e}")))?;
        if parsed.response.trim().is_empty() {
            return Err(ServiceError::Empty);
        }
        Ok(parsed.response)
    }
}

impl TextGenerator for OllamaClient {
    fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        self.complete(prompt)
    }
}

impl AuditService for OllamaClient {
    fn audit(&self, prompt: &str) -> Result<String, ServiceError> {
        self.complete(prompt)
    }
}

/// Client for a voice-cloning TTS server taking a multipart form with the
/// text and a reference clip, and answering with audio bytes.
#[derive(Clone)]
pub struct HttpSynthesizer {
    http: Client,
    endpoint: SynthesisEndpoint,
}

impl HttpSynthesizer {
    pub fn new(endpoint: SynthesisEndpoint) -> Result<Self, ServiceError> {
        Ok(Self {
            http: build_client(endpoint.timeout_ms)?,
            endpoint,
        })
    }
}

impl SpeechSynthesizer for HttpSynthesizer {
    fn synthesize(&self, text: &str, voice_reference: &Path) -> Result<Vec<u8>, ServiceError> {
        debug!(
            target: "voice_flow::http",
            url = %self.endpoint.url,
            reference = %voice_reference.display(),
            "POST synthesize"
        );
        let form = multipart::Form::new()
            .text("text", text.to_string())
            .file("voice_reference", voice_reference)
            .map_err(|e| ServiceError::Other(format!("cannot attach voice reference: {e}")))?;

        let resp = self
            .http
            .post(&self.endpoint.url)
            .multipart(form)
            .send()
            .map_err(|e| ServiceError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            error!(target: "voice_flow::http", %status, body = %body, "synthesis request failed");
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let bytes = resp.bytes().map_err(|e| ServiceError::Request(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
