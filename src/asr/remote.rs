//! HTTP client for a remote transcription server.
//!
//! Uploads the capture window as a WAV file via `multipart/form-data` and
//! parses the JSON `{text}` / `{error}` response. Guided matching is
//! implemented as transcription plus Levenshtein fuzzy matching, which is
//! the documented behaviour for backends without native guided decoding.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use super::wav::encode_wav_16k_mono;
use super::{finish_scores, AsrEngine, GuidedMatchResult, RemoteAsrConfig, TranscriptionResult};
use crate::nlu::levenshtein_similarity;

#[derive(Debug, Deserialize)]
struct InferenceResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Transcription client for a whisper-server-compatible endpoint.
pub struct RemoteWhisperEngine {
    config: RemoteAsrConfig,
    client: Client,
    endpoint: String,
}

impl RemoteWhisperEngine {
    /// Validate the configuration and build the HTTP client. Fails on an
    /// empty or unparseable server URL.
    pub fn new(config: RemoteAsrConfig) -> Result<Self> {
        if config.server_url.is_empty() {
            bail!("remote ASR server URL is empty");
        }
        let endpoint = format!(
            "{}{}",
            config.server_url.trim_end_matches('/'),
            config.inference_path
        );
        reqwest::Url::parse(&endpoint)
            .with_context(|| format!("invalid remote ASR URL: {endpoint}"))?;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            config,
            client,
            endpoint,
        })
    }

    pub fn config(&self) -> &RemoteAsrConfig {
        &self.config
    }

    fn post_audio(&self, samples: &[f32]) -> Result<String> {
        let wav = encode_wav_16k_mono(samples)?;
        debug!(bytes = wav.len(), endpoint = %self.endpoint, "posting audio");

        let mut form = Form::new()
            .part(
                "file",
                Part::bytes(wav)
                    .file_name("audio.wav")
                    .mime_str("audio/wav")
                    .context("invalid mime type")?,
            )
            .text("response_format", "json")
            .text("language", self.config.language.clone())
            .text("temperature", self.config.temperature.to_string());
        if self.config.translate {
            form = form.text("translate", "true");
        }

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .context("HTTP request failed")?;

        let status = response.status();
        let body = response.text().context("failed to read response body")?;
        if !status.is_success() {
            bail!("server returned error: {status} {body}");
        }

        let parsed: InferenceResponse =
            serde_json::from_str(&body).context("JSON parse error")?;
        if let Some(error) = parsed.error {
            bail!("{error}");
        }
        parsed
            .text
            .ok_or_else(|| anyhow::anyhow!("response missing 'text' field"))
    }
}

impl AsrEngine for RemoteWhisperEngine {
    fn transcribe(&mut self, samples: &[f32]) -> TranscriptionResult {
        if samples.is_empty() {
            return TranscriptionResult::failure("Empty audio samples");
        }

        let start = Instant::now();
        let mut result = match self.post_audio(samples) {
            Ok(text) => TranscriptionResult {
                success: true,
                text: text.trim().to_string(),
                ..TranscriptionResult::default()
            },
            Err(err) => {
                warn!(%err, "remote transcription failed");
                TranscriptionResult::failure(format!("{err:#}"))
            }
        };
        result.processing_time_ms = start.elapsed().as_millis() as u64;
        result
    }

    fn guided_match(&mut self, samples: &[f32], phrases: &[String]) -> GuidedMatchResult {
        if samples.is_empty() {
            return GuidedMatchResult::failure("Empty audio samples");
        }
        if phrases.is_empty() {
            return GuidedMatchResult::failure("No phrases provided");
        }

        let start = Instant::now();
        let transcription = self.transcribe(samples);
        if !transcription.success {
            let mut result = GuidedMatchResult::failure(transcription.error);
            result.processing_time_ms = start.elapsed().as_millis() as u64;
            return result;
        }

        let transcript = transcription.text.trim().to_lowercase();
        let mut result = GuidedMatchResult {
            success: true,
            all_scores: phrases
                .iter()
                .map(|phrase| levenshtein_similarity(&transcript, &phrase.to_lowercase()))
                .collect(),
            ..GuidedMatchResult::default()
        };
        finish_scores(&mut result, phrases);
        result.processing_time_ms = start.elapsed().as_millis() as u64;
        result
    }

    fn name(&self) -> &'static str {
        "remote_whisper"
    }
}
