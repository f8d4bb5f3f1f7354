//! Local in-process whisper.cpp engine.
//!
//! The model loads once at construction and is reused for every capture.
//! whisper.cpp's default logger is silenced the first time an engine is
//! created so inference noise does not reach the host's stderr.

use std::sync::Once;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use tracing::debug;
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use super::{finish_scores, AsrEngine, GuidedMatchResult, LocalAsrConfig, TranscriptionResult};
use crate::nlu::levenshtein_similarity;

/// Whisper model context for local speech recognition.
pub struct LocalWhisperEngine {
    ctx: WhisperContext,
    config: LocalAsrConfig,
}

impl LocalWhisperEngine {
    /// Load the model from disk. Fails when the model file cannot be loaded.
    pub fn new(config: LocalAsrConfig) -> Result<Self> {
        if config.model_path.is_empty() {
            bail!("whisper model path is empty");
        }
        install_log_silencer();

        let mut params = WhisperContextParameters::default();
        params.use_gpu(config.use_gpu);
        params.flash_attn(config.flash_attn);

        let ctx = WhisperContext::new_with_params(&config.model_path, params)
            .with_context(|| format!("failed to load whisper model '{}'", config.model_path))?;

        Ok(Self { ctx, config })
    }

    pub fn config(&self) -> &LocalAsrConfig {
        &self.config
    }

    fn full_params<'a>(&'a self, initial_prompt: Option<&'a str>) -> FullParams<'a, 'a> {
        let mut params = if self.config.beam_size > 1 {
            FullParams::new(SamplingStrategy::BeamSearch {
                beam_size: self.config.beam_size,
                patience: -1.0,
            })
        } else {
            FullParams::new(SamplingStrategy::Greedy { best_of: 1 })
        };

        params.set_language(Some(&self.config.language));
        params.set_translate(self.config.translate);
        params.set_temperature(self.config.temperature);
        params.set_n_threads(self.config.num_threads.min(num_cpus::get() as i32).max(1));
        params.set_max_tokens(self.config.max_tokens);
        params.set_audio_ctx(self.config.audio_ctx);
        params.set_no_context(true);
        params.set_single_segment(true);
        params.set_print_progress(false);
        params.set_print_special(self.config.print_special);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);
        params.set_token_timestamps(false);
        if let Some(prompt) = initial_prompt {
            params.set_initial_prompt(prompt);
        }
        params
    }

    fn run_inference(&self, samples: &[f32], prompt: Option<&str>) -> Result<TranscriptionResult> {
        let mut state = self
            .ctx
            .create_state()
            .context("failed to create whisper state")?;
        state
            .full(self.full_params(prompt), samples)
            .context("whisper inference failed")?;

        let mut result = TranscriptionResult {
            success: true,
            ..TranscriptionResult::default()
        };

        let num_segments = state
            .full_n_segments()
            .context("failed to read segment count")?;
        let mut text = String::new();
        for segment in 0..num_segments {
            if let Ok(segment_text) = state.full_get_segment_text_lossy(segment) {
                text.push_str(&segment_text);
            }
            let num_tokens = state.full_n_tokens(segment).unwrap_or(0);
            for token in 0..num_tokens {
                if let Ok(data) = state.full_get_token_data(segment, token) {
                    if result.num_tokens == 0 || data.plog < result.logprob_min {
                        result.logprob_min = data.plog;
                    }
                    result.logprob_sum += data.plog;
                    result.num_tokens += 1;
                }
            }
        }

        result.text = text.replace("[BLANK_AUDIO]", "").trim().to_string();
        Ok(result)
    }
}

impl AsrEngine for LocalWhisperEngine {
    fn transcribe(&mut self, samples: &[f32]) -> TranscriptionResult {
        if samples.is_empty() {
            return TranscriptionResult::failure("Empty audio samples");
        }

        let start = Instant::now();
        let mut result = match self.run_inference(samples, None) {
            Ok(result) => result,
            Err(err) => TranscriptionResult::failure(format!("{err:#}")),
        };
        result.processing_time_ms = start.elapsed().as_millis() as u64;
        debug!(
            text = %result.text,
            tokens = result.num_tokens,
            elapsed_ms = result.processing_time_ms,
            "local transcription"
        );
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
        let prompt = build_guided_prompt(phrases);
        let transcription = match self.run_inference(samples, Some(&prompt)) {
            Ok(result) => result,
            Err(err) => {
                let mut result = GuidedMatchResult::failure(format!("{err:#}"));
                result.processing_time_ms = start.elapsed().as_millis() as u64;
                return result;
            }
        };

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
        "local_whisper"
    }
}

/// Decoding prompt that biases the model toward the candidate phrases.
fn build_guided_prompt(phrases: &[String]) -> String {
    format!(
        "select one from the available words: {}. selected word: ",
        phrases.join(", ")
    )
}

fn install_log_silencer() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        whisper_rs::install_whisper_log_trampoline();
    });
}
