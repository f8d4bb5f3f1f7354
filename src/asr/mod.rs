//! Automatic speech recognition port.
//!
//! Two operations: free transcription and guided matching of a PCM window
//! against a closed phrase list. Engines are not required to support
//! concurrent inference on one instance; the orchestrator funnels all calls
//! through a single mutex.

#[cfg(feature = "whisper")]
mod local;
mod remote;
mod wav;

#[cfg(feature = "whisper")]
pub use local::LocalWhisperEngine;
pub use remote::RemoteWhisperEngine;
pub use wav::encode_wav_16k_mono;

/// Sample rate every engine expects.
pub const EXPECTED_SAMPLE_RATE: u32 = crate::audio::TARGET_RATE;

/// Result of a transcription operation.
#[derive(Debug, Clone, Default)]
pub struct TranscriptionResult {
    pub success: bool,
    /// Transcribed text, whitespace-trimmed.
    pub text: String,
    /// Minimum log probability across tokens; `exp(logprob_min)` is the
    /// downstream confidence.
    pub logprob_min: f32,
    pub logprob_sum: f32,
    pub num_tokens: u32,
    pub processing_time_ms: u64,
    /// Error message when `success` is false.
    pub error: String,
}

impl TranscriptionResult {
    pub(crate) fn failure(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Self::default()
        }
    }

    /// Confidence derived from the weakest token, in (0, 1].
    pub fn confidence(&self) -> f32 {
        if self.num_tokens == 0 {
            return 0.0;
        }
        self.logprob_min.exp()
    }
}

/// Result of scoring audio against a closed phrase list.
#[derive(Debug, Clone)]
pub struct GuidedMatchResult {
    pub success: bool,
    /// Index of the best phrase in the input list, -1 on failure.
    pub best_index: i32,
    pub best_match: String,
    /// Probability of the best phrase, in [0, 1].
    pub best_score: f32,
    /// Per-phrase scores in input order, normalised to sum to 1 when any
    /// score is positive.
    pub all_scores: Vec<f32>,
    pub processing_time_ms: u64,
    pub error: String,
}

impl Default for GuidedMatchResult {
    fn default() -> Self {
        Self {
            success: false,
            best_index: -1,
            best_match: String::new(),
            best_score: 0.0,
            all_scores: Vec::new(),
            processing_time_ms: 0,
            error: String::new(),
        }
    }
}

impl GuidedMatchResult {
    pub(crate) fn failure(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Self::default()
        }
    }
}

/// Port for speech recognition engines.
pub trait AsrEngine: Send {
    /// Transcribe 16 kHz mono f32 PCM to text.
    fn transcribe(&mut self, samples: &[f32]) -> TranscriptionResult;

    /// Score the audio against `phrases` and pick the most likely one.
    fn guided_match(&mut self, samples: &[f32], phrases: &[String]) -> GuidedMatchResult;

    /// Engine name for logging.
    fn name(&self) -> &'static str {
        "asr"
    }
}

/// Normalise scores to sum to 1 (no-op when all scores are zero), then fill
/// the best-match fields with the argmax, lowest index winning ties.
pub(crate) fn finish_scores(result: &mut GuidedMatchResult, phrases: &[String]) {
    let total: f32 = result.all_scores.iter().sum();
    if total > 0.0 {
        for score in &mut result.all_scores {
            *score /= total;
        }
    }

    let mut best_index = 0usize;
    let mut best_score = result.all_scores.first().copied().unwrap_or(0.0);
    for (i, &score) in result.all_scores.iter().enumerate().skip(1) {
        if score > best_score {
            best_score = score;
            best_index = i;
        }
    }

    result.best_index = best_index as i32;
    result.best_score = best_score;
    result.best_match = phrases.get(best_index).cloned().unwrap_or_default();
}

/// Configuration for a local whisper.cpp engine.
#[derive(Debug, Clone)]
pub struct LocalAsrConfig {
    /// Path to the GGML model file.
    pub model_path: String,
    pub num_threads: i32,
    pub max_tokens: i32,
    pub audio_ctx: i32,
    pub language: String,
    pub translate: bool,
    pub use_gpu: bool,
    pub flash_attn: bool,
    pub print_special: bool,
    pub temperature: f32,
    /// Beam size; 1 selects greedy decoding.
    pub beam_size: i32,
}

impl Default for LocalAsrConfig {
    fn default() -> Self {
        Self {
            model_path: String::new(),
            num_threads: 4,
            max_tokens: 32,
            audio_ctx: 0,
            language: "en".to_string(),
            translate: false,
            use_gpu: false,
            flash_attn: false,
            print_special: false,
            temperature: 0.0,
            beam_size: 5,
        }
    }
}

/// Configuration for a remote transcription server.
#[derive(Debug, Clone)]
pub struct RemoteAsrConfig {
    /// Base URL, e.g. `http://localhost:8080`.
    pub server_url: String,
    pub inference_path: String,
    pub timeout_ms: u64,
    pub language: String,
    pub translate: bool,
    pub temperature: f32,
}

impl Default for RemoteAsrConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            inference_path: "/inference".to_string(),
            timeout_ms: 30_000,
            language: "en".to_string(),
            translate: false,
            temperature: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_comes_from_weakest_token() {
        let result = TranscriptionResult {
            success: true,
            num_tokens: 3,
            logprob_min: -0.5,
            ..TranscriptionResult::default()
        };
        assert!((result.confidence() - (-0.5f32).exp()).abs() < 1e-6);
    }

    #[test]
    fn confidence_is_zero_without_tokens() {
        let result = TranscriptionResult::default();
        assert_eq!(result.confidence(), 0.0);
    }

    #[test]
    fn scores_normalise_to_one() {
        let phrases = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let mut result = GuidedMatchResult {
            all_scores: vec![1.0, 2.0, 1.0],
            ..GuidedMatchResult::default()
        };
        finish_scores(&mut result, &phrases);

        let sum: f32 = result.all_scores.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert_eq!(result.best_index, 1);
        assert_eq!(result.best_match, "b");
    }

    #[test]
    fn argmax_ties_resolve_to_lowest_index() {
        let phrases = vec!["a".to_string(), "b".to_string()];
        let mut result = GuidedMatchResult {
            all_scores: vec![0.5, 0.5],
            ..GuidedMatchResult::default()
        };
        finish_scores(&mut result, &phrases);
        assert_eq!(result.best_index, 0);
        assert_eq!(result.best_match, "a");
    }

    #[test]
    fn all_zero_scores_stay_zero() {
        let phrases = vec!["a".to_string(), "b".to_string()];
        let mut result = GuidedMatchResult {
            all_scores: vec![0.0, 0.0],
            ..GuidedMatchResult::default()
        };
        finish_scores(&mut result, &phrases);
        assert_eq!(result.best_score, 0.0);
        assert_eq!(result.best_index, 0);
    }
}
