//! Recognition strategies: PCM window → command + parameters.
//!
//! Two paths share one port. Guided matching scores the audio against the
//! closed set of registered trigger phrases and is cheap but parameter-free;
//! the NLU path transcribes first and hands the text to an NLU engine, which
//! is what parameterized commands need.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tracing::debug;

use crate::asr::AsrEngine;
use crate::command::CommandRegistry;
use crate::nlu::NluEngine;

/// ASR engines are serialised behind one lock; the wake-word check on the
/// poll thread and the worker share the same instance.
pub type SharedAsr = Arc<Mutex<Box<dyn AsrEngine>>>;

const DEFAULT_MIN_GUIDED_CONFIDENCE: f32 = 0.3;
const DEFAULT_MIN_NLU_CONFIDENCE: f32 = 0.3;
const DEFAULT_MIN_TRANSCRIPTION_CONFIDENCE: f32 = 0.0;

/// Outcome of one recognition attempt.
#[derive(Debug, Clone, Default)]
pub struct RecognitionResult {
    pub success: bool,
    pub command_name: String,
    /// Confidence in [0, 1].
    pub confidence: f32,
    /// Extracted parameters as raw strings.
    pub params: HashMap<String, String>,
    /// Transcript, when the path produced one.
    pub raw_transcript: String,
    pub error: String,
    pub asr_time_ms: u64,
    pub nlu_time_ms: u64,
    pub total_time_ms: u64,
}

impl RecognitionResult {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Self::default()
        }
    }
}

/// Port for recognition strategies.
pub trait RecognitionStrategy: Send + Sync {
    fn recognize(&self, samples: &[f32]) -> RecognitionResult;

    /// Strategy name for logging.
    fn name(&self) -> &'static str;
}

/// Guided phrase-scoring path for trigger-only command sets.
pub struct GuidedStrategy {
    asr: SharedAsr,
    registry: Arc<CommandRegistry>,
    min_confidence: f32,
}

impl GuidedStrategy {
    pub fn new(asr: SharedAsr, registry: Arc<CommandRegistry>) -> Self {
        Self {
            asr,
            registry,
            min_confidence: DEFAULT_MIN_GUIDED_CONFIDENCE,
        }
    }

    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }
}

impl RecognitionStrategy for GuidedStrategy {
    fn recognize(&self, samples: &[f32]) -> RecognitionResult {
        let total_start = Instant::now();

        // Rebuild the phrase map every call; the registry may have changed.
        let mut phrase_to_command: HashMap<String, String> = HashMap::new();
        let mut phrases: Vec<String> = Vec::new();
        for descriptor in self.registry.all_descriptors() {
            for phrase in &descriptor.trigger_phrases {
                let lower = phrase.to_lowercase();
                phrase_to_command.insert(lower.clone(), descriptor.name.clone());
                phrases.push(lower);
            }
        }
        if phrases.is_empty() {
            return RecognitionResult::failure("No trigger phrases registered");
        }

        let asr_start = Instant::now();
        let matched = self
            .asr
            .lock()
            .expect("asr lock poisoned")
            .guided_match(samples, &phrases);
        let asr_time_ms = asr_start.elapsed().as_millis() as u64;

        let mut result = RecognitionResult {
            asr_time_ms,
            nlu_time_ms: 0,
            ..RecognitionResult::default()
        };

        if !matched.success {
            result.error = matched.error;
            result.total_time_ms = total_start.elapsed().as_millis() as u64;
            return result;
        }
        if matched.best_score < self.min_confidence {
            result.error = "Confidence below threshold".to_string();
            result.total_time_ms = total_start.elapsed().as_millis() as u64;
            return result;
        }

        let Some(command_name) = phrase_to_command.get(&matched.best_match.to_lowercase()) else {
            result.error = "Matched phrase not found in mapping".to_string();
            result.total_time_ms = total_start.elapsed().as_millis() as u64;
            return result;
        };

        debug!(
            command = %command_name,
            score = matched.best_score,
            "guided match"
        );

        result.success = true;
        result.command_name = command_name.clone();
        result.confidence = matched.best_score;
        result.raw_transcript = matched.best_match;
        result.total_time_ms = total_start.elapsed().as_millis() as u64;
        result
    }

    fn name(&self) -> &'static str {
        "guided"
    }
}

/// Full transcription + NLU path for parameterized commands.
pub struct NluStrategy {
    asr: SharedAsr,
    nlu: Arc<dyn NluEngine>,
    registry: Arc<CommandRegistry>,
    min_transcription_confidence: f32,
    min_nlu_confidence: f32,
}

impl NluStrategy {
    pub fn new(asr: SharedAsr, nlu: Arc<dyn NluEngine>, registry: Arc<CommandRegistry>) -> Self {
        Self {
            asr,
            nlu,
            registry,
            min_transcription_confidence: DEFAULT_MIN_TRANSCRIPTION_CONFIDENCE,
            min_nlu_confidence: DEFAULT_MIN_NLU_CONFIDENCE,
        }
    }

    pub fn with_min_transcription_confidence(mut self, threshold: f32) -> Self {
        self.min_transcription_confidence = threshold;
        self
    }

    pub fn with_min_nlu_confidence(mut self, threshold: f32) -> Self {
        self.min_nlu_confidence = threshold;
        self
    }
}

impl RecognitionStrategy for NluStrategy {
    fn recognize(&self, samples: &[f32]) -> RecognitionResult {
        let total_start = Instant::now();

        let asr_start = Instant::now();
        let transcription = self
            .asr
            .lock()
            .expect("asr lock poisoned")
            .transcribe(samples);
        let asr_time_ms = asr_start.elapsed().as_millis() as u64;

        let mut result = RecognitionResult {
            asr_time_ms,
            ..RecognitionResult::default()
        };

        if !transcription.success {
            result.error = format!("Transcription failed: {}", transcription.error);
            result.total_time_ms = total_start.elapsed().as_millis() as u64;
            return result;
        }
        if transcription.text.is_empty() {
            result.error = "Empty transcription".to_string();
            result.total_time_ms = total_start.elapsed().as_millis() as u64;
            return result;
        }
        if transcription.num_tokens > 0
            && transcription.confidence() < self.min_transcription_confidence
        {
            result.error = "Transcription confidence below threshold".to_string();
            result.total_time_ms = total_start.elapsed().as_millis() as u64;
            return result;
        }

        result.raw_transcript = transcription.text.clone();

        let descriptors = self.registry.all_descriptors();
        if descriptors.is_empty() {
            result.error = "No commands registered".to_string();
            result.total_time_ms = total_start.elapsed().as_millis() as u64;
            return result;
        }

        let nlu_start = Instant::now();
        let nlu_result = self.nlu.process(&transcription.text, &descriptors);
        result.nlu_time_ms = nlu_start.elapsed().as_millis() as u64;

        if !nlu_result.success {
            result.error = format!("NLU processing failed: {}", nlu_result.error_message);
            result.total_time_ms = total_start.elapsed().as_millis() as u64;
            return result;
        }
        if nlu_result.confidence < self.min_nlu_confidence {
            result.error = "NLU confidence below threshold".to_string();
            result.total_time_ms = total_start.elapsed().as_millis() as u64;
            return result;
        }

        debug!(
            command = %nlu_result.command_name,
            confidence = nlu_result.confidence,
            transcript = %transcription.text,
            "nlu recognition"
        );

        result.success = true;
        result.command_name = nlu_result.command_name;
        result.confidence = nlu_result.confidence;
        result.params = nlu_result.extracted_params;
        result.total_time_ms = total_start.elapsed().as_millis() as u64;
        result
    }

    fn name(&self) -> &'static str {
        "nlu"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::{GuidedMatchResult, TranscriptionResult};
    use crate::command::{CommandContext, CommandDescriptor, CommandResult, ParamDescriptor, ParamType};
    use crate::nlu::RuleBasedNluEngine;

    /// Scripted engine: fixed transcription text and guided scores.
    struct ScriptedAsr {
        transcript: String,
        guided_scores: Vec<f32>,
    }

    impl AsrEngine for ScriptedAsr {
        fn transcribe(&mut self, _samples: &[f32]) -> TranscriptionResult {
            TranscriptionResult {
                success: true,
                text: self.transcript.clone(),
                logprob_min: -0.1,
                logprob_sum: -0.3,
                num_tokens: 3,
                ..TranscriptionResult::default()
            }
        }

        fn guided_match(&mut self, _samples: &[f32], phrases: &[String]) -> GuidedMatchResult {
            let mut result = GuidedMatchResult {
                success: true,
                all_scores: self.guided_scores.clone(),
                ..GuidedMatchResult::default()
            };
            crate::asr::finish_scores(&mut result, phrases);
            result
        }
    }

    fn scripted(transcript: &str, scores: Vec<f32>) -> SharedAsr {
        let engine: Box<dyn AsrEngine> = Box::new(ScriptedAsr {
            transcript: transcript.to_string(),
            guided_scores: scores,
        });
        Arc::new(Mutex::new(engine))
    }

    fn registry_with_commands() -> Arc<CommandRegistry> {
        let registry = Arc::new(CommandRegistry::new());
        registry.register_simple(
            "show_help",
            ["show help", "help"],
            Box::new(|_: &CommandContext| CommandResult::Success),
        );
        registry.register(
            CommandDescriptor::new("zoom_to")
                .with_triggers(["zoom to"])
                .with_parameter(ParamDescriptor::new("level", ParamType::Integer).required()),
            Box::new(|_: &CommandContext| CommandResult::Success),
        );
        registry
    }

    #[test]
    fn guided_maps_best_phrase_to_command() {
        let registry = registry_with_commands();
        // Phrase order matches registry iteration; score one phrase high.
        let phrases = registry.all_trigger_phrases();
        let scores: Vec<f32> = phrases
            .iter()
            .map(|p| if p == "zoom to" { 0.9 } else { 0.05 })
            .collect();

        let strategy = GuidedStrategy::new(scripted("", scores), registry);
        let result = strategy.recognize(&[0.0; 160]);
        assert!(result.success, "{}", result.error);
        assert_eq!(result.command_name, "zoom_to");
        assert!(result.params.is_empty());
        assert_eq!(result.nlu_time_ms, 0);
    }

    #[test]
    fn guided_rejects_low_confidence() {
        let registry = registry_with_commands();
        let n = registry.all_trigger_phrases().len();
        // Uniform scores normalise to 1/n; raise the threshold above that.
        let strategy =
            GuidedStrategy::new(scripted("", vec![1.0; n]), registry).with_min_confidence(0.5);
        let result = strategy.recognize(&[0.0; 160]);
        assert!(!result.success);
        assert!(result.error.contains("Confidence below threshold"));
    }

    #[test]
    fn guided_fails_without_registered_phrases() {
        let registry = Arc::new(CommandRegistry::new());
        let strategy = GuidedStrategy::new(scripted("", vec![]), registry);
        let result = strategy.recognize(&[0.0; 160]);
        assert!(!result.success);
        assert!(result.error.contains("No trigger phrases"));
    }

    #[test]
    fn nlu_path_extracts_parameters() {
        let registry = registry_with_commands();
        let strategy = NluStrategy::new(
            scripted("zoom to 15", vec![]),
            Arc::new(RuleBasedNluEngine::new()),
            registry,
        );

        let result = strategy.recognize(&[0.0; 160]);
        assert!(result.success, "{}", result.error);
        assert_eq!(result.command_name, "zoom_to");
        assert_eq!(result.params["level"], "15");
        assert_eq!(result.raw_transcript, "zoom to 15");
    }

    #[test]
    fn nlu_path_fails_on_empty_transcription() {
        let registry = registry_with_commands();
        let strategy = NluStrategy::new(
            scripted("", vec![]),
            Arc::new(RuleBasedNluEngine::new()),
            registry,
        );
        let result = strategy.recognize(&[0.0; 160]);
        assert!(!result.success);
        assert!(result.error.contains("Empty transcription"));
    }

    #[test]
    fn nlu_path_reports_unmatched_transcript() {
        let registry = registry_with_commands();
        let strategy = NluStrategy::new(
            scripted("pure nonsense text", vec![]),
            Arc::new(RuleBasedNluEngine::new()),
            registry,
        );
        let result = strategy.recognize(&[0.0; 160]);
        assert!(!result.success);
        assert_eq!(result.raw_transcript, "pure nonsense text");
    }

    #[test]
    fn nlu_transcription_confidence_gate() {
        let registry = registry_with_commands();
        let strategy = NluStrategy::new(
            scripted("zoom to 15", vec![]),
            Arc::new(RuleBasedNluEngine::new()),
            registry,
        )
        .with_min_transcription_confidence(0.99);

        // exp(-0.1) ≈ 0.90 < 0.99
        let result = strategy.recognize(&[0.0; 160]);
        assert!(!result.success);
        assert!(result.error.contains("Transcription confidence"));
    }
}
