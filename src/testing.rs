//! Text-bypass harness for exercising commands without audio.
//!
//! Feeds transcripts straight through NLU and the dispatcher, exactly as the
//! worker thread would after transcription. Useful for unit-testing command
//! schemas, parameter extraction, and handlers without a microphone or model.

use std::collections::HashMap;
use std::sync::Arc;

use crate::command::{
    CommandContext, CommandDispatcher, CommandRegistry, CommandResult, ParamValue,
};
use crate::nlu::{NluEngine, RuleBasedNluEngine};

const DEFAULT_MIN_CONFIDENCE: f32 = 0.5;

/// Outcome of pushing one transcript through the pipeline.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Whether a command was recognised above the confidence threshold.
    pub recognized: bool,
    /// Matched command name; empty when not recognised.
    pub command_name: String,
    pub confidence: f32,
    pub params: HashMap<String, String>,
    /// Dispatcher result; `NotHandled` when recognition failed.
    pub execution_result: CommandResult,
    pub raw_transcript: String,
    /// Failure description when recognition or execution went wrong.
    pub error: String,
}

impl TestResult {
    fn unrecognized(transcript: &str, error: impl Into<String>) -> Self {
        Self {
            recognized: false,
            command_name: String::new(),
            confidence: 0.0,
            params: HashMap::new(),
            execution_result: CommandResult::NotHandled,
            raw_transcript: transcript.to_string(),
            error: error.into(),
        }
    }
}

/// Pipeline harness with its own registry and dispatcher.
pub struct CommandTester {
    registry: Arc<CommandRegistry>,
    dispatcher: CommandDispatcher,
    nlu: Box<dyn NluEngine>,
    min_confidence: f32,
}

impl CommandTester {
    /// Harness with the default rule-based NLU engine.
    pub fn new() -> Self {
        Self::with_nlu(Box::new(RuleBasedNluEngine::new()))
    }

    /// Harness with a caller-provided NLU engine.
    pub fn with_nlu(nlu: Box<dyn NluEngine>) -> Self {
        let registry = Arc::new(CommandRegistry::new());
        Self {
            dispatcher: CommandDispatcher::new(Arc::clone(&registry)),
            registry,
            nlu,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    /// Registry for registering commands; same API as the live assistant.
    pub fn registry(&self) -> Arc<CommandRegistry> {
        Arc::clone(&self.registry)
    }

    /// Commands below this confidence are reported as unrecognised and the
    /// handler is not executed.
    pub fn set_min_confidence(&mut self, threshold: f32) {
        self.min_confidence = threshold;
    }

    /// Run one transcript through NLU and dispatch.
    pub fn process_text(&self, transcript: &str) -> TestResult {
        if transcript.is_empty() {
            return TestResult::unrecognized(transcript, "Empty transcript");
        }

        let descriptors = self.registry.all_descriptors();
        if descriptors.is_empty() {
            return TestResult::unrecognized(transcript, "No commands registered");
        }

        let nlu_result = self.nlu.process(transcript, &descriptors);
        if !nlu_result.success {
            return TestResult::unrecognized(transcript, nlu_result.error_message);
        }
        if nlu_result.confidence < self.min_confidence {
            return TestResult::unrecognized(
                transcript,
                format!(
                    "Confidence below threshold: {:.2} < {:.2}",
                    nlu_result.confidence, self.min_confidence
                ),
            );
        }

        let mut context = CommandContext::new(transcript, nlu_result.confidence);
        for (name, value) in &nlu_result.extracted_params {
            context.set_param(name.clone(), ParamValue::new(value.clone()));
        }

        let execution_result = self.dispatcher.dispatch(&nlu_result.command_name, &mut context);

        TestResult {
            recognized: true,
            command_name: nlu_result.command_name,
            confidence: nlu_result.confidence,
            params: nlu_result.extracted_params,
            execution_result,
            raw_transcript: transcript.to_string(),
            error: String::new(),
        }
    }

    /// Run several transcripts and collect every result.
    pub fn process_batch<S: AsRef<str>>(&self, transcripts: &[S]) -> Vec<TestResult> {
        transcripts
            .iter()
            .map(|transcript| self.process_text(transcript.as_ref()))
            .collect()
    }
}

impl Default for CommandTester {
    fn default() -> Self {
        Self::new()
    }
}
