//! Natural-language understanding: transcript + command schemas → intent
//! and raw parameter strings.

mod remote_llm;
mod rule_based;

pub use remote_llm::{RemoteLlmNluConfig, RemoteLlmNluEngine};
pub use rule_based::{levenshtein_similarity, RuleBasedNluEngine};

use std::collections::HashMap;

use crate::command::CommandDescriptor;

/// Result of NLU processing.
#[derive(Debug, Clone, Default)]
pub struct NluResult {
    pub success: bool,
    /// Identified intent; empty when no command matched.
    pub command_name: String,
    /// Intent confidence in [0, 1].
    pub confidence: f32,
    /// Extracted parameters as raw strings, keyed by parameter name.
    pub extracted_params: HashMap<String, String>,
    /// Human-readable failure description when `success` is false.
    pub error_message: String,
}

impl NluResult {
    pub(crate) fn failure(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
            ..Self::default()
        }
    }
}

/// Port for NLU engines. Implementations never panic across this boundary;
/// failures are reported through [`NluResult`].
pub trait NluEngine: Send + Sync {
    fn process(&self, transcript: &str, schemas: &[CommandDescriptor]) -> NluResult;

    /// Engine name for logging.
    fn name(&self) -> &'static str {
        "nlu"
    }
}
