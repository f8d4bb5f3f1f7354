//! Parameter values and the per-dispatch command context.
//!
//! Parameters travel as raw strings from the NLU; handlers read them through
//! typed accessors that fail loudly instead of guessing.

use std::collections::HashMap;

use anyhow::{anyhow, Result};

/// Opaque carrier of a raw string with typed accessors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParamValue {
    raw: String,
}

impl ParamValue {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    /// Parse as integer. The whole raw string must parse cleanly.
    pub fn as_int(&self) -> Result<i64> {
        self.raw
            .parse::<i64>()
            .map_err(|_| anyhow!("invalid integer parameter: '{}'", self.raw))
    }

    /// Parse as double. The whole raw string must parse cleanly.
    pub fn as_double(&self) -> Result<f64> {
        self.raw
            .parse::<f64>()
            .map_err(|_| anyhow!("invalid double parameter: '{}'", self.raw))
    }

    /// Parse as bool. Accepts true/false/yes/no/1/0, case-insensitive.
    pub fn as_bool(&self) -> Result<bool> {
        match self.raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Ok(true),
            "false" | "no" | "0" => Ok(false),
            _ => Err(anyhow!(
                "invalid boolean parameter: '{}' (expected true/false/yes/no/1/0)",
                self.raw
            )),
        }
    }
}

impl<S: Into<String>> From<S> for ParamValue {
    fn from(raw: S) -> Self {
        Self::new(raw)
    }
}

/// Per-dispatch context handed to command handlers.
///
/// Created by the dispatcher, which also injects declared defaults; handlers
/// receive it by shared reference and must not retain it past the call.
#[derive(Debug, Clone, Default)]
pub struct CommandContext {
    params: HashMap<String, ParamValue>,
    raw_transcript: String,
    confidence: f32,
}

impl CommandContext {
    pub fn new(raw_transcript: impl Into<String>, confidence: f32) -> Self {
        Self {
            params: HashMap::new(),
            raw_transcript: raw_transcript.into(),
            confidence,
        }
    }

    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    /// Fetch a parameter, or an empty value when absent.
    pub fn param_or_empty(&self, name: &str) -> ParamValue {
        self.params.get(name).cloned().unwrap_or_default()
    }

    pub fn has_param(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    pub fn params(&self) -> &HashMap<String, ParamValue> {
        &self.params
    }

    pub fn raw_transcript(&self) -> &str {
        &self.raw_transcript
    }

    /// Recognition confidence in [0, 1].
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn set_param(&mut self, name: impl Into<String>, value: ParamValue) {
        self.params.insert(name.into(), value);
    }

    pub fn set_raw_transcript(&mut self, transcript: impl Into<String>) {
        self.raw_transcript = transcript.into();
    }

    pub fn set_confidence(&mut self, confidence: f32) {
        self.confidence = confidence;
    }
}
