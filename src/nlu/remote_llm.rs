//! LLM-backed NLU over an OpenAI-compatible chat-completions endpoint.
//!
//! The system prompt enumerates every registered command schema; the model
//! answers with a small JSON object naming the command, a confidence, and
//! stringified parameters. Models often wrap the JSON in prose, so the
//! parser extracts the first `{…}` region and reads it leniently.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use reqwest::blocking::Client;
use serde_json::{json, Value};
use tracing::debug;

use super::{NluEngine, NluResult};
use crate::command::{CommandDescriptor, ParamDescriptor};

/// Configuration for the remote LLM classifier.
#[derive(Debug, Clone)]
pub struct RemoteLlmNluConfig {
    /// Base URL, e.g. `http://localhost:1234`.
    pub server_url: String,
    pub endpoint: String,
    /// Bearer token; empty disables the Authorization header.
    pub api_key: String,
    pub model: String,
    pub timeout_ms: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Log full request and response bodies.
    pub enable_debug_logging: bool,
}

impl Default for RemoteLlmNluConfig {
    fn default() -> Self {
        Self {
            server_url: String::new(),
            endpoint: "/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: String::new(),
            timeout_ms: 30_000,
            temperature: 0.0,
            max_tokens: 256,
            enable_debug_logging: false,
        }
    }
}

/// Chat-completions NLU client.
pub struct RemoteLlmNluEngine {
    config: RemoteLlmNluConfig,
    client: Client,
    endpoint: String,
}

impl RemoteLlmNluEngine {
    /// Validate the configuration and build the HTTP client. Requires a
    /// server URL and a model name.
    pub fn new(config: RemoteLlmNluConfig) -> Result<Self> {
        if config.server_url.is_empty() {
            bail!("LLM NLU server URL is empty");
        }
        if config.model.is_empty() {
            bail!("LLM NLU model name is empty");
        }
        let endpoint = format!(
            "{}{}",
            config.server_url.trim_end_matches('/'),
            config.endpoint
        );
        reqwest::Url::parse(&endpoint)
            .with_context(|| format!("invalid LLM NLU URL: {endpoint}"))?;

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

    pub fn config(&self) -> &RemoteLlmNluConfig {
        &self.config
    }

    fn request_completion(&self, transcript: &str, schemas: &[CommandDescriptor]) -> Result<String> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": build_system_prompt(schemas)},
                {"role": "user", "content": transcript},
            ],
            "temperature": self.config.temperature,
            "max_tokens": self.config.max_tokens,
        });

        if self.config.enable_debug_logging {
            debug!(request = %body, "LLM NLU request");
        }

        let mut request = self.client.post(&self.endpoint).json(&body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request.send().context("HTTP request failed")?;
        let status = response.status();
        let text = response.text().context("failed to read response body")?;
        if !status.is_success() {
            bail!("HTTP error: {status}");
        }

        if self.config.enable_debug_logging {
            debug!(response = %text, "LLM NLU response");
        }

        let parsed: Value = serde_json::from_str(&text).context("JSON parse error")?;
        parsed["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("invalid response: no message content"))
    }
}

impl NluEngine for RemoteLlmNluEngine {
    fn process(&self, transcript: &str, schemas: &[CommandDescriptor]) -> NluResult {
        if transcript.is_empty() {
            return NluResult::failure("Empty transcript");
        }
        if schemas.is_empty() {
            return NluResult::failure("No command schemas provided");
        }

        match self.request_completion(transcript, schemas) {
            Ok(content) => parse_llm_content(&content),
            Err(err) => NluResult::failure(format!("{err:#}")),
        }
    }

    fn name(&self) -> &'static str {
        "remote_llm"
    }
}

/// Enumerate commands and parameters for the classifier prompt.
fn build_system_prompt(schemas: &[CommandDescriptor]) -> String {
    let mut prompt = String::from(
        "You are a voice command classifier. Given a transcript, identify \
         the command and extract parameters.\n\nAvailable commands:\n",
    );

    for (i, schema) in schemas.iter().enumerate() {
        let _ = write!(prompt, "{}. \"{}\"", i + 1, schema.name);
        if !schema.description.is_empty() {
            let _ = write!(prompt, " - {}", schema.description);
        }
        prompt.push('\n');

        if !schema.parameters.is_empty() {
            prompt.push_str("   Parameters:\n");
            for param in &schema.parameters {
                prompt.push_str(&format_parameter(param));
            }
        }
        prompt.push('\n');
    }

    prompt.push_str(
        "Respond with JSON only:\n\
         {\"command\": \"command_name\", \"confidence\": 0.0-1.0, \
         \"params\": {\"key\": \"value\"}}\n\n\
         If no command matches, respond:\n\
         {\"command\": \"\", \"confidence\": 0.0, \"params\": {}}\n",
    );
    prompt
}

fn format_parameter(param: &ParamDescriptor) -> String {
    let mut line = format!("   - {} ({}", param.name, param.param_type.as_str());
    if param.required {
        line.push_str(", required");
    } else {
        line.push_str(", optional");
        if !param.default_value.is_empty() {
            let _ = write!(line, ", default={}", param.default_value);
        }
    }
    line.push(')');

    if !param.description.is_empty() {
        let _ = write!(line, ": {}", param.description);
    }

    if param.min_value.is_some() || param.max_value.is_some() {
        line.push_str(" [");
        if let Some(min) = param.min_value {
            let _ = write!(line, "min={min}");
        }
        if param.min_value.is_some() && param.max_value.is_some() {
            line.push_str(", ");
        }
        if let Some(max) = param.max_value {
            let _ = write!(line, "max={max}");
        }
        line.push(']');
    }

    if !param.enum_values.is_empty() {
        let _ = write!(line, " [values: {}]", param.enum_values.join(", "));
    }

    line.push('\n');
    line
}

/// Read the model's answer leniently: locate the first `{…}` region, then
/// accept string, numeric, or boolean parameter values by stringifying them.
/// An empty command name is the no-match sentinel and still parses as
/// success.
fn parse_llm_content(content: &str) -> NluResult {
    let json_str = match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if end > start => &content[start..=end],
        _ => content,
    };

    let parsed: Value = match serde_json::from_str(json_str) {
        Ok(value) => value,
        Err(err) => {
            return NluResult::failure(format!("Failed to parse LLM response: {err}"));
        }
    };

    let mut result = NluResult {
        success: true,
        ..NluResult::default()
    };

    if let Some(command) = parsed["command"].as_str() {
        result.command_name = command.to_string();
    }
    if let Some(confidence) = parsed["confidence"].as_f64() {
        result.confidence = confidence as f32;
    }
    if let Some(params) = parsed["params"].as_object() {
        let mut extracted = HashMap::new();
        for (key, value) in params {
            let raw = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            extracted.insert(key.clone(), raw);
        }
        result.extracted_params = extracted;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ParamDescriptor, ParamType};

    fn schemas() -> Vec<CommandDescriptor> {
        vec![
            CommandDescriptor::new("zoom_to")
                .with_description("Zooms the view")
                .with_triggers(["zoom to"])
                .with_parameter(
                    ParamDescriptor::new("level", ParamType::Integer)
                        .required()
                        .with_description("zoom level")
                        .with_range(1.0, 20.0),
                ),
            CommandDescriptor::new("change_mode")
                .with_triggers(["change mode"])
                .with_parameter(
                    ParamDescriptor::new("mode", ParamType::Enum)
                        .with_default("day")
                        .with_enum_values(["day", "night"]),
                ),
        ]
    }

    #[test]
    fn prompt_enumerates_commands_and_parameters() {
        let prompt = build_system_prompt(&schemas());
        assert!(prompt.contains("1. \"zoom_to\" - Zooms the view"));
        assert!(prompt.contains("- level (integer, required): zoom level [min=1, max=20]"));
        assert!(prompt.contains("2. \"change_mode\""));
        assert!(prompt.contains("- mode (enum, optional, default=day)"));
        assert!(prompt.contains("[values: day, night]"));
        assert!(prompt.contains("Respond with JSON only"));
    }

    #[test]
    fn content_parses_clean_json() {
        let result = parse_llm_content(
            r#"{"command": "zoom_to", "confidence": 0.92, "params": {"level": "15"}}"#,
        );
        assert!(result.success);
        assert_eq!(result.command_name, "zoom_to");
        assert!((result.confidence - 0.92).abs() < 1e-6);
        assert_eq!(result.extracted_params["level"], "15");
    }

    #[test]
    fn content_parses_json_wrapped_in_prose() {
        let result = parse_llm_content(
            "Sure! Here is the classification:\n\
             {\"command\": \"zoom_to\", \"confidence\": 0.8, \"params\": {}}\n\
             Let me know if you need more.",
        );
        assert!(result.success);
        assert_eq!(result.command_name, "zoom_to");
    }

    #[test]
    fn numeric_and_boolean_params_are_stringified() {
        let result = parse_llm_content(
            r#"{"command": "set_view", "confidence": 1.0,
                "params": {"level": 15, "ratio": 2.5, "enabled": true}}"#,
        );
        assert_eq!(result.extracted_params["level"], "15");
        assert_eq!(result.extracted_params["ratio"], "2.5");
        assert_eq!(result.extracted_params["enabled"], "true");
    }

    #[test]
    fn empty_command_sentinel_is_success() {
        let result = parse_llm_content(r#"{"command": "", "confidence": 0.0, "params": {}}"#);
        assert!(result.success);
        assert!(result.command_name.is_empty());
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn unparseable_content_fails() {
        let result = parse_llm_content("I could not find a command.");
        assert!(!result.success);
        assert!(result.error_message.contains("parse"));
    }

    #[test]
    fn engine_requires_url_and_model() {
        assert!(RemoteLlmNluEngine::new(RemoteLlmNluConfig::default()).is_err());

        let no_model = RemoteLlmNluConfig {
            server_url: "http://localhost:1234".to_string(),
            ..RemoteLlmNluConfig::default()
        };
        assert!(RemoteLlmNluEngine::new(no_model).is_err());

        let ok = RemoteLlmNluConfig {
            server_url: "http://localhost:1234".to_string(),
            model: "qwen".to_string(),
            ..RemoteLlmNluConfig::default()
        };
        assert!(RemoteLlmNluEngine::new(ok).is_ok());
    }

    #[test]
    fn empty_transcript_short_circuits() {
        let config = RemoteLlmNluConfig {
            server_url: "http://localhost:1234".to_string(),
            model: "qwen".to_string(),
            ..RemoteLlmNluConfig::default()
        };
        let engine = RemoteLlmNluEngine::new(config).unwrap();
        let result = engine.process("", &schemas());
        assert!(!result.success);
        assert!(result.error_message.contains("Empty"));
    }
}
