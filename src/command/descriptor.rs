//! Command schemas: trigger phrases, parameters, types, constraints.
//!
//! A descriptor is the "tool definition" the NLU matches against; it is
//! registered alongside a handler and never owns behaviour itself.

use serde::{Deserialize, Serialize};

/// Supported parameter types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Integer,
    Double,
    Bool,
    /// String constrained to a set of allowed values.
    Enum,
}

impl Default for ParamType {
    fn default() -> Self {
        Self::String
    }
}

impl ParamType {
    /// Wire name used in LLM prompts.
    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Double => "double",
            ParamType::Bool => "boolean",
            ParamType::Enum => "enum",
        }
    }
}

/// Schema for a single command parameter.
///
/// `enum_values` is meaningful only for [`ParamType::Enum`]; `min_value` and
/// `max_value` only for the numeric types.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParamDescriptor {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: ParamType,
    /// Human-readable description, used by NLU engines.
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    /// Injected by the dispatcher when the parameter was not extracted.
    #[serde(default)]
    pub default_value: String,
    #[serde(default)]
    pub enum_values: Vec<String>,
    #[serde(default)]
    pub min_value: Option<f64>,
    #[serde(default)]
    pub max_value: Option<f64>,
}

impl ParamDescriptor {
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_default(mut self, default_value: impl Into<String>) -> Self {
        self.default_value = default_value.into();
        self
    }

    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    pub fn with_enum_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }
}

/// Full schema for a command, keyed by its unique name in the registry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandDescriptor {
    /// Unique identifier, e.g. `"create_placemark"`.
    pub name: String,
    /// Natural-language description used for intent classification.
    #[serde(default)]
    pub description: String,
    /// Phrases that route an utterance to this command.
    #[serde(default)]
    pub trigger_phrases: Vec<String>,
    /// Parameter schema; empty means a simple command.
    #[serde(default)]
    pub parameters: Vec<ParamDescriptor>,
}

impl CommandDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_triggers<I, S>(mut self, triggers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.trigger_phrases = triggers.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_parameter(mut self, parameter: ParamDescriptor) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// True when the command declares parameters and therefore needs the
    /// NLU recognition path.
    pub fn is_parameterized(&self) -> bool {
        !self.parameters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_command_is_not_parameterized() {
        let desc = CommandDescriptor::new("show_help").with_triggers(["show help", "help"]);
        assert!(!desc.is_parameterized());
    }

    #[test]
    fn parameterized_predicate_follows_parameters() {
        let desc = CommandDescriptor::new("zoom_to")
            .with_triggers(["zoom to"])
            .with_parameter(ParamDescriptor::new("level", ParamType::Integer).required());
        assert!(desc.is_parameterized());
    }

    #[test]
    fn builder_fills_constraints() {
        let param = ParamDescriptor::new("level", ParamType::Integer)
            .required()
            .with_range(1.0, 20.0)
            .with_description("zoom level");
        assert!(param.required);
        assert_eq!(param.min_value, Some(1.0));
        assert_eq!(param.max_value, Some(20.0));
    }

    #[test]
    fn descriptor_round_trips_through_json() {
        let desc = CommandDescriptor::new("change_color")
            .with_triggers(["change color to"])
            .with_parameter(
                ParamDescriptor::new("color", ParamType::Enum)
                    .required()
                    .with_enum_values(["red", "green", "blue"]),
            );
        let json = serde_json::to_string(&desc).unwrap();
        let back: CommandDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name, "change_color");
        assert_eq!(back.parameters[0].enum_values.len(), 3);
        assert_eq!(back.parameters[0].param_type, ParamType::Enum);
    }
}
