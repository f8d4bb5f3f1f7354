//! Parameter validation and handler invocation.
//!
//! The dispatcher is the only component that mutates a context: missing
//! optional parameters with declared defaults are injected before the
//! handler runs. Any validation failure short-circuits to `InvalidParams`
//! without invoking the handler.

use std::sync::Arc;

use tracing::debug;

use super::context::{CommandContext, ParamValue};
use super::descriptor::{CommandDescriptor, ParamType};
use super::registry::CommandRegistry;
use super::CommandResult;

/// Dispatches recognised commands through the registry.
pub struct CommandDispatcher {
    registry: Arc<CommandRegistry>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    /// Look up, validate, fill defaults, execute.
    ///
    /// The handler's result is returned verbatim; the dispatcher adds no
    /// side effects of its own.
    pub fn dispatch(&self, command_name: &str, context: &mut CommandContext) -> CommandResult {
        let Some(handler) = self.registry.find_handler(command_name) else {
            debug!(command = command_name, "dispatch of unknown command");
            return CommandResult::Failure;
        };
        let Some(descriptor) = self.registry.find_descriptor(command_name) else {
            return CommandResult::Failure;
        };

        if !validate_and_fill_defaults(&descriptor, context) {
            return CommandResult::InvalidParams;
        }

        handler.execute(context)
    }
}

/// Returns false on the first missing-required or failed validation.
fn validate_and_fill_defaults(descriptor: &CommandDescriptor, context: &mut CommandContext) -> bool {
    for param in &descriptor.parameters {
        let mut present = context.has_param(&param.name);

        if param.required && !present {
            debug!(param = %param.name, "required parameter missing");
            return false;
        }

        if !present && !param.default_value.is_empty() {
            context.set_param(&param.name, ParamValue::new(param.default_value.clone()));
            present = true;
        }

        // Optional, absent, no default: nothing to validate.
        if !present {
            continue;
        }

        let value = context.param_or_empty(&param.name);
        let valid = match param.param_type {
            ParamType::Integer => match value.as_int() {
                Ok(v) => in_range(v as f64, param.min_value, param.max_value),
                Err(_) => false,
            },
            ParamType::Double => match value.as_double() {
                Ok(v) => in_range(v, param.min_value, param.max_value),
                Err(_) => false,
            },
            ParamType::Bool => value.as_bool().is_ok(),
            ParamType::Enum => param
                .enum_values
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(value.as_str())),
            ParamType::String => true,
        };
        if !valid {
            debug!(param = %param.name, value = %value.as_str(), "parameter failed validation");
            return false;
        }
    }
    true
}

fn in_range(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    if let Some(min) = min {
        if value < min {
            return false;
        }
    }
    if let Some(max) = max {
        if value > max {
            return false;
        }
    }
    true
}
