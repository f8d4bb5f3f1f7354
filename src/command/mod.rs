//! Command model: schemas, typed parameters, registry, dispatch.

mod context;
mod descriptor;
mod dispatcher;
mod handler;
mod registry;

pub use context::{CommandContext, ParamValue};
pub use descriptor::{CommandDescriptor, ParamDescriptor, ParamType};
pub use dispatcher::CommandDispatcher;
pub use handler::CommandHandler;
pub use registry::CommandRegistry;

/// Outcome of executing a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandResult {
    Success,
    Failure,
    /// Validation failed; the handler was not invoked.
    InvalidParams,
    /// Command recognised but the handler chose not to act.
    NotHandled,
}
