//! Command handler trait.

use super::context::CommandContext;
use super::CommandResult;

/// Behaviour bound to a registered command.
///
/// The context is borrowed for the duration of the call; implementations
/// must not retain it. Handlers run on the orchestrator's worker thread.
pub trait CommandHandler: Send + Sync {
    /// Execute the command. The returned result is propagated verbatim to
    /// observers; the dispatcher never remaps it.
    fn execute(&self, context: &CommandContext) -> CommandResult;

    /// Human-readable name for logging.
    fn name(&self) -> &str {
        "unnamed_command"
    }
}

/// Blanket impl so plain closures can be registered directly.
impl<F> CommandHandler for F
where
    F: Fn(&CommandContext) -> CommandResult + Send + Sync,
{
    fn execute(&self, context: &CommandContext) -> CommandResult {
        self(context)
    }
}
