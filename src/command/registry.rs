//! Thread-safe name → (descriptor, handler) registry.
//!
//! Entries live from `register` until `unregister` or registry drop. A
//! reader-writer lock protects the map; iteration hands out snapshots so
//! callers never hold the lock across NLU or handler work.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::descriptor::CommandDescriptor;
use super::handler::CommandHandler;

struct Entry {
    descriptor: CommandDescriptor,
    handler: Arc<dyn CommandHandler>,
}

/// Registry of voice commands.
#[derive(Default)]
pub struct CommandRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command. Returns false (and leaves the registry untouched)
    /// when the name is already taken.
    pub fn register(
        &self,
        descriptor: CommandDescriptor,
        handler: Box<dyn CommandHandler>,
    ) -> bool {
        let mut entries = self.entries.write().expect("registry lock poisoned");
        if entries.contains_key(&descriptor.name) {
            debug!(name = %descriptor.name, "duplicate command registration rejected");
            return false;
        }
        let name = descriptor.name.clone();
        entries.insert(
            name,
            Entry {
                descriptor,
                handler: handler.into(),
            },
        );
        true
    }

    /// Register a trigger-only command with a generated description.
    pub fn register_simple<I, S>(
        &self,
        name: impl Into<String>,
        triggers: I,
        handler: Box<dyn CommandHandler>,
    ) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let descriptor = CommandDescriptor::new(name.clone())
            .with_description(format!("Simple command: {name}"))
            .with_triggers(triggers);
        self.register(descriptor, handler)
    }

    /// Remove a command. Returns false when the name is unknown.
    pub fn unregister(&self, name: &str) -> bool {
        self.entries
            .write()
            .expect("registry lock poisoned")
            .remove(name)
            .is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn find_handler(&self, name: &str) -> Option<Arc<dyn CommandHandler>> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .map(|entry| Arc::clone(&entry.handler))
    }

    pub fn find_descriptor(&self, name: &str) -> Option<CommandDescriptor> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .get(name)
            .map(|entry| entry.descriptor.clone())
    }

    /// Snapshot of all descriptors.
    pub fn all_descriptors(&self) -> Vec<CommandDescriptor> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .values()
            .map(|entry| entry.descriptor.clone())
            .collect()
    }

    /// Snapshot of all command names.
    pub fn all_command_names(&self) -> Vec<String> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .keys()
            .cloned()
            .collect()
    }

    /// Snapshot of every trigger phrase across all commands.
    pub fn all_trigger_phrases(&self) -> Vec<String> {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .values()
            .flat_map(|entry| entry.descriptor.trigger_phrases.iter().cloned())
            .collect()
    }

    /// True when any registered command declares parameters.
    pub fn has_parameterized_commands(&self) -> bool {
        self.entries
            .read()
            .expect("registry lock poisoned")
            .values()
            .any(|entry| entry.descriptor.is_parameterized())
    }
}

impl std::fmt::Debug for CommandRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRegistry")
            .field("commands", &self.all_command_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandContext, CommandResult};

    fn noop() -> Box<dyn CommandHandler> {
        Box::new(|_: &CommandContext| CommandResult::Success)
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = CommandRegistry::new();
        assert!(registry.register_simple("show_help", ["help"], noop()));
        assert!(!registry.register_simple("show_help", ["other trigger"], noop()));

        assert_eq!(registry.len(), 1);
        let desc = registry.find_descriptor("show_help").unwrap();
        assert_eq!(desc.trigger_phrases, vec!["help".to_string()]);
    }

    #[test]
    fn unregister_unknown_returns_false() {
        let registry = CommandRegistry::new();
        assert!(!registry.unregister("missing"));
        registry.register_simple("a", ["a"], noop());
        assert!(registry.unregister("a"));
        assert!(registry.is_empty());
    }

    #[test]
    fn snapshots_collect_triggers_across_commands() {
        let registry = CommandRegistry::new();
        registry.register_simple("a", ["alpha", "first"], noop());
        registry.register_simple("b", ["bravo"], noop());

        let mut phrases = registry.all_trigger_phrases();
        phrases.sort();
        assert_eq!(phrases, vec!["alpha", "bravo", "first"]);
    }

    #[test]
    fn parameterized_detection() {
        use crate::command::{CommandDescriptor, ParamDescriptor, ParamType};

        let registry = CommandRegistry::new();
        registry.register_simple("simple", ["go"], noop());
        assert!(!registry.has_parameterized_commands());

        let desc = CommandDescriptor::new("zoom_to")
            .with_triggers(["zoom to"])
            .with_parameter(ParamDescriptor::new("level", ParamType::Integer).required());
        registry.register(desc, noop());
        assert!(registry.has_parameterized_commands());
    }
}
