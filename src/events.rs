//! Event notifier port.
//!
//! The pipeline reports everything observable through one sink trait; hosts
//! choose how to transport the notifications (direct calls, a channel, a GUI
//! signal bridge). Recognition events arrive on the worker thread,
//! state-machine events on the thread that performed the transition.

use std::sync::Mutex;

use crate::command::{CommandContext, CommandResult};

/// High-level listening policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListeningMode {
    /// VAD-driven, always listening.
    #[default]
    Continuous,
    /// Listen for a wake phrase, then capture one command.
    WakeWord,
    /// Capture only between `start_capture` and `stop_capture`.
    PushToTalk,
}

/// Low-level state within a listening mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListeningState {
    /// Push-to-talk: waiting for a trigger.
    Idle,
    /// Continuous/wake-word: listening for speech.
    Listening,
    /// Wake word detected; waiting for the command utterance.
    WakeWordActive,
    /// Push-to-talk: actively capturing.
    Capturing,
}

/// Out-bound notifications. All methods default to no-ops so hosts implement
/// only what they observe. Implementations must not block for long; they run
/// on pipeline threads.
#[allow(unused_variables)]
pub trait EventSink: Send + Sync {
    /// A speech window was enqueued for recognition.
    fn speech_detected(&self) {}

    /// A command was dispatched; `result` is the handler's verbatim result.
    fn command_executed(&self, name: &str, result: CommandResult, context: &CommandContext) {}

    /// Recognition produced a transcript that matched no command.
    fn unrecognised_speech(&self, transcript: &str) {}

    /// A failure worth surfacing to the consumer.
    fn error(&self, message: &str) {}

    /// The wake phrase was heard (wake-word mode).
    fn wake_word_detected(&self) {}

    /// Push-to-talk capture began.
    fn capture_started(&self) {}

    /// Push-to-talk capture ended.
    fn capture_ended(&self) {}

    /// The listening state machine moved; only fires when `old != new`.
    fn listening_state_changed(&self, old: ListeningState, new: ListeningState) {}
}

/// Sink that discards every notification.
pub struct NullSink;

impl EventSink for NullSink {}

/// Recorded notification, for inspection in tests.
#[derive(Debug, Clone, PartialEq)]
pub enum AssistantEvent {
    SpeechDetected,
    CommandExecuted {
        name: String,
        result: CommandResult,
        transcript: String,
    },
    UnrecognisedSpeech {
        transcript: String,
    },
    Error {
        message: String,
    },
    WakeWordDetected,
    CaptureStarted,
    CaptureEnded,
    StateChanged {
        old: ListeningState,
        new: ListeningState,
    },
}

/// Sink that records every notification in memory.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<AssistantEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AssistantEvent> {
        self.events.lock().expect("event sink poisoned").clone()
    }

    pub fn clear(&self) {
        self.events.lock().expect("event sink poisoned").clear();
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().expect("event sink poisoned").is_empty()
    }

    /// Events matching a predicate.
    pub fn filtered<F>(&self, predicate: F) -> Vec<AssistantEvent>
    where
        F: Fn(&AssistantEvent) -> bool,
    {
        self.events()
            .into_iter()
            .filter(|event| predicate(event))
            .collect()
    }

    fn push(&self, event: AssistantEvent) {
        self.events.lock().expect("event sink poisoned").push(event);
    }
}

impl EventSink for CollectingSink {
    fn speech_detected(&self) {
        self.push(AssistantEvent::SpeechDetected);
    }

    fn command_executed(&self, name: &str, result: CommandResult, context: &CommandContext) {
        self.push(AssistantEvent::CommandExecuted {
            name: name.to_string(),
            result,
            transcript: context.raw_transcript().to_string(),
        });
    }

    fn unrecognised_speech(&self, transcript: &str) {
        self.push(AssistantEvent::UnrecognisedSpeech {
            transcript: transcript.to_string(),
        });
    }

    fn error(&self, message: &str) {
        self.push(AssistantEvent::Error {
            message: message.to_string(),
        });
    }

    fn wake_word_detected(&self) {
        self.push(AssistantEvent::WakeWordDetected);
    }

    fn capture_started(&self) {
        self.push(AssistantEvent::CaptureStarted);
    }

    fn capture_ended(&self) {
        self.push(AssistantEvent::CaptureEnded);
    }

    fn listening_state_changed(&self, old: ListeningState, new: ListeningState) {
        self.push(AssistantEvent::StateChanged { old, new });
    }
}
