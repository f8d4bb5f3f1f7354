//! voxcmd: an embeddable voice-command pipeline.
//!
//! Microphone PCM flows through voice-activity detection, speech
//! recognition, and intent/parameter extraction into typed dispatch against
//! a registry of user-declared commands:
//!
//! ```text
//! capture -> ring buffer -> VAD -> queue -> ASR -> NLU -> dispatcher -> handler
//! ```
//!
//! Hosts register commands at runtime, inject an ASR engine (and optionally
//! an NLU engine), and observe the pipeline through an [`events::EventSink`].
//! [`testing::CommandTester`] exercises the text half of the pipeline
//! without any audio.

pub mod asr;
pub mod assistant;
pub mod audio;
pub mod command;
pub mod events;
pub mod nlu;
pub mod recognize;
pub mod testing;

pub use assistant::{VoiceAssistant, VoiceAssistantConfig};
pub use command::{
    CommandContext, CommandDescriptor, CommandDispatcher, CommandHandler, CommandRegistry,
    CommandResult, ParamDescriptor, ParamType, ParamValue,
};
pub use events::{AssistantEvent, CollectingSink, EventSink, ListeningMode, ListeningState, NullSink};
pub use recognize::{RecognitionResult, RecognitionStrategy};
