//! Audio capture and voice activity detection.
//!
//! Backends fill a thread-safe circular buffer with 16 kHz mono f32 PCM; the
//! pipeline pulls recent windows and asks the VAD whether an utterance just
//! ended.

/// Sample rate the ASR engines expect.
pub const TARGET_RATE: u32 = 16_000;

mod buffer;
mod capture;
#[cfg(feature = "cpal")]
mod cpal_backend;
mod engine;
mod mock;
mod vad;

pub use buffer::RingBuffer;
pub use capture::{AudioCapture, AudioCaptureConfig};
#[cfg(feature = "cpal")]
pub use cpal_backend::CpalCapture;
pub use engine::{AudioBackend, AudioEngine, AudioEngineConfig};
pub use mock::{MockCapture, MockFeed};
pub use vad::{EnergyVad, VadConfig, VadResult};

/// List input device names, if a device backend is compiled in.
#[cfg(feature = "cpal")]
pub fn list_input_devices() -> anyhow::Result<Vec<String>> {
    CpalCapture::list_devices()
}
