//! AudioEngine: one capture backend plus one voice-activity detector behind
//! a single façade. Capture operations delegate to the backend; speech
//! detection delegates to the VAD, which can be reconfigured at runtime
//! without stopping capture.

use std::sync::RwLock;

use anyhow::Result;

use super::capture::{AudioCapture, AudioCaptureConfig};
#[cfg(feature = "cpal")]
use super::cpal_backend::CpalCapture;
use super::mock::MockCapture;
use super::vad::{EnergyVad, VadConfig, VadResult};

/// Runtime backend selection. Features may compile a backend out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioBackend {
    /// Real microphone via CPAL.
    #[cfg(feature = "cpal")]
    Cpal,
    /// In-memory backend fed by the host (tests, headless operation).
    Mock,
}

impl Default for AudioBackend {
    fn default() -> Self {
        #[cfg(feature = "cpal")]
        {
            AudioBackend::Cpal
        }
        #[cfg(not(feature = "cpal"))]
        {
            AudioBackend::Mock
        }
    }
}

/// Configuration for [`AudioEngine`].
#[derive(Debug, Clone, Default)]
pub struct AudioEngineConfig {
    pub backend: AudioBackend,
    pub capture: AudioCaptureConfig,
    pub vad: VadConfig,
}

impl AudioEngineConfig {
    /// Convenience factory for the CPAL backend.
    #[cfg(feature = "cpal")]
    pub fn cpal(capture: AudioCaptureConfig, vad: VadConfig) -> Self {
        Self {
            backend: AudioBackend::Cpal,
            capture,
            vad,
        }
    }

    /// Convenience factory for the mock backend.
    pub fn mock(capture: AudioCaptureConfig, vad: VadConfig) -> Self {
        Self {
            backend: AudioBackend::Mock,
            capture,
            vad,
        }
    }
}

/// Capture + VAD façade used by the orchestrator.
pub struct AudioEngine {
    capture: Box<dyn AudioCapture>,
    vad: RwLock<EnergyVad>,
}

impl AudioEngine {
    /// Build the selected backend and a VAD from config.
    pub fn new(config: AudioEngineConfig) -> Result<Self> {
        let capture: Box<dyn AudioCapture> = match config.backend {
            #[cfg(feature = "cpal")]
            AudioBackend::Cpal => Box::new(CpalCapture::new(&config.capture)?),
            AudioBackend::Mock => Box::new(MockCapture::new(&config.capture)),
        };
        Ok(Self::with_capture(capture, config.vad))
    }

    /// Wrap an already-constructed backend (custom implementations, or a
    /// mock whose feed handle the host keeps).
    pub fn with_capture(capture: Box<dyn AudioCapture>, vad: VadConfig) -> Self {
        Self {
            capture,
            vad: RwLock::new(EnergyVad::new(vad)),
        }
    }

    pub fn start(&self) -> Result<()> {
        self.capture.start()
    }

    pub fn stop(&self) -> Result<()> {
        self.capture.stop()
    }

    pub fn is_running(&self) -> bool {
        self.capture.is_running()
    }

    pub fn get_audio(&self, duration_ms: u32, out: &mut Vec<f32>) {
        self.capture.get_audio(duration_ms, out);
    }

    pub fn detect_speech(&self, samples: &[f32]) -> VadResult {
        self.vad.read().expect("vad lock poisoned").detect(samples)
    }

    pub fn clear_buffer(&self) -> bool {
        self.capture.clear()
    }

    pub fn sample_rate(&self) -> u32 {
        self.capture.sample_rate()
    }

    pub fn buffer_duration_ms(&self) -> u32 {
        self.capture.buffer_duration_ms()
    }

    pub fn vad_config(&self) -> VadConfig {
        self.vad.read().expect("vad lock poisoned").config().clone()
    }

    /// Swap VAD parameters without stopping capture.
    pub fn set_vad_config(&self, config: VadConfig) {
        self.vad
            .write()
            .expect("vad lock poisoned")
            .set_config(config);
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        if self.capture.is_running() {
            let _ = self.capture.stop();
        }
    }
}
