//! Audio capture port and configuration.
//!
//! Backends own the device and a circular sample buffer; the pipeline pulls
//! recent windows instead of consuming a stream. All buffer access happens
//! behind one lock inside the backend, so the trait is `&self` throughout.

use anyhow::Result;

/// Configuration shared by capture backends.
#[derive(Debug, Clone)]
pub struct AudioCaptureConfig {
    /// Device index for capture (-1 = default device).
    pub device_id: i32,
    /// Alternative selection by device name; takes precedence when set.
    pub device_name: Option<String>,
    /// Sample rate in Hz. ASR engines expect 16 kHz.
    pub sample_rate: u32,
    /// Channel count requested from the device; output is always mono.
    pub channels: u16,
    /// Circular buffer duration in milliseconds.
    pub buffer_duration_ms: u32,
}

impl Default for AudioCaptureConfig {
    fn default() -> Self {
        Self {
            device_id: -1,
            device_name: None,
            sample_rate: super::TARGET_RATE,
            channels: 1,
            buffer_duration_ms: 30_000,
        }
    }
}

/// Contract for audio capture backends.
///
/// Lifecycle: construct with a config, `start` to begin capturing, pull
/// windows with `get_audio`, `stop` to pause. Dropping the backend releases
/// the device.
pub trait AudioCapture: Send + Sync {
    /// Begin capturing. Fails if the device is absent or already running.
    fn start(&self) -> Result<()>;

    /// Stop capturing. Fails if not running.
    fn stop(&self) -> Result<()>;

    /// Returns true while samples are being delivered.
    fn is_running(&self) -> bool;

    /// Copy the most recent `duration_ms` of audio into `out` (fewer samples
    /// on underflow, empty when not running). 0 means the entire buffer.
    fn get_audio(&self, duration_ms: u32, out: &mut Vec<f32>);

    /// Discard all buffered samples. Returns false when not running.
    fn clear(&self) -> bool;

    fn sample_rate(&self) -> u32;

    fn buffer_duration_ms(&self) -> u32;
}
