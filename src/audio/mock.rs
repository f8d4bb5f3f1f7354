//! Scriptable capture backend for tests and headless hosts.
//!
//! The host pushes PCM through a [`MockFeed`] handle; the pipeline reads it
//! back through the regular [`AudioCapture`] contract. Shares the ring-buffer
//! semantics of the real backend, minus the device.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};

use super::buffer::RingBuffer;
use super::capture::{AudioCapture, AudioCaptureConfig};

struct Shared {
    buffer: Mutex<RingBuffer>,
    running: AtomicBool,
}

/// In-memory capture backend.
pub struct MockCapture {
    shared: Arc<Shared>,
    sample_rate: u32,
    buffer_duration_ms: u32,
}

/// Cloneable producer handle paired with a [`MockCapture`].
#[derive(Clone)]
pub struct MockFeed {
    shared: Arc<Shared>,
}

impl MockCapture {
    pub fn new(config: &AudioCaptureConfig) -> Self {
        let capacity = RingBuffer::capacity_for(config.sample_rate, config.buffer_duration_ms);
        Self {
            shared: Arc::new(Shared {
                buffer: Mutex::new(RingBuffer::new(capacity)),
                running: AtomicBool::new(false),
            }),
            sample_rate: config.sample_rate,
            buffer_duration_ms: config.buffer_duration_ms,
        }
    }

    /// Producer handle for pushing samples into the buffer.
    pub fn feed(&self) -> MockFeed {
        MockFeed {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl MockFeed {
    /// Append samples as if a device callback delivered them. Ignored while
    /// the capture is stopped, matching a paused device.
    pub fn push(&self, samples: &[f32]) {
        if !self.shared.running.load(Ordering::Acquire) {
            return;
        }
        self.shared
            .buffer
            .lock()
            .expect("mock capture buffer poisoned")
            .write(samples);
    }
}

impl AudioCapture for MockCapture {
    fn start(&self) -> Result<()> {
        if self.shared.running.swap(true, Ordering::AcqRel) {
            bail!("mock capture already running");
        }
        Ok(())
    }

    fn stop(&self) -> Result<()> {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            bail!("mock capture not running");
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    fn get_audio(&self, duration_ms: u32, out: &mut Vec<f32>) {
        out.clear();
        if !self.is_running() {
            return;
        }
        let buffer = self
            .shared
            .buffer
            .lock()
            .expect("mock capture buffer poisoned");
        let n = if duration_ms == 0 {
            buffer.capacity()
        } else {
            (self.sample_rate as u64 * duration_ms as u64 / 1000) as usize
        };
        buffer.read_last(n, out);
    }

    fn clear(&self) -> bool {
        if !self.is_running() {
            return false;
        }
        self.shared
            .buffer
            .lock()
            .expect("mock capture buffer poisoned")
            .clear();
        true
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn buffer_duration_ms(&self) -> u32 {
        self.buffer_duration_ms
    }
}
