//! Microphone capture via CPAL.
//!
//! The device callback runs on a CPAL-owned thread: incoming samples are
//! converted to f32, downmixed to mono, rate-converted to the configured
//! rate, and written into the shared ring buffer. A small owner thread keeps
//! the stream alive between `start` and `stop` because CPAL streams cannot
//! cross threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, warn};

use super::buffer::RingBuffer;
use super::capture::{AudioCapture, AudioCaptureConfig};

struct Shared {
    buffer: Mutex<RingBuffer>,
    running: AtomicBool,
}

struct StreamWorker {
    stop_tx: Sender<()>,
    handle: thread::JoinHandle<()>,
}

/// CPAL-backed capture.
pub struct CpalCapture {
    shared: Arc<Shared>,
    config: AudioCaptureConfig,
    worker: Mutex<Option<StreamWorker>>,
}

impl CpalCapture {
    /// Open the configured device. Fails when a named or indexed device does
    /// not exist.
    pub fn new(config: &AudioCaptureConfig) -> Result<Self> {
        // Resolve once up front so a bad selection fails at init, not at start.
        let device = resolve_device(config)?;
        let name = device.name().unwrap_or_else(|_| "unknown".to_string());
        debug!(device = %name, sample_rate = config.sample_rate, "opened capture device");

        let capacity = RingBuffer::capacity_for(config.sample_rate, config.buffer_duration_ms);
        Ok(Self {
            shared: Arc::new(Shared {
                buffer: Mutex::new(RingBuffer::new(capacity)),
                running: AtomicBool::new(false),
            }),
            config: config.clone(),
            worker: Mutex::new(None),
        })
    }

    /// List input device names for host-side selection.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }
}

impl AudioCapture for CpalCapture {
    fn start(&self) -> Result<()> {
        let mut worker = self.worker.lock().expect("capture worker lock poisoned");
        if worker.is_some() {
            bail!("audio capture already running");
        }

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let (ready_tx, ready_rx) = bounded::<Result<()>>(1);
        let shared = Arc::clone(&self.shared);
        let config = self.config.clone();

        let handle = thread::spawn(move || {
            run_stream(&config, &shared, &stop_rx, &ready_tx);
        });

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {
                self.shared.running.store(true, Ordering::Release);
                *worker = Some(StreamWorker { stop_tx, handle });
                Ok(())
            }
            Ok(Err(err)) => {
                let _ = handle.join();
                Err(err)
            }
            Err(_) => {
                drop(stop_tx);
                let _ = handle.join();
                Err(anyhow!("audio stream did not start within 5s"))
            }
        }
    }

    fn stop(&self) -> Result<()> {
        let mut worker = self.worker.lock().expect("capture worker lock poisoned");
        let Some(StreamWorker { stop_tx, handle }) = worker.take() else {
            bail!("audio capture not running");
        };
        self.shared.running.store(false, Ordering::Release);
        let _ = stop_tx.send(());
        handle
            .join()
            .map_err(|_| anyhow!("audio stream thread panicked"))?;
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
        let buffer = self.shared.buffer.lock().expect("capture buffer poisoned");
        let n = if duration_ms == 0 {
            buffer.capacity()
        } else {
            (self.config.sample_rate as u64 * duration_ms as u64 / 1000) as usize
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
            .expect("capture buffer poisoned")
            .clear();
        true
    }

    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn buffer_duration_ms(&self) -> u32 {
        self.config.buffer_duration_ms
    }
}

impl Drop for CpalCapture {
    fn drop(&mut self) {
        if self.is_running() {
            let _ = self.stop();
        }
    }
}

fn resolve_device(config: &AudioCaptureConfig) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if let Some(ref name) = config.device_name {
        let mut devices = host.input_devices().context("no input devices available")?;
        return devices
            .find(|d| d.name().map(|n| &n == name).unwrap_or(false))
            .ok_or_else(|| anyhow!("input device '{name}' not found"));
    }
    if config.device_id >= 0 {
        let devices = host.input_devices().context("no input devices available")?;
        let mut devices = devices;
        return devices
            .nth(config.device_id as usize)
            .ok_or_else(|| anyhow!("input device #{} not found", config.device_id));
    }
    host.default_input_device()
        .context("no default input device available")
}

/// Build the stream, report readiness, then park until `stop_rx` fires.
fn run_stream(
    config: &AudioCaptureConfig,
    shared: &Arc<Shared>,
    stop_rx: &Receiver<()>,
    ready_tx: &Sender<Result<()>>,
) {
    let stream = match build_stream(config, shared) {
        Ok(stream) => stream,
        Err(err) => {
            let _ = ready_tx.send(Err(err));
            return;
        }
    };
    if let Err(err) = stream.play() {
        let _ = ready_tx.send(Err(err.into()));
        return;
    }
    let _ = ready_tx.send(Ok(()));

    // Block until stop() signals or the capture is dropped.
    let _ = stop_rx.recv();

    if let Err(err) = stream.pause() {
        warn!(%err, "failed to pause audio stream");
    }
}

fn build_stream(config: &AudioCaptureConfig, shared: &Arc<Shared>) -> Result<cpal::Stream> {
    let device = resolve_device(config)?;
    let default_config = device.default_input_config()?;
    let format = default_config.sample_format();
    let device_config: StreamConfig = default_config.into();
    let device_rate = device_config.sample_rate.0;
    let channels = usize::from(device_config.channels.max(1));
    let target_rate = config.sample_rate;

    debug!(
        ?format,
        device_rate,
        channels,
        target_rate,
        "building input stream"
    );

    let err_fn = |err| warn!(%err, "audio stream error");

    let stream = match format {
        SampleFormat::F32 => {
            let shared = Arc::clone(shared);
            device.build_input_stream(
                &device_config,
                move |data: &[f32], _| {
                    ingest(&shared, data, channels, device_rate, target_rate, |s| s);
                },
                err_fn,
                None,
            )?
        }
        SampleFormat::I16 => {
            let shared = Arc::clone(shared);
            device.build_input_stream(
                &device_config,
                move |data: &[i16], _| {
                    ingest(&shared, data, channels, device_rate, target_rate, |s| {
                        s as f32 / 32_768.0
                    });
                },
                err_fn,
                None,
            )?
        }
        SampleFormat::U16 => {
            let shared = Arc::clone(shared);
            device.build_input_stream(
                &device_config,
                move |data: &[u16], _| {
                    ingest(&shared, data, channels, device_rate, target_rate, |s| {
                        (s as f32 - 32_768.0) / 32_768.0
                    });
                },
                err_fn,
                None,
            )?
        }
        other => bail!("unsupported sample format: {other:?}"),
    };
    Ok(stream)
}

/// Device callback body: convert, downmix, rate-convert, write.
fn ingest<T, F>(
    shared: &Arc<Shared>,
    data: &[T],
    channels: usize,
    device_rate: u32,
    target_rate: u32,
    convert: F,
) where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if !shared.running.load(Ordering::Acquire) {
        return;
    }
    let mut mono = Vec::with_capacity(data.len() / channels.max(1) + 1);
    downmix(&mut mono, data, channels, convert);
    let resampled = convert_rate(&mono, device_rate, target_rate);
    if let Ok(mut buffer) = shared.buffer.lock() {
        buffer.write(&resampled);
    }
}

/// Average interleaved frames into a mono representation.
fn downmix<T, F>(out: &mut Vec<f32>, data: &[T], channels: usize, mut convert: F)
where
    T: Copy,
    F: FnMut(T) -> f32,
{
    if channels <= 1 {
        out.extend(data.iter().copied().map(&mut convert));
        return;
    }
    let mut acc = 0.0f32;
    let mut count = 0usize;
    for sample in data.iter().copied() {
        acc += convert(sample);
        count += 1;
        if count == channels {
            out.push(acc / channels as f32);
            acc = 0.0;
            count = 0;
        }
    }
    if count > 0 {
        out.push(acc / count as f32);
    }
}

/// Linear rate conversion; identity when the rates already match.
fn convert_rate(input: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 || input.is_empty() {
        return input.to_vec();
    }
    let ratio = to_rate as f64 / from_rate as f64;
    let out_len = ((input.len() as f64) * ratio).round().max(1.0) as usize;
    let mut out = Vec::with_capacity(out_len);
    for i in 0..out_len {
        let src = i as f64 / ratio;
        let idx = src.floor() as usize;
        let frac = (src - idx as f64) as f32;
        let a = input[idx.min(input.len() - 1)];
        let b = input[(idx + 1).min(input.len() - 1)];
        out.push(a + (b - a) * frac);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_interleaved_frames() {
        let mut out = Vec::new();
        downmix(&mut out, &[1.0f32, -1.0, 0.5, 0.5], 2, |s| s);
        assert_eq!(out, vec![0.0, 0.5]);
    }

    #[test]
    fn downmix_passes_mono_through() {
        let mut out = Vec::new();
        downmix(&mut out, &[0.1f32, 0.2, 0.3], 1, |s| s);
        assert_eq!(out, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn convert_rate_identity_when_rates_match() {
        let input = vec![0.1f32, 0.2, 0.3];
        assert_eq!(convert_rate(&input, 16_000, 16_000), input);
    }

    #[test]
    fn convert_rate_halves_length_on_2x_downsample() {
        let input: Vec<f32> = (0..100).map(|i| i as f32).collect();
        let out = convert_rate(&input, 32_000, 16_000);
        assert_eq!(out.len(), 50);
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn convert_rate_preserves_endpoints_on_upsample() {
        let input = vec![0.0f32, 1.0];
        let out = convert_rate(&input, 8_000, 16_000);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], 0.0);
    }
}
