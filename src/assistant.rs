//! VoiceAssistant: the pipeline orchestrator.
//!
//! Wiring: a poll thread samples the audio engine every `poll_interval_ms`
//! and runs the listening state machine; complete capture windows go onto a
//! bounded queue; one worker thread pulls windows, runs the recognition
//! strategy, and dispatches the result. Recognition events are delivered
//! from the worker thread, state-machine events from the thread performing
//! the transition.
//!
//! The ASR engine sits behind one mutex shared by the worker and the
//! wake-word check on the poll thread, so at most one inference is in
//! flight process-wide.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use tracing::{debug, warn};

use crate::asr::AsrEngine;
use crate::audio::{AudioEngine, AudioEngineConfig};
use crate::command::{CommandContext, CommandDispatcher, CommandRegistry, ParamValue};
use crate::events::{EventSink, ListeningMode, ListeningState, NullSink};
use crate::nlu::NluEngine;
use crate::recognize::{GuidedStrategy, NluStrategy, RecognitionStrategy, SharedAsr};

/// Orchestrator configuration.
#[derive(Debug, Clone)]
pub struct VoiceAssistantConfig {
    pub audio: AudioEngineConfig,
    /// Window analysed by the VAD on each poll tick, in milliseconds.
    pub vad_check_duration_ms: u32,
    /// Window enqueued for recognition once speech ends, in milliseconds.
    pub command_capture_duration_ms: u32,
    pub poll_interval_ms: u64,
    /// Bounded audio queue depth; overflow drops the newest window.
    pub max_queue_depth: usize,
    /// Pick the NLU strategy automatically when any registered command is
    /// parameterized.
    pub auto_select_strategy: bool,
    /// Always use the NLU strategy (falls back to guided without an NLU
    /// engine).
    pub force_nlu_strategy: bool,
    pub listening_mode: ListeningMode,
    /// Wake phrase; required in wake-word mode.
    pub wake_word: String,
    pub wake_word_timeout_ms: u64,
    pub wake_word_confidence: f32,
}

impl Default for VoiceAssistantConfig {
    fn default() -> Self {
        Self {
            audio: AudioEngineConfig::default(),
            vad_check_duration_ms: 2000,
            command_capture_duration_ms: 8000,
            poll_interval_ms: 100,
            max_queue_depth: 10,
            auto_select_strategy: true,
            force_nlu_strategy: false,
            listening_mode: ListeningMode::Continuous,
            wake_word: String::new(),
            wake_word_timeout_ms: 5000,
            wake_word_confidence: 0.5,
        }
    }
}

struct FsmState {
    state: ListeningState,
    capture_started_at: Option<Instant>,
    wake_started_at: Option<Instant>,
}

struct Shared {
    config: VoiceAssistantConfig,
    audio: Arc<AudioEngine>,
    asr: SharedAsr,
    nlu: Option<Arc<dyn NluEngine>>,
    registry: Arc<CommandRegistry>,
    dispatcher: CommandDispatcher,
    strategy: RwLock<Option<Arc<dyn RecognitionStrategy>>>,
    sink: RwLock<Arc<dyn EventSink>>,
    force_nlu: AtomicBool,
    running: AtomicBool,
    fsm: Mutex<FsmState>,
    queue_tx: Mutex<Option<Sender<Vec<f32>>>>,
}

/// Main orchestrator. Owns the audio engine, the injected ASR and NLU
/// engines, the registry, and the worker threads.
pub struct VoiceAssistant {
    shared: Arc<Shared>,
    poll_handle: Option<thread::JoinHandle<()>>,
    worker_handle: Option<thread::JoinHandle<()>>,
}

impl VoiceAssistant {
    /// Build the audio engine from config and wire the pipeline.
    pub fn new(
        config: VoiceAssistantConfig,
        asr: Box<dyn AsrEngine>,
        nlu: Option<Box<dyn NluEngine>>,
    ) -> Result<Self> {
        let audio =
            AudioEngine::new(config.audio.clone()).context("audio engine init failed")?;
        Ok(Self::with_audio_engine(config, audio, asr, nlu))
    }

    /// Wire the pipeline around an already-constructed audio engine
    /// (custom backends, or a mock whose feed the host keeps).
    pub fn with_audio_engine(
        config: VoiceAssistantConfig,
        audio: AudioEngine,
        asr: Box<dyn AsrEngine>,
        nlu: Option<Box<dyn NluEngine>>,
    ) -> Self {
        let registry = Arc::new(CommandRegistry::new());
        let force_nlu = config.force_nlu_strategy;
        let shared = Arc::new(Shared {
            config,
            audio: Arc::new(audio),
            asr: Arc::new(Mutex::new(asr)),
            nlu: nlu.map(Arc::from),
            registry: Arc::clone(&registry),
            dispatcher: CommandDispatcher::new(registry),
            strategy: RwLock::new(None),
            sink: RwLock::new(Arc::new(NullSink)),
            force_nlu: AtomicBool::new(force_nlu),
            running: AtomicBool::new(false),
            fsm: Mutex::new(FsmState {
                state: ListeningState::Idle,
                capture_started_at: None,
                wake_started_at: None,
            }),
            queue_tx: Mutex::new(None),
        });
        Self {
            shared,
            poll_handle: None,
            worker_handle: None,
        }
    }

    /// Replace the event sink. Takes effect immediately, including mid-run.
    pub fn set_event_sink(&self, sink: Arc<dyn EventSink>) {
        *self.shared.sink.write().expect("sink lock poisoned") = sink;
    }

    /// Registry for registering and unregistering commands.
    pub fn registry(&self) -> Arc<CommandRegistry> {
        Arc::clone(&self.shared.registry)
    }

    pub fn config(&self) -> &VoiceAssistantConfig {
        &self.shared.config
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn listening_mode(&self) -> ListeningMode {
        self.shared.config.listening_mode
    }

    pub fn listening_state(&self) -> ListeningState {
        self.shared.fsm.lock().expect("fsm lock poisoned").state
    }

    pub fn is_capturing(&self) -> bool {
        self.listening_state() == ListeningState::Capturing
    }

    /// Name of the currently selected recognition strategy.
    pub fn strategy_name(&self) -> Option<&'static str> {
        self.shared
            .strategy
            .read()
            .expect("strategy lock poisoned")
            .as_ref()
            .map(|strategy| strategy.name())
    }

    /// Start capture and the worker threads.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            bail!("voice assistant already running");
        }
        if self.shared.config.listening_mode == ListeningMode::WakeWord
            && self.shared.config.wake_word.is_empty()
        {
            bail!("wake-word mode requires a wake word");
        }

        self.shared.select_strategy();
        self.shared.audio.start().context("audio start failed")?;

        {
            let mut fsm = self.shared.fsm.lock().expect("fsm lock poisoned");
            fsm.state = initial_state(self.shared.config.listening_mode);
            fsm.capture_started_at = None;
            fsm.wake_started_at = None;
        }

        let (tx, rx) = bounded::<Vec<f32>>(self.shared.config.max_queue_depth.max(1));
        *self.shared.queue_tx.lock().expect("queue lock poisoned") = Some(tx);
        self.shared.running.store(true, Ordering::Release);

        let worker_shared = Arc::clone(&self.shared);
        self.worker_handle = Some(
            thread::Builder::new()
                .name("voxcmd-worker".to_string())
                .spawn(move || worker_loop(&worker_shared, &rx))
                .context("failed to spawn worker thread")?,
        );

        let poll_shared = Arc::clone(&self.shared);
        self.poll_handle = Some(
            thread::Builder::new()
                .name("voxcmd-poll".to_string())
                .spawn(move || poll_loop(&poll_shared))
                .context("failed to spawn poll thread")?,
        );

        debug!(
            mode = ?self.shared.config.listening_mode,
            strategy = ?self.strategy_name(),
            "voice assistant started"
        );
        Ok(())
    }

    /// Stop the threads, stop capture, drain the queue, reset to idle.
    pub fn stop(&mut self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }

        // Dropping the sender wakes the worker immediately.
        *self.shared.queue_tx.lock().expect("queue lock poisoned") = None;

        if let Some(handle) = self.poll_handle.take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }

        if let Err(err) = self.shared.audio.stop() {
            warn!(%err, "audio stop failed");
        }

        {
            let mut fsm = self.shared.fsm.lock().expect("fsm lock poisoned");
            fsm.capture_started_at = None;
            fsm.wake_started_at = None;
        }
        self.shared.transition(ListeningState::Idle);
        debug!("voice assistant stopped");
    }

    /// Stop and release the recognition strategy. Owned engines are released
    /// when the assistant drops, in reverse construction order.
    pub fn shutdown(&mut self) {
        self.stop();
        *self
            .shared
            .strategy
            .write()
            .expect("strategy lock poisoned") = None;
    }

    /// Begin a push-to-talk capture. Rejected outside push-to-talk mode or
    /// outside the idle state.
    pub fn start_capture(&self) -> bool {
        if !self.is_running() || self.shared.config.listening_mode != ListeningMode::PushToTalk {
            return false;
        }
        {
            let mut fsm = self.shared.fsm.lock().expect("fsm lock poisoned");
            if fsm.state != ListeningState::Idle {
                return false;
            }
            self.shared.audio.clear_buffer();
            fsm.capture_started_at = Some(Instant::now());
            fsm.state = ListeningState::Capturing;
        }
        let sink = self.shared.sink();
        sink.listening_state_changed(ListeningState::Idle, ListeningState::Capturing);
        sink.capture_started();
        true
    }

    /// End a push-to-talk capture and enqueue the recorded window.
    /// Rejected outside the capturing state.
    pub fn stop_capture(&self) -> bool {
        let elapsed = {
            let mut fsm = self.shared.fsm.lock().expect("fsm lock poisoned");
            if fsm.state != ListeningState::Capturing {
                return false;
            }
            let elapsed = fsm
                .capture_started_at
                .take()
                .map(|started| started.elapsed())
                .unwrap_or_default();
            fsm.state = ListeningState::Idle;
            elapsed
        };

        let mut samples = Vec::new();
        let duration_ms = elapsed.as_millis().min(u128::from(u32::MAX)) as u32;
        self.shared.audio.get_audio(duration_ms, &mut samples);
        if !samples.is_empty() {
            self.shared.enqueue(samples);
        }
        self.shared.audio.clear_buffer();

        let sink = self.shared.sink();
        sink.listening_state_changed(ListeningState::Capturing, ListeningState::Idle);
        sink.capture_ended();
        true
    }

    /// Force (or stop forcing) the NLU strategy. Re-selects immediately when
    /// running.
    pub fn set_force_nlu_strategy(&self, use_nlu: bool) {
        self.shared.force_nlu.store(use_nlu, Ordering::Release);
        if self.is_running() {
            self.shared.select_strategy();
        }
    }
}

impl Drop for VoiceAssistant {
    fn drop(&mut self) {
        self.stop();
    }
}

fn initial_state(mode: ListeningMode) -> ListeningState {
    match mode {
        ListeningMode::Continuous | ListeningMode::WakeWord => ListeningState::Listening,
        ListeningMode::PushToTalk => ListeningState::Idle,
    }
}

impl Shared {
    fn sink(&self) -> Arc<dyn EventSink> {
        Arc::clone(&self.sink.read().expect("sink lock poisoned"))
    }

    fn select_strategy(&self) {
        let use_nlu = self.force_nlu.load(Ordering::Acquire)
            || (self.config.auto_select_strategy && self.registry.has_parameterized_commands());

        let strategy: Arc<dyn RecognitionStrategy> = if use_nlu {
            match &self.nlu {
                Some(nlu) => Arc::new(NluStrategy::new(
                    Arc::clone(&self.asr),
                    Arc::clone(nlu),
                    Arc::clone(&self.registry),
                )),
                // No NLU engine available: guided is the only option left.
                None => Arc::new(GuidedStrategy::new(
                    Arc::clone(&self.asr),
                    Arc::clone(&self.registry),
                )),
            }
        } else {
            Arc::new(GuidedStrategy::new(
                Arc::clone(&self.asr),
                Arc::clone(&self.registry),
            ))
        };

        debug!(strategy = strategy.name(), "recognition strategy selected");
        *self.strategy.write().expect("strategy lock poisoned") = Some(strategy);
    }

    /// Change state and notify when it actually moved.
    fn transition(&self, new: ListeningState) {
        let old = {
            let mut fsm = self.fsm.lock().expect("fsm lock poisoned");
            let old = fsm.state;
            fsm.state = new;
            old
        };
        if old != new {
            self.sink().listening_state_changed(old, new);
        }
    }

    /// Push a capture window onto the bounded queue; the newest window is
    /// dropped on overflow.
    fn enqueue(&self, samples: Vec<f32>) {
        let guard = self.queue_tx.lock().expect("queue lock poisoned");
        let Some(tx) = guard.as_ref() else {
            return;
        };
        match tx.try_send(samples) {
            Ok(()) => self.sink().speech_detected(),
            Err(TrySendError::Full(_)) => {
                warn!("audio queue full, dropping capture window");
                self.sink().error("Audio queue full; capture window dropped");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// One poll tick of the listening state machine.
    fn tick(&self, samples: &mut Vec<f32>) {
        match self.config.listening_mode {
            ListeningMode::Continuous => self.tick_continuous(samples),
            ListeningMode::WakeWord => self.tick_wake_word(samples),
            ListeningMode::PushToTalk => {}
        }
    }

    fn tick_continuous(&self, samples: &mut Vec<f32>) {
        self.audio
            .get_audio(self.config.vad_check_duration_ms, samples);
        if !self.audio.detect_speech(samples).speech_ended {
            return;
        }
        self.audio
            .get_audio(self.config.command_capture_duration_ms, samples);
        self.enqueue(std::mem::take(samples));
        self.audio.clear_buffer();
    }

    fn tick_wake_word(&self, samples: &mut Vec<f32>) {
        let state = self.fsm.lock().expect("fsm lock poisoned").state;
        match state {
            ListeningState::Listening => {
                self.audio
                    .get_audio(self.config.vad_check_duration_ms, samples);
                if !self.audio.detect_speech(samples).speech_ended {
                    return;
                }

                let phrases = [self.config.wake_word.clone()];
                let matched = self
                    .asr
                    .lock()
                    .expect("asr lock poisoned")
                    .guided_match(samples, &phrases);
                if matched.success && matched.best_score >= self.config.wake_word_confidence {
                    debug!(score = matched.best_score, "wake word detected");
                    self.fsm.lock().expect("fsm lock poisoned").wake_started_at =
                        Some(Instant::now());
                    self.sink().wake_word_detected();
                    self.transition(ListeningState::WakeWordActive);
                }
                self.audio.clear_buffer();
            }
            ListeningState::WakeWordActive => {
                let expired = {
                    let fsm = self.fsm.lock().expect("fsm lock poisoned");
                    fsm.wake_started_at
                        .map(|started| {
                            started.elapsed()
                                > Duration::from_millis(self.config.wake_word_timeout_ms)
                        })
                        .unwrap_or(true)
                };
                if expired {
                    debug!("wake word window timed out");
                    self.transition(ListeningState::Listening);
                    self.audio.clear_buffer();
                    return;
                }

                self.audio
                    .get_audio(self.config.vad_check_duration_ms, samples);
                if !self.audio.detect_speech(samples).speech_ended {
                    return;
                }
                self.audio
                    .get_audio(self.config.command_capture_duration_ms, samples);
                self.enqueue(std::mem::take(samples));
                self.transition(ListeningState::Listening);
                self.audio.clear_buffer();
            }
            _ => {}
        }
    }

    /// Run the strategy over one window, dispatch, and notify.
    fn process_audio(&self, samples: &[f32]) {
        let strategy = {
            let guard = self.strategy.read().expect("strategy lock poisoned");
            guard.as_ref().map(Arc::clone)
        };
        let Some(strategy) = strategy else {
            return;
        };

        let recognition = strategy.recognize(samples);

        if !recognition.success {
            let sink = self.sink();
            if !recognition.raw_transcript.is_empty() {
                debug!(transcript = %recognition.raw_transcript, "unrecognised speech");
                sink.unrecognised_speech(&recognition.raw_transcript);
            } else if !recognition.error.is_empty() {
                debug!(error = %recognition.error, "recognition failed");
                sink.error(&recognition.error);
            }
            return;
        }

        let mut context = CommandContext::new(
            recognition.raw_transcript.clone(),
            recognition.confidence,
        );
        for (name, value) in &recognition.params {
            context.set_param(name.clone(), ParamValue::new(value.clone()));
        }

        let result = self
            .dispatcher
            .dispatch(&recognition.command_name, &mut context);
        debug!(
            command = %recognition.command_name,
            ?result,
            asr_ms = recognition.asr_time_ms,
            nlu_ms = recognition.nlu_time_ms,
            "command dispatched"
        );
        self.sink()
            .command_executed(&recognition.command_name, result, &context);
    }
}

fn poll_loop(shared: &Arc<Shared>) {
    let interval = Duration::from_millis(shared.config.poll_interval_ms.max(1));

    // Give capture one interval to stabilise, then start from a clean buffer.
    thread::sleep(interval);
    shared.audio.clear_buffer();

    let mut samples = Vec::new();
    while shared.running.load(Ordering::Acquire) {
        thread::sleep(interval);
        if !shared.running.load(Ordering::Acquire) {
            break;
        }
        shared.tick(&mut samples);
    }
}

fn worker_loop(shared: &Arc<Shared>, rx: &Receiver<Vec<f32>>) {
    let wait = Duration::from_millis(shared.config.poll_interval_ms.max(10));
    loop {
        match rx.recv_timeout(wait) {
            Ok(samples) => shared.process_audio(&samples),
            Err(RecvTimeoutError::Timeout) => {
                if !shared.running.load(Ordering::Acquire) {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}
