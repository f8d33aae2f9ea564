//! The host-facing synthesis coordinator.
//!
//! Receives structured speech requests from the screen-reader host, decides
//! per segment whether to stream (bounded queue + worker) or speak directly
//! through the engine, applies rate/pitch/volume/voice changes, and emits
//! completion/index notifications back to the host. A synthesis failure is
//! never allowed to abort the host's speech pipeline: worst case an
//! utterance is dropped and a log line written.

use crate::audio::playback::{CpalSink, PlaybackSink, SharedSink};
use crate::config::DriverConfig;
use crate::engine::{DeltaTalkEngine, SynthEngine, Voice};
use crate::error::{DriverError, Result};
use crate::pipeline::busy::BusyFlag;
use crate::pipeline::direct::speak_direct;
use crate::pipeline::messages::{QueueItem, SpeechSegment, SynthEvent};
use crate::pipeline::worker::{self, WorkerContext};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One item of the host's structured speech sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechItem {
    /// Literal text to speak.
    Text(String),
    /// Marker to echo back once the surrounding speech completes.
    Index(u32),
    /// Toggle character-by-character mode for subsequent text.
    CharacterMode(bool),
    /// Relative pitch change, applied until the current literal finishes.
    PitchOffset(i32),
    /// Absolute rate on the host's 0–100 scale.
    Rate(u8),
    /// Absolute volume on the host's 0–100 scale.
    Volume(u8),
}

/// Convert the host's 0–100 scale to the engine's 1–20 scale.
pub fn to_engine_scale(value: u8) -> u8 {
    ((u32::from(value) * 20) / 100).clamp(1, 20) as u8
}

/// Mutable synthesis parameters, on the host's 0–100 scale.
#[derive(Debug, Clone, Copy)]
struct VoiceParams {
    rate: u8,
    pitch: u8,
    volume: u8,
    voice: Voice,
}

impl Default for VoiceParams {
    fn default() -> Self {
        Self {
            rate: 50,
            pitch: 50,
            volume: 100,
            voice: Voice::default(),
        }
    }
}

/// Streaming resources, held only while streaming is enabled.
struct StreamingPipeline {
    queue_tx: Sender<QueueItem>,
    /// Second handle on the queue so `cancel` can drain it.
    drain_rx: Receiver<QueueItem>,
    worker: JoinHandle<()>,
    sink: SharedSink,
}

/// Synthesizer driver for the DeltaTalk engine.
pub struct DeltaTalkDriver {
    engine: Arc<dyn SynthEngine>,
    config: DriverConfig,
    params: Mutex<VoiceParams>,
    busy: Arc<BusyFlag>,
    streaming: Mutex<Option<StreamingPipeline>>,
    events_tx: Sender<SynthEvent>,
    events_rx: Receiver<SynthEvent>,
}

impl DeltaTalkDriver {
    /// Load the native engine and build a driver around it.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine library is missing or refuses to
    /// initialize. That is fatal to driver construction and reported to
    /// the host.
    pub fn open(config: DriverConfig) -> Result<Self> {
        let engine =
            DeltaTalkEngine::load(config.engine.library.as_deref(), config.engine.dsp_mode)?;
        Ok(Self::new(Arc::new(engine), config))
    }

    /// Build a driver around an already-initialized engine.
    ///
    /// Streaming playback comes up when the config enables it; if the audio
    /// sink cannot be created the driver silently stays on direct playback.
    pub fn new(engine: Arc<dyn SynthEngine>, config: DriverConfig) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let driver = Self {
            engine,
            config,
            params: Mutex::new(VoiceParams::default()),
            busy: Arc::new(BusyFlag::new()),
            streaming: Mutex::new(None),
            events_tx,
            events_rx,
        };

        driver.apply_params();
        driver.apply_voice();

        if driver.config.streaming.enabled
            && let Err(e) = driver.enable_streaming()
        {
            warn!("streaming unavailable, staying on direct playback: {e}");
        }
        driver
    }

    /// Build a driver around an engine and a caller-supplied playback sink.
    ///
    /// The factory receives the driver's event sender so the sink can post
    /// completion events. The sink replaces the default cpal output;
    /// streaming starts regardless of the config switch.
    pub fn with_sink<F>(engine: Arc<dyn SynthEngine>, config: DriverConfig, make_sink: F) -> Self
    where
        F: FnOnce(Sender<SynthEvent>) -> Box<dyn PlaybackSink>,
    {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        let driver = Self {
            engine,
            config,
            params: Mutex::new(VoiceParams::default()),
            busy: Arc::new(BusyFlag::new()),
            streaming: Mutex::new(None),
            events_tx,
            events_rx,
        };

        driver.apply_params();
        driver.apply_voice();

        let sink = make_sink(driver.events_tx.clone());
        if let Err(e) = driver.start_pipeline(sink) {
            warn!("streaming unavailable, staying on direct playback: {e}");
        }
        driver
    }

    /// The channel carrying index-reached and done-speaking notifications.
    pub fn events(&self) -> Receiver<SynthEvent> {
        self.events_rx.clone()
    }

    /// Bring up the playback sink and worker thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the audio device is unavailable; the driver
    /// keeps working through direct playback.
    pub fn enable_streaming(&self) -> Result<()> {
        let sample_rate = self.voice().sample_rate();
        let sink = CpalSink::new(&self.config.audio, sample_rate, self.events_tx.clone())?;
        self.start_pipeline(Box::new(sink))
    }

    /// Tear down the worker thread and playback sink.
    pub fn disable_streaming(&self) {
        let pipeline = match self.streaming.lock() {
            Ok(mut slot) => slot.take(),
            Err(_) => None,
        };
        if let Some(pipeline) = pipeline {
            teardown_pipeline(pipeline);
            info!("streaming playback disabled");
        }
    }

    /// Whether the streaming pipeline is currently up.
    pub fn streaming_active(&self) -> bool {
        self.streaming.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    fn start_pipeline(&self, sink: Box<dyn PlaybackSink>) -> Result<()> {
        let mut slot = self
            .streaming
            .lock()
            .map_err(|e| DriverError::Channel(format!("streaming lock poisoned: {e}")))?;
        if slot.is_some() {
            return Ok(());
        }

        let (queue_tx, queue_rx) =
            crossbeam_channel::bounded(self.config.streaming.queue_capacity);
        let sink: SharedSink = Arc::new(Mutex::new(sink));
        let ctx = WorkerContext {
            engine: Arc::clone(&self.engine),
            sink: Arc::clone(&sink),
            busy: Arc::clone(&self.busy),
            streaming: self.config.streaming.clone(),
            busy_wait: self.config.busy_wait.clone(),
        };
        let worker = worker::spawn(ctx, queue_rx.clone())
            .map_err(|e| DriverError::Channel(format!("cannot spawn speech worker: {e}")))?;

        *slot = Some(StreamingPipeline {
            queue_tx,
            drain_rx: queue_rx,
            worker,
            sink,
        });
        info!("streaming playback enabled");
        Ok(())
    }

    /// Speak a structured sequence of text and inline commands.
    ///
    /// Always emits exactly one [`SynthEvent::DoneSpeaking`], however many
    /// segments the sequence contained.
    pub fn speak(&self, sequence: &[SpeechItem]) {
        let base_pitch = self.pitch();
        let mut char_mode = false;
        let mut pending_index: Option<u32> = None;

        for item in sequence {
            match item {
                SpeechItem::Text(text) => {
                    let text = text.trim();
                    if text.is_empty() {
                        continue;
                    }
                    if char_mode {
                        let mut buf = [0u8; 4];
                        for c in text.chars() {
                            self.submit(c.encode_utf8(&mut buf), None);
                        }
                    } else {
                        self.submit(text, pending_index.take());
                    }
                    if self.pitch() != base_pitch {
                        self.set_pitch(base_pitch);
                    }
                }
                SpeechItem::Index(index) => {
                    // Only one marker can be pending; an unconsumed older
                    // one is reported right away.
                    if let Some(old) = pending_index.replace(*index) {
                        let _ = self.events_tx.send(SynthEvent::IndexReached(old));
                    }
                }
                SpeechItem::CharacterMode(state) => char_mode = *state,
                SpeechItem::PitchOffset(offset) => {
                    let pitch = i32::from(self.pitch()) + offset;
                    self.set_pitch(pitch.clamp(0, 100) as u8);
                }
                SpeechItem::Rate(value) => self.set_rate(*value),
                SpeechItem::Volume(value) => self.set_volume(*value),
            }
        }

        if let Some(index) = pending_index {
            let _ = self.events_tx.send(SynthEvent::IndexReached(index));
        }
        let _ = self.events_tx.send(SynthEvent::DoneSpeaking);
    }

    /// Route one segment: streaming queue first, direct playback otherwise.
    fn submit(&self, text: &str, index: Option<u32>) {
        if let Ok(slot) = self.streaming.lock()
            && let Some(pipeline) = slot.as_ref()
        {
            let item = QueueItem::Segment(SpeechSegment {
                text: text.to_owned(),
                index,
            });
            match pipeline.queue_tx.try_send(item) {
                Ok(()) => {
                    debug!("queued for streaming: {text:?}");
                    return;
                }
                Err(TrySendError::Full(_)) => {
                    warn!("speech queue full, using direct playback");
                }
                Err(TrySendError::Disconnected(_)) => {
                    warn!("speech worker unavailable, using direct playback");
                }
            }
        }

        speak_direct(&*self.engine, &self.busy, &self.config.busy_wait, text);
        // Direct playback has no completion callback to hang the marker on.
        if let Some(index) = index {
            let _ = self.events_tx.send(SynthEvent::IndexReached(index));
        }
    }

    /// Pause or resume playback in both the engine and the sink.
    pub fn pause(&self, switch: bool) {
        let result = if switch {
            self.engine.pause()
        } else {
            self.engine.resume()
        };
        if let Err(code) = result {
            warn!("engine pause/resume failed: {code}");
        }

        if let Ok(slot) = self.streaming.lock()
            && let Some(pipeline) = slot.as_ref()
            && let Ok(mut sink) = pipeline.sink.lock()
        {
            sink.pause(switch);
        }
    }

    /// Stop current speech, drain the queue, and clear the busy flag.
    ///
    /// Best-effort: an in-flight generation call may still be executing
    /// inside the engine when this returns.
    pub fn cancel(&self) {
        if let Err(code) = self.engine.stop() {
            warn!("engine stop failed: {code}");
        }

        if let Ok(slot) = self.streaming.lock()
            && let Some(pipeline) = slot.as_ref()
        {
            if let Ok(mut sink) = pipeline.sink.lock() {
                sink.stop();
            }
            let mut dropped = 0usize;
            while pipeline.drain_rx.try_recv().is_ok() {
                dropped += 1;
            }
            if dropped > 0 {
                debug!("cancelled {dropped} queued segments");
            }
        }

        self.busy.force_clear();
    }

    /// Current rate on the host scale.
    pub fn rate(&self) -> u8 {
        self.params.lock().map(|p| p.rate).unwrap_or_default()
    }

    /// Current pitch on the host scale.
    pub fn pitch(&self) -> u8 {
        self.params.lock().map(|p| p.pitch).unwrap_or_default()
    }

    /// Current volume on the host scale.
    pub fn volume(&self) -> u8 {
        self.params.lock().map(|p| p.volume).unwrap_or_default()
    }

    /// Currently selected voice.
    pub fn voice(&self) -> Voice {
        self.params.lock().map(|p| p.voice).unwrap_or_default()
    }

    /// Set the speaking rate (0–100).
    pub fn set_rate(&self, value: u8) {
        if let Ok(mut params) = self.params.lock() {
            params.rate = value.min(100);
        }
        self.apply_params();
    }

    /// Set the pitch (0–100).
    pub fn set_pitch(&self, value: u8) {
        if let Ok(mut params) = self.params.lock() {
            params.pitch = value.min(100);
        }
        self.apply_params();
    }

    /// Set the volume (0–100).
    pub fn set_volume(&self, value: u8) {
        if let Ok(mut params) = self.params.lock() {
            params.volume = value.min(100);
        }
        self.apply_params();
    }

    /// Select a voice, retargeting the sink when the sample rate changes.
    pub fn set_voice(&self, voice: Voice) {
        if let Ok(mut params) = self.params.lock() {
            params.voice = voice;
        }
        self.apply_voice();
        self.apply_params();
        self.retarget_sink(voice.sample_rate());
    }

    /// Push the full rate/volume/pitch triple to the engine.
    ///
    /// The native API only ever sets all three together.
    fn apply_params(&self) {
        let Ok(params) = self.params.lock().map(|p| *p) else {
            return;
        };
        let result = self.engine.set_params(
            to_engine_scale(params.rate),
            to_engine_scale(params.volume),
            to_engine_scale(params.pitch),
        );
        match result {
            Ok(()) => debug!(
                "applied settings: rate={} volume={} pitch={}",
                to_engine_scale(params.rate),
                to_engine_scale(params.volume),
                to_engine_scale(params.pitch)
            ),
            Err(code) => warn!("cannot apply settings: {code}"),
        }
    }

    fn apply_voice(&self) {
        let voice = self.voice();
        match self.engine.set_voice(voice) {
            Ok(()) => info!("voice set to {}", voice.display_name()),
            Err(code) => warn!("cannot apply voice: {code}"),
        }
    }

    /// Move the sink to a new sample rate; on failure, drop to direct
    /// playback for the rest of the session.
    fn retarget_sink(&self, sample_rate: u32) {
        let failed = {
            let Ok(slot) = self.streaming.lock() else {
                return;
            };
            let Some(pipeline) = slot.as_ref() else {
                return;
            };
            match pipeline.sink.lock() {
                Ok(mut sink) => {
                    if sink.sample_rate() == sample_rate {
                        return;
                    }
                    info!("retargeting playback to {sample_rate} Hz");
                    sink.set_sample_rate(sample_rate).is_err()
                }
                Err(_) => return,
            }
        };

        if failed {
            warn!("cannot retarget playback sink; disabling streaming");
            self.disable_streaming();
        }
    }

    /// Release all resources: worker thread, sink, pending speech.
    pub fn shutdown(&self) {
        self.cancel();
        self.disable_streaming();
    }
}

impl Drop for DeltaTalkDriver {
    fn drop(&mut self) {
        self.disable_streaming();
    }
}

fn teardown_pipeline(pipeline: StreamingPipeline) {
    // Bounded push: the sentinel must not wedge shutdown on a full queue.
    let _ = pipeline
        .queue_tx
        .send_timeout(QueueItem::Shutdown, Duration::from_millis(500));
    drop(pipeline.queue_tx);
    drop(pipeline.drain_rx);
    if pipeline.worker.join().is_err() {
        warn!("speech worker panicked during shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_scale_maps_to_engine_scale() {
        assert_eq!(to_engine_scale(0), 1);
        assert_eq!(to_engine_scale(4), 1);
        assert_eq!(to_engine_scale(5), 1);
        assert_eq!(to_engine_scale(50), 10);
        assert_eq!(to_engine_scale(100), 20);
    }

    #[test]
    fn engine_scale_never_leaves_bounds() {
        for value in 0..=100u8 {
            let scaled = to_engine_scale(value);
            assert!((1..=20).contains(&scaled), "{value} scaled to {scaled}");
        }
    }
}
