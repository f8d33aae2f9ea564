//! Audio playback to system speakers via cpal.
//!
//! The sink accepts 16-bit PCM buffers from the worker and reports, on the
//! driver's event channel, when a buffer carrying an index marker has
//! finished playing. A dedicated audio thread owns the `cpal::Stream`;
//! `feed` and `stop` only touch the shared pending-buffer queue, so they
//! are safe to call from the worker and the host thread concurrently.

use crate::config::AudioConfig;
use crate::error::{DriverError, Result};
use crate::pipeline::messages::{AudioChunk, SynthEvent};
use cpal::StreamConfig;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::{Receiver, Sender};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Abstraction over audio output.
///
/// Implementations are internally thread-safe: `feed` runs on the worker
/// thread while `pause`/`stop` may arrive from the host thread during
/// cancellation. Completion is reported asynchronously on the driver's
/// event channel, never from inside `feed`.
pub trait PlaybackSink: Send {
    /// Queue PCM for playback.
    ///
    /// # Errors
    ///
    /// Returns an error if the sink can no longer accept audio.
    fn feed(&mut self, chunk: AudioChunk) -> Result<()>;

    /// Pause or resume playback. Idempotent.
    fn pause(&mut self, paused: bool);

    /// Discard all pending audio. Buffers dropped here never report
    /// completion. Idempotent.
    fn stop(&mut self);

    /// Retarget the sink to a new sample rate, discarding in-flight audio.
    ///
    /// # Errors
    ///
    /// Returns an error if the output stream cannot be rebuilt; the sink is
    /// unusable afterwards and the caller should drop to direct playback.
    fn set_sample_rate(&mut self, sample_rate: u32) -> Result<()>;

    /// The sample rate the sink currently plays at.
    fn sample_rate(&self) -> u32;
}

/// The sink as shared between the driver and the worker thread.
pub type SharedSink = Arc<Mutex<Box<dyn PlaybackSink>>>;

/// A fed buffer waiting to be drained by the stream callback.
struct PendingBuffer {
    samples: Vec<f32>,
    position: usize,
    index: Option<u32>,
}

/// State shared with the stream callback.
struct SinkShared {
    queue: Mutex<VecDeque<PendingBuffer>>,
    events: Sender<SynthEvent>,
}

impl SinkShared {
    fn clear(&self) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.clear();
        }
    }
}

enum SinkCommand {
    Pause(bool),
    SetRate { sample_rate: u32, ack: Sender<Result<()>> },
    Close,
}

/// Audio playback to system speakers via cpal.
pub struct CpalSink {
    shared: Arc<SinkShared>,
    cmd_tx: Sender<SinkCommand>,
    thread: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl CpalSink {
    /// Create a sink playing at `sample_rate` on the configured device.
    ///
    /// # Errors
    ///
    /// Returns an error if the output device is unavailable or the stream
    /// cannot be created.
    pub fn new(
        config: &AudioConfig,
        sample_rate: u32,
        events: Sender<SynthEvent>,
    ) -> Result<Self> {
        let shared = Arc::new(SinkShared {
            queue: Mutex::new(VecDeque::new()),
            events,
        });
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let thread = {
            let shared = Arc::clone(&shared);
            let device_name = config.output_device.clone();
            std::thread::Builder::new()
                .name("dtalk-audio".to_owned())
                .spawn(move || {
                    run_audio_thread(device_name, sample_rate, &shared, &cmd_rx, &ready_tx);
                })?
        };

        match ready_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => Ok(Self {
                shared,
                cmd_tx,
                thread: Some(thread),
                sample_rate,
            }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(DriverError::Audio(
                "audio thread did not come up".to_owned(),
            )),
        }
    }
}

impl PlaybackSink for CpalSink {
    fn feed(&mut self, chunk: AudioChunk) -> Result<()> {
        let samples = pcm_to_f32(&chunk.pcm);
        let mut queue = self
            .shared
            .queue
            .lock()
            .map_err(|e| DriverError::Audio(format!("pending queue lock poisoned: {e}")))?;
        queue.push_back(PendingBuffer {
            samples,
            position: 0,
            index: chunk.index,
        });
        Ok(())
    }

    fn pause(&mut self, paused: bool) {
        if self.cmd_tx.send(SinkCommand::Pause(paused)).is_err() {
            warn!("audio thread gone, cannot pause/resume");
        }
    }

    fn stop(&mut self) {
        self.shared.clear();
    }

    fn set_sample_rate(&mut self, sample_rate: u32) -> Result<()> {
        if sample_rate == self.sample_rate {
            return Ok(());
        }
        let (ack_tx, ack_rx) = crossbeam_channel::bounded(1);
        self.cmd_tx
            .send(SinkCommand::SetRate {
                sample_rate,
                ack: ack_tx,
            })
            .map_err(|_| DriverError::Audio("audio thread gone".to_owned()))?;
        match ack_rx.recv_timeout(Duration::from_secs(5)) {
            Ok(Ok(())) => {
                self.sample_rate = sample_rate;
                Ok(())
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(DriverError::Audio(
                "audio thread did not acknowledge rate change".to_owned(),
            )),
        }
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(SinkCommand::Close);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn run_audio_thread(
    device_name: Option<String>,
    sample_rate: u32,
    shared: &Arc<SinkShared>,
    cmd_rx: &Receiver<SinkCommand>,
    ready_tx: &Sender<Result<()>>,
) {
    let mut stream = match build_stream(device_name.as_deref(), sample_rate, shared) {
        Ok(stream) => {
            let _ = ready_tx.send(Ok(()));
            stream
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
            return;
        }
    };

    while let Ok(cmd) = cmd_rx.recv() {
        match cmd {
            SinkCommand::Pause(true) => {
                if let Err(e) = stream.pause() {
                    warn!("cannot pause output stream: {e}");
                }
            }
            SinkCommand::Pause(false) => {
                if let Err(e) = stream.play() {
                    warn!("cannot resume output stream: {e}");
                }
            }
            SinkCommand::SetRate {
                sample_rate,
                ack,
            } => {
                // In-flight buffers are discarded with the old stream.
                shared.clear();
                drop(stream);
                match build_stream(device_name.as_deref(), sample_rate, shared) {
                    Ok(new_stream) => {
                        stream = new_stream;
                        let _ = ack.send(Ok(()));
                    }
                    Err(e) => {
                        error!("cannot rebuild output stream: {e}");
                        let _ = ack.send(Err(e));
                        return;
                    }
                }
            }
            SinkCommand::Close => break,
        }
    }

    shared.clear();
    debug!("audio thread exiting");
}

fn build_stream(
    device_name: Option<&str>,
    sample_rate: u32,
    shared: &Arc<SinkShared>,
) -> Result<cpal::Stream> {
    let host = cpal::default_host();

    let device = if let Some(name) = device_name {
        host.output_devices()
            .map_err(|e| DriverError::Audio(format!("cannot enumerate devices: {e}")))?
            .find(|d| {
                d.description()
                    .ok()
                    .map(|desc| desc.name() == name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| DriverError::Audio(format!("output device '{name}' not found")))?
    } else {
        host.default_output_device()
            .ok_or_else(|| DriverError::Audio("no default output device".into()))?
    };

    let device_name = device
        .description()
        .map(|d| d.name().to_owned())
        .unwrap_or_else(|_| "<unknown>".into());
    info!("using output device: {device_name} at {sample_rate} Hz");

    let stream_config = StreamConfig {
        channels: 1,
        sample_rate,
        buffer_size: cpal::BufferSize::Default,
    };

    let callback_shared = Arc::clone(shared);
    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                let mut queue = match callback_shared.queue.lock() {
                    Ok(q) => q,
                    Err(_) => return,
                };
                for sample in data.iter_mut() {
                    *sample = next_sample(&mut queue, &callback_shared.events);
                }
            },
            move |err| {
                error!("audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| DriverError::Audio(format!("failed to build output stream: {e}")))?;

    stream
        .play()
        .map_err(|e| DriverError::Audio(format!("failed to start output stream: {e}")))?;

    Ok(stream)
}

/// Pull the next sample, retiring drained buffers and reporting their
/// index markers.
fn next_sample(queue: &mut VecDeque<PendingBuffer>, events: &Sender<SynthEvent>) -> f32 {
    while let Some(front) = queue.front_mut() {
        if front.position < front.samples.len() {
            let sample = front.samples[front.position];
            front.position += 1;
            if front.position == front.samples.len() {
                retire(queue, events);
            }
            return sample;
        }
        retire(queue, events);
    }
    0.0
}

fn retire(queue: &mut VecDeque<PendingBuffer>, events: &Sender<SynthEvent>) {
    if let Some(done) = queue.pop_front()
        && let Some(index) = done.index
    {
        let _ = events.send(SynthEvent::IndexReached(index));
    }
}

/// Decode 16-bit little-endian PCM into f32 samples.
fn pcm_to_f32(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(2)
        .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0)
        .collect()
}
