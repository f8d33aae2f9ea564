//! The speech queue worker.
//!
//! One dedicated thread per driver instance consumes the bounded speech
//! queue, drives the multi-block generator for each unit, and feeds the
//! playback sink. Failures never leave this thread: a unit that cannot be
//! streamed falls back to direct playback, and the remaining units of its
//! segment are dropped.

use crate::audio::playback::SharedSink;
use crate::config::{BusyWaitConfig, StreamingConfig};
use crate::engine::{EngineCode, SynthEngine};
use crate::pipeline::busy::BusyFlag;
use crate::pipeline::direct::speak_direct;
use crate::pipeline::generator::MultiBlockGenerator;
use crate::pipeline::messages::{AudioChunk, QueueItem, SpeechSegment};
use crate::text::split_units;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, warn};

/// Everything the worker thread needs to run.
pub(crate) struct WorkerContext {
    pub engine: Arc<dyn SynthEngine>,
    pub sink: SharedSink,
    pub busy: Arc<BusyFlag>,
    pub streaming: StreamingConfig,
    pub busy_wait: BusyWaitConfig,
}

/// Why a unit could not be streamed.
#[derive(Debug, thiserror::Error)]
enum StreamUnitError {
    #[error("busy flag wait expired")]
    BusyTimeout,
    #[error("generation failed: {0}")]
    Engine(EngineCode),
    #[error("sink rejected audio: {0}")]
    Sink(crate::error::DriverError),
}

/// Spawn the worker thread.
pub(crate) fn spawn(
    ctx: WorkerContext,
    rx: Receiver<QueueItem>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("dtalk-speech".to_owned())
        .spawn(move || run(ctx, rx))
}

fn run(ctx: WorkerContext, rx: Receiver<QueueItem>) {
    let pop_timeout = Duration::from_millis(ctx.streaming.pop_timeout_ms.max(1));
    debug!("speech worker started");
    loop {
        match rx.recv_timeout(pop_timeout) {
            Ok(QueueItem::Segment(segment)) => process_segment(&ctx, &segment),
            Ok(QueueItem::Shutdown) => break,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("speech worker exiting");
}

fn process_segment(ctx: &WorkerContext, segment: &SpeechSegment) {
    for unit in split_units(&segment.text, segment.index) {
        if let Err(e) = stream_unit(ctx, &unit) {
            warn!(
                "streaming failed for {:?} ({e}); falling back to direct playback",
                unit.text
            );
            speak_direct(&*ctx.engine, &ctx.busy, &ctx.busy_wait, &unit.text);
            // Remaining units of this segment are dropped with it.
            break;
        }
    }
}

fn stream_unit(
    ctx: &WorkerContext,
    unit: &SpeechSegment,
) -> Result<(), StreamUnitError> {
    let Some(_guard) = ctx.busy.acquire_within(&ctx.busy_wait) else {
        return Err(StreamUnitError::BusyTimeout);
    };

    let mut generator =
        MultiBlockGenerator::new(&*ctx.engine, &unit.text, ctx.streaming.buffer_size);
    let delay = Duration::from_millis(ctx.streaming.block_delay_ms);
    let mut index = unit.index;

    loop {
        match generator.next_block() {
            Ok(Some(pcm)) => {
                if !pcm.is_empty() {
                    let chunk = AudioChunk {
                        pcm,
                        index: index.take(),
                    };
                    feed_sink(ctx, chunk)?;
                }
                // Pace generation so it doesn't spin ahead of playback.
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }
            Ok(None) => return Ok(()),
            Err(code) => return Err(StreamUnitError::Engine(code)),
        }
    }
}

fn feed_sink(ctx: &WorkerContext, chunk: AudioChunk) -> Result<(), StreamUnitError> {
    let mut sink = ctx
        .sink
        .lock()
        .map_err(|_| StreamUnitError::Sink(crate::error::DriverError::Audio(
            "sink lock poisoned".to_owned(),
        )))?;
    sink.feed(chunk).map_err(StreamUnitError::Sink)
}
