//! Synthesizer driver for the legacy DeltaTalk Brazilian-Portuguese TTS
//! engine.
//!
//! DeltaTalk ships as a closed dynamic library with a C calling convention.
//! This crate wraps it in a driver a screen-reader host can use:
//!
//! - **Engine binding**: loads the library at runtime and exposes its
//!   narrow `TTSENG_*` call surface behind the [`engine::SynthEngine`]
//!   trait.
//! - **Streaming pipeline**: a background worker turns each utterance into
//!   a continuous, cancelable PCM stream by driving the engine's
//!   multi-block generation protocol and feeding a cpal playback sink.
//! - **Fallback**: segments that cannot be streamed (queue full, audio
//!   device gone, generation error) fall back to the engine's own
//!   synchronous play/append path; failures there are logged and swallowed
//!   so the host's speech pipeline never aborts.
//!
//! The host drives the [`driver::DeltaTalkDriver`]: `speak` takes a
//! structured sequence of text and inline commands, and index-reached /
//! done-speaking notifications come back on the driver's event channel.

pub mod audio;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod text;

pub use audio::playback::{CpalSink, PlaybackSink};
pub use config::DriverConfig;
pub use driver::{DeltaTalkDriver, SpeechItem};
pub use engine::{DeltaTalkEngine, EngineCode, SynthEngine, Voice};
pub use error::{DriverError, Result};
pub use pipeline::messages::SynthEvent;
