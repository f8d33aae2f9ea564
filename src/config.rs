//! Configuration types for the synthesizer driver.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::engine::DspMode;

/// Top-level configuration for the driver.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Native engine settings.
    pub engine: EngineConfig,
    /// Audio output settings.
    pub audio: AudioConfig,
    /// Streaming playback settings.
    pub streaming: StreamingConfig,
    /// Busy-flag wait behaviour.
    pub busy_wait: BusyWaitConfig,
}

impl DriverConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> crate::error::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw)
            .map_err(|e| crate::error::DriverError::Config(format!("cannot parse config: {e}")))
    }
}

/// Native engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Path to the engine dynamic library (None = look next to the executable).
    pub library: Option<PathBuf>,
    /// DSP mode requested at engine initialization.
    pub dsp_mode: DspMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            library: None,
            dsp_mode: DspMode::Multimedia,
        }
    }
}

/// Audio output configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Output device name (None = system default).
    pub output_device: Option<String>,
}

/// Streaming playback configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamingConfig {
    /// Whether streamed (queued) playback is enabled. When disabled, every
    /// utterance goes through the engine's own play/append entry points.
    pub enabled: bool,
    /// Depth of the speech queue between the driver and the worker.
    pub queue_capacity: usize,
    /// Capacity in bytes of the buffer handed to each generation call.
    pub buffer_size: usize,
    /// Pacing delay between generation calls, in milliseconds.
    ///
    /// Keeps the generator from spinning far ahead of playback consumption.
    pub block_delay_ms: u64,
    /// Worker queue-pop timeout in milliseconds, so shutdown stays observable.
    pub pop_timeout_ms: u64,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 50,
            buffer_size: 16 * 1024,
            block_delay_ms: 50,
            pop_timeout_ms: 1000,
        }
    }
}

/// Busy-flag wait configuration.
///
/// The busy flag is a soft mutual exclusion: a caller that outwaits the
/// ceiling proceeds anyway and logs a warning. The legacy engine has no
/// cancellable blocking call, so a hard lock could wedge the host forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BusyWaitConfig {
    /// Maximum time to wait for the flag, in milliseconds.
    pub timeout_ms: u64,
    /// Polling interval while waiting, in milliseconds.
    pub poll_ms: u64,
}

impl Default for BusyWaitConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 2000,
            poll_ms: 10,
        }
    }
}
