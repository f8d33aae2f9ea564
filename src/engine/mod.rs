//! Binding layer for the proprietary DeltaTalk synthesis engine.
//!
//! The engine is a closed dynamic library with a C calling convention. This
//! module owns the narrow call surface the rest of the driver is allowed to
//! touch: a status-code table, the voice catalogue, and the [`SynthEngine`]
//! trait implemented by the real binding ([`DeltaTalkEngine`]) and by
//! scripted engines in tests.

pub mod binding;
pub mod codes;

pub use binding::DeltaTalkEngine;
pub use codes::EngineCode;

/// Result alias for calls that fail with a raw engine status code.
pub type EngineResult<T> = std::result::Result<T, EngineCode>;

use serde::{Deserialize, Serialize};

/// Generation mode passed to the engine's buffer-generation entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum GenMode {
    /// One-shot generation of a whole utterance into a single buffer.
    NewSimpleBlock = 0,
    /// First call of the stateful multi-block protocol.
    NewMultiBlock = 1,
    /// Continuation call of the multi-block protocol.
    NextBlock = 2,
}

/// Sample format for generated PCM. The driver only ever uses 16-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum SampleFormat {
    Bits16 = 0,
    Bits8 = 1,
    ULaw = 2,
    ALaw = 3,
}

/// DSP mode requested at engine initialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DspMode {
    #[default]
    Multimedia,
    Telephony,
}

impl DspMode {
    pub(crate) fn raw(self) -> i32 {
        match self {
            Self::Multimedia => 0,
            Self::Telephony => 1,
        }
    }
}

/// The three DeltaTalk voices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    /// Marcelo, the 16 kHz male voice.
    #[default]
    Marcelo,
    /// Paula, 22.05 kHz female voice.
    Paula,
    /// José, 22.05 kHz male voice.
    Jose,
}

impl Voice {
    /// All voices, in the order the host should list them.
    pub const ALL: [Voice; 3] = [Voice::Marcelo, Voice::Paula, Voice::Jose];

    /// Stable identifier used in configuration and by the host.
    pub fn id(self) -> &'static str {
        match self {
            Self::Marcelo => "br1",
            Self::Paula => "br2",
            Self::Jose => "br3",
        }
    }

    /// Human-readable name for voice pickers.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Marcelo => "DeltaTalk - Marcelo (16 kHz)",
            Self::Paula => "DeltaTalk - Paula (22 kHz)",
            Self::Jose => "DeltaTalk - José (22 kHz)",
        }
    }

    /// Voice index expected by the native `TTSENG_SetVoice` call.
    pub fn engine_id(self) -> i32 {
        match self {
            Self::Marcelo => 0,
            Self::Jose => 1,
            Self::Paula => 2,
        }
    }

    /// Output sample rate of PCM generated with this voice.
    pub fn sample_rate(self) -> u32 {
        match self {
            Self::Marcelo => 16_000,
            Self::Paula | Self::Jose => 22_050,
        }
    }

    /// Look a voice up by its stable identifier.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.id() == id)
    }
}

/// Outcome of a successful generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenStatus {
    /// A block was produced; the payload is the byte count written.
    Block(usize),
    /// The multi-block sequence is finished. Any bytes written by this
    /// final call still have to be flushed to playback.
    Finished(usize),
}

/// Narrow interface over the native engine.
///
/// Every method maps 1:1 to an engine entry point and reports the engine's
/// status code on failure. All calls are synchronous and block the calling
/// thread for the duration of the native call; no timeout is enforced here.
/// The engine mutates shared internal state on `set_params`/`set_voice`, so
/// concurrent calls from two threads are never safe. Callers serialize
/// through the driver's busy flag.
pub trait SynthEngine: Send + Sync {
    /// Apply the full rate/volume/pitch triple, on the engine's 1–20 scale.
    /// The native API only sets all three atomically, never individually.
    fn set_params(&self, rate: u8, volume: u8, pitch: u8) -> EngineResult<()>;

    /// Select the active voice.
    fn set_voice(&self, voice: Voice) -> EngineResult<()>;

    /// Drive one step of audio generation into `buf`.
    ///
    /// `text` is required for the `NewSimpleBlock`/`NewMultiBlock` modes and
    /// ignored for `NextBlock`. The buffer keeps the native 8-bit-signed
    /// representation; callers reinterpret bytes as unsigned before treating
    /// them as PCM.
    fn generate(
        &self,
        text: Option<&[u8]>,
        mode: GenMode,
        format: SampleFormat,
        buf: &mut [i8],
    ) -> EngineResult<GenStatus>;

    /// Speak `text` through the engine's own audio path.
    ///
    /// With `replace` set, any current speech is cut off first.
    fn play(&self, text: &[u8], replace: bool) -> EngineResult<()>;

    /// Append `text` to the engine's current utterance.
    fn append(&self, text: &[u8]) -> EngineResult<()>;

    /// Pause the engine's own playback.
    fn pause(&self) -> EngineResult<()>;

    /// Resume the engine's own playback.
    fn resume(&self) -> EngineResult<()>;

    /// Stop the engine's current utterance.
    fn stop(&self) -> EngineResult<()>;
}
