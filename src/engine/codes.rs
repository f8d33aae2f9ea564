//! The engine's closed status-code table.
//!
//! Every native entry point returns one of these codes. `PcmFinished` is not
//! an error: it is the terminal signal of the multi-block protocol.

/// Status code reported by the native engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCode {
    NotInitialized,
    Busy,
    BadCommand,
    DspInitError,
    FileOpenError,
    FileWriteError,
    EngineInitError,
    MemAllocError,
    WaveOutBusy,
    WaveOutOpenError,
    WaveOutWriteError,
    WaveOutFormatError,
    WaveOutNotAvailable,
    WaveOutError,
    WaveOutMemAllocError,
    ValueOutOfRange,
    /// Terminal signal of the multi-block protocol, not an error.
    PcmFinished,
    SignalError,
    DspNotFound,
    ProsodyInitError,
    NoLicense,
    /// A code outside the documented table.
    Unknown(i32),
}

impl EngineCode {
    /// Map a raw return value: 0 is success, everything else is a code.
    pub fn check(raw: i32) -> Result<(), EngineCode> {
        if raw == 0 {
            Ok(())
        } else {
            Err(Self::from_raw(raw))
        }
    }

    /// Decode a non-zero raw return value.
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            -1 => Self::NotInitialized,
            -2 => Self::Busy,
            -3 => Self::BadCommand,
            -4 => Self::DspInitError,
            -5 => Self::FileOpenError,
            -6 => Self::FileWriteError,
            -7 => Self::EngineInitError,
            -8 => Self::MemAllocError,
            -9 => Self::WaveOutBusy,
            -10 => Self::WaveOutOpenError,
            -11 => Self::WaveOutWriteError,
            -12 => Self::WaveOutFormatError,
            -13 => Self::WaveOutNotAvailable,
            -14 => Self::WaveOutError,
            -15 => Self::WaveOutMemAllocError,
            -16 => Self::ValueOutOfRange,
            -17 => Self::PcmFinished,
            -100 => Self::SignalError,
            -103 => Self::DspNotFound,
            -104 => Self::ProsodyInitError,
            -106 => Self::NoLicense,
            other => Self::Unknown(other),
        }
    }

    /// The raw integer value of this code.
    pub fn raw(self) -> i32 {
        match self {
            Self::NotInitialized => -1,
            Self::Busy => -2,
            Self::BadCommand => -3,
            Self::DspInitError => -4,
            Self::FileOpenError => -5,
            Self::FileWriteError => -6,
            Self::EngineInitError => -7,
            Self::MemAllocError => -8,
            Self::WaveOutBusy => -9,
            Self::WaveOutOpenError => -10,
            Self::WaveOutWriteError => -11,
            Self::WaveOutFormatError => -12,
            Self::WaveOutNotAvailable => -13,
            Self::WaveOutError => -14,
            Self::WaveOutMemAllocError => -15,
            Self::ValueOutOfRange => -16,
            Self::PcmFinished => -17,
            Self::SignalError => -100,
            Self::DspNotFound => -103,
            Self::ProsodyInitError => -104,
            Self::NoLicense => -106,
            Self::Unknown(raw) => raw,
        }
    }

    /// The engine's literal constant name for this code.
    pub fn literal(self) -> &'static str {
        match self {
            Self::NotInitialized => "TTS_NOT_INITIALIZED",
            Self::Busy => "TTS_BUSY",
            Self::BadCommand => "TTS_BAD_COMMAND",
            Self::DspInitError => "TTS_DSP_INIT_ERROR",
            Self::FileOpenError => "TTS_FILE_OPEN_ERROR",
            Self::FileWriteError => "TTS_FILE_WRITE_ERROR",
            Self::EngineInitError => "TTS_INIT_ENGINE_ERROR",
            Self::MemAllocError => "TTS_MEM_ALLOC_ERROR",
            Self::WaveOutBusy => "TTS_WAVEOUT_BUSY",
            Self::WaveOutOpenError => "TTS_WAVEOUT_OPEN_ERROR",
            Self::WaveOutWriteError => "TTS_WAVEOUT_WRITE_ERROR",
            Self::WaveOutFormatError => "TTS_WAVEOUT_FORMAT_ERROR",
            Self::WaveOutNotAvailable => "TTS_WAVEOUT_NOT_AVAILABLE",
            Self::WaveOutError => "TTS_WAVEOUT_ERROR",
            Self::WaveOutMemAllocError => "TTS_WAVEOUT_MEM_ALLOC_ERROR",
            Self::ValueOutOfRange => "TTS_VALUE_OUT_OF_RANGE",
            Self::PcmFinished => "TTS_PCM_FINISHED",
            Self::SignalError => "TTS_MBR_ERROR",
            Self::DspNotFound => "TTS_DSP_NOT_FOUND",
            Self::ProsodyInitError => "TTS_PROSODY_INIT_ERROR",
            Self::NoLicense => "TTS_NO_LICENSE",
            Self::Unknown(_) => "TTS_UNKNOWN",
        }
    }

    /// Human-readable description, suitable for log lines.
    pub fn description(self) -> &'static str {
        match self {
            Self::NotInitialized => "the synthesizer is not initialized",
            Self::Busy => "the synthesizer is busy processing another task",
            Self::BadCommand => "invalid command issued to the synthesizer",
            Self::DspInitError => "failed to initialize the audio processing subsystem",
            Self::FileOpenError => "failed to open a required file",
            Self::FileWriteError => "failed to write to the specified file",
            Self::EngineInitError => "failed to initialize the synthesizer engine",
            Self::MemAllocError => "insufficient memory to process the request",
            Self::WaveOutBusy => "the audio device is already in use by another program",
            Self::WaveOutOpenError => "failed to open the audio device",
            Self::WaveOutWriteError => "failed to send an audio buffer to the sound card",
            Self::WaveOutFormatError => "audio format not supported by the sound card",
            Self::WaveOutNotAvailable => "the audio output device is not available",
            Self::WaveOutError => "error communicating with the sound card driver",
            Self::WaveOutMemAllocError => "insufficient memory to store synthesized audio",
            Self::ValueOutOfRange => "the provided value is out of range",
            Self::PcmFinished => "PCM audio processing completed",
            Self::SignalError => "internal signal processing error",
            Self::DspNotFound => "DSP file not found",
            Self::ProsodyInitError => "prosody modeling file not found",
            Self::NoLicense => "the engine's simultaneous-instance limit was exceeded",
            Self::Unknown(_) => "unknown engine error",
        }
    }

    /// Whether this code is the multi-block terminal signal.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::PcmFinished)
    }
}

impl std::fmt::Display for EngineCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}): {}",
            self.literal(),
            self.raw(),
            self.description()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_success() {
        assert!(EngineCode::check(0).is_ok());
    }

    #[test]
    fn table_round_trips() {
        for raw in [
            -1, -2, -3, -4, -5, -6, -7, -8, -9, -10, -11, -12, -13, -14, -15, -16, -17, -100,
            -103, -104, -106,
        ] {
            let code = EngineCode::from_raw(raw);
            assert_eq!(code.raw(), raw);
            assert!(!matches!(code, EngineCode::Unknown(_)));
        }
    }

    #[test]
    fn undocumented_codes_fall_back_to_unknown() {
        let code = EngineCode::from_raw(-42);
        assert_eq!(code, EngineCode::Unknown(-42));
        assert_eq!(code.raw(), -42);
        assert_eq!(code.literal(), "TTS_UNKNOWN");
    }

    #[test]
    fn pcm_finished_is_a_signal_not_an_error() {
        let code = EngineCode::from_raw(-17);
        assert!(code.is_finished());
        assert_eq!(code.literal(), "TTS_PCM_FINISHED");
    }

    #[test]
    fn display_carries_literal_and_raw_code() {
        let rendered = EngineCode::Busy.to_string();
        assert!(rendered.contains("TTS_BUSY"));
        assert!(rendered.contains("-2"));
    }
}
