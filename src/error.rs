//! Error types for the synthesizer driver.

use crate::engine::EngineCode;

/// Top-level error type for the DeltaTalk driver.
#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The native engine reported a status code.
    #[error("engine error: {0}")]
    Engine(EngineCode),

    /// The engine library could not be loaded or is missing a symbol.
    #[error("binding error: {0}")]
    Binding(String),

    /// Audio device or stream error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EngineCode> for DriverError {
    fn from(code: EngineCode) -> Self {
        Self::Engine(code)
    }
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, DriverError>;
