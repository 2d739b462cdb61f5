//! Error types for the bobbin relay.

use std::time::Duration;

/// Top-level error type for the relay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Process error: {0}")]
    Process(#[from] ProcessError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chat channel errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel {name} failed to start: {reason}")]
    StartupFailed { name: String, reason: String },

    #[error("Failed to send response on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },
}

/// Which side of the emulator pipeline an I/O error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeStage {
    Stdin,
    Stdout,
    Stderr,
    Wait,
}

impl std::fmt::Display for PipeStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PipeStage::Stdin => "stdin",
            PipeStage::Stdout => "stdout",
            PipeStage::Stderr => "stderr",
            PipeStage::Wait => "wait",
        };
        f.write_str(s)
    }
}

/// Emulator subprocess errors.
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Emulator I/O failed on {stage}: {source}")]
    Io {
        stage: PipeStage,
        #[source]
        source: std::io::Error,
    },

    #[error("Emulator timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

/// Result type alias for the relay.
pub type Result<T> = std::result::Result<T, Error>;
