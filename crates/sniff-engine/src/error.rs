//! Error types for the acquisition engine

use thiserror::Error;

pub use sniff_protocol::ConfigError;

/// Errors raised by the serial transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// No port configured
    #[error("no serial port configured")]
    NoPort,

    /// Failed to open the port
    #[error("failed to open port {port}: {reason}")]
    OpenFailed { port: String, reason: String },

    /// Transport already handed out its stream
    #[error("transport {0} is already in use")]
    Unavailable(String),

    /// Device closed the link
    #[error("device disconnected")]
    Disconnected,

    /// I/O error mid-session
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by the sniffer command surface
#[derive(Debug, Error)]
pub enum SnifferError {
    /// A command argument failed validation; engine state is untouched
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(#[from] ConfigError),

    /// `start` called on a sniffer that already ran
    #[error("sniffer already started")]
    AlreadyStarted,

    /// No tokio runtime to spawn the worker on
    #[error("no tokio runtime available: {0}")]
    NoRuntime(String),

    /// Configuration file I/O failure
    #[error("config file I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file is not valid JSON
    #[error("config file format error: {0}")]
    Json(#[from] serde_json::Error),
}
