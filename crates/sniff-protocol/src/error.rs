//! Error types for sniffer frame parsing and value validation

use thiserror::Error;

use crate::address::DeviceAddress;

/// Errors that can occur while decoding frames from the serial stream
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Buffer holds no complete frame yet - need more data
    #[error("incomplete frame")]
    Incomplete,

    /// Invalid frame structure; `discard` bytes at the front of the buffer
    /// must be dropped before decoding can resume
    #[error("invalid frame ({discard} bytes discarded): {reason}")]
    InvalidFrame { discard: usize, reason: String },
}

impl ParseError {
    pub(crate) fn invalid(discard: usize, reason: impl Into<String>) -> Self {
        Self::InvalidFrame {
            discard,
            reason: reason.into(),
        }
    }
}

/// Errors raised when validating values handed to the sniffer
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Hop sequence with no channels
    #[error("hop sequence must contain at least one channel")]
    EmptyHopSequence,

    /// Hop sequence longer than the three advertising channels
    #[error("hop sequence has {0} channels, at most 3 allowed")]
    HopSequenceTooLong(usize),

    /// Channel outside 37, 38, 39
    #[error("channel {0} is not an advertising channel (37, 38 or 39)")]
    InvalidChannel(u8),

    /// Channel listed twice
    #[error("channel {0} appears more than once in the hop sequence")]
    DuplicateChannel(u8),

    /// Temporary key of the wrong size
    #[error("temporary key must be 1 to 16 bytes, got {0}")]
    InvalidKeyLength(usize),

    /// Pairing passkey out of the six-digit range
    #[error("passkey {0} exceeds 999999")]
    InvalidPasskey(u32),

    /// Address string that is not six colon-separated hex octets
    #[error("invalid device address: {0}")]
    InvalidAddress(String),

    /// Device not present in the device list
    #[error("unknown device: {0}")]
    UnknownDevice(DeviceAddress),
}
