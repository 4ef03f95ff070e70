//! Byte transports the worker reads from
//!
//! The worker only needs an `AsyncRead + AsyncWrite` stream. Real hardware is
//! reached through [`SerialTransport`]; tests and virtual devices hand over a
//! pre-built stream (typically one end of `tokio::io::duplex()`) through
//! [`StreamTransport`].

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

use crate::error::TransportError;

/// Opens the byte stream for a session
pub trait Transport: Send + 'static {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Open `port` at `baud_rate`
    fn open(&mut self, port: &str, baud_rate: u32) -> Result<Self::Io, TransportError>;

    /// Port name to use when none is configured
    fn default_port(&self) -> Option<String> {
        None
    }
}

/// Serial port transport backed by tokio-serial
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialTransport;

impl Transport for SerialTransport {
    type Io = SerialStream;

    fn open(&mut self, port: &str, baud_rate: u32) -> Result<SerialStream, TransportError> {
        if port.is_empty() {
            return Err(TransportError::NoPort);
        }
        debug!("Opening {} at {} baud", port, baud_rate);
        tokio_serial::new(port, baud_rate)
            .timeout(Duration::from_millis(100))
            .open_native_async()
            .map_err(|e| TransportError::OpenFailed {
                port: port.to_string(),
                reason: e.to_string(),
            })
    }
}

/// Transport that hands out one pre-built stream
///
/// The stream can be opened once; a second `open` fails with
/// [`TransportError::Unavailable`].
#[derive(Debug)]
pub struct StreamTransport<S> {
    name: String,
    stream: Option<S>,
}

impl<S> StreamTransport<S> {
    pub fn new(name: impl Into<String>, stream: S) -> Self {
        Self {
            name: name.into(),
            stream: Some(stream),
        }
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    type Io = S;

    fn open(&mut self, port: &str, _baud_rate: u32) -> Result<S, TransportError> {
        debug!("Handing out stream {} for port {}", self.name, port);
        self.stream
            .take()
            .ok_or_else(|| TransportError::Unavailable(self.name.clone()))
    }

    fn default_port(&self) -> Option<String> {
        Some(self.name.clone())
    }
}
