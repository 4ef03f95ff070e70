//! SLIP framing for the sniffer serial link
//!
//! # Frame Format
//! ```text
//! AB [header(6)] [payload...] BC      (escaped)
//! ```
//!
//! - `AB`: Start byte
//! - `header`: `[header_len, payload_len, protocol_version, counter_lo, counter_hi, packet_id]`
//! - `payload`: `payload_len` bytes
//! - `BC`: End byte
//!
//! Any start, end or escape byte inside the frame body is replaced by `CD`
//! followed by `AC`, `BD` or `CE` respectively.

use crate::error::ParseError;

/// Frame start byte
pub const SLIP_START: u8 = 0xAB;
/// Frame end byte
pub const SLIP_END: u8 = 0xBC;
/// Escape byte
pub const SLIP_ESC: u8 = 0xCD;
/// Escaped start byte
pub const SLIP_ESC_START: u8 = 0xAC;
/// Escaped end byte
pub const SLIP_ESC_END: u8 = 0xBD;
/// Escaped escape byte
pub const SLIP_ESC_ESC: u8 = 0xCE;

/// Length of the frame header
pub const HEADER_LEN: usize = 6;

/// Protocol version stamped on frames sent by the host
pub const PROTOCOL_VERSION: u8 = 2;

/// Maximum escaped frame length (reasonable limit to prevent buffer overflow)
const MAX_FRAME_LEN: usize = 1024;

/// A decoded (unescaped) frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Packet id (see [`crate::packet_id`])
    pub id: u8,
    /// Sender's wrapping packet counter
    pub counter: u16,
    /// Protocol version from the header
    pub protocol_version: u8,
    /// Frame payload
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a frame with the current protocol version
    pub fn new(id: u8, counter: u16, payload: Vec<u8>) -> Self {
        Self {
            id,
            counter,
            protocol_version: PROTOCOL_VERSION,
            payload,
        }
    }

    /// Encode to escaped wire bytes, start and end bytes included
    ///
    /// Payloads longer than 255 bytes are truncated to fit the length field.
    pub fn encode(&self) -> Vec<u8> {
        let payload = &self.payload[..self.payload.len().min(u8::MAX as usize)];
        let [counter_lo, counter_hi] = self.counter.to_le_bytes();
        let header = [
            HEADER_LEN as u8,
            payload.len() as u8,
            self.protocol_version,
            counter_lo,
            counter_hi,
            self.id,
        ];

        let mut out = Vec::with_capacity(2 + 2 * (HEADER_LEN + payload.len()));
        out.push(SLIP_START);
        for &byte in header.iter().chain(payload) {
            match byte {
                SLIP_START => out.extend_from_slice(&[SLIP_ESC, SLIP_ESC_START]),
                SLIP_END => out.extend_from_slice(&[SLIP_ESC, SLIP_ESC_END]),
                SLIP_ESC => out.extend_from_slice(&[SLIP_ESC, SLIP_ESC_ESC]),
                other => out.push(other),
            }
        }
        out.push(SLIP_END);
        out
    }

    /// Decode the first frame in `buf`
    ///
    /// Returns the frame and the number of bytes it occupied. On
    /// [`ParseError::InvalidFrame`] the caller drops `discard` bytes and
    /// retries; on [`ParseError::Incomplete`] it waits for more data.
    pub fn decode(buf: &[u8]) -> Result<(Frame, usize), ParseError> {
        let Some(start) = buf.iter().position(|&b| b == SLIP_START) else {
            if buf.is_empty() {
                return Err(ParseError::Incomplete);
            }
            return Err(ParseError::invalid(buf.len(), "no start byte"));
        };
        if start > 0 {
            return Err(ParseError::invalid(start, "bytes before start byte"));
        }

        let body = &buf[1..];
        let end = body.iter().position(|&b| b == SLIP_END);
        let restart = body.iter().position(|&b| b == SLIP_START);

        let end = match (end, restart) {
            // A new frame begins before this one ended; the current one is truncated.
            (Some(e), Some(r)) if r < e => {
                return Err(ParseError::invalid(r + 1, "truncated frame"));
            }
            (None, Some(r)) => {
                return Err(ParseError::invalid(r + 1, "truncated frame"));
            }
            (Some(e), _) => e,
            (None, None) => {
                if buf.len() > MAX_FRAME_LEN {
                    return Err(ParseError::invalid(buf.len(), "frame too long"));
                }
                return Err(ParseError::Incomplete);
            }
        };
        let consumed = end + 2;

        let raw =
            unescape(&body[..end]).ok_or_else(|| ParseError::invalid(consumed, "bad escape"))?;
        if raw.len() < HEADER_LEN {
            return Err(ParseError::invalid(consumed, "frame shorter than header"));
        }

        let header_len = raw[0] as usize;
        let payload_len = raw[1] as usize;
        if header_len < HEADER_LEN || header_len > raw.len() {
            return Err(ParseError::invalid(
                consumed,
                format!("bad header length {header_len}"),
            ));
        }
        if raw.len() - header_len != payload_len {
            return Err(ParseError::invalid(
                consumed,
                format!(
                    "payload length {} does not match header ({payload_len})",
                    raw.len() - header_len
                ),
            ));
        }

        let frame = Frame {
            id: raw[5],
            counter: u16::from_le_bytes([raw[3], raw[4]]),
            protocol_version: raw[2],
            payload: raw[header_len..].to_vec(),
        };
        Ok((frame, consumed))
    }
}

fn unescape(body: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(body.len());
    let mut iter = body.iter();
    while let Some(&byte) = iter.next() {
        if byte == SLIP_ESC {
            let decoded = match iter.next()? {
                &SLIP_ESC_START => SLIP_START,
                &SLIP_ESC_END => SLIP_END,
                &SLIP_ESC_ESC => SLIP_ESC,
                _ => return None,
            };
            out.push(decoded);
        } else {
            out.push(byte);
        }
    }
    Some(out)
}
