//! BLE Sniffer Protocol Library
//!
//! This crate provides the data model and wire codec for talking to BLE
//! sniffer firmware over a serial link:
//!
//! - **SLIP framing**: byte-stuffed frames with a 6-byte header carrying the
//!   firmware's wrapping packet counter
//! - **Packets**: decoded, immutable records of what the firmware reported
//!   (advertisements, connect requests, data, terminations, link loss, pings)
//! - **Host requests**: scan, follow, temporary key, advertising hop sequence
//! - **Validated values**: [`DeviceAddress`], [`HopSequence`], [`TemporaryKey`]
//!
//! # Architecture
//!
//! The engine talks to the wire only through the [`PacketCodec`] trait.
//! [`SlipCodec`] is the implementation for the sniffer firmware; tests and
//! alternative firmware can bring their own.
//!
//! # Example
//!
//! ```rust
//! use sniff_protocol::{packet_id, Frame, PacketCodec, PacketKind, SlipCodec};
//!
//! let mut codec = SlipCodec::new();
//! let bytes = Frame::new(packet_id::PING_RESP, 7, vec![0x02, 0x01]).encode();
//!
//! let (packet, used) = codec.decode(&bytes).unwrap();
//! assert_eq!(used, bytes.len());
//! assert_eq!(packet.kind, PacketKind::PingResponse);
//! assert_eq!(packet.firmware_version(), Some(0x0102));
//! ```

pub mod address;
pub mod ble;
pub mod codec;
pub mod error;
pub mod hop;
pub mod key;
pub mod packet;
pub mod request;
pub mod slip;

pub use address::{AddressKind, DeviceAddress};
pub use ble::{AdvPduType, BleEvent};
pub use codec::SlipCodec;
pub use error::{ConfigError, ParseError};
pub use hop::{AdvChannel, HopSequence};
pub use key::TemporaryKey;
pub use packet::{Packet, PacketKind};
pub use request::HostRequest;
pub use slip::Frame;

/// Frame packet ids
pub mod packet_id {
    /// Host → firmware: follow a device
    pub const REQ_FOLLOW: u8 = 0x00;
    /// Firmware → host: follow acknowledged
    pub const EVENT_FOLLOW: u8 = 0x01;
    /// Firmware → host: connection event
    pub const EVENT_CONNECT: u8 = 0x05;
    /// Firmware → host: sniffed BLE packet
    pub const EVENT_PACKET: u8 = 0x06;
    /// Host → firmware: scan continuously
    pub const REQ_SCAN_CONT: u8 = 0x07;
    /// Firmware → host: followed connection lost
    pub const EVENT_DISCONNECT: u8 = 0x09;
    /// Host → firmware: temporary key
    pub const SET_TEMPORARY_KEY: u8 = 0x0C;
    /// Host → firmware: ping
    pub const PING_REQ: u8 = 0x0D;
    /// Firmware → host: ping answer with firmware version
    pub const PING_RESP: u8 = 0x0E;
    /// Host → firmware: advertising channel hop order
    pub const SET_ADV_CHANNEL_HOP_SEQ: u8 = 0x17;
    /// Host → firmware: stop sniffing
    pub const GO_IDLE: u8 = 0xFE;
}

/// Trait for codecs that turn serial bytes into packets and requests into bytes
pub trait PacketCodec: Send {
    /// Decode the first packet in `buf`
    ///
    /// Returns the packet and the number of bytes it occupied.
    /// [`ParseError::Incomplete`] means the buffer holds no complete frame yet;
    /// [`ParseError::InvalidFrame`] tells the caller how many bytes to drop.
    fn decode(&mut self, buf: &[u8]) -> Result<(Packet, usize), ParseError>;

    /// Encode a host request to wire bytes
    fn encode(&mut self, request: &HostRequest) -> Vec<u8>;

    /// Encode an advertising hop sequence request
    fn encode_hop_sequence(&mut self, sequence: &HopSequence) -> Vec<u8> {
        self.encode(&HostRequest::SetAdvHopSequence(sequence.clone()))
    }

    /// Encode a temporary key request
    fn encode_tk(&mut self, key: &TemporaryKey) -> Vec<u8> {
        self.encode(&HostRequest::SetTemporaryKey(*key))
    }
}
