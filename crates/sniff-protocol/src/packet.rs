//! Decoded packets
//!
//! A [`Packet`] is created once by the codec and never mutated afterwards.
//! The engine shares packets as `Arc<Packet>`.

use std::time::SystemTime;

use crate::address::{AddressKind, DeviceAddress};
use crate::ble::{AdvPduType, BleEvent};
use crate::packet_id;
use crate::slip::Frame;

/// What a decoded packet represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    /// Advertising PDU (ADV_IND, ADV_DIRECT_IND, ADV_NONCONN_IND, ADV_SCAN_IND)
    Advertisement,
    /// SCAN_REQ
    ScanRequest,
    /// SCAN_RSP
    ScanResponse,
    /// CONNECT_REQ
    ConnectRequest,
    /// Data channel PDU
    Data,
    /// LL_TERMINATE_IND
    Terminate,
    /// Firmware lost the connection it was following
    LinkLoss,
    /// Answer to a ping request, carries the firmware version
    PingResponse,
    /// Firmware acknowledged a follow request
    FollowAck,
    /// Any other frame id
    Other(u8),
}

impl PacketKind {
    /// Short label for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::Advertisement => "advertisement",
            Self::ScanRequest => "scan request",
            Self::ScanResponse => "scan response",
            Self::ConnectRequest => "connect request",
            Self::Data => "data",
            Self::Terminate => "terminate",
            Self::LinkLoss => "link loss",
            Self::PingResponse => "ping response",
            Self::FollowAck => "follow ack",
            Self::Other(_) => "other",
        }
    }

    /// Whether the packet ends a followed connection
    pub fn ends_connection(&self) -> bool {
        matches!(self, Self::Terminate | Self::LinkLoss)
    }
}

/// A decoded packet from the sniffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    /// Device-reported packet counter (wraps at 65536)
    pub counter: u16,
    /// Host arrival time
    pub received_at: SystemTime,
    /// Frame packet id
    pub id: u8,
    /// Decoded type tag
    pub kind: PacketKind,
    /// Raw frame bytes as received (escaped, with delimiters)
    pub raw: Vec<u8>,
    /// Unescaped frame payload
    pub payload: Vec<u8>,
    /// Air packet details for BLE packet events
    pub ble: Option<BleEvent>,
    /// Advertiser address (AdvA), if the PDU carries one
    pub advertiser: Option<DeviceAddress>,
    /// Kind of the advertiser address
    pub address_kind: AddressKind,
    /// Advertised local name
    pub name: Option<String>,
}

impl Packet {
    /// Create a packet with no air details
    pub fn new(id: u8, counter: u16, kind: PacketKind, payload: Vec<u8>) -> Self {
        Self {
            counter,
            received_at: SystemTime::now(),
            id,
            kind,
            raw: Vec::new(),
            payload,
            ble: None,
            advertiser: None,
            address_kind: AddressKind::Public,
            name: None,
        }
    }

    /// Attach an advertiser address
    pub fn with_advertiser(mut self, address: DeviceAddress) -> Self {
        self.advertiser = Some(address);
        self
    }

    /// Interpret a decoded frame
    pub fn from_frame(frame: Frame, raw: Vec<u8>) -> Result<Self, String> {
        let mut packet = Packet::new(
            frame.id,
            frame.counter,
            PacketKind::Other(frame.id),
            Vec::new(),
        );
        packet.raw = raw;

        packet.kind = match frame.id {
            packet_id::EVENT_PACKET => {
                let event = BleEvent::parse(&frame.payload)?;
                let kind = match event.adv_pdu_type() {
                    Some(AdvPduType::ConnectReq) => PacketKind::ConnectRequest,
                    Some(AdvPduType::ScanReq) => PacketKind::ScanRequest,
                    Some(AdvPduType::ScanRsp) => PacketKind::ScanResponse,
                    Some(_) => PacketKind::Advertisement,
                    None if event.is_terminate() => PacketKind::Terminate,
                    None => PacketKind::Data,
                };
                if let Some((address, address_kind)) = event.advertiser() {
                    packet.advertiser = Some(address);
                    packet.address_kind = address_kind;
                }
                packet.name = event.local_name();
                packet.ble = Some(event);
                kind
            }
            packet_id::EVENT_DISCONNECT => PacketKind::LinkLoss,
            packet_id::PING_RESP => {
                if frame.payload.len() < 2 {
                    return Err("ping response without version".to_string());
                }
                PacketKind::PingResponse
            }
            packet_id::EVENT_FOLLOW => PacketKind::FollowAck,
            other => PacketKind::Other(other),
        };
        packet.payload = frame.payload;
        Ok(packet)
    }

    /// RF channel, for BLE packet events
    pub fn channel(&self) -> Option<u8> {
        self.ble.as_ref().map(|b| b.channel)
    }

    /// RSSI in dBm, for BLE packet events
    pub fn rssi(&self) -> Option<i8> {
        self.ble.as_ref().map(|b| b.rssi)
    }

    /// Whether the air packet passed its CRC check
    pub fn crc_ok(&self) -> bool {
        self.ble.as_ref().is_some_and(BleEvent::crc_ok)
    }

    /// Whether this packet advertises a device worth registering
    pub fn announces_device(&self) -> bool {
        matches!(
            self.kind,
            PacketKind::Advertisement | PacketKind::ScanResponse
        ) && self.advertiser.is_some()
    }

    /// Firmware version carried by a ping response
    pub fn firmware_version(&self) -> Option<u16> {
        match (self.kind, self.payload.as_slice()) {
            (PacketKind::PingResponse, [lo, hi, ..]) => Some(u16::from_le_bytes([*lo, *hi])),
            _ => None,
        }
    }
}
