//! Virtual sniffer device
//!
//! Models the firmware side of the serial link: it keeps its own wrapping
//! packet counter, encodes scripted air traffic as device frames, and decodes
//! the host's requests.

use std::collections::VecDeque;

use sniff_protocol::ble::{BleEvent, ADVERTISING_ACCESS_ADDRESS, FLAG_CRC_OK, LL_TERMINATE_IND};
use sniff_protocol::{
    packet_id, DeviceAddress, Frame, HopSequence, HostRequest, ParseError, TemporaryKey,
};
use tracing::{debug, warn};

/// Access address the simulated connection uses after a CONNECT_REQ
pub const SIM_CONNECTION_ACCESS_ADDRESS: u32 = 0x5065_A1B2;

/// Firmware version reported in ping responses unless overridden
pub const DEFAULT_FW_VERSION: u16 = 0x0104;

/// Longest advertised name that fits the advertising data
const MAX_NAME_LEN: usize = 29;

/// Traffic the virtual sniffer can be told to report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// ADV_IND from `address`, optionally carrying a complete local name
    Advertise {
        address: DeviceAddress,
        name: Option<String>,
    },
    /// CONNECT_REQ from `initiator` to `advertiser`
    ConnectRequest {
        initiator: DeviceAddress,
        advertiser: DeviceAddress,
    },
    /// Data channel PDU on the simulated connection
    Data { payload: Vec<u8> },
    /// LL_TERMINATE_IND on the simulated connection
    Terminate,
    /// Firmware lost the followed connection
    LinkLoss,
    /// Advance the packet counter without sending, as if frames were lost
    SkipCounter(u16),
    /// Raw bytes written as-is
    Garbage(Vec<u8>),
}

/// A simulated sniffer board
#[derive(Debug)]
pub struct VirtualSniffer {
    id: String,
    fw_version: u16,
    counter: u16,
    rssi: i8,
    hop_sequence: HopSequence,
    hop_index: usize,
    temporary_key: Option<TemporaryKey>,
    follow: Option<(DeviceAddress, bool)>,
    scanning: bool,
    idle: bool,
    /// Every request decoded from the host, in order
    requests: Vec<HostRequest>,
    /// Host bytes not yet decoded
    rx: Vec<u8>,
    /// Encoded frames waiting to be written to the host
    pending_output: VecDeque<Vec<u8>>,
}

impl VirtualSniffer {
    /// Create a sniffer whose first frame carries counter 0
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            fw_version: DEFAULT_FW_VERSION,
            counter: 0,
            rssi: -60,
            hop_sequence: HopSequence::default(),
            hop_index: 0,
            temporary_key: None,
            follow: None,
            scanning: false,
            idle: true,
            requests: Vec::new(),
            rx: Vec::new(),
            pending_output: VecDeque::new(),
        }
    }

    /// Set the counter the next frame will carry
    pub fn with_counter(mut self, counter: u16) -> Self {
        self.counter = counter;
        self
    }

    pub fn with_fw_version(mut self, version: u16) -> Self {
        self.fw_version = version;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn fw_version(&self) -> u16 {
        self.fw_version
    }

    /// Counter the next frame will carry
    pub fn counter(&self) -> u16 {
        self.counter
    }

    pub fn set_counter(&mut self, counter: u16) {
        self.counter = counter;
    }

    pub fn set_rssi(&mut self, rssi: i8) {
        self.rssi = rssi;
    }

    pub fn hop_sequence(&self) -> &HopSequence {
        &self.hop_sequence
    }

    pub fn temporary_key(&self) -> Option<TemporaryKey> {
        self.temporary_key
    }

    /// Followed address and its advertisements-only flag
    pub fn follow_target(&self) -> Option<(DeviceAddress, bool)> {
        self.follow
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning
    }

    pub fn is_idle(&self) -> bool {
        self.idle
    }

    pub fn requests(&self) -> &[HostRequest] {
        &self.requests
    }

    /// Encode `event` and queue the resulting bytes
    pub fn emit(&mut self, event: SimEvent) {
        match event {
            SimEvent::Advertise { address, name } => {
                let mut pdu = address.to_air().to_vec();
                // Flags: LE general discoverable, BR/EDR not supported
                pdu.extend_from_slice(&[0x02, 0x01, 0x06]);
                if let Some(name) = name {
                    let bytes = &name.as_bytes()[..name.len().min(MAX_NAME_LEN)];
                    pdu.push(bytes.len() as u8 + 1);
                    pdu.push(0x09);
                    pdu.extend_from_slice(bytes);
                }
                let channel = self.next_adv_channel();
                self.push_air_packet(channel, ADVERTISING_ACCESS_ADDRESS, 0x00, pdu);
            }
            SimEvent::ConnectRequest {
                initiator,
                advertiser,
            } => {
                let mut pdu = initiator.to_air().to_vec();
                pdu.extend_from_slice(&advertiser.to_air());
                // LLData: access address, CRC init, window, interval, latency,
                // timeout, channel map, hop/SCA
                pdu.extend_from_slice(&SIM_CONNECTION_ACCESS_ADDRESS.to_le_bytes());
                pdu.extend_from_slice(&[0x55, 0x55, 0x55, 0x03, 0x09, 0x00, 0x18, 0x00]);
                pdu.extend_from_slice(&[0x00, 0x00, 0xC8, 0x00]);
                pdu.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F, 0x25]);
                let channel = self.next_adv_channel();
                self.push_air_packet(channel, ADVERTISING_ACCESS_ADDRESS, 0x05, pdu);
            }
            SimEvent::Data { payload } => {
                self.push_air_packet(12, SIM_CONNECTION_ACCESS_ADDRESS, 0x02, payload);
            }
            SimEvent::Terminate => {
                self.push_air_packet(
                    12,
                    SIM_CONNECTION_ACCESS_ADDRESS,
                    0x03,
                    vec![LL_TERMINATE_IND, 0x13],
                );
            }
            SimEvent::LinkLoss => {
                self.push_frame(packet_id::EVENT_DISCONNECT, Vec::new());
            }
            SimEvent::SkipCounter(n) => {
                self.counter = self.counter.wrapping_add(n);
            }
            SimEvent::Garbage(bytes) => {
                self.pending_output.push_back(bytes);
            }
        }
    }

    /// Feed bytes written by the host
    ///
    /// Returns the requests decoded from them. Ping requests are answered
    /// with a ping response queued as output.
    pub fn receive(&mut self, bytes: &[u8]) -> Vec<HostRequest> {
        self.rx.extend_from_slice(bytes);
        let mut decoded = Vec::new();

        loop {
            match Frame::decode(&self.rx) {
                Ok((frame, used)) => {
                    self.rx.drain(..used);
                    match HostRequest::from_frame(&frame) {
                        Some(request) => {
                            self.apply(&request);
                            decoded.push(request);
                        }
                        None => warn!("{}: ignoring unknown request id {:#04X}", self.id, frame.id),
                    }
                }
                Err(ParseError::Incomplete) => break,
                Err(ParseError::InvalidFrame { discard, reason }) => {
                    warn!("{}: dropping {} host bytes: {}", self.id, discard, reason);
                    self.rx.drain(..discard.clamp(1, self.rx.len()));
                }
            }
        }

        self.requests.extend(decoded.iter().cloned());
        decoded
    }

    fn apply(&mut self, request: &HostRequest) {
        debug!("{}: host request {:?}", self.id, request);
        match request {
            HostRequest::Ping => {
                let version = self.fw_version.to_le_bytes().to_vec();
                self.push_frame(packet_id::PING_RESP, version);
            }
            HostRequest::ScanContinuously => {
                self.follow = None;
                self.scanning = true;
                self.idle = false;
            }
            HostRequest::Follow {
                address,
                follow_only_advertisements,
                ..
            } => {
                self.follow = Some((*address, *follow_only_advertisements));
                self.scanning = false;
                self.idle = false;
            }
            HostRequest::SetTemporaryKey(key) => self.temporary_key = Some(*key),
            HostRequest::SetAdvHopSequence(sequence) => {
                self.hop_sequence = sequence.clone();
                self.hop_index = 0;
            }
            HostRequest::GoIdle => {
                self.follow = None;
                self.scanning = false;
                self.idle = true;
            }
        }
    }

    fn next_adv_channel(&mut self) -> u8 {
        let channels = self.hop_sequence.numbers();
        let channel = channels[self.hop_index % channels.len()];
        self.hop_index = self.hop_index.wrapping_add(1);
        channel
    }

    fn push_air_packet(&mut self, channel: u8, access_address: u32, header0: u8, pdu: Vec<u8>) {
        let event = BleEvent {
            flags: FLAG_CRC_OK,
            channel,
            rssi: self.rssi,
            event_counter: 0,
            timestamp_us: u32::from(self.counter).wrapping_mul(625),
            access_address,
            pdu_header: [header0, pdu.len().min(u8::MAX as usize) as u8],
            pdu,
        };
        self.push_frame(packet_id::EVENT_PACKET, event.encode());
    }

    fn push_frame(&mut self, id: u8, payload: Vec<u8>) {
        let frame = Frame::new(id, self.counter, payload);
        self.counter = self.counter.wrapping_add(1);
        self.pending_output.push_back(frame.encode());
    }

    /// Take the next pending output bytes
    pub fn take_output(&mut self) -> Option<Vec<u8>> {
        self.pending_output.pop_front()
    }

    pub fn has_output(&self) -> bool {
        !self.pending_output.is_empty()
    }

    pub fn output_count(&self) -> usize {
        self.pending_output.len()
    }
}
