//! Requests sent from the host to the sniffer firmware

use crate::address::{AddressKind, DeviceAddress};
use crate::hop::HopSequence;
use crate::key::{TemporaryKey, TK_LEN};
use crate::packet_id;
use crate::slip::Frame;

/// A request the host can send to the firmware
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostRequest {
    /// Follow a single advertiser (and its connection unless advertisements only)
    Follow {
        /// Advertiser to follow
        address: DeviceAddress,
        /// Public or random address
        kind: AddressKind,
        /// Stay on the advertising channels, do not follow into a connection
        follow_only_advertisements: bool,
    },
    /// Report every advertiser in range
    ScanContinuously,
    /// Temporary key for decrypting the followed connection
    SetTemporaryKey(TemporaryKey),
    /// Advertising channel hop order
    SetAdvHopSequence(HopSequence),
    /// Ask for the firmware version
    Ping,
    /// Stop sniffing
    GoIdle,
}

impl HostRequest {
    /// Frame packet id for this request
    pub fn id(&self) -> u8 {
        match self {
            Self::Follow { .. } => packet_id::REQ_FOLLOW,
            Self::ScanContinuously => packet_id::REQ_SCAN_CONT,
            Self::SetTemporaryKey(_) => packet_id::SET_TEMPORARY_KEY,
            Self::SetAdvHopSequence(_) => packet_id::SET_ADV_CHANNEL_HOP_SEQ,
            Self::Ping => packet_id::PING_REQ,
            Self::GoIdle => packet_id::GO_IDLE,
        }
    }

    /// Encode the request payload
    pub fn payload(&self) -> Vec<u8> {
        match self {
            Self::Follow {
                address,
                kind,
                follow_only_advertisements,
            } => {
                let mut payload = address.to_air().to_vec();
                payload.push(kind.as_u8());
                payload.push(u8::from(*follow_only_advertisements));
                payload
            }
            Self::SetTemporaryKey(key) => key.as_bytes().to_vec(),
            Self::SetAdvHopSequence(seq) => {
                let mut payload = vec![seq.len() as u8];
                payload.extend(seq.numbers());
                payload
            }
            Self::ScanContinuously | Self::Ping | Self::GoIdle => Vec::new(),
        }
    }

    /// Wrap in a frame stamped with `counter`
    pub fn to_frame(&self, counter: u16) -> Frame {
        Frame::new(self.id(), counter, self.payload())
    }

    /// Interpret a frame received by the firmware side
    ///
    /// Returns `None` for unknown ids or malformed payloads.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        let payload = frame.payload.as_slice();
        match frame.id {
            packet_id::REQ_FOLLOW => {
                let address = DeviceAddress::from_air(payload)?;
                let kind = match payload.get(6).copied().unwrap_or(0) {
                    0 => AddressKind::Public,
                    _ => AddressKind::Random,
                };
                let follow_only_advertisements = payload.get(7).is_some_and(|&v| v != 0);
                Some(Self::Follow {
                    address,
                    kind,
                    follow_only_advertisements,
                })
            }
            packet_id::REQ_SCAN_CONT => Some(Self::ScanContinuously),
            packet_id::SET_TEMPORARY_KEY if payload.len() == TK_LEN => {
                TemporaryKey::from_bytes(payload).ok().map(Self::SetTemporaryKey)
            }
            packet_id::SET_ADV_CHANNEL_HOP_SEQ => {
                let (&len, channels) = payload.split_first()?;
                let channels = channels.get(..len as usize)?;
                HopSequence::new(channels).ok().map(Self::SetAdvHopSequence)
            }
            packet_id::PING_REQ => Some(Self::Ping),
            packet_id::GO_IDLE => Some(Self::GoIdle),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_payload() {
        let address: DeviceAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        let req = HostRequest::Follow {
            address,
            kind: AddressKind::Random,
            follow_only_advertisements: true,
        };
        assert_eq!(
            req.payload(),
            vec![0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA, 0x01, 0x01]
        );
        assert_eq!(HostRequest::from_frame(&req.to_frame(3)), Some(req));
    }

    #[test]
    fn test_hop_sequence_payload() {
        let req = HostRequest::SetAdvHopSequence(HopSequence::new(&[39, 37]).unwrap());
        assert_eq!(req.payload(), vec![2, 39, 37]);

        let frame = req.to_frame(0);
        assert_eq!(frame.id, packet_id::SET_ADV_CHANNEL_HOP_SEQ);
        assert_eq!(HostRequest::from_frame(&frame), Some(req));
    }

    #[test]
    fn test_unknown_and_malformed_frames() {
        assert_eq!(HostRequest::from_frame(&Frame::new(0x42, 0, vec![])), None);
        assert_eq!(
            HostRequest::from_frame(&Frame::new(packet_id::SET_TEMPORARY_KEY, 0, vec![1, 2])),
            None
        );
        assert_eq!(
            HostRequest::from_frame(&Frame::new(
                packet_id::SET_ADV_CHANNEL_HOP_SEQ,
                0,
                vec![2, 37]
            )),
            None
        );
    }
}
