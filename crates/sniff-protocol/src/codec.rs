//! SLIP packet codec for the sniffer serial link

use tracing::trace;

use crate::error::ParseError;
use crate::packet::Packet;
use crate::request::HostRequest;
use crate::slip::{Frame, PROTOCOL_VERSION};
use crate::PacketCodec;

/// Codec for SLIP-framed sniffer traffic
///
/// Decoding is stateless; encoding stamps each request with the host's own
/// wrapping counter.
#[derive(Debug, Default)]
pub struct SlipCodec {
    tx_counter: u16,
}

impl SlipCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self::default()
    }
}

impl PacketCodec for SlipCodec {
    fn decode(&mut self, buf: &[u8]) -> Result<(Packet, usize), ParseError> {
        let (frame, used) = Frame::decode(buf)?;
        if frame.protocol_version != PROTOCOL_VERSION {
            trace!(
                "frame {} uses protocol version {}",
                frame.counter,
                frame.protocol_version
            );
        }
        let packet = Packet::from_frame(frame, buf[..used].to_vec())
            .map_err(|reason| ParseError::InvalidFrame {
                discard: used,
                reason,
            })?;
        Ok((packet, used))
    }

    fn encode(&mut self, request: &HostRequest) -> Vec<u8> {
        let counter = self.tx_counter;
        self.tx_counter = self.tx_counter.wrapping_add(1);
        request.to_frame(counter).encode()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::{BleEvent, ADVERTISING_ACCESS_ADDRESS, FLAG_CRC_OK, LL_TERMINATE_IND};
    use crate::{packet_id, PacketKind};

    fn ble_frame(counter: u16, access_address: u32, header0: u8, pdu: Vec<u8>) -> Vec<u8> {
        let event = BleEvent {
            flags: FLAG_CRC_OK,
            channel: 38,
            rssi: -70,
            event_counter: 0,
            timestamp_us: 0,
            access_address,
            pdu_header: [header0, pdu.len() as u8],
            pdu,
        };
        Frame::new(packet_id::EVENT_PACKET, counter, event.encode()).encode()
    }

    #[test]
    fn test_decode_advertisement() {
        let mut codec = SlipCodec::new();
        let bytes = ble_frame(
            17,
            ADVERTISING_ACCESS_ADDRESS,
            0x00,
            vec![0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA],
        );

        let (packet, used) = codec.decode(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(packet.counter, 17);
        assert_eq!(packet.kind, PacketKind::Advertisement);
        assert_eq!(packet.advertiser.unwrap().to_string(), "AA:BB:CC:DD:EE:FF");
        assert_eq!(packet.channel(), Some(38));
        assert_eq!(packet.rssi(), Some(-70));
        assert!(packet.crc_ok());
        assert!(packet.announces_device());
        assert_eq!(packet.raw, bytes);
    }

    #[test]
    fn test_decode_connect_and_terminate() {
        let mut codec = SlipCodec::new();

        let mut pdu = vec![0x01; 6];
        pdu.extend_from_slice(&[0x02; 6]);
        pdu.extend_from_slice(&[0u8; 22]);
        let bytes = ble_frame(42, ADVERTISING_ACCESS_ADDRESS, 0x05, pdu);
        let (packet, _) = codec.decode(&bytes).unwrap();
        assert_eq!(packet.kind, PacketKind::ConnectRequest);
        assert_eq!(packet.counter, 42);
        assert_eq!(packet.advertiser.unwrap().0, [0x02; 6]);
        assert!(!packet.announces_device());

        let bytes = ble_frame(43, 0x1234_5678, 0x03, vec![LL_TERMINATE_IND, 0x13]);
        let (packet, _) = codec.decode(&bytes).unwrap();
        assert_eq!(packet.kind, PacketKind::Terminate);
        assert!(packet.kind.ends_connection());

        let bytes = ble_frame(44, 0x1234_5678, 0x02, vec![0x01, 0x02]);
        assert_eq!(codec.decode(&bytes).unwrap().0.kind, PacketKind::Data);
    }

    #[test]
    fn test_decode_firmware_events() {
        let mut codec = SlipCodec::new();

        let bytes = Frame::new(packet_id::PING_RESP, 1, vec![0x34, 0x12]).encode();
        let (packet, _) = codec.decode(&bytes).unwrap();
        assert_eq!(packet.kind, PacketKind::PingResponse);
        assert_eq!(packet.firmware_version(), Some(0x1234));

        let bytes = Frame::new(packet_id::EVENT_DISCONNECT, 2, vec![]).encode();
        assert_eq!(codec.decode(&bytes).unwrap().0.kind, PacketKind::LinkLoss);

        let bytes = Frame::new(0x55, 3, vec![]).encode();
        assert_eq!(codec.decode(&bytes).unwrap().0.kind, PacketKind::Other(0x55));
    }

    #[test]
    fn test_bad_ble_payload_discards_whole_frame() {
        let mut codec = SlipCodec::new();
        let bytes = Frame::new(packet_id::EVENT_PACKET, 5, vec![10, 0, 0]).encode();

        match codec.decode(&bytes) {
            Err(ParseError::InvalidFrame { discard, .. }) => assert_eq!(discard, bytes.len()),
            other => panic!("expected InvalidFrame, got {:?}", other),
        }
    }

    #[test]
    fn test_encode_stamps_wrapping_counter() {
        let mut codec = SlipCodec { tx_counter: u16::MAX };

        let first = Frame::decode(&codec.encode(&HostRequest::Ping)).unwrap().0;
        let second = Frame::decode(&codec.encode(&HostRequest::ScanContinuously)).unwrap().0;

        assert_eq!(first.counter, u16::MAX);
        assert_eq!(first.id, packet_id::PING_REQ);
        assert_eq!(second.counter, 0);
        assert_eq!(second.id, packet_id::REQ_SCAN_CONT);
    }
}
