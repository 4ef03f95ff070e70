//! BLE packet events
//!
//! The firmware wraps every sniffed air packet in a small metadata header:
//!
//! ```text
//! [hdr_len=10] [flags] [channel] [rssi] [event_counter(2)] [timestamp_us(4)]
//! [access_address(4)] [pdu_header(2)] [pdu(pdu_header[1])] [crc(3)]
//! ```
//!
//! Only the fields the host needs are interpreted: PDU type, advertiser
//! address, local name and the LL_TERMINATE_IND control opcode.

use crate::address::{AddressKind, DeviceAddress};

/// Access address used on the advertising channels
pub const ADVERTISING_ACCESS_ADDRESS: u32 = 0x8E89_BED6;

/// Length of the firmware metadata header
pub const BLE_HEADER_LEN: usize = 10;

/// Flag bit set when the air packet passed its CRC check
pub const FLAG_CRC_OK: u8 = 0x01;

/// LL control opcode for connection termination
pub const LL_TERMINATE_IND: u8 = 0x02;

/// LLID of LL control PDUs
const LLID_CONTROL: u8 = 0x03;

/// AD type: shortened local name
const AD_SHORT_NAME: u8 = 0x08;
/// AD type: complete local name
const AD_COMPLETE_NAME: u8 = 0x09;

/// Advertising channel PDU types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvPduType {
    /// Connectable undirected advertising
    AdvInd,
    /// Connectable directed advertising
    AdvDirectInd,
    /// Non-connectable undirected advertising
    AdvNonconnInd,
    /// Scan request
    ScanReq,
    /// Scan response
    ScanRsp,
    /// Connection request
    ConnectReq,
    /// Scannable undirected advertising
    AdvScanInd,
    /// Reserved value
    Reserved(u8),
}

impl AdvPduType {
    /// Decode from the low nibble of the PDU header
    pub fn from_header(byte: u8) -> Self {
        match byte & 0x0F {
            0 => Self::AdvInd,
            1 => Self::AdvDirectInd,
            2 => Self::AdvNonconnInd,
            3 => Self::ScanReq,
            4 => Self::ScanRsp,
            5 => Self::ConnectReq,
            6 => Self::AdvScanInd,
            other => Self::Reserved(other),
        }
    }

    /// Wire value
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::AdvInd => 0,
            Self::AdvDirectInd => 1,
            Self::AdvNonconnInd => 2,
            Self::ScanReq => 3,
            Self::ScanRsp => 4,
            Self::ConnectReq => 5,
            Self::AdvScanInd => 6,
            Self::Reserved(v) => *v,
        }
    }

    /// Whether the PDU carries advertising data after the address
    fn has_adv_data(&self) -> bool {
        matches!(
            self,
            Self::AdvInd | Self::AdvNonconnInd | Self::AdvScanInd | Self::ScanRsp
        )
    }
}

/// A sniffed air packet with its firmware metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BleEvent {
    /// Firmware flags (bit 0: CRC OK)
    pub flags: u8,
    /// RF channel index (0..=39)
    pub channel: u8,
    /// Received signal strength in dBm
    pub rssi: i8,
    /// Connection event counter
    pub event_counter: u16,
    /// Firmware timestamp in microseconds
    pub timestamp_us: u32,
    /// Access address of the air packet
    pub access_address: u32,
    /// Two-byte PDU header
    pub pdu_header: [u8; 2],
    /// PDU payload
    pub pdu: Vec<u8>,
}

impl BleEvent {
    /// Parse a BLE packet event payload
    pub fn parse(payload: &[u8]) -> Result<Self, String> {
        if payload.len() < BLE_HEADER_LEN + 6 {
            return Err(format!("BLE event too short ({} bytes)", payload.len()));
        }
        let header_len = payload[0] as usize;
        if header_len < BLE_HEADER_LEN || header_len + 6 > payload.len() {
            return Err(format!("bad BLE header length {header_len}"));
        }

        let air = &payload[header_len..];
        let pdu_header = [air[4], air[5]];
        let pdu_len = pdu_header[1] as usize;
        let pdu = air
            .get(6..6 + pdu_len)
            .ok_or_else(|| format!("PDU length {pdu_len} exceeds packet"))?
            .to_vec();

        Ok(Self {
            flags: payload[1],
            channel: payload[2],
            rssi: -(payload[3] as i16).clamp(0, 128) as i8,
            event_counter: u16::from_le_bytes([payload[4], payload[5]]),
            timestamp_us: u32::from_le_bytes([payload[6], payload[7], payload[8], payload[9]]),
            access_address: u32::from_le_bytes([air[0], air[1], air[2], air[3]]),
            pdu_header,
            pdu,
        })
    }

    /// Encode back to an event payload (CRC bytes are zero)
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(BLE_HEADER_LEN + 9 + self.pdu.len());
        out.push(BLE_HEADER_LEN as u8);
        out.push(self.flags);
        out.push(self.channel);
        out.push(self.rssi.unsigned_abs());
        out.extend_from_slice(&self.event_counter.to_le_bytes());
        out.extend_from_slice(&self.timestamp_us.to_le_bytes());
        out.extend_from_slice(&self.access_address.to_le_bytes());
        out.push(self.pdu_header[0]);
        out.push(self.pdu.len().min(u8::MAX as usize) as u8);
        out.extend_from_slice(&self.pdu[..self.pdu.len().min(u8::MAX as usize)]);
        out.extend_from_slice(&[0, 0, 0]);
        out
    }

    /// Whether the packet was captured on the advertising access address
    pub fn is_advertising(&self) -> bool {
        self.access_address == ADVERTISING_ACCESS_ADDRESS
    }

    /// Whether the CRC check passed
    pub fn crc_ok(&self) -> bool {
        self.flags & FLAG_CRC_OK != 0
    }

    /// Advertising PDU type, `None` for data channel packets
    pub fn adv_pdu_type(&self) -> Option<AdvPduType> {
        self.is_advertising()
            .then(|| AdvPduType::from_header(self.pdu_header[0]))
    }

    /// Advertiser address and its kind
    ///
    /// For CONNECT_REQ this is the AdvA field (the device being connected to).
    pub fn advertiser(&self) -> Option<(DeviceAddress, AddressKind)> {
        let tx_add = self.pdu_header[0] & 0x40 != 0;
        let rx_add = self.pdu_header[0] & 0x80 != 0;
        match self.adv_pdu_type()? {
            AdvPduType::ConnectReq | AdvPduType::ScanReq => {
                let addr = DeviceAddress::from_air(self.pdu.get(6..12)?)?;
                Some((addr, AddressKind::from_bit(rx_add)))
            }
            AdvPduType::Reserved(_) => None,
            _ => {
                let addr = DeviceAddress::from_air(self.pdu.get(..6)?)?;
                Some((addr, AddressKind::from_bit(tx_add)))
            }
        }
    }

    /// Initiator address of a CONNECT_REQ (or scanner of a SCAN_REQ)
    pub fn initiator(&self) -> Option<DeviceAddress> {
        match self.adv_pdu_type()? {
            AdvPduType::ConnectReq | AdvPduType::ScanReq => {
                DeviceAddress::from_air(self.pdu.get(..6)?)
            }
            _ => None,
        }
    }

    /// Local name from the advertising data, if present
    pub fn local_name(&self) -> Option<String> {
        if !self.adv_pdu_type()?.has_adv_data() {
            return None;
        }
        let mut data = self.pdu.get(6..)?;
        while data.len() >= 2 {
            let len = data[0] as usize;
            if len == 0 || len + 1 > data.len() {
                break;
            }
            let ad_type = data[1];
            if ad_type == AD_COMPLETE_NAME || ad_type == AD_SHORT_NAME {
                return Some(String::from_utf8_lossy(&data[2..len + 1]).into_owned());
            }
            data = &data[len + 1..];
        }
        None
    }

    /// Whether this is an LL_TERMINATE_IND control PDU
    pub fn is_terminate(&self) -> bool {
        !self.is_advertising()
            && self.pdu_header[0] & 0x03 == LLID_CONTROL
            && self.pdu.first() == Some(&LL_TERMINATE_IND)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn adv_event(pdu_header0: u8, pdu: Vec<u8>) -> BleEvent {
        BleEvent {
            flags: FLAG_CRC_OK,
            channel: 37,
            rssi: -60,
            event_counter: 0,
            timestamp_us: 1234,
            access_address: ADVERTISING_ACCESS_ADDRESS,
            pdu_header: [pdu_header0, pdu.len() as u8],
            pdu,
        }
    }

    #[test]
    fn test_encode_parse() {
        let mut pdu = vec![0x06, 0x05, 0x04, 0x03, 0x02, 0x01];
        pdu.extend_from_slice(&[0x05, AD_COMPLETE_NAME, b'T', b'a', b'g', b'1']);
        let event = adv_event(0x40, pdu);

        let parsed = BleEvent::parse(&event.encode()).unwrap();
        assert_eq!(parsed, event);
        assert!(parsed.crc_ok());
        assert_eq!(parsed.adv_pdu_type(), Some(AdvPduType::AdvInd));

        let (addr, kind) = parsed.advertiser().unwrap();
        assert_eq!(addr.to_string(), "01:02:03:04:05:06");
        assert_eq!(kind, AddressKind::Random);
        assert_eq!(parsed.local_name().as_deref(), Some("Tag1"));
    }

    #[test]
    fn test_connect_req_addresses() {
        let mut pdu = vec![0x11; 6]; // InitA
        pdu.extend_from_slice(&[0x22; 6]); // AdvA
        pdu.extend_from_slice(&[0u8; 22]); // LLData
        let event = adv_event(0x05, pdu);

        assert_eq!(event.adv_pdu_type(), Some(AdvPduType::ConnectReq));
        assert_eq!(event.advertiser().unwrap().0.0, [0x22; 6]);
        assert_eq!(event.initiator().unwrap().0, [0x11; 6]);
        assert_eq!(event.local_name(), None);
    }

    #[test]
    fn test_terminate_detection() {
        let event = BleEvent {
            access_address: 0x5065_1234,
            pdu_header: [0x03, 2],
            pdu: vec![LL_TERMINATE_IND, 0x13],
            ..adv_event(0, vec![])
        };
        assert!(event.is_terminate());
        assert_eq!(event.adv_pdu_type(), None);

        let data = BleEvent {
            pdu_header: [0x02, 2],
            ..event.clone()
        };
        assert!(!data.is_terminate());
    }

    #[test]
    fn test_parse_rejects_short_payloads() {
        assert!(BleEvent::parse(&[10, 0, 0]).is_err());

        let mut bytes = adv_event(0x00, vec![0u8; 6]).encode();
        bytes[BLE_HEADER_LEN + 5] = 40; // claim a longer PDU
        assert!(BleEvent::parse(&bytes).is_err());
    }
}
