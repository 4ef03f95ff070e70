//! BLE device addresses
//!
//! Addresses are held most significant byte first, which is how they are
//! printed (`AA:BB:CC:DD:EE:FF`). On air they travel least significant byte
//! first; use [`DeviceAddress::from_air`] and [`DeviceAddress::to_air`] at the
//! wire boundary.

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// A 48-bit BLE device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DeviceAddress(pub [u8; 6]);

impl DeviceAddress {
    /// Build from the on-air (little-endian) byte order
    pub fn from_air(bytes: &[u8]) -> Option<Self> {
        let slice: [u8; 6] = bytes.get(..6)?.try_into().ok()?;
        let mut addr = slice;
        addr.reverse();
        Some(Self(addr))
    }

    /// Bytes in on-air (little-endian) order
    pub fn to_air(&self) -> [u8; 6] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }

    /// Raw bytes, most significant first
    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

impl FromStr for DeviceAddress {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidAddress(s.to_string());

        let mut bytes = [0u8; 6];
        let mut parts = s.split(':');
        for byte in bytes.iter_mut() {
            let part = parts.next().ok_or_else(invalid)?;
            if part.len() != 2 {
                return Err(invalid());
            }
            *byte = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self(bytes))
    }
}

/// Whether an address is public or random (TxAdd/RxAdd bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AddressKind {
    /// IEEE-assigned public address
    #[default]
    Public,
    /// Random static or private address
    Random,
}

impl AddressKind {
    /// Wire value used in follow requests
    pub fn as_u8(&self) -> u8 {
        match self {
            Self::Public => 0,
            Self::Random => 1,
        }
    }

    pub(crate) fn from_bit(random: bool) -> Self {
        if random {
            Self::Random
        } else {
            Self::Public
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let addr: DeviceAddress = "AA:BB:CC:DD:EE:FF".parse().unwrap();
        assert_eq!(addr.0, [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);
        assert_eq!(addr.to_string(), "AA:BB:CC:DD:EE:FF");

        let lower: DeviceAddress = "0a:0b:0c:0d:0e:0f".parse().unwrap();
        assert_eq!(lower.to_string(), "0A:0B:0C:0D:0E:0F");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["", "AA:BB", "AA:BB:CC:DD:EE:FF:00", "AA:BB:CC:DD:EE:GG", "AAA:BB:CC:DD:EE:F"] {
            assert!(
                matches!(bad.parse::<DeviceAddress>(), Err(ConfigError::InvalidAddress(_))),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_air_order_is_reversed() {
        let addr = DeviceAddress::from_air(&[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]).unwrap();
        assert_eq!(addr.to_string(), "06:05:04:03:02:01");
        assert_eq!(addr.to_air(), [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert!(DeviceAddress::from_air(&[0x01, 0x02]).is_none());
    }
}
