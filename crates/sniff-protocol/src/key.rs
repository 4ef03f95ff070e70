//! Temporary key (TK) used by the firmware to decrypt link-layer traffic

use std::fmt;

use crate::error::ConfigError;

/// TK length in bytes
pub const TK_LEN: usize = 16;

/// Largest six-digit pairing passkey
pub const MAX_PASSKEY: u32 = 999_999;

/// A 128-bit temporary key
#[derive(Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TemporaryKey([u8; TK_LEN]);

impl TemporaryKey {
    /// Build a key from 1 to 16 bytes, left-padding shorter keys with zeros
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        if bytes.is_empty() || bytes.len() > TK_LEN {
            return Err(ConfigError::InvalidKeyLength(bytes.len()));
        }
        let mut key = [0u8; TK_LEN];
        key[TK_LEN - bytes.len()..].copy_from_slice(bytes);
        Ok(Self(key))
    }

    /// Derive the TK for passkey-entry pairing
    pub fn from_passkey(passkey: u32) -> Result<Self, ConfigError> {
        if passkey > MAX_PASSKEY {
            return Err(ConfigError::InvalidPasskey(passkey));
        }
        let mut key = [0u8; TK_LEN];
        key[TK_LEN - 4..].copy_from_slice(&passkey.to_be_bytes());
        Ok(Self(key))
    }

    /// Key bytes, most significant first
    pub fn as_bytes(&self) -> &[u8; TK_LEN] {
        &self.0
    }
}

// Keys are secrets; keep them out of logs.
impl fmt::Debug for TemporaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TemporaryKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_key_is_left_padded() {
        let key = TemporaryKey::from_bytes(&[0x12, 0x34]).unwrap();
        let mut expected = [0u8; 16];
        expected[14] = 0x12;
        expected[15] = 0x34;
        assert_eq!(key.as_bytes(), &expected);
    }

    #[test]
    fn test_rejects_bad_lengths() {
        assert_eq!(
            TemporaryKey::from_bytes(&[]),
            Err(ConfigError::InvalidKeyLength(0))
        );
        assert_eq!(
            TemporaryKey::from_bytes(&[0u8; 17]),
            Err(ConfigError::InvalidKeyLength(17))
        );
        assert!(TemporaryKey::from_bytes(&[0xFF; 16]).is_ok());
    }

    #[test]
    fn test_passkey() {
        let key = TemporaryKey::from_passkey(123_456).unwrap();
        assert_eq!(&key.as_bytes()[12..], &123_456u32.to_be_bytes());
        assert!(key.as_bytes()[..12].iter().all(|&b| b == 0));
        assert_eq!(
            TemporaryKey::from_passkey(1_000_000),
            Err(ConfigError::InvalidPasskey(1_000_000))
        );
    }

    #[test]
    fn test_debug_hides_key() {
        let key = TemporaryKey::from_bytes(&[0xAB; 16]).unwrap();
        assert_eq!(format!("{key:?}"), "TemporaryKey(..)");
    }
}
