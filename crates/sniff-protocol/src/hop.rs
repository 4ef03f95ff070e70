//! Advertising channel hop sequence

use crate::error::ConfigError;

/// One of the three BLE advertising channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdvChannel {
    /// Channel 37 (2402 MHz)
    Ch37,
    /// Channel 38 (2426 MHz)
    Ch38,
    /// Channel 39 (2480 MHz)
    Ch39,
}

impl AdvChannel {
    /// Channel index as used on the wire
    pub fn number(&self) -> u8 {
        match self {
            Self::Ch37 => 37,
            Self::Ch38 => 38,
            Self::Ch39 => 39,
        }
    }
}

impl TryFrom<u8> for AdvChannel {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            37 => Ok(Self::Ch37),
            38 => Ok(Self::Ch38),
            39 => Ok(Self::Ch39),
            other => Err(ConfigError::InvalidChannel(other)),
        }
    }
}

/// Order in which the sniffer cycles through advertising channels
///
/// Always 1 to 3 distinct advertising channels; the only way to build one is
/// through [`HopSequence::new`] (or `TryFrom`), which enforces that.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "Vec<u8>", into = "Vec<u8>")
)]
pub struct HopSequence(Vec<AdvChannel>);

impl HopSequence {
    /// Validate a list of channel numbers
    pub fn new(channels: &[u8]) -> Result<Self, ConfigError> {
        if channels.is_empty() {
            return Err(ConfigError::EmptyHopSequence);
        }
        if channels.len() > 3 {
            return Err(ConfigError::HopSequenceTooLong(channels.len()));
        }

        let mut seq = Vec::with_capacity(channels.len());
        for &number in channels {
            let channel = AdvChannel::try_from(number)?;
            if seq.contains(&channel) {
                return Err(ConfigError::DuplicateChannel(number));
            }
            seq.push(channel);
        }
        Ok(Self(seq))
    }

    /// Channels in hop order
    pub fn channels(&self) -> &[AdvChannel] {
        &self.0
    }

    /// Channel numbers in hop order
    pub fn numbers(&self) -> Vec<u8> {
        self.0.iter().map(AdvChannel::number).collect()
    }

    /// Number of channels (1..=3)
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; present for API symmetry with `len`
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for HopSequence {
    fn default() -> Self {
        Self(vec![AdvChannel::Ch37, AdvChannel::Ch38, AdvChannel::Ch39])
    }
}

impl TryFrom<Vec<u8>> for HopSequence {
    type Error = ConfigError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<HopSequence> for Vec<u8> {
    fn from(value: HopSequence) -> Self {
        value.numbers()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_rejects_invalid_sequences() {
        assert_eq!(HopSequence::new(&[]), Err(ConfigError::EmptyHopSequence));
        assert_eq!(
            HopSequence::new(&[37, 38, 39, 37]),
            Err(ConfigError::HopSequenceTooLong(4))
        );
        assert_eq!(
            HopSequence::new(&[37, 37]),
            Err(ConfigError::DuplicateChannel(37))
        );
        assert_eq!(HopSequence::new(&[36]), Err(ConfigError::InvalidChannel(36)));
        assert_eq!(
            HopSequence::new(&[39, 40]),
            Err(ConfigError::InvalidChannel(40))
        );
    }

    #[test]
    fn test_keeps_order() {
        let seq = HopSequence::new(&[39, 37]).unwrap();
        assert_eq!(seq.numbers(), vec![39, 37]);
        assert_eq!(seq.len(), 2);
        assert_eq!(HopSequence::default().numbers(), vec![37, 38, 39]);
    }

    fn distinct_adv_channels() -> impl Strategy<Value = Vec<u8>> {
        Just(vec![37u8, 38, 39])
            .prop_shuffle()
            .prop_flat_map(|all| (1usize..=3).prop_map(move |n| all[..n].to_vec()))
    }

    proptest! {
        #[test]
        fn accepts_any_permutation(channels in distinct_adv_channels()) {
            let seq = HopSequence::new(&channels).unwrap();
            prop_assert_eq!(seq.numbers(), channels);
        }

        #[test]
        fn rejects_out_of_range(channels in proptest::collection::vec(any::<u8>(), 1..=3)) {
            prop_assume!(channels.iter().any(|c| !(37..=39).contains(c)));
            prop_assert!(HopSequence::new(&channels).is_err());
        }

        #[test]
        fn rejects_over_long(channels in proptest::collection::vec(37u8..=39, 4..8)) {
            prop_assert_eq!(
                HopSequence::new(&channels),
                Err(ConfigError::HopSequenceTooLong(channels.len()))
            );
        }
    }
}
