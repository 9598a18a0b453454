//! This module contains the definition of [`Address`], the 20-byte account
//! identifier used by the interpreter.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::vm::value::Word;

/// The number of bytes in an account address.
pub const ADDRESS_SIZE_BYTES: usize = 20;

/// A fixed 20-byte account identifier.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Address([u8; ADDRESS_SIZE_BYTES]);

impl Address {
    /// The all-zeroes address.
    pub const ZERO: Self = Self([0; ADDRESS_SIZE_BYTES]);

    /// Constructs an address from its raw bytes.
    #[must_use]
    pub fn new(bytes: [u8; ADDRESS_SIZE_BYTES]) -> Self {
        Self(bytes)
    }

    /// Constructs an address from the low 20 bytes of a [`Word`], as the call
    /// opcodes do when interpreting a stack item as a call target.
    #[must_use]
    pub fn from_word(word: Word) -> Self {
        let be = word.to_be_bytes();
        let mut bytes = [0u8; ADDRESS_SIZE_BYTES];
        bytes.copy_from_slice(&be[be.len() - ADDRESS_SIZE_BYTES..]);
        Self(bytes)
    }

    /// Parses an address from a hexadecimal string, with or without the `0x`
    /// prefix. Returns [`None`] unless the string encodes exactly 20 bytes.
    #[must_use]
    pub fn from_hex_str(s: &str) -> Option<Self> {
        let decoded = hex::decode(s.trim_start_matches("0x")).ok()?;
        let bytes: [u8; ADDRESS_SIZE_BYTES] = decoded.try_into().ok()?;
        Some(Self(bytes))
    }

    /// Gets the raw bytes of the address.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE_BYTES] {
        &self.0
    }

    /// Widens the address into a [`Word`], as the environment opcodes do when
    /// pushing an address onto the stack.
    #[must_use]
    pub fn to_word(self) -> Word {
        Word::from_be_slice(&self.0)
    }

    /// Checks whether this is the all-zeroes address.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0; ADDRESS_SIZE_BYTES]
    }
}

/// Pretty-prints the address as `0x`-prefixed hexadecimal, unabbreviated.
impl Display for Address {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// Serializes the address as its full hexadecimal string form.
impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let string = String::deserialize(deserializer)?;
        Address::from_hex_str(&string)
            .ok_or_else(|| serde::de::Error::custom("expected a 20-byte hexadecimal address"))
    }
}

#[cfg(test)]
mod test {
    use super::Address;
    use crate::vm::value::Word;

    #[test]
    fn round_trips_through_word() {
        let address =
            Address::from_hex_str("0xd8da6bf26964af9d7eed9e03e53415d37aa96045").unwrap();
        assert_eq!(Address::from_word(address.to_word()), address);
    }

    #[test]
    fn truncates_word_to_low_twenty_bytes() {
        // The high 12 bytes of a word are discarded when casting to address.
        let word = Word::MAX;
        let address = Address::from_word(word);
        assert_eq!(address.as_bytes(), &[0xff; 20]);
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(Address::from_hex_str("0x1234").is_none());
        assert!(Address::from_hex_str("zz").is_none());
    }
}
