//! This module contains small utilities that are depended on throughout the
//! library but have no other sensible home.

use sha3::{Digest, Keccak256};
use uuid::Uuid;

/// Computes the keccak-256 hash of the provided `bytes`.
#[must_use]
pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Clips the standard textual representation of `uuid` down to just the first
/// group.
///
/// The full representation is far too long for sensible printing, while the
/// first group alone is more than sufficient to distinguish identities in a
/// printed trace.
#[must_use]
pub fn clip_uuid(uuid: &Uuid) -> String {
    let string = format!("{uuid}");
    string.split('-').next().unwrap_or(&string).to_string()
}

/// Renders `bytes` in the classic sixteen-bytes-per-row hex dump format, with
/// printable ASCII shown in a trailing column.
///
/// The `base` offset is added to the offsets printed in the leftmost column,
/// which lets a dump of a memory window show real memory addresses.
#[must_use]
pub fn hex_dump(bytes: &[u8], base: usize) -> String {
    let mut out = String::new();
    for (row, chunk) in bytes.chunks(16).enumerate() {
        let offset = base + row * 16;
        out.push_str(&format!("{offset:08x}  "));

        for i in 0..16 {
            match chunk.get(i) {
                Some(byte) => out.push_str(&format!("{byte:02x} ")),
                None => out.push_str("   "),
            }
            if i == 7 {
                out.push(' ');
            }
        }

        out.push_str(" |");
        for byte in chunk {
            let ch = if (0x20..0x7f).contains(byte) {
                *byte as char
            } else {
                '.'
            };
            out.push(ch);
        }
        out.push_str("|\n");
    }
    out
}

/// Serde adapters that encode byte buffers as hexadecimal strings rather than
/// JSON arrays of numbers.
pub mod serde_hex {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serializes `bytes` as a hexadecimal string.
    ///
    /// # Errors
    ///
    /// If the underlying serializer errors.
    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    /// Deserializes a hexadecimal string into a byte buffer.
    ///
    /// # Errors
    ///
    /// If the input is not a valid hexadecimal string.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let string = String::deserialize(deserializer)?;
        hex::decode(string.trim_start_matches("0x")).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod test {
    use super::{hex_dump, keccak256};

    #[test]
    fn computes_known_keccak_vector() {
        // keccak256 of the empty input is a well-known constant.
        let hash = keccak256(&[]);
        assert_eq!(
            hex::encode(hash),
            "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn dumps_bytes_with_ascii_column() {
        let dump = hex_dump(b"hello world", 0x40);
        assert!(dump.starts_with("00000040  68 65 6c 6c 6f 20 77 6f  72 6c 64"));
        assert!(dump.contains("|hello world|"));
    }
}
