//! Structured document identifiers.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::core::{AggPipeError, Result};

/// A 12-byte document identifier, written as 24 hexadecimal characters.
///
/// Serializes in extended-JSON form (`{"$oid": "..."}`) so it can be embedded
/// directly in `$match` conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

impl ObjectId {
    /// Parse a 24-character hexadecimal string.
    ///
    /// Any failure is reported as [`AggPipeError::InvalidIdentifier`] carrying
    /// the rejected input.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || AggPipeError::InvalidIdentifier {
            value: input.to_string(),
        };

        let bytes = input.as_bytes();
        if bytes.len() != 24 {
            return Err(invalid());
        }

        let mut out = [0u8; 12];
        for (i, pair) in bytes.chunks_exact(2).enumerate() {
            let hi = hex_value(pair[0]).ok_or_else(invalid)?;
            let lo = hex_value(pair[1]).ok_or_else(invalid)?;
            out[i] = (hi << 4) | lo;
        }
        Ok(Self(out))
    }

    /// Construct from raw bytes.
    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Lowercase hexadecimal form.
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Extended-JSON document for use inside query conditions.
    pub fn to_document(&self) -> serde_json::Value {
        serde_json::json!({ "$oid": self.to_hex() })
    }
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

impl FromStr for ObjectId {
    type Err = AggPipeError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_document().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_through_display() {
        let id = ObjectId::parse("507f1f77bcf86cd799439011").unwrap();
        assert_eq!(id.to_string(), "507f1f77bcf86cd799439011");
        assert_eq!(id.bytes()[0], 0x50);
    }

    #[test]
    fn test_uppercase_is_accepted_and_normalized() {
        let id: ObjectId = "507F1F77BCF86CD799439011".parse().unwrap();
        assert_eq!(id.to_hex(), "507f1f77bcf86cd799439011");
    }

    #[test]
    fn test_malformed_identifiers_are_rejected() {
        for bad in ["", "507f1f77", "507f1f77bcf86cd79943901z", "507f1f77bcf86cd7994390111"] {
            match ObjectId::parse(bad) {
                Err(AggPipeError::InvalidIdentifier { value }) => assert_eq!(value, bad),
                other => panic!("expected invalid identifier for {bad:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_serializes_as_extended_json() {
        let id = ObjectId::from_bytes([0xab; 12]);
        let json = serde_json::to_value(id).unwrap();
        assert_eq!(json, serde_json::json!({ "$oid": "abababababababababababab" }));
    }
}
