//! Rights and rights bitmasks.
//!
//! Rights are numbered from one externally. Inside a mask, right `n` lives at
//! bit `n - 1`. Full control sets every bit, which as a signed 64-bit mask is
//! `-1`.

use serde::{Deserialize, Serialize};
use warden_core::Value;

use crate::error::{PermsError, Result};

/// A grantable right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Right {
    Create,
    Read,
    Update,
    Delete,
    Invoke,
    FullControl,
}

impl Right {
    /// External one-based code; full control is `-1`.
    pub const fn code(self) -> i64 {
        match self {
            Right::Create => 1,
            Right::Read => 2,
            Right::Update => 3,
            Right::Delete => 4,
            Right::Invoke => 5,
            Right::FullControl => -1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(Right::Create),
            2 => Some(Right::Read),
            3 => Some(Right::Update),
            4 => Some(Right::Delete),
            5 => Some(Right::Invoke),
            -1 => Some(Right::FullControl),
            _ => None,
        }
    }

    /// Zero-based bit position. Full control has no single bit.
    pub const fn bit(self) -> Option<u32> {
        match self {
            Right::FullControl => None,
            other => Some(other.code() as u32 - 1),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Right::Create => "create",
            Right::Read => "read",
            Right::Update => "update",
            Right::Delete => "delete",
            Right::Invoke => "invoke",
            Right::FullControl => "full_control",
        }
    }
}

/// Bit positions that must all be set to hold `rights`.
pub fn required_bits(rights: &[Right]) -> Vec<u32> {
    let mut bits: Vec<u32> = rights
        .iter()
        .flat_map(|right| match right.bit() {
            Some(bit) => bit..bit + 1,
            None => 0..64,
        })
        .collect();
    bits.sort_unstable();
    bits.dedup();
    bits
}

/// A signed 64-bit rights mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RightsMask(pub i64);

impl RightsMask {
    pub const NONE: Self = Self(0);
    pub const FULL_CONTROL: Self = Self(-1);

    pub fn from_rights(rights: &[Right]) -> Self {
        rights.iter().fold(Self::NONE, |mask, right| mask.with(*right))
    }

    /// Add a right.
    pub fn with(self, right: Right) -> Self {
        match right.bit() {
            Some(bit) => Self(self.0 | (1i64 << bit)),
            None => Self::FULL_CONTROL,
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub fn contains(self, right: Right) -> bool {
        self.has_bits(&required_bits(&[right]))
    }

    /// Bits past 63 follow the sign of the mask.
    pub fn has_bits(self, bits: &[u32]) -> bool {
        bits.iter().all(|&bit| {
            if bit < 64 {
                (self.0 as u64) & (1u64 << bit) != 0
            } else {
                self.0 < 0
            }
        })
    }

    pub fn is_full_control(self) -> bool {
        self == Self::FULL_CONTROL
    }

    /// Read a mask from little-endian bytes.
    ///
    /// Bytes past the eighth are dropped; a short mask is zero-extended.
    pub fn from_le_bytes(bytes: &[u8]) -> Self {
        let mut buf = [0u8; 8];
        let n = bytes.len().min(8);
        buf[..n].copy_from_slice(&bytes[..n]);
        Self(i64::from_le_bytes(buf))
    }

    /// Read a mask from the hex text of its little-endian bytes.
    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes = hex::decode(text)
            .map_err(|e| PermsError::InvalidAcl(format!("rights '{}' is not hex: {}", text, e)))?;
        Ok(Self::from_le_bytes(&bytes))
    }

    /// Accept an integer, an integral double, hex text or binary.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::Int(_) | Value::Double(_) => value
                .as_i64()
                .map(Self)
                .ok_or_else(|| PermsError::InvalidAcl("rights must be an integer mask".into())),
            Value::String(text) => Self::from_hex(text),
            Value::Binary(bytes) => Ok(Self::from_le_bytes(bytes)),
            Value::Null => Ok(Self::NONE),
            other => Err(PermsError::InvalidAcl(format!(
                "rights cannot be a {}",
                other.type_name()
            ))),
        }
    }

    pub fn to_value(self) -> Value {
        Value::Int(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_bits() {
        assert_eq!(Right::Read.code(), 2);
        assert_eq!(Right::Read.bit(), Some(1));
        assert_eq!(Right::from_code(-1), Some(Right::FullControl));
        assert_eq!(Right::from_code(9), None);
        assert_eq!(required_bits(&[Right::Update, Right::Read, Right::Read]), vec![1, 2]);
        assert_eq!(required_bits(&[Right::FullControl]).len(), 64);
    }

    #[test]
    fn test_mask_composition() {
        let mask = RightsMask::from_rights(&[Right::Read, Right::Update]);
        assert_eq!(mask, RightsMask(0b110));
        assert!(mask.contains(Right::Read));
        assert!(!mask.contains(Right::Delete));
        assert!(!mask.contains(Right::FullControl));
        assert!(RightsMask::FULL_CONTROL.contains(Right::Invoke));
        assert!(mask.with(Right::FullControl).is_full_control());
    }

    #[test]
    fn test_mask_forms() {
        assert_eq!(RightsMask::from_hex("06").unwrap(), RightsMask(6));
        assert_eq!(
            RightsMask::from_hex("ffffffffffffffff").unwrap(),
            RightsMask::FULL_CONTROL
        );
        assert!(RightsMask::from_hex("zz").is_err());
        assert_eq!(RightsMask::from_value(&Value::Int(-1)).unwrap(), RightsMask::FULL_CONTROL);
        assert_eq!(RightsMask::from_value(&Value::Double(4.0)).unwrap(), RightsMask(4));
        assert!(RightsMask::from_value(&Value::Bool(true)).is_err());
    }
}
