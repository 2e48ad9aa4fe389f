//! UUID column
//!
//! A UUID travels as two little-endian u64 words: the high 64 bits first,
//! then the low 64 bits. This is not the RFC byte order, so the record goes
//! through [`FixedSize`] like every other fixed-width type.

use super::{
    numeric::{
        ColumnVector,
        FixedSize,
    },
    Value,
};
use crate::{
    types::Type,
    Error,
    Result,
};
use uuid::Uuid;

impl FixedSize for Uuid {
    const SIZE: usize = 16;

    fn decode(bytes: &[u8]) -> Self {
        let high = u64::decode(&bytes[..8]);
        let low = u64::decode(&bytes[8..16]);
        Uuid::from_u128(((high as u128) << 64) | low as u128)
    }

    fn encode(&self, out: &mut [u8]) {
        let bits = self.as_u128();
        ((bits >> 64) as u64).encode(&mut out[..8]);
        (bits as u64).encode(&mut out[8..16]);
    }

    fn wire_type() -> Type {
        Type::uuid()
    }

    fn to_value(&self) -> Value {
        Value::Uuid(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Uuid(u) => Some(*u),
            Value::String(s) => Uuid::parse_str(s).ok(),
            _ => None,
        }
    }

    fn matches(value: &Value) -> bool {
        matches!(value, Value::Uuid(_))
    }
}

/// Column for UUID type (stored as 2x UInt64)
pub type ColumnUuid = ColumnVector<Uuid>;

impl ColumnVector<Uuid> {
    /// Parse `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx` and append it.
    pub fn append_from_string(&mut self, s: &str) -> Result<()> {
        let uuid = Uuid::parse_str(s)
            .map_err(|e| {
                Error::InvalidArgument(format!("Invalid UUID '{}': {}", s, e))
            })?;
        self.append(uuid);
        Ok(())
    }

    pub fn as_string(&self, index: usize) -> Option<String> {
        self.get(index).map(|u| u.hyphenated().to_string())
    }
}
