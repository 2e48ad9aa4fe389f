//! Value - a single row value read from or appended to a column
//!
//! Every column can produce a [`Value`] for any of its rows and accept one on
//! append, which is what lets decorators (Array, Nullable, LowCardinality,
//! Variant) work over arbitrary inner columns without knowing their concrete
//! type.

use chrono::{
    DateTime,
    NaiveDate,
    Utc,
};

/// A dynamically typed row value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    UInt8(u8),
    UInt16(u16),
    UInt32(u32),
    UInt64(u64),
    UInt128(u128),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Int128(i128),
    Float32(f32),
    Float64(f64),
    /// UTF-8 text.
    String(String),
    /// Raw bytes, for String or FixedString columns holding binary data.
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Date32(NaiveDate),
    DateTime(DateTime<Utc>),
    DateTime64(DateTime<Utc>),
    /// Unscaled integer and its scale: `value / 10^scale`.
    Decimal { value: i128, scale: usize },
    Uuid(uuid::Uuid),
    Enum { code: i16, name: String },
    Array(Vec<Value>),
    Tuple(Vec<Value>),
    Map(Vec<(Value, Value)>),
}

impl Value {
    /// Short name of the value's kind, used in error messages.
    pub fn type_hint(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::UInt8(_) => "UInt8",
            Value::UInt16(_) => "UInt16",
            Value::UInt32(_) => "UInt32",
            Value::UInt64(_) => "UInt64",
            Value::UInt128(_) => "UInt128",
            Value::Int8(_) => "Int8",
            Value::Int16(_) => "Int16",
            Value::Int32(_) => "Int32",
            Value::Int64(_) => "Int64",
            Value::Int128(_) => "Int128",
            Value::Float32(_) => "Float32",
            Value::Float64(_) => "Float64",
            Value::String(_) => "String",
            Value::Bytes(_) => "Bytes",
            Value::Date(_) => "Date",
            Value::Date32(_) => "Date32",
            Value::DateTime(_) => "DateTime",
            Value::DateTime64(_) => "DateTime64",
            Value::Decimal { .. } => "Decimal",
            Value::Uuid(_) => "UUID",
            Value::Enum { .. } => "Enum",
            Value::Array(_) => "Array",
            Value::Tuple(_) => "Tuple",
            Value::Map(_) => "Map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Any integer kind widened to i128. `UInt128` values above `i128::MAX`
    /// yield `None`.
    pub fn as_i128(&self) -> Option<i128> {
        match *self {
            Value::UInt8(v) => Some(v as i128),
            Value::UInt16(v) => Some(v as i128),
            Value::UInt32(v) => Some(v as i128),
            Value::UInt64(v) => Some(v as i128),
            Value::UInt128(v) => i128::try_from(v).ok(),
            Value::Int8(v) => Some(v as i128),
            Value::Int16(v) => Some(v as i128),
            Value::Int32(v) => Some(v as i128),
            Value::Int64(v) => Some(v as i128),
            Value::Int128(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Float32(v) => Some(v as f64),
            Value::Float64(v) => Some(v),
            _ => self.as_i128().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            Value::Bytes(b) => std::str::from_utf8(b).ok(),
            Value::Enum { name, .. } => Some(name),
            _ => None,
        }
    }

    /// String payload as bytes, for both `String` and `Bytes`.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::String(s) => Some(s.as_bytes()),
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn array<I, T>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

macro_rules! impl_from_value {
    ($($rust:ty => $variant:ident),+ $(,)?) => {
        $(
            impl From<$rust> for Value {
                fn from(v: $rust) -> Self {
                    Value::$variant(v)
                }
            }
        )+
    };
}

impl_from_value!(
    u8 => UInt8,
    u16 => UInt16,
    u32 => UInt32,
    u64 => UInt64,
    u128 => UInt128,
    i8 => Int8,
    i16 => Int16,
    i32 => Int32,
    i64 => Int64,
    i128 => Int128,
    f32 => Float32,
    f64 => Float64,
    String => String,
    Vec<u8> => Bytes,
    uuid::Uuid => Uuid,
    NaiveDate => Date,
    DateTime<Utc> => DateTime,
);

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::UInt8(v as u8)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::UInt8(v) => write!(f, "{}", v),
            Value::UInt16(v) => write!(f, "{}", v),
            Value::UInt32(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::UInt128(v) => write!(f, "{}", v),
            Value::Int8(v) => write!(f, "{}", v),
            Value::Int16(v) => write!(f, "{}", v),
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Int128(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::String(s) => write!(f, "'{}'", s),
            Value::Bytes(b) => write!(f, "'{}'", String::from_utf8_lossy(b)),
            Value::Date(d) | Value::Date32(d) => write!(f, "{}", d),
            Value::DateTime(t) | Value::DateTime64(t) => write!(f, "{}", t),
            Value::Decimal { value, scale } => {
                f.write_str(&super::decimal::format_decimal(*value, *scale))
            }
            Value::Uuid(u) => write!(f, "{}", u),
            Value::Enum { name, .. } => write!(f, "'{}'", name),
            Value::Array(items) => {
                f.write_str("[")?;
                write_list(f, items)?;
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                write_list(f, items)?;
                f.write_str(")")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k, v)?;
                }
                f.write_str("}")
            }
        }
    }
}

fn write_list(
    f: &mut std::fmt::Formatter<'_>,
    items: &[Value],
) -> std::fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}
