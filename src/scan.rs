//! Conversion of row values into plain Rust types.
//!
//! Sits on top of [`Column::value`]: read a row as a [`Value`], then convert
//! it with the destination's [`FromValue`] impl.
//!
//! ```
//! use clickhouse_columns::{
//!     column::{Column, ColumnArray, ColumnNullable, ColumnUInt32},
//!     scan,
//!     Value,
//! };
//!
//! let nullable = ColumnNullable::new(Box::new(ColumnUInt32::new()));
//! let mut col = ColumnArray::new(Box::new(nullable));
//! col.append_value(&Value::array([Some(1u32), None])).unwrap();
//!
//! let row: Vec<Option<u32>> = scan(&col, 0).unwrap();
//! assert_eq!(row, vec![Some(1), None]);
//! ```

use crate::{
    column::{
        Column,
        Value,
    },
    Error,
    Result,
};
use chrono::{
    DateTime,
    NaiveDate,
    Utc,
};
use std::{
    collections::{
        BTreeMap,
        HashMap,
    },
    hash::Hash,
};

/// A destination a [`Value`] can be converted into.
pub trait FromValue: Sized {
    fn from_value(value: Value) -> Result<Self>;
}

/// Read row `index` of `column` as `T`.
pub fn scan<T: FromValue>(column: &dyn Column, index: usize) -> Result<T> {
    T::from_value(column.value(index)?)
}

/// `value` as a wide integer, or a mismatch naming `T`.
fn wide_int<T>(value: &Value) -> Result<i128> {
    value.as_i128().ok_or_else(|| mismatch::<T>(value))
}

fn out_of_range<T>(wide: i128) -> Error {
    Error::InvalidArgument(format!(
        "{} is out of range for {}",
        wide,
        std::any::type_name::<T>()
    ))
}

fn mismatch<T>(value: &Value) -> Error {
    Error::TypeMismatch {
        expected: std::any::type_name::<T>().to_string(),
        actual: value.type_hint().to_string(),
    }
}

macro_rules! impl_from_value_int {
    ($($t:ty),+) => {
        $(
            impl FromValue for $t {
                fn from_value(value: Value) -> Result<Self> {
                    let wide = wide_int::<$t>(&value)?;
                    <$t>::try_from(wide).map_err(|_| out_of_range::<$t>(wide))
                }
            }
        )+
    };
}

impl_from_value_int!(u8, u16, u32, u64, i8, i16, i32, i64, i128);

impl FromValue for u128 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::UInt128(v) => Ok(v),
            other => {
                let wide = wide_int::<u128>(&other)?;
                u128::try_from(wide).map_err(|_| out_of_range::<u128>(wide))
            }
        }
    }
}

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self> {
        value.as_f64().ok_or_else(|| mismatch::<f64>(&value))
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Float32(v) => Ok(v),
            other => other
                .as_f64()
                .map(|v| v as f32)
                .ok_or_else(|| mismatch::<f32>(&other)),
        }
    }
}

impl FromValue for bool {
    fn from_value(value: Value) -> Result<Self> {
        match value.as_i128() {
            Some(0) => Ok(false),
            Some(1) => Ok(true),
            _ => Err(mismatch::<bool>(&value)),
        }
    }
}

impl FromValue for String {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::String(s) => Ok(s),
            Value::Enum { name, .. } => Ok(name),
            Value::Bytes(bytes) => String::from_utf8(bytes).map_err(|e| {
                Error::Utf8(e.utf8_error())
            }),
            Value::Decimal { .. } | Value::Uuid(_) => Ok(value.to_string()),
            other => Err(mismatch::<String>(&other)),
        }
    }
}

impl FromValue for NaiveDate {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Date(d) | Value::Date32(d) => Ok(d),
            Value::DateTime(t) | Value::DateTime64(t) => Ok(t.date_naive()),
            other => Err(mismatch::<NaiveDate>(&other)),
        }
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::DateTime(t) | Value::DateTime64(t) => Ok(t),
            other => Err(mismatch::<DateTime<Utc>>(&other)),
        }
    }
}

impl FromValue for uuid::Uuid {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Uuid(u) => Ok(u),
            Value::String(ref s) => uuid::Uuid::parse_str(s).map_err(|e| {
                Error::InvalidArgument(format!("Invalid UUID '{}': {}", s, e))
            }),
            other => Err(mismatch::<uuid::Uuid>(&other)),
        }
    }
}

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self> {
        Ok(value)
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            other => T::from_value(other).map(Some),
        }
    }
}

/// `Array` rows convert element-wise. `String` and `Bytes` payloads scan as
/// their raw bytes, so `Vec<u8>` reads binary strings.
impl<T: FromValue> FromValue for Vec<T> {
    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Array(items) => {
                items.into_iter().map(T::from_value).collect()
            }
            Value::Bytes(bytes) => byte_items(bytes),
            Value::String(s) => byte_items(s.into_bytes()),
            other => Err(mismatch::<Vec<T>>(&other)),
        }
    }
}

fn byte_items<T: FromValue>(bytes: Vec<u8>) -> Result<Vec<T>> {
    bytes.into_iter().map(|b| T::from_value(Value::UInt8(b))).collect()
}

fn map_entries<K, V>(
    value: Value,
) -> Result<impl Iterator<Item = Result<(K, V)>>>
where
    K: FromValue,
    V: FromValue,
{
    match value {
        Value::Map(entries) => Ok(entries
            .into_iter()
            .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))),
        other => Err(mismatch::<(K, V)>(&other)),
    }
}

impl<K: FromValue + Eq + Hash, V: FromValue> FromValue for HashMap<K, V> {
    fn from_value(value: Value) -> Result<Self> {
        map_entries(value)?.collect()
    }
}

impl<K: FromValue + Ord, V: FromValue> FromValue for BTreeMap<K, V> {
    fn from_value(value: Value) -> Result<Self> {
        map_entries(value)?.collect()
    }
}

fn tuple_items(
    value: Value,
    arity: usize,
) -> Result<std::vec::IntoIter<Value>> {
    match value {
        Value::Tuple(items) if items.len() == arity => Ok(items.into_iter()),
        Value::Tuple(items) => Err(Error::TypeMismatch {
            expected: format!("Tuple of {} elements", arity),
            actual: format!("Tuple of {} elements", items.len()),
        }),
        other => Err(Error::TypeMismatch {
            expected: format!("Tuple of {} elements", arity),
            actual: other.type_hint().to_string(),
        }),
    }
}

fn next_item<T: FromValue>(items: &mut std::vec::IntoIter<Value>) -> Result<T> {
    T::from_value(items.next().unwrap_or(Value::Null))
}

impl<A: FromValue, B: FromValue> FromValue for (A, B) {
    fn from_value(value: Value) -> Result<Self> {
        let mut items = tuple_items(value, 2)?;
        Ok((next_item(&mut items)?, next_item(&mut items)?))
    }
}

impl<A: FromValue, B: FromValue, C: FromValue> FromValue for (A, B, C) {
    fn from_value(value: Value) -> Result<Self> {
        let mut items = tuple_items(value, 3)?;
        Ok((
            next_item(&mut items)?,
            next_item(&mut items)?,
            next_item(&mut items)?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{
        ColumnMap,
        ColumnString,
        ColumnTuple,
        ColumnUInt64,
        ColumnUInt8,
    };

    #[test]
    fn test_integer_range_checked() {
        assert_eq!(u8::from_value(Value::UInt64(200)).unwrap(), 200);
        assert!(matches!(
            u8::from_value(Value::UInt64(300)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            u32::from_value(Value::Int8(-1)),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            i64::from_value(Value::from("1")),
            Err(Error::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_bool_and_option() {
        let mut col = ColumnUInt8::new();
        col.append(1);
        assert!(scan::<bool>(&col, 0).unwrap());
        assert_eq!(Option::<u8>::from_value(Value::Null).unwrap(), None);
        assert!(scan::<bool>(&col, 1).is_err());
    }

    #[test]
    fn test_maps() {
        let mut col = ColumnMap::new(
            Box::new(ColumnString::new()),
            Box::new(ColumnUInt64::new()),
        );
        let entries: Vec<(Value, Value)> =
            vec![("a".into(), 1u64.into()), ("b".into(), 2u64.into())];
        col.append_value(&Value::Map(entries)).unwrap();

        let hashed: HashMap<String, u64> = scan(&col, 0).unwrap();
        assert_eq!(hashed["b"], 2);
        let ordered: BTreeMap<String, u64> = scan(&col, 0).unwrap();
        assert_eq!(ordered.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_tuples() {
        let mut col = ColumnTuple::new(vec![
            Box::new(ColumnString::new()),
            Box::new(ColumnUInt64::new()),
        ]);
        col.append_value(&Value::Tuple(vec!["k".into(), 9u64.into()])).unwrap();

        let (k, v): (String, u64) = scan(&col, 0).unwrap();
        assert_eq!((k.as_str(), v), ("k", 9));
        assert!(scan::<(String, u64, u8)>(&col, 0).is_err());
    }

    #[test]
    fn test_binary_strings_scan_as_bytes() {
        let mut col = ColumnString::new();
        col.append("ab");

        let bytes: Vec<u8> = scan(&col, 0).unwrap();
        assert_eq!(bytes, b"ab".to_vec());
        assert_eq!(
            Vec::<u8>::from_value(Value::Bytes(vec![0xff, 0])).unwrap(),
            vec![0xff, 0]
        );
        assert_eq!(
            Vec::<u8>::from_value(Value::array([1u8, 2])).unwrap(),
            vec![1, 2]
        );
        assert!(Vec::<u8>::from_value(Value::UInt64(1)).is_err());
    }
}
