//! Fixed-width columns
//!
//! `ColumnVector<T>` stores one `T` per row. On the wire a column is
//! `rows × T::SIZE` bytes, record-major, every record little-endian. The
//! conversion goes through `from_le_bytes` / `to_le_bytes` record by record,
//! so the layout does not depend on the host byte order.

use super::{
    check_slice,
    downcast_other,
    out_of_range,
    rejected,
    Column,
    ColumnBox,
    ColumnTyped,
    Value,
};
use crate::{
    io::{
        cursor::{
            payload_len,
            READ_CHUNK,
        },
        ByteRead,
        ByteWrite,
    },
    types::{
        ToType,
        Type,
    },
    Result,
};

/// A record type with a fixed little-endian wire representation.
pub trait FixedSize:
    Copy + PartialEq + std::fmt::Debug + Send + Sync + 'static
{
    /// Encoded size in bytes.
    const SIZE: usize;

    /// Decode from exactly `SIZE` bytes.
    fn decode(bytes: &[u8]) -> Self;

    /// Encode into exactly `SIZE` bytes.
    fn encode(&self, out: &mut [u8]);

    /// Default wire type of a column of this record type.
    fn wire_type() -> Type;

    fn to_value(&self) -> Value;

    /// Convert a value, accepting any kind that fits without loss.
    fn from_value(value: &Value) -> Option<Self>;

    /// Whether `value` is this record's own kind.
    fn matches(value: &Value) -> bool;
}

macro_rules! impl_fixed_size_int {
    ($($type:ty => $variant:ident),+ $(,)?) => {
        $(
            impl FixedSize for $type {
                const SIZE: usize = std::mem::size_of::<$type>();

                fn decode(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$type>()];
                    raw.copy_from_slice(bytes);
                    <$type>::from_le_bytes(raw)
                }

                fn encode(&self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_le_bytes());
                }

                fn wire_type() -> Type {
                    <$type as ToType>::to_type()
                }

                fn to_value(&self) -> Value {
                    Value::$variant(*self)
                }

                fn from_value(value: &Value) -> Option<Self> {
                    if let Value::$variant(v) = value {
                        return Some(*v);
                    }
                    if let Value::UInt128(v) = value {
                        return <$type>::try_from(*v).ok();
                    }
                    value.as_i128().and_then(|v| <$type>::try_from(v).ok())
                }

                fn matches(value: &Value) -> bool {
                    matches!(value, Value::$variant(_))
                }
            }
        )+
    };
}

impl_fixed_size_int!(
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
);

impl FixedSize for f32 {
    const SIZE: usize = 4;

    fn decode(bytes: &[u8]) -> Self {
        f32::from_bits(u32::decode(bytes))
    }

    fn encode(&self, out: &mut [u8]) {
        self.to_bits().encode(out)
    }

    fn wire_type() -> Type {
        Type::float32()
    }

    fn to_value(&self) -> Value {
        Value::Float32(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float32(v) => Some(*v),
            _ => None,
        }
    }

    fn matches(value: &Value) -> bool {
        matches!(value, Value::Float32(_))
    }
}

impl FixedSize for f64 {
    const SIZE: usize = 8;

    fn decode(bytes: &[u8]) -> Self {
        f64::from_bits(u64::decode(bytes))
    }

    fn encode(&self, out: &mut [u8]) {
        self.to_bits().encode(out)
    }

    fn wire_type() -> Type {
        Type::float64()
    }

    fn to_value(&self) -> Value {
        Value::Float64(*self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float64(v) => Some(*v),
            Value::Float32(v) => Some(*v as f64),
            _ => None,
        }
    }

    fn matches(value: &Value) -> bool {
        matches!(value, Value::Float64(_))
    }
}

/// Generic column for fixed-width record types
#[derive(Debug, Clone)]
pub struct ColumnVector<T: FixedSize> {
    type_: Type,
    data: Vec<T>,
}

impl<T: FixedSize> ColumnVector<T> {
    pub fn new() -> Self {
        Self::with_type(T::wire_type())
    }

    /// Column with an explicit declared type, for aliases such as `Bool`
    /// over `UInt8` or the integer storage of dates and enums.
    pub fn with_type(type_: Type) -> Self {
        Self { type_, data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { type_: T::wire_type(), data: Vec::with_capacity(capacity) }
    }

    pub fn from_vec(data: Vec<T>) -> Self {
        Self { type_: T::wire_type(), data }
    }

    /// Create a column with initial data (builder pattern)
    pub fn with_data(mut self, data: Vec<T>) -> Self {
        self.data = data;
        self
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.data.get(index).copied()
    }

    /// Get value at index (panics if out of bounds)
    pub fn at(&self, index: usize) -> T {
        self.data[index]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn append(&mut self, value: T) {
        self.data.push(value);
    }

    pub fn last(&self) -> Option<T> {
        self.data.last().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.data.iter()
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Vec<T> {
        &mut self.data
    }
}

impl<T: FixedSize> Default for ColumnVector<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: FixedSize> Column for ColumnVector<T> {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn clear(&mut self) {
        self.data.clear()
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    fn append_column(&mut self, other: &dyn Column) -> Result<()> {
        let other = downcast_other::<ColumnVector<T>>(&self.type_, other)?;
        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        let record = T::from_value(value)
            .ok_or_else(|| rejected(value, &self.type_))?;
        self.data.push(record);
        Ok(())
    }

    fn append_default(&mut self) {
        self.data.push(T::decode(&[0u8; 16][..T::SIZE]));
    }

    fn can_accept(&self, value: &Value) -> bool {
        T::matches(value)
    }

    fn value(&self, index: usize) -> Result<Value> {
        self.data
            .get(index)
            .map(FixedSize::to_value)
            .ok_or_else(|| out_of_range(index, self.data.len()))
    }

    fn load_body(
        &mut self,
        reader: &mut dyn ByteRead,
        rows: usize,
    ) -> Result<()> {
        payload_len(rows, T::SIZE)?;
        self.data.clear();
        self.data.reserve(rows.min(READ_CHUNK));

        // decode chunk by chunk so the row count only commits memory as
        // bytes actually arrive
        let per_chunk = (READ_CHUNK / T::SIZE).max(1);
        let mut buf = vec![0u8; rows.min(per_chunk) * T::SIZE];
        let mut remaining = rows;
        while remaining > 0 {
            let n = remaining.min(per_chunk);
            let bytes = &mut buf[..n * T::SIZE];
            if let Err(e) = reader.read_exact_into(bytes) {
                self.data.clear();
                return Err(e);
            }
            self.data.extend(bytes.chunks_exact(T::SIZE).map(T::decode));
            remaining -= n;
        }
        Ok(())
    }

    fn save_body(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        let mut bytes = vec![0u8; self.data.len() * T::SIZE];
        let slots = bytes.chunks_exact_mut(T::SIZE);
        for (record, out) in self.data.iter().zip(slots) {
            record.encode(out);
        }
        writer.write_bytes(&bytes)
    }

    fn check_type(&mut self, wire_type: &Type) -> Result<()> {
        if wire_type == &self.type_ || wire_type == &T::wire_type() {
            Ok(())
        } else {
            Err(super::incompatible(wire_type, &self.type_))
        }
    }

    fn clone_empty(&self) -> ColumnBox {
        Box::new(ColumnVector::<T>::with_type(self.type_.clone()))
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnBox> {
        check_slice(begin, len, self.data.len())?;
        Ok(Box::new(ColumnVector::<T> {
            type_: self.type_.clone(),
            data: self.data[begin..begin + len].to_vec(),
        }))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl<T: FixedSize> ColumnTyped for ColumnVector<T> {
    type Item = T;

    fn get(&self, index: usize) -> Option<T> {
        self.data.get(index).copied()
    }

    fn push(&mut self, item: T) -> Result<()> {
        self.data.push(item);
        Ok(())
    }
}

// Type aliases for common numeric columns
pub type ColumnUInt8 = ColumnVector<u8>;
pub type ColumnUInt16 = ColumnVector<u16>;
pub type ColumnUInt32 = ColumnVector<u32>;
pub type ColumnUInt64 = ColumnVector<u64>;
pub type ColumnUInt128 = ColumnVector<u128>;

pub type ColumnInt8 = ColumnVector<i8>;
pub type ColumnInt16 = ColumnVector<i16>;
pub type ColumnInt32 = ColumnVector<i32>;
pub type ColumnInt64 = ColumnVector<i64>;
pub type ColumnInt128 = ColumnVector<i128>;

pub type ColumnFloat32 = ColumnVector<f32>;
pub type ColumnFloat64 = ColumnVector<f64>;
