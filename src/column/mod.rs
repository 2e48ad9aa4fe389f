//! # Column Module
//!
//! This module provides implementations for the ClickHouse column kinds of
//! the native block format, and the [`Column`] trait they all share.
//!
//! ## ClickHouse Documentation
//!
//! - [Data Types Overview](https://clickhouse.com/docs/en/sql-reference/data-types)
//! - [Nullable Type](https://clickhouse.com/docs/en/sql-reference/data-types/nullable)
//! - [Array Type](https://clickhouse.com/docs/en/sql-reference/data-types/array)
//! - [LowCardinality Type](https://clickhouse.com/docs/en/sql-reference/data-types/lowcardinality)
//! - [Tuple Type](https://clickhouse.com/docs/en/sql-reference/data-types/tuple)
//! - [Map Type](https://clickhouse.com/docs/en/sql-reference/data-types/map)
//! - [Variant Type](https://clickhouse.com/docs/en/sql-reference/data-types/variant)
//!
//! ## Composition
//!
//! Leaves ([`ColumnVector`], [`ColumnString`], dates, decimals, enums) hold
//! data. Decorators ([`ColumnArray`], [`ColumnNullable`],
//! [`ColumnLowCardinality`], [`ColumnTuple`], [`ColumnMap`],
//! [`ColumnVariant`]) exclusively own the boxed columns they wrap and
//! delegate to them in a fixed order. Ownership is strictly nested.
//!
//! ## Type Nesting Restrictions
//!
//! ClickHouse enforces strict rules about type nesting. The following
//! combinations are **NOT allowed**:
//!
//! | Invalid Nesting | Workaround |
//! |----------------|------------|
//! | `Nullable(Array(...))` | Use `Array(Nullable(...))` |
//! | `Nullable(LowCardinality(...))` | Use `LowCardinality(Nullable(...))` |
//!
//! [`create_column`] rejects both.

pub mod array;
pub mod date;
pub mod decimal;
pub mod enum_column;
pub mod lowcardinality;
pub mod map;
pub mod nullable;
pub mod numeric;
pub mod string;
pub mod tuple;
pub mod uuid;
pub mod value;
pub mod variant;

pub use array::ColumnArray;
pub use date::{
    ColumnDate,
    ColumnDate32,
    ColumnDateTime,
    ColumnDateTime64,
};
pub use decimal::ColumnDecimal;
pub use enum_column::{
    ColumnEnum,
    ColumnEnum16,
    ColumnEnum8,
};
pub use lowcardinality::ColumnLowCardinality;
pub use map::ColumnMap;
pub use nullable::ColumnNullable;
pub use numeric::*;
pub use string::{
    ColumnFixedString,
    ColumnString,
};
pub use tuple::{
    ColumnTuple,
    ColumnTuple1,
    ColumnTuple2,
    ColumnTuple3,
    ColumnTuple4,
    ColumnTuple5,
    ColumnTupleN,
    TupleRow,
};
pub use uuid::ColumnUuid;
pub use value::Value;
pub use variant::ColumnVariant;

use crate::{
    io::{
        ByteRead,
        ByteWrite,
    },
    types::{
        Type,
        TypeCode,
    },
    Error,
    Result,
};
use std::any::Any;

/// Owned, type-erased column. Decorators own their children through this.
pub type ColumnBox = Box<dyn Column>;

/// Base trait for all column types.
///
/// Reading happens in two phases per block: every column's prefix first
/// ([`Column::load_prefix`]), then every column's body
/// ([`Column::load_body`]). Writing mirrors this. Only LowCardinality and
/// Variant carry prefix data; decorators forward the prefix calls to their
/// children so that nested occurrences are found.
pub trait Column: Send + Sync {
    /// Declared wire type of this column.
    fn column_type(&self) -> &Type;

    /// Number of rows.
    fn size(&self) -> usize;

    /// Remove all rows, keeping allocated buffers.
    fn clear(&mut self);

    /// Reserve capacity for at least `additional` more rows.
    fn reserve(&mut self, additional: usize);

    /// Keep only the first `len` rows. No-op if `len >= size()`.
    fn truncate(&mut self, len: usize);

    /// Append all rows of another column of the same kind.
    fn append_column(&mut self, other: &dyn Column) -> Result<()>;

    /// Append one row.
    fn append_value(&mut self, value: &Value) -> Result<()>;

    /// Append the placeholder row used at null positions.
    fn append_default(&mut self);

    /// Whether [`Column::append_value`] would store `value` without
    /// converting it to a different kind.
    fn can_accept(&self, value: &Value) -> bool;

    /// Row `index` as a dynamic value.
    fn value(&self, index: usize) -> Result<Value>;

    /// Read prefix data that precedes all column bodies of a block.
    fn load_prefix(
        &mut self,
        _reader: &mut dyn ByteRead,
        _rows: usize,
    ) -> Result<()> {
        Ok(())
    }

    /// Read `rows` rows, replacing the current content.
    fn load_body(
        &mut self,
        reader: &mut dyn ByteRead,
        rows: usize,
    ) -> Result<()>;

    /// Write prefix data; the counterpart of [`Column::load_prefix`].
    fn save_prefix(&self, _writer: &mut dyn ByteWrite) -> Result<()> {
        Ok(())
    }

    /// Write all rows.
    fn save_body(&self, writer: &mut dyn ByteWrite) -> Result<()>;

    /// Revalidate this column against a type announced in a block header,
    /// adopting header details the column kind tolerates (timezones, enum
    /// tables). Fails with [`Error::IncompatibleType`] otherwise.
    fn check_type(&mut self, wire_type: &Type) -> Result<()> {
        if wire_type == self.column_type() {
            Ok(())
        } else {
            Err(incompatible(wire_type, self.column_type()))
        }
    }

    /// Check that buffered rows are internally consistent before encoding.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Create an empty column of the same type and shape.
    fn clone_empty(&self) -> ColumnBox;

    /// Copy rows `[begin, begin + len)` into a new column.
    fn slice(&self, begin: usize, len: usize) -> Result<ColumnBox>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<'a> dyn Column + 'a {
    /// Downcast to a concrete column type.
    pub fn downcast_ref<T: Column + 'static>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Column + 'static>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

impl<'a> std::fmt::Debug for dyn Column + 'a {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("type", &self.column_type().name())
            .field("rows", &self.size())
            .finish()
    }
}

/// Statically typed row access on top of [`Column`].
pub trait ColumnTyped: Column {
    type Item;

    /// Row `index`, or `None` when out of range.
    fn get(&self, index: usize) -> Option<Self::Item>;

    /// Append one row.
    fn push(&mut self, item: Self::Item) -> Result<()>;
}

pub(crate) fn incompatible(wire_type: &Type, accepted: &Type) -> Error {
    Error::IncompatibleType {
        wire_type: wire_type.name(),
        accepted: vec![accepted.name()],
    }
}

pub(crate) fn check_slice(begin: usize, len: usize, size: usize) -> Result<()> {
    match begin.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::InvalidArgument(format!(
            "Slice range out of bounds: begin={}, len={}, size={}",
            begin, len, size
        ))),
    }
}

pub(crate) fn out_of_range(index: usize, size: usize) -> Error {
    Error::InvalidArgument(format!(
        "Row index {} out of range for column of {} rows",
        index, size
    ))
}

pub(crate) fn rejected(value: &Value, type_: &Type) -> Error {
    Error::TypeMismatch {
        expected: type_.name(),
        actual: value.type_hint().to_string(),
    }
}

pub(crate) fn downcast_other<'a, T: Column + 'static>(
    this: &Type,
    other: &'a dyn Column,
) -> Result<&'a T> {
    other.as_any().downcast_ref::<T>().ok_or_else(|| Error::TypeMismatch {
        expected: this.name(),
        actual: other.column_type().name(),
    })
}

/// Build an empty column tree for `type_`.
pub fn create_column(type_: &Type) -> Result<ColumnBox> {
    match type_ {
        Type::Simple(code) => match code {
            TypeCode::UInt8 => Ok(Box::new(ColumnUInt8::new())),
            TypeCode::UInt16 => Ok(Box::new(ColumnUInt16::new())),
            TypeCode::UInt32 => Ok(Box::new(ColumnUInt32::new())),
            TypeCode::UInt64 => Ok(Box::new(ColumnUInt64::new())),
            TypeCode::UInt128 => Ok(Box::new(ColumnUInt128::new())),
            TypeCode::Int8 => Ok(Box::new(ColumnInt8::new())),
            TypeCode::Int16 => Ok(Box::new(ColumnInt16::new())),
            TypeCode::Int32 => Ok(Box::new(ColumnInt32::new())),
            TypeCode::Int64 => Ok(Box::new(ColumnInt64::new())),
            TypeCode::Int128 => Ok(Box::new(ColumnInt128::new())),
            TypeCode::Float32 => Ok(Box::new(ColumnFloat32::new())),
            TypeCode::Float64 => Ok(Box::new(ColumnFloat64::new())),
            TypeCode::String => Ok(Box::new(ColumnString::new())),
            TypeCode::Date => Ok(Box::new(ColumnDate::new())),
            TypeCode::Date32 => Ok(Box::new(ColumnDate32::new())),
            TypeCode::UUID => Ok(Box::new(ColumnUuid::new())),
            _ => Err(Error::NotImplemented(format!(
                "Unsupported column type: {}",
                type_.name()
            ))),
        },
        Type::FixedString { size } => {
            Ok(Box::new(ColumnFixedString::new(*size)))
        }
        Type::DateTime { timezone } => {
            Ok(Box::new(ColumnDateTime::new(timezone.clone())))
        }
        Type::DateTime64 { precision, timezone } => {
            Ok(Box::new(ColumnDateTime64::new(*precision, timezone.clone())))
        }
        Type::Decimal { precision, scale } => {
            Ok(Box::new(ColumnDecimal::new(*precision, *scale)))
        }
        Type::Enum8 { .. } => Ok(Box::new(ColumnEnum8::new(type_.clone()))),
        Type::Enum16 { .. } => Ok(Box::new(ColumnEnum16::new(type_.clone()))),
        Type::Array { item_type } => {
            Ok(Box::new(ColumnArray::new(create_column(item_type)?)))
        }
        Type::Nullable { nested_type } => match nested_type.as_ref() {
            Type::Array { .. } | Type::LowCardinality { .. } => {
                Err(Error::MalformedType {
                    fragment: type_.name(),
                    reason: format!(
                        "{} cannot be inside Nullable",
                        nested_type.code().name()
                    ),
                })
            }
            nested => Ok(Box::new(ColumnNullable::new(create_column(nested)?))),
        },
        Type::Tuple { item_types, item_names } => {
            let columns = item_types
                .iter()
                .map(create_column)
                .collect::<Result<Vec<_>>>()?;
            if item_names.is_empty() {
                Ok(Box::new(ColumnTuple::new(columns)))
            } else {
                Ok(Box::new(ColumnTuple::with_type(type_.clone(), columns)?))
            }
        }
        Type::Nested { fields } => {
            let columns = fields
                .iter()
                .map(|(_, t)| create_column(t))
                .collect::<Result<Vec<_>>>()?;
            let tuple = ColumnTuple::with_type(
                Type::named_tuple(fields.clone()),
                columns,
            )?;
            Ok(Box::new(ColumnArray::with_type(type_.clone(), Box::new(tuple))))
        }
        Type::LowCardinality { nested_type } => {
            Ok(Box::new(ColumnLowCardinality::new(nested_type)?))
        }
        Type::Map { key_type, value_type } => Ok(Box::new(ColumnMap::new(
            create_column(key_type)?,
            create_column(value_type)?,
        ))),
        Type::Variant { variants } => {
            let columns = variants
                .iter()
                .map(create_column)
                .collect::<Result<Vec<_>>>()?;
            Ok(Box::new(ColumnVariant::new(columns)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_column_types() {
        for name in [
            "UInt8",
            "Int128",
            "String",
            "FixedString(4)",
            "DateTime('UTC')",
            "DateTime64(6)",
            "Decimal(20, 4)",
            "Enum8('a' = 1)",
            "Array(Array(Nullable(Int32)))",
            "LowCardinality(Nullable(String))",
            "Tuple(String, Int64)",
            "Tuple(a String, b Int64)",
            "Nested(id UInt32, name String)",
            "Map(String, UInt64)",
            "Variant(String, UInt64)",
        ] {
            let type_ = Type::parse(name).unwrap();
            let column = create_column(&type_).unwrap();
            assert_eq!(column.column_type(), &type_, "type of {}", name);
            assert_eq!(column.size(), 0);
        }
    }

    #[test]
    fn test_create_column_rejects_bad_nesting() {
        for name in
            ["Nullable(Array(Int32))", "Nullable(LowCardinality(String))"]
        {
            let type_ = Type::parse(name).unwrap();
            assert!(matches!(
                create_column(&type_),
                Err(Error::MalformedType { .. })
            ));
        }
    }

    #[test]
    fn test_downcast() {
        let column = create_column(&Type::uint64()).unwrap();
        assert!(column.downcast_ref::<ColumnUInt64>().is_some());
        assert!(column.downcast_ref::<ColumnString>().is_none());
    }

    #[test]
    fn test_debug_names_type() {
        let mut column = create_column(&Type::parse("Array(UInt8)").unwrap())
            .unwrap();
        column.append_value(&Value::array([1u8])).unwrap();
        assert_eq!(
            format!("{:?}", column),
            "Column { type: \"Array(UInt8)\", rows: 1 }"
        );
    }
}
