//! Array column implementation
//!
//! **ClickHouse Documentation:** <https://clickhouse.com/docs/en/sql-reference/data-types/array>
//!
//! ## Overview
//!
//! Array columns store variable-length arrays of elements. All elements are
//! stored in a single nested column (flattened), with offsets tracking where
//! each array ends.
//!
//! ## Important Restriction
//!
//! **Arrays cannot be wrapped in Nullable:**
//! - ❌ `Nullable(Array(String))`
//! - ✅ `Array(Nullable(String))` - each element can be NULL
//!
//! If you need to represent "no array", use an empty array `[]` instead of
//! NULL.
//!
//! ## Wire Format
//!
//! ```text
//! [offsets: UInt64 * num_arrays]  // Cumulative element counts
//! [nested_column_data]             // All elements concatenated
//! ```
//!
//! Example: `[[1,2], [3], [4,5,6]]`
//! - Offsets: `[2, 3, 6]`
//! - Nested data: `[1, 2, 3, 4, 5, 6]`

use super::{
    check_slice,
    downcast_other,
    numeric::ColumnVector,
    out_of_range,
    rejected,
    Column,
    ColumnBox,
    Value,
};
use crate::{
    error::ResultExt,
    io::{
        ByteRead,
        ByteWrite,
    },
    types::Type,
    Error,
    Result,
};
use std::sync::OnceLock;
use tracing::trace;

/// Column for arrays of variable length
///
/// Row `i` spans nested rows `[offsets[i-1], offsets[i])`, with an implicit
/// `offsets[-1] = 0`. Offsets only ever grow by appending.
pub struct ColumnArray {
    type_: Type,
    nested: ColumnBox,
    offsets: ColumnVector<u64>,
    /// Nested rows materialized as values, built on first row access and
    /// dropped on any mutation.
    values: OnceLock<Vec<Value>>,
}

impl ColumnArray {
    /// Create an array column around an existing (usually empty) nested
    /// column.
    pub fn new(nested: ColumnBox) -> Self {
        let type_ = Type::array(nested.column_type().clone());
        Self::with_type(type_, nested)
    }

    /// Array column that reports a different declared type, as `Nested(...)`
    /// does over an array of named tuples.
    pub fn with_type(type_: Type, nested: ColumnBox) -> Self {
        Self {
            type_,
            nested,
            offsets: ColumnVector::new(),
            values: OnceLock::new(),
        }
    }

    fn invalidate(&mut self) {
        self.values.take();
    }

    fn last_offset(&self) -> u64 {
        self.offsets.last().unwrap_or(0)
    }

    /// Record an array of `len` elements that were already appended to the
    /// nested column.
    pub fn append_len(&mut self, len: u64) {
        let last = self.last_offset();
        self.offsets.append(last + len);
        self.invalidate();
    }

    /// Append all rows of `array_data` as one array row.
    pub fn append_array(&mut self, array_data: &dyn Column) -> Result<()> {
        self.nested.append_column(array_data)?;
        self.append_len(array_data.size() as u64);
        Ok(())
    }

    /// Nested row range `[start, end)` of row `index`.
    pub fn array_range(&self, index: usize) -> Option<(usize, usize)> {
        let end = self.offsets.get(index)? as usize;
        let start = match index {
            0 => 0,
            _ => self.offsets.get(index - 1)? as usize,
        };
        Some((start, end))
    }

    fn checked_range(&self, index: usize) -> Result<(usize, usize)> {
        self.array_range(index)
            .ok_or_else(|| out_of_range(index, self.size()))
    }

    pub fn array_len(&self, index: usize) -> Option<usize> {
        self.array_range(index).map(|(start, end)| end - start)
    }

    /// Row `index` as a standalone column.
    pub fn at(&self, index: usize) -> Result<ColumnBox> {
        let (start, end) = self.checked_range(index)?;
        self.nested.slice(start, end - start)
    }

    pub fn nested(&self) -> &dyn Column {
        self.nested.as_ref()
    }

    /// Mutable access to the nested column. Callers that append to it must
    /// follow up with [`ColumnArray::append_len`].
    pub fn nested_mut(&mut self) -> &mut dyn Column {
        self.invalidate();
        self.nested.as_mut()
    }

    pub fn offsets(&self) -> &[u64] {
        self.offsets.data()
    }

    /// Descend `level` array wrappers: `elem(0)` is this column, `elem(1)`
    /// its nested column, and so on. `None` if a level is not an array.
    pub fn elem(&self, level: usize) -> Option<&dyn Column> {
        let mut current: &dyn Column = self;
        for _ in 0..level {
            current = current.downcast_ref::<ColumnArray>()?.nested();
        }
        Some(current)
    }

    /// Innermost non-array column.
    pub fn innermost(&self) -> &dyn Column {
        let mut current = self.nested();
        while let Some(array) = current.downcast_ref::<ColumnArray>() {
            current = array.nested();
        }
        current
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    fn nested_values(&self) -> Result<&[Value]> {
        if let Some(values) = self.values.get() {
            return Ok(values);
        }
        let values = (0..self.nested.size())
            .map(|i| self.nested.value(i))
            .collect::<Result<Vec<_>>>()?;
        Ok(self.values.get_or_init(|| values))
    }

    fn check_offsets(&self) -> Result<()> {
        let mut previous = 0u64;
        for (row, &offset) in self.offsets.data().iter().enumerate() {
            if offset < previous {
                return Err(Error::Protocol(format!(
                    "Array offsets decrease at row {}: {} after {}",
                    row, offset, previous
                )));
            }
            previous = offset;
        }
        Ok(())
    }
}

impl Column for ColumnArray {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.offsets.len()
    }

    fn clear(&mut self) {
        self.offsets.clear();
        self.nested.clear();
        self.invalidate();
    }

    fn reserve(&mut self, additional: usize) {
        self.offsets.reserve(additional);
    }

    fn truncate(&mut self, len: usize) {
        if len < self.offsets.len() {
            let keep = match len {
                0 => 0,
                _ => self.offsets.at(len - 1) as usize,
            };
            self.nested.truncate(keep);
            self.offsets.truncate(len);
            self.invalidate();
        }
    }

    fn append_column(&mut self, other: &dyn Column) -> Result<()> {
        let other = downcast_other::<ColumnArray>(&self.type_, other)?;
        let base = self.last_offset();
        self.nested.append_column(other.nested.as_ref())?;
        for &offset in other.offsets.data() {
            self.offsets.append(base + offset);
        }
        self.invalidate();
        Ok(())
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        let Value::Array(items) = value else {
            return Err(rejected(value, &self.type_));
        };

        let before = self.nested.size();
        for item in items {
            if let Err(e) = self.nested.append_value(item) {
                self.nested.truncate(before);
                return Err(e);
            }
        }
        self.append_len(items.len() as u64);
        Ok(())
    }

    fn append_default(&mut self) {
        self.append_len(0);
    }

    fn can_accept(&self, value: &Value) -> bool {
        match value {
            Value::Array(items) => {
                items.iter().all(|v| self.nested.can_accept(v))
            }
            _ => false,
        }
    }

    fn value(&self, index: usize) -> Result<Value> {
        let (start, end) = self.checked_range(index)?;
        let values = self.nested_values()?;
        let items = values.get(start..end).ok_or_else(|| {
            Error::Validation(format!(
                "Array row {} spans [{}, {}) but nested column has {} rows",
                index,
                start,
                end,
                values.len()
            ))
        })?;
        Ok(Value::Array(items.to_vec()))
    }

    fn load_prefix(
        &mut self,
        reader: &mut dyn ByteRead,
        rows: usize,
    ) -> Result<()> {
        self.nested.load_prefix(reader, rows)
    }

    fn load_body(
        &mut self,
        reader: &mut dyn ByteRead,
        rows: usize,
    ) -> Result<()> {
        self.invalidate();
        self.offsets.load_body(reader, rows).context("read offset column")?;
        self.check_offsets()?;

        let last = self.last_offset();
        let total = usize::try_from(last).map_err(|_| {
            Error::Protocol(format!(
                "Array element count {} is too large",
                last
            ))
        })?;
        trace!(rows, elements = total, "array body");
        self.nested.load_body(reader, total).context("read array elements")
    }

    fn save_prefix(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        self.nested.save_prefix(writer)
    }

    fn save_body(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        self.offsets.save_body(writer).context("write offset column")?;
        self.nested.save_body(writer).context("write array elements")
    }

    fn check_type(&mut self, wire_type: &Type) -> Result<()> {
        match (&self.type_, wire_type) {
            (Type::Array { .. }, Type::Array { item_type }) => {
                self.nested.check_type(item_type)?;
                self.type_ = Type::array(self.nested.column_type().clone());
                Ok(())
            }
            (Type::Nested { .. }, Type::Nested { fields }) => {
                self.nested.check_type(&Type::named_tuple(fields.clone()))?;
                self.type_ = wire_type.clone();
                Ok(())
            }
            _ => Err(super::incompatible(wire_type, &self.type_)),
        }
    }

    fn validate(&self) -> Result<()> {
        self.check_offsets()?;
        if self.nested.size() as u64 != self.last_offset() {
            return Err(Error::Insert(format!(
                "Array column {} has {} elements but its offsets end at {}",
                self.type_,
                self.nested.size(),
                self.last_offset()
            )));
        }
        self.nested.validate()
    }

    fn clone_empty(&self) -> ColumnBox {
        Box::new(ColumnArray::with_type(
            self.type_.clone(),
            self.nested.clone_empty(),
        ))
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnBox> {
        check_slice(begin, len, self.size())?;
        if len == 0 {
            return Ok(self.clone_empty());
        }

        let start = if begin == 0 { 0 } else { self.offsets.at(begin - 1) };
        let end = self.offsets.at(begin + len - 1);
        let nested = self.nested.slice(start as usize, (end - start) as usize)?;

        let mut result = ColumnArray::with_type(self.type_.clone(), nested);
        for &offset in &self.offsets.data()[begin..begin + len] {
            result.offsets.append(offset - start);
        }
        Ok(Box::new(result))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        column::{
            ColumnNullable,
            ColumnString,
            ColumnUInt64,
        },
        io::SliceReader,
    };
    use bytes::BytesMut;

    fn uint64_array() -> ColumnArray {
        ColumnArray::new(Box::new(ColumnUInt64::new()))
    }

    #[test]
    fn test_array_creation() {
        let arr = uint64_array();
        assert_eq!(arr.size(), 0);
        assert_eq!(arr.column_type().name(), "Array(UInt64)");
    }

    #[test]
    fn test_array_offsets() {
        let mut arr = uint64_array();
        arr.append_value(&Value::array([1u64, 2])).unwrap();
        arr.append_value(&Value::Array(vec![])).unwrap();
        arr.append_value(&Value::array([3u64, 4, 5])).unwrap();

        assert_eq!(arr.offsets(), &[2, 2, 5]);
        assert_eq!(arr.array_range(2), Some((2, 5)));
        assert_eq!(arr.array_len(1), Some(0));
        assert_eq!(arr.value(2).unwrap(), Value::array([3u64, 4, 5]));
    }

    #[test]
    fn test_failed_append_rolls_back() {
        let mut arr = uint64_array();
        arr.append_value(&Value::array([1u64])).unwrap();
        let bad = Value::Array(vec![Value::UInt64(2), Value::from("x")]);
        assert!(arr.append_value(&bad).is_err());
        assert_eq!(arr.size(), 1);
        assert_eq!(arr.nested().size(), 1);
        arr.validate().unwrap();
    }

    #[test]
    fn test_array_wire_layout() {
        let mut arr = uint64_array();
        arr.append_value(&Value::array([7u64])).unwrap();
        arr.append_value(&Value::array([8u64, 9])).unwrap();

        let mut buf = BytesMut::new();
        arr.save_body(&mut buf).unwrap();

        let mut expected = Vec::new();
        for v in [1u64, 3, 7, 8, 9] {
            expected.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(&buf[..], &expected[..]);

        let mut decoded = uint64_array();
        decoded.load_body(&mut SliceReader::new(&buf), 2).unwrap();
        assert_eq!(decoded.value(1).unwrap(), Value::array([8u64, 9]));
    }

    #[test]
    fn test_decreasing_offsets_rejected() {
        let mut buf = Vec::new();
        for v in [3u64, 1] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        let mut arr = uint64_array();
        assert!(matches!(
            arr.load_body(&mut SliceReader::new(&buf), 2),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_short_elements_carry_context() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&2u64.to_le_bytes());
        buf.extend_from_slice(&1u64.to_le_bytes());

        let mut arr = uint64_array();
        let err = arr.load_body(&mut SliceReader::new(&buf), 1).unwrap_err();
        assert_eq!(err.steps(), vec!["read array elements"]);
        assert!(matches!(err.root(), Error::UnexpectedEof { position: 8, .. }));
    }

    #[test]
    fn test_array_slice() {
        let mut arr = ColumnArray::new(Box::new(ColumnString::new()));
        for row in [vec!["a"], vec!["b", "c"], vec![], vec!["d"]] {
            arr.append_value(&Value::array(row)).unwrap();
        }

        let sliced = arr.slice(1, 2).unwrap();
        let sliced = sliced.downcast_ref::<ColumnArray>().unwrap();
        assert_eq!(sliced.offsets(), &[2, 2]);
        assert_eq!(sliced.value(0).unwrap(), Value::array(["b", "c"]));
        assert_eq!(arr.at(3).unwrap().size(), 1);
    }

    #[test]
    fn test_append_column_rebases_offsets() {
        let mut a = uint64_array();
        a.append_value(&Value::array([1u64, 2])).unwrap();
        let mut b = uint64_array();
        b.append_value(&Value::array([3u64])).unwrap();

        a.append_column(&b).unwrap();
        assert_eq!(a.offsets(), &[2, 3]);
        assert_eq!(a.value(1).unwrap(), Value::array([3u64]));
    }

    #[test]
    fn test_elem_levels() {
        let nullable = ColumnNullable::new(Box::new(ColumnUInt64::new()));
        let inner = ColumnArray::new(Box::new(nullable));
        let outer = ColumnArray::new(Box::new(inner));
        assert_eq!(
            outer.column_type().name(),
            "Array(Array(Nullable(UInt64)))"
        );
        let level_two = outer.elem(2).unwrap();
        assert_eq!(level_two.column_type().name(), "Nullable(UInt64)");
        assert!(outer.elem(3).is_none());
        assert_eq!(outer.innermost().column_type().name(), "Nullable(UInt64)");
    }

    #[test]
    fn test_cache_invalidated_by_mutation() {
        let mut arr = uint64_array();
        arr.append_value(&Value::array([1u64])).unwrap();
        assert_eq!(arr.value(0).unwrap(), Value::array([1u64]));
        arr.clear();
        arr.append_value(&Value::array([5u64])).unwrap();
        assert_eq!(arr.value(0).unwrap(), Value::array([5u64]));
    }

    #[test]
    fn test_validate_detects_mismatch() {
        let mut arr = uint64_array();
        arr.nested_mut().append_value(&Value::UInt64(1)).unwrap();
        assert!(matches!(arr.validate(), Err(Error::Insert(_))));
        arr.append_len(1);
        arr.validate().unwrap();
    }
}
