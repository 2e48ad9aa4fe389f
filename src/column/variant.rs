//! Variant column implementation
//!
//! **ClickHouse Documentation:** <https://clickhouse.com/docs/en/sql-reference/data-types/variant>
//!
//! A tagged union over up to 255 member columns. Members are ordered by their
//! canonical type name and a row's discriminator is its member's index in that
//! order, so both ends of the wire agree regardless of declaration order.
//!
//! ## Wire Format
//!
//! ```text
//! prefix:  [discriminators mode: UInt64 = 0]
//!          [member prefixes, in order]
//! body:    [discriminator: UInt8 * rows]      // 255 = NULL
//!          [member 0 data, rows tagged 0]
//!          [member 1 data, rows tagged 1]
//!          ...
//! ```
//!
//! Members hold their rows densely in arrival order, so a per-row position
//! index maps row `i` to its row inside the selected member.

use super::{
    check_slice,
    downcast_other,
    numeric::ColumnVector,
    out_of_range,
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
use tracing::trace;

/// Discriminator of a NULL row.
pub const NULL_DISCRIMINATOR: u8 = 255;

const BASIC_DISCRIMINATORS_MODE: u64 = 0;

pub struct ColumnVariant {
    type_: Type,
    variants: Vec<ColumnBox>,
    discriminators: ColumnVector<u8>,
    /// Row index inside the selected member; 0 for NULL rows.
    positions: Vec<usize>,
}

fn variant_type(variants: &[ColumnBox]) -> Type {
    Type::variant(variants.iter().map(|c| c.column_type().clone()).collect())
}

impl ColumnVariant {
    /// Build a variant over `variants`, reordering them by type name.
    pub fn new(mut variants: Vec<ColumnBox>) -> Result<Self> {
        if variants.len() > usize::from(NULL_DISCRIMINATOR) {
            return Err(Error::MalformedType {
                fragment: format!("Variant of {} types", variants.len()),
                reason: format!(
                    "at most {} members are allowed",
                    NULL_DISCRIMINATOR
                ),
            });
        }
        variants.sort_by_cached_key(|c| c.column_type().name());
        if let Some(pair) = variants
            .windows(2)
            .find(|w| w[0].column_type() == w[1].column_type())
        {
            return Err(Error::MalformedType {
                fragment: pair[0].column_type().name(),
                reason: "appears more than once in Variant".to_string(),
            });
        }

        Ok(Self {
            type_: variant_type(&variants),
            variants,
            discriminators: ColumnVector::new(),
            positions: Vec::new(),
        })
    }

    pub fn variant_count(&self) -> usize {
        self.variants.len()
    }

    /// Member column for discriminator `discriminator`.
    pub fn variant(&self, discriminator: u8) -> Option<&dyn Column> {
        self.variants.get(usize::from(discriminator)).map(|c| c.as_ref())
    }

    /// Discriminator assigned to the member of type `type_`.
    pub fn discriminator_of(&self, type_: &Type) -> Option<u8> {
        self.variants
            .iter()
            .position(|c| c.column_type() == type_)
            .and_then(|i| u8::try_from(i).ok())
    }

    pub fn discriminator_at(&self, index: usize) -> Option<u8> {
        self.discriminators.get(index)
    }

    pub fn position_at(&self, index: usize) -> Option<usize> {
        self.positions.get(index).copied()
    }

    pub fn discriminators(&self) -> &[u8] {
        self.discriminators.data()
    }

    pub fn null_count(&self) -> usize {
        self.discriminators.iter().filter(|&&d| d == NULL_DISCRIMINATOR).count()
    }

    pub fn len(&self) -> usize {
        self.discriminators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.discriminators.is_empty()
    }

    fn push_null(&mut self) {
        self.discriminators.append(NULL_DISCRIMINATOR);
        self.positions.push(0);
    }

    /// Drop the last `n` rows, trimming each member by the number of those
    /// rows it holds. A member row is one top-level row; rows nested inside a
    /// member are that member's business.
    pub fn remove_last(&mut self, n: usize) {
        let keep = self.len().saturating_sub(n);
        let mut removed = vec![0usize; self.variants.len()];
        for &d in &self.discriminators.data()[keep..] {
            if let Some(count) = removed.get_mut(usize::from(d)) {
                *count += 1;
            }
        }
        for (column, count) in self.variants.iter_mut().zip(removed) {
            if count > 0 {
                let len = column.size().saturating_sub(count);
                column.truncate(len);
            }
        }
        self.discriminators.truncate(keep);
        self.positions.truncate(keep);
    }

    /// Rebuild the position index from the discriminators, returning the
    /// number of rows tagged for each member.
    fn rebuild_positions(&mut self) -> Result<Vec<usize>> {
        let mut counts = vec![0usize; self.variants.len()];
        self.positions.clear();
        self.positions.reserve(self.discriminators.len());
        for (row, &d) in self.discriminators.data().iter().enumerate() {
            if d == NULL_DISCRIMINATOR {
                self.positions.push(0);
                continue;
            }
            let count = counts.get_mut(usize::from(d)).ok_or_else(|| {
                Error::Protocol(format!(
                    "Variant discriminator {} at row {} exceeds {} members",
                    d,
                    row,
                    self.variants.len()
                ))
            })?;
            self.positions.push(*count);
            *count += 1;
        }
        Ok(counts)
    }
}

impl Column for ColumnVariant {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.discriminators.len()
    }

    fn clear(&mut self) {
        self.discriminators.clear();
        self.positions.clear();
        for column in &mut self.variants {
            column.clear();
        }
    }

    fn reserve(&mut self, additional: usize) {
        self.discriminators.reserve(additional);
        self.positions.reserve(additional);
    }

    fn truncate(&mut self, len: usize) {
        if len < self.len() {
            self.remove_last(self.len() - len);
        }
    }

    fn append_column(&mut self, other: &dyn Column) -> Result<()> {
        let other = downcast_other::<ColumnVariant>(&self.type_, other)?;
        if self.type_ != other.type_ {
            return Err(Error::TypeMismatch {
                expected: self.type_.name(),
                actual: other.type_.name(),
            });
        }

        let bases: Vec<usize> =
            self.variants.iter().map(|c| c.size()).collect();
        for (column, theirs) in self.variants.iter_mut().zip(&other.variants) {
            column.append_column(theirs.as_ref())?;
        }
        let rows = other.discriminators.iter().zip(&other.positions);
        for (&d, &position) in rows {
            self.discriminators.append(d);
            self.positions.push(if d == NULL_DISCRIMINATOR {
                0
            } else {
                bases.get(usize::from(d)).copied().unwrap_or(0) + position
            });
        }
        Ok(())
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        if value.is_null() {
            self.push_null();
            return Ok(());
        }

        let accepting = self.variants.iter().position(|c| c.can_accept(value));
        let Some(index) = accepting else {
            return Err(Error::InvalidArgument(format!(
                "No member of {} accepts a {} value",
                self.type_,
                value.type_hint()
            )));
        };
        let position = self.variants[index].size();
        self.variants[index].append_value(value)?;
        // Bounded by the member count check in `new`.
        self.discriminators.append(index as u8);
        self.positions.push(position);
        Ok(())
    }

    fn append_default(&mut self) {
        self.push_null();
    }

    fn can_accept(&self, value: &Value) -> bool {
        value.is_null() || self.variants.iter().any(|c| c.can_accept(value))
    }

    fn value(&self, index: usize) -> Result<Value> {
        let d = self
            .discriminators
            .get(index)
            .ok_or_else(|| out_of_range(index, self.size()))?;
        if d == NULL_DISCRIMINATOR {
            return Ok(Value::Null);
        }
        let column = self.variants.get(usize::from(d)).ok_or_else(|| {
            Error::Validation(format!(
                "Variant discriminator {} has no member",
                d
            ))
        })?;
        column.value(self.positions[index])
    }

    fn load_prefix(
        &mut self,
        reader: &mut dyn ByteRead,
        rows: usize,
    ) -> Result<()> {
        let mode = reader.read_u64_le().context("read discriminators mode")?;
        if mode != BASIC_DISCRIMINATORS_MODE {
            return Err(Error::NotImplemented(format!(
                "Variant discriminators serialization mode {}",
                mode
            )));
        }
        for column in &mut self.variants {
            column.load_prefix(reader, rows)?;
        }
        Ok(())
    }

    fn load_body(
        &mut self,
        reader: &mut dyn ByteRead,
        rows: usize,
    ) -> Result<()> {
        self.discriminators
            .load_body(reader, rows)
            .context("read discriminators")?;
        let counts = self.rebuild_positions()?;
        trace!(rows, tallies = ?counts, "variant discriminators");

        for (column, count) in self.variants.iter_mut().zip(counts) {
            let name = column.column_type().name();
            column
                .load_body(reader, count)
                .with_context(|| format!("read variant {}", name))?;
        }
        Ok(())
    }

    fn save_prefix(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        writer.write_u64_le(BASIC_DISCRIMINATORS_MODE)?;
        for column in &self.variants {
            column.save_prefix(writer)?;
        }
        Ok(())
    }

    fn save_body(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        self.discriminators.save_body(writer).context("write discriminators")?;
        for column in &self.variants {
            column.save_body(writer)?;
        }
        Ok(())
    }

    fn check_type(&mut self, wire_type: &Type) -> Result<()> {
        let Type::Variant { variants } = wire_type else {
            return Err(super::incompatible(wire_type, &self.type_));
        };
        if variants.len() != self.variants.len() {
            return Err(super::incompatible(wire_type, &self.type_));
        }
        let mut sorted: Vec<&Type> = variants.iter().collect();
        sorted.sort_by_cached_key(|t| t.name());
        for (column, member_type) in self.variants.iter_mut().zip(sorted) {
            column.check_type(member_type)?;
        }
        self.type_ = variant_type(&self.variants);
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let stored: usize = self.variants.iter().map(|c| c.size()).sum();
        let expected = self.len() - self.null_count();
        if stored != expected {
            return Err(Error::Insert(format!(
                "{} members hold {} rows but {} non-null rows are tagged",
                self.type_, stored, expected
            )));
        }
        for column in &self.variants {
            column.validate()?;
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnBox {
        Box::new(ColumnVariant {
            type_: self.type_.clone(),
            variants: self.variants.iter().map(|c| c.clone_empty()).collect(),
            discriminators: ColumnVector::new(),
            positions: Vec::new(),
        })
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnBox> {
        check_slice(begin, len, self.size())?;
        let mut result = ColumnVariant {
            type_: self.type_.clone(),
            variants: self.variants.iter().map(|c| c.clone_empty()).collect(),
            discriminators: ColumnVector::new(),
            positions: Vec::new(),
        };
        for row in begin..begin + len {
            let d = self.discriminators.at(row);
            if d == NULL_DISCRIMINATOR {
                result.push_null();
                continue;
            }
            let k = usize::from(d);
            let position = result.variants[k].size();
            let cell = self.variants[k].slice(self.positions[row], 1)?;
            result.variants[k].append_column(cell.as_ref())?;
            result.discriminators.append(d);
            result.positions.push(position);
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
            ColumnArray,
            ColumnString,
            ColumnUInt64,
        },
        io::SliceReader,
    };

    fn string_u64_variant() -> ColumnVariant {
        ColumnVariant::new(vec![
            Box::new(ColumnUInt64::new()),
            Box::new(ColumnString::new()),
        ])
        .unwrap()
    }

    fn fill(v: &mut ColumnVariant, values: &[Value]) {
        for value in values {
            v.append_value(value).unwrap();
        }
    }

    #[test]
    fn test_members_sorted_by_name() {
        let v = string_u64_variant();
        assert_eq!(v.column_type().name(), "Variant(String, UInt64)");
        assert_eq!(v.discriminator_of(&Type::string()), Some(0));
        assert_eq!(v.discriminator_of(&Type::uint64()), Some(1));
        assert_eq!(v.discriminator_of(&Type::int8()), None);
    }

    #[test]
    fn test_duplicate_member_rejected() {
        let err = ColumnVariant::new(vec![
            Box::new(ColumnString::new()),
            Box::new(ColumnString::new()),
        ]);
        assert!(matches!(err, Err(Error::MalformedType { .. })));
    }

    #[test]
    fn test_append_dispatch() {
        let mut v = string_u64_variant();
        v.append_value(&Value::from("a")).unwrap();
        v.append_value(&Value::Null).unwrap();
        v.append_value(&Value::UInt64(7)).unwrap();
        v.append_value(&Value::from("b")).unwrap();

        assert_eq!(v.discriminators(), &[0, NULL_DISCRIMINATOR, 1, 0]);
        assert_eq!(v.position_at(3), Some(1));
        assert_eq!(v.value(1).unwrap(), Value::Null);
        assert_eq!(v.value(2).unwrap(), Value::UInt64(7));
        assert_eq!(v.value(3).unwrap(), Value::from("b"));
        v.validate().unwrap();

        let err = v.append_value(&Value::Float64(1.0)).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidArgument(msg) if msg.contains("Float64")
        ));
        assert_eq!(v.size(), 4);
    }

    #[test]
    fn test_partition_on_read() {
        let mut buf = vec![0, NULL_DISCRIMINATOR, 1, 0, 1];
        for s in ["x", "y"] {
            buf.push(1);
            buf.extend_from_slice(s.as_bytes());
        }
        for n in [10u64, 20] {
            buf.extend_from_slice(&n.to_le_bytes());
        }

        let mut v = string_u64_variant();
        let mut reader = SliceReader::new(&buf);
        v.load_body(&mut reader, 5).unwrap();
        assert!(reader.is_empty());

        assert_eq!(v.variant(0).unwrap().size(), 2);
        assert_eq!(v.variant(1).unwrap().size(), 2);
        assert_eq!(v.value(1).unwrap(), Value::Null);
        let first_number = v.variant(1).unwrap().value(0).unwrap();
        assert_eq!(v.value(2).unwrap(), first_number);
        assert_eq!(v.value(4).unwrap(), Value::UInt64(20));
    }

    #[test]
    fn test_bad_discriminator() {
        let mut v = string_u64_variant();
        assert!(matches!(
            v.load_body(&mut SliceReader::new(&[2]), 1),
            Err(Error::Protocol(_))
        ));
    }

    #[test]
    fn test_prefix_mode() {
        let v = string_u64_variant();
        let mut buf = Vec::new();
        v.save_prefix(&mut buf).unwrap();
        assert_eq!(buf, 0u64.to_le_bytes());

        let mut decoded = string_u64_variant();
        decoded.load_prefix(&mut SliceReader::new(&buf), 0).unwrap();
        let unknown = 1u64.to_le_bytes();
        let mut reader = SliceReader::new(&unknown);
        assert!(decoded.load_prefix(&mut reader, 0).is_err());
    }

    #[test]
    fn test_remove_last() {
        let mut v = string_u64_variant();
        fill(
            &mut v,
            &[
                Value::from("a"),
                Value::UInt64(1),
                Value::Null,
                Value::from("b"),
                Value::UInt64(2),
            ],
        );
        v.remove_last(3);

        assert_eq!(v.size(), 2);
        assert_eq!(v.variant(0).unwrap().size(), 1);
        assert_eq!(v.variant(1).unwrap().size(), 1);
        v.validate().unwrap();

        v.append_value(&Value::from("c")).unwrap();
        assert_eq!(v.value(2).unwrap(), Value::from("c"));
    }

    #[test]
    fn test_remove_last_counts_top_level_rows_only() {
        let mut v = ColumnVariant::new(vec![
            Box::new(ColumnArray::new(Box::new(ColumnUInt64::new()))),
            Box::new(ColumnString::new()),
        ])
        .unwrap();
        v.append_value(&Value::array([1u64, 2, 3])).unwrap();
        v.append_value(&Value::array([4u64])).unwrap();
        v.remove_last(1);

        let arrays = v
            .variant(0)
            .and_then(|c| c.downcast_ref::<ColumnArray>())
            .unwrap();
        assert_eq!(arrays.size(), 1);
        assert_eq!(arrays.nested().size(), 3);
    }

    #[test]
    fn test_validate_mismatch_is_insert_error() {
        let mut a = string_u64_variant();
        a.append_value(&Value::from("a")).unwrap();
        let mut b = string_u64_variant();
        b.append_value(&Value::UInt64(1)).unwrap();
        a.append_column(&b).unwrap();
        a.validate().unwrap();
        assert_eq!(a.value(1).unwrap(), Value::UInt64(1));

        a.variants[0].append_value(&Value::from("orphan")).unwrap();
        let err = a.validate().unwrap_err();
        assert!(matches!(err, Error::Insert(_)));
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_slice() {
        let mut v = string_u64_variant();
        fill(
            &mut v,
            &[
                Value::UInt64(1),
                Value::from("a"),
                Value::Null,
                Value::UInt64(2),
            ],
        );
        let sliced = v.slice(1, 3).unwrap();
        assert_eq!(sliced.value(0).unwrap(), Value::from("a"));
        assert_eq!(sliced.value(1).unwrap(), Value::Null);
        assert_eq!(sliced.value(2).unwrap(), Value::UInt64(2));
        sliced.validate().unwrap();
    }
}
