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

/// Column for nullable values
///
/// Stores a nested column and a byte per row: 1 = null, 0 = not null. A null
/// row still occupies a default placeholder row in the nested column so both
/// stay aligned.
pub struct ColumnNullable {
    type_: Type,
    nested: ColumnBox,
    nulls: ColumnVector<u8>,
}

impl ColumnNullable {
    /// Create a new nullable column wrapping a nested column
    pub fn new(nested: ColumnBox) -> Self {
        let type_ = Type::nullable(nested.column_type().clone());
        Self { type_, nested, nulls: ColumnVector::new() }
    }

    pub fn with_capacity(nested: ColumnBox, capacity: usize) -> Self {
        let mut col = Self::new(nested);
        col.reserve(capacity);
        col
    }

    /// Append a null, pushing a placeholder into the nested column.
    pub fn append_null(&mut self) {
        self.nested.append_default();
        self.nulls.append(1);
    }

    /// Check if value at index is null
    pub fn is_null(&self, index: usize) -> bool {
        self.nulls.get(index).is_some_and(|flag| flag != 0)
    }

    pub fn nested(&self) -> &dyn Column {
        self.nested.as_ref()
    }

    /// Mutable access to the nested column. Appending to it directly breaks
    /// alignment unless followed by [`ColumnNullable::append_present`].
    pub fn nested_mut(&mut self) -> &mut dyn Column {
        self.nested.as_mut()
    }

    /// Mark the row most recently appended to the nested column as present.
    pub fn append_present(&mut self) {
        self.nulls.append(0);
    }

    pub fn nulls(&self) -> &[u8] {
        self.nulls.data()
    }
}

impl Column for ColumnNullable {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.nulls.len()
    }

    fn clear(&mut self) {
        self.nulls.clear();
        self.nested.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.nulls.reserve(additional);
        self.nested.reserve(additional);
    }

    fn truncate(&mut self, len: usize) {
        self.nulls.truncate(len);
        self.nested.truncate(len);
    }

    fn append_column(&mut self, other: &dyn Column) -> Result<()> {
        let other = downcast_other::<ColumnNullable>(&self.type_, other)?;
        self.nested.append_column(other.nested.as_ref())?;
        self.nulls.append_column(&other.nulls)
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        if value.is_null() {
            self.append_null();
            return Ok(());
        }
        self.nested.append_value(value)?;
        self.nulls.append(0);
        Ok(())
    }

    fn append_default(&mut self) {
        self.append_null();
    }

    fn can_accept(&self, value: &Value) -> bool {
        value.is_null() || self.nested.can_accept(value)
    }

    fn value(&self, index: usize) -> Result<Value> {
        match self.nulls.get(index) {
            None => Err(out_of_range(index, self.size())),
            Some(0) => self.nested.value(index),
            Some(_) => Ok(Value::Null),
        }
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
        self.nulls.load_body(reader, rows).context("read null map")?;
        self.nested.load_body(reader, rows).context("read nullable values")
    }

    fn save_prefix(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        self.nested.save_prefix(writer)
    }

    fn save_body(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        self.nulls.save_body(writer)?;
        self.nested.save_body(writer)
    }

    fn check_type(&mut self, wire_type: &Type) -> Result<()> {
        let Type::Nullable { nested_type } = wire_type else {
            return Err(super::incompatible(wire_type, &self.type_));
        };
        self.nested.check_type(nested_type)?;
        self.type_ = Type::nullable(self.nested.column_type().clone());
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.nulls.len() != self.nested.size() {
            return Err(Error::Insert(format!(
                "{} has {} null flags but {} values",
                self.type_,
                self.nulls.len(),
                self.nested.size()
            )));
        }
        self.nested.validate()
    }

    fn clone_empty(&self) -> ColumnBox {
        Box::new(ColumnNullable::new(self.nested.clone_empty()))
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnBox> {
        check_slice(begin, len, self.size())?;
        let mut result = ColumnNullable::new(self.nested.slice(begin, len)?);
        let nulls = &self.nulls.data()[begin..begin + len];
        result.nulls = ColumnVector::from_vec(nulls.to_vec());
        Ok(Box::new(result))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}
