//! Tuple column implementation
//!
//! **ClickHouse Documentation:** <https://clickhouse.com/docs/en/sql-reference/data-types/tuple>
//!
//! A tuple is a fixed list of member columns with equal row counts. On the
//! wire each member is written in full, one after another, so the tuple adds
//! no bytes of its own.
//!
//! Three shapes are offered:
//! - [`ColumnTuple`]: type-erased members, built from a [`Type`].
//! - [`ColumnTuple1`] .. [`ColumnTuple5`]: statically typed members with
//!   `get(i) -> (A::Item, B::Item, ..)`.
//! - [`ColumnTupleN`]: any arity, with the caller's row type implementing
//!   [`TupleRow`].

use super::{
    check_slice,
    create_column,
    downcast_other,
    out_of_range,
    rejected,
    Column,
    ColumnBox,
    ColumnTyped,
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
use std::marker::PhantomData;

/// Column for tuple types (fixed number of heterogeneous columns)
pub struct ColumnTuple {
    type_: Type,
    columns: Vec<ColumnBox>,
}

impl ColumnTuple {
    /// Unnamed tuple over `columns`.
    pub fn new(columns: Vec<ColumnBox>) -> Self {
        let item_types =
            columns.iter().map(|c| c.column_type().clone()).collect();
        Self { type_: Type::tuple(item_types), columns }
    }

    /// Tuple reporting `type_`, e.g. with element names. The member count
    /// must match the type.
    pub fn with_type(type_: Type, columns: Vec<ColumnBox>) -> Result<Self> {
        let Type::Tuple { item_types, .. } = &type_ else {
            return Err(Error::MalformedType {
                fragment: type_.name(),
                reason: "not a tuple type".to_string(),
            });
        };
        if item_types.len() != columns.len() {
            return Err(Error::MalformedType {
                fragment: type_.name(),
                reason: format!(
                    "declares {} elements but {} columns were given",
                    item_types.len(),
                    columns.len()
                ),
            });
        }
        Ok(Self { type_, columns })
    }

    /// Get the number of columns in the tuple
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_at(&self, index: usize) -> Option<&dyn Column> {
        self.columns.get(index).map(|c| c.as_ref())
    }

    pub fn column_at_mut(&mut self, index: usize) -> Option<&mut dyn Column> {
        match self.columns.get_mut(index) {
            Some(c) => Some(c.as_mut()),
            None => None,
        }
    }

    pub fn columns(&self) -> &[ColumnBox] {
        &self.columns
    }

    /// Number of rows, taken from the first member.
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, |c| c.size())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn member<M: Column + 'static>(&self, index: usize) -> Result<&M> {
        self.column_at(index)
            .and_then(|c| c.downcast_ref::<M>())
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Tuple element {} of {} is not a {}",
                    index,
                    self.type_,
                    std::any::type_name::<M>()
                ))
            })
    }

    fn member_mut<M: Column + 'static>(
        &mut self,
        index: usize,
    ) -> Result<&mut M> {
        let type_name = self.type_.name();
        self.column_at_mut(index)
            .and_then(|c| c.downcast_mut::<M>())
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Tuple element {} of {} is not a {}",
                    index,
                    type_name,
                    std::any::type_name::<M>()
                ))
            })
    }

    fn empty_like(&self) -> ColumnTuple {
        ColumnTuple {
            type_: self.type_.clone(),
            columns: self.columns.iter().map(|c| c.clone_empty()).collect(),
        }
    }

    fn slice_tuple(&self, begin: usize, len: usize) -> Result<ColumnTuple> {
        check_slice(begin, len, self.size())?;
        let columns = self
            .columns
            .iter()
            .map(|c| c.slice(begin, len))
            .collect::<Result<Vec<_>>>()?;
        Ok(ColumnTuple { type_: self.type_.clone(), columns })
    }

    fn truncate_members(&mut self, len: usize) {
        for col in &mut self.columns {
            col.truncate(len);
        }
    }
}

impl Column for ColumnTuple {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.len()
    }

    fn clear(&mut self) {
        for col in &mut self.columns {
            col.clear();
        }
    }

    fn reserve(&mut self, additional: usize) {
        for col in &mut self.columns {
            col.reserve(additional);
        }
    }

    fn truncate(&mut self, len: usize) {
        self.truncate_members(len);
    }

    fn append_column(&mut self, other: &dyn Column) -> Result<()> {
        let other = downcast_other::<ColumnTuple>(&self.type_, other)?;
        if self.columns.len() != other.columns.len() {
            return Err(Error::TypeMismatch {
                expected: self.type_.name(),
                actual: other.type_.name(),
            });
        }
        for (col, other_col) in self.columns.iter_mut().zip(&other.columns) {
            col.append_column(other_col.as_ref())?;
        }
        Ok(())
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        let Value::Tuple(items) = value else {
            return Err(rejected(value, &self.type_));
        };
        if items.len() != self.columns.len() {
            return Err(Error::Insert(format!(
                "{} expects {} elements, got {}",
                self.type_,
                self.columns.len(),
                items.len()
            )));
        }

        let before = self.size();
        for (col, item) in self.columns.iter_mut().zip(items) {
            if let Err(e) = col.append_value(item) {
                self.truncate_members(before);
                return Err(e);
            }
        }
        Ok(())
    }

    fn append_default(&mut self) {
        for col in &mut self.columns {
            col.append_default();
        }
    }

    fn can_accept(&self, value: &Value) -> bool {
        match value {
            Value::Tuple(items) => {
                items.len() == self.columns.len()
                    && self
                        .columns
                        .iter()
                        .zip(items)
                        .all(|(c, v)| c.can_accept(v))
            }
            _ => false,
        }
    }

    fn value(&self, index: usize) -> Result<Value> {
        if index >= self.size() {
            return Err(out_of_range(index, self.size()));
        }
        self.columns
            .iter()
            .map(|c| c.value(index))
            .collect::<Result<Vec<_>>>()
            .map(Value::Tuple)
    }

    fn load_prefix(
        &mut self,
        reader: &mut dyn ByteRead,
        rows: usize,
    ) -> Result<()> {
        for col in &mut self.columns {
            col.load_prefix(reader, rows)?;
        }
        Ok(())
    }

    fn load_body(
        &mut self,
        reader: &mut dyn ByteRead,
        rows: usize,
    ) -> Result<()> {
        for (i, col) in self.columns.iter_mut().enumerate() {
            col.load_body(reader, rows)
                .with_context(|| format!("read tuple element {}", i))?;
        }
        Ok(())
    }

    fn save_prefix(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        for col in &self.columns {
            col.save_prefix(writer)?;
        }
        Ok(())
    }

    fn save_body(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        for (i, col) in self.columns.iter().enumerate() {
            col.save_body(writer)
                .with_context(|| format!("write tuple element {}", i))?;
        }
        Ok(())
    }

    fn check_type(&mut self, wire_type: &Type) -> Result<()> {
        let Type::Tuple { item_types, .. } = wire_type else {
            return Err(super::incompatible(wire_type, &self.type_));
        };
        if item_types.len() != self.columns.len() {
            return Err(super::incompatible(wire_type, &self.type_));
        }
        for (col, item_type) in self.columns.iter_mut().zip(item_types) {
            col.check_type(item_type)?;
        }
        self.type_ = wire_type.clone();
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        let expected = self.len();
        for (i, col) in self.columns.iter().enumerate() {
            if col.size() != expected {
                return Err(Error::Insert(format!(
                    "{} element {} has {} rows, element 0 has {}",
                    self.type_,
                    i,
                    col.size(),
                    expected
                )));
            }
            col.validate()?;
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnBox {
        Box::new(self.empty_like())
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnBox> {
        Ok(Box::new(self.slice_tuple(begin, len)?))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// `Column` methods of a wrapper that only adds typed access on top of its
/// `inner: ColumnTuple`.
macro_rules! delegate_to_inner {
    () => {
        fn column_type(&self) -> &Type {
            self.inner.column_type()
        }

        fn size(&self) -> usize {
            self.inner.size()
        }

        fn clear(&mut self) {
            self.inner.clear()
        }

        fn reserve(&mut self, additional: usize) {
            self.inner.reserve(additional)
        }

        fn truncate(&mut self, len: usize) {
            self.inner.truncate(len)
        }

        fn append_column(&mut self, other: &dyn Column) -> Result<()> {
            match other.downcast_ref::<Self>() {
                Some(other) => self.inner.append_column(&other.inner),
                None => self.inner.append_column(other),
            }
        }

        fn append_value(&mut self, value: &Value) -> Result<()> {
            self.inner.append_value(value)
        }

        fn append_default(&mut self) {
            self.inner.append_default()
        }

        fn can_accept(&self, value: &Value) -> bool {
            self.inner.can_accept(value)
        }

        fn value(&self, index: usize) -> Result<Value> {
            self.inner.value(index)
        }

        fn load_prefix(
            &mut self,
            reader: &mut dyn ByteRead,
            rows: usize,
        ) -> Result<()> {
            self.inner.load_prefix(reader, rows)
        }

        fn load_body(
            &mut self,
            reader: &mut dyn ByteRead,
            rows: usize,
        ) -> Result<()> {
            self.inner.load_body(reader, rows)
        }

        fn save_prefix(&self, writer: &mut dyn ByteWrite) -> Result<()> {
            self.inner.save_prefix(writer)
        }

        fn save_body(&self, writer: &mut dyn ByteWrite) -> Result<()> {
            self.inner.save_body(writer)
        }

        fn check_type(&mut self, wire_type: &Type) -> Result<()> {
            self.inner.check_type(wire_type)
        }

        fn validate(&self) -> Result<()> {
            self.inner.validate()
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
            self
        }
    };
}

macro_rules! typed_tuple {
    ($(#[$doc:meta])* $name:ident; $($T:ident . $idx:tt),+) => {
        $(#[$doc])*
        pub struct $name<$($T),+> {
            inner: ColumnTuple,
            _members: PhantomData<fn() -> ($($T,)+)>,
        }

        impl<$($T: ColumnTyped + 'static),+> $name<$($T),+> {
            pub fn new(members: ($($T,)+)) -> Self {
                let inner = ColumnTuple::new(vec![
                    $(Box::new(members.$idx) as ColumnBox),+
                ]);
                Self { inner, _members: PhantomData }
            }

            pub fn inner(&self) -> &ColumnTuple {
                &self.inner
            }

            pub fn into_inner(self) -> ColumnTuple {
                self.inner
            }

            pub fn len(&self) -> usize {
                self.inner.len()
            }

            pub fn is_empty(&self) -> bool {
                self.inner.is_empty()
            }

            fn push_members(&mut self, item: ($($T::Item,)+)) -> Result<()> {
                $(self.inner.member_mut::<$T>($idx)?.push(item.$idx)?;)+
                Ok(())
            }
        }

        impl<$($T: ColumnTyped + 'static),+> ColumnTyped for $name<$($T),+> {
            type Item = ($($T::Item,)+);

            fn get(&self, index: usize) -> Option<Self::Item> {
                Some(($(self.inner.member::<$T>($idx).ok()?.get(index)?,)+))
            }

            fn push(&mut self, item: Self::Item) -> Result<()> {
                let before = self.inner.size();
                let result = self.push_members(item);
                if result.is_err() {
                    self.inner.truncate_members(before);
                }
                result
            }
        }

        impl<$($T: ColumnTyped + 'static),+> Column for $name<$($T),+> {
            delegate_to_inner!();

            fn clone_empty(&self) -> ColumnBox {
                Box::new(Self {
                    inner: self.inner.empty_like(),
                    _members: PhantomData,
                })
            }

            fn slice(&self, begin: usize, len: usize) -> Result<ColumnBox> {
                let inner = self.inner.slice_tuple(begin, len)?;
                Ok(Box::new(Self { inner, _members: PhantomData }))
            }
        }
    };
}

typed_tuple!(
    /// Statically typed single-element tuple.
    ColumnTuple1; A.0
);
typed_tuple!(
    /// Statically typed pair.
    ColumnTuple2; A.0, B.1
);
typed_tuple!(ColumnTuple3; A.0, B.1, C.2);
typed_tuple!(ColumnTuple4; A.0, B.1, C.2, D.3);
typed_tuple!(ColumnTuple5; A.0, B.1, C.2, D.3, E.4);

/// A caller-defined row type stored as a tuple of columns.
///
/// ```ignore
/// struct Point { x: f64, y: f64, label: String }
///
/// impl TupleRow for Point {
///     fn member_types() -> Vec<Type> {
///         vec![Type::float64(), Type::float64(), Type::string()]
///     }
///     fn read_row(columns: &[ColumnBox], index: usize) -> Result<Self> { .. }
///     fn write_row(&self, columns: &mut [ColumnBox]) -> Result<()> { .. }
/// }
/// ```
pub trait TupleRow: Sized {
    fn member_types() -> Vec<Type>;

    fn read_row(columns: &[ColumnBox], index: usize) -> Result<Self>;

    /// Append one row to every member column.
    fn write_row(&self, columns: &mut [ColumnBox]) -> Result<()>;
}

/// Tuple column of any arity whose rows are `R`.
pub struct ColumnTupleN<R> {
    inner: ColumnTuple,
    _row: PhantomData<fn() -> R>,
}

impl<R: TupleRow + 'static> ColumnTupleN<R> {
    pub fn new() -> Result<Self> {
        let columns = R::member_types()
            .iter()
            .map(create_column)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { inner: ColumnTuple::new(columns), _row: PhantomData })
    }

    pub fn row(&self, index: usize) -> Result<R> {
        if index >= self.inner.size() {
            return Err(out_of_range(index, self.inner.size()));
        }
        R::read_row(&self.inner.columns, index)
    }

    /// Append `row`; on failure every member is restored to its previous
    /// length.
    pub fn append_row(&mut self, row: &R) -> Result<()> {
        let before = self.inner.size();
        let result = row.write_row(&mut self.inner.columns);
        if result.is_err() {
            self.inner.truncate_members(before);
        }
        result
    }

    pub fn inner(&self) -> &ColumnTuple {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl<R: TupleRow + 'static> ColumnTyped for ColumnTupleN<R> {
    type Item = R;

    fn get(&self, index: usize) -> Option<R> {
        self.row(index).ok()
    }

    fn push(&mut self, item: R) -> Result<()> {
        self.append_row(&item)
    }
}

impl<R: TupleRow + 'static> Column for ColumnTupleN<R> {
    delegate_to_inner!();

    fn clone_empty(&self) -> ColumnBox {
        Box::new(Self { inner: self.inner.empty_like(), _row: PhantomData })
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnBox> {
        let inner = self.inner.slice_tuple(begin, len)?;
        Ok(Box::new(Self { inner, _row: PhantomData }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        column::{
            ColumnFloat64,
            ColumnString,
            ColumnUInt64,
        },
        io::SliceReader,
    };

    fn string_u64_members() -> Vec<ColumnBox> {
        vec![Box::new(ColumnString::new()), Box::new(ColumnUInt64::new())]
    }

    fn string_u64_tuple() -> ColumnTuple {
        ColumnTuple::new(string_u64_members())
    }

    fn row(s: &str, n: u64) -> Value {
        Value::Tuple(vec![s.into(), n.into()])
    }

    #[test]
    fn test_tuple_creation() {
        let tuple = string_u64_tuple();
        assert_eq!(tuple.column_count(), 2);
        assert_eq!(tuple.column_type().name(), "Tuple(String, UInt64)");
        assert_eq!(tuple.size(), 0);
    }

    #[test]
    fn test_named_tuple_type() {
        let t = Type::named_tuple(vec![
            ("a".into(), Type::string()),
            ("b".into(), Type::uint64()),
        ]);
        let tuple = ColumnTuple::with_type(t, string_u64_members()).unwrap();
        assert_eq!(tuple.column_type().name(), "Tuple(a String, b UInt64)");

        let wrong = ColumnTuple::with_type(
            Type::tuple(vec![Type::string()]),
            string_u64_members(),
        );
        assert!(matches!(wrong, Err(Error::MalformedType { .. })));
    }

    #[test]
    fn test_member_count_mismatch_leaves_column_untouched() {
        let mut tuple = string_u64_tuple();
        tuple.append_value(&row("a", 1)).unwrap();

        let short = Value::Tuple(vec!["b".into()]);
        let err = tuple.append_value(&short).unwrap_err();
        assert!(matches!(err, Error::Insert(_)));
        assert!(err.is_recoverable());

        let bad = Value::Tuple(vec!["b".into(), "oops".into()]);
        let err = tuple.append_value(&bad);
        assert!(err.is_err());
        assert_eq!(tuple.size(), 1);
        tuple.validate().unwrap();
    }

    #[test]
    fn test_tuple_wire_layout() {
        let mut tuple = string_u64_tuple();
        tuple.append_value(&row("hi", 7)).unwrap();

        let mut buf = Vec::new();
        tuple.save_body(&mut buf).unwrap();
        let mut expected = vec![2, b'h', b'i'];
        expected.extend_from_slice(&7u64.to_le_bytes());
        assert_eq!(buf, expected);

        let mut decoded = string_u64_tuple();
        decoded.load_body(&mut SliceReader::new(&buf), 1).unwrap();
        assert_eq!(decoded.value(0).unwrap(), row("hi", 7));
    }

    #[test]
    fn test_tuple_slice() {
        let mut tuple = string_u64_tuple();
        for (s, n) in [("a", 1u64), ("b", 2), ("c", 3)] {
            tuple.append_value(&row(s, n)).unwrap();
        }
        let sliced = tuple.slice(1, 2).unwrap();
        assert_eq!(sliced.size(), 2);
        assert_eq!(sliced.value(0).unwrap(), row("b", 2));
    }

    #[test]
    fn test_validate_unequal_members() {
        let mut tuple = string_u64_tuple();
        tuple.column_at_mut(0).unwrap().append_value(&"x".into()).unwrap();
        assert!(matches!(tuple.validate(), Err(Error::Insert(_))));
    }

    #[test]
    fn test_typed_pair() {
        let mut pair =
            ColumnTuple2::new((ColumnUInt64::new(), ColumnString::new()));
        pair.push((1, "one".to_string())).unwrap();
        pair.push((2, "two".to_string())).unwrap();

        assert_eq!(pair.len(), 2);
        assert_eq!(pair.get(1), Some((2, "two".to_string())));
        assert_eq!(pair.get(2), None);
        assert_eq!(pair.column_type().name(), "Tuple(UInt64, String)");
        assert_eq!(
            pair.value(0).unwrap(),
            Value::Tuple(vec![1u64.into(), "one".into()])
        );
    }

    #[test]
    fn test_typed_triple_slice() {
        type Triple = ColumnTuple3<ColumnUInt64, ColumnFloat64, ColumnString>;

        let mut t = Triple::new((
            ColumnUInt64::new(),
            ColumnFloat64::new(),
            ColumnString::new(),
        ));
        t.push((1, 1.5, "a".into())).unwrap();
        t.push((2, 2.5, "b".into())).unwrap();

        let sliced = t.slice(1, 1).unwrap();
        let sliced = sliced.downcast_ref::<Triple>().unwrap();
        assert_eq!(sliced.get(0), Some((2, 2.5, "b".to_string())));
    }

    struct Point {
        x: f64,
        y: f64,
        label: String,
    }

    impl TupleRow for Point {
        fn member_types() -> Vec<Type> {
            vec![Type::float64(), Type::float64(), Type::string()]
        }

        fn read_row(columns: &[ColumnBox], index: usize) -> Result<Self> {
            let float = |i: usize| -> Result<f64> {
                columns[i]
                    .value(index)?
                    .as_f64()
                    .ok_or_else(|| Error::InvalidArgument("not a float".into()))
            };
            let label = columns[2]
                .value(index)?
                .as_str()
                .unwrap_or_default()
                .to_string();
            Ok(Point { x: float(0)?, y: float(1)?, label })
        }

        fn write_row(&self, columns: &mut [ColumnBox]) -> Result<()> {
            columns[0].append_value(&self.x.into())?;
            columns[1].append_value(&self.y.into())?;
            columns[2].append_value(&self.label.as_str().into())
        }
    }

    #[test]
    fn test_tuple_n_rows() {
        let mut points = ColumnTupleN::<Point>::new().unwrap();
        let point = Point { x: 1.0, y: 2.0, label: "p".into() };
        points.append_row(&point).unwrap();

        let p = points.row(0).unwrap();
        assert_eq!((p.x, p.y, p.label.as_str()), (1.0, 2.0, "p"));
        assert!(points.row(1).is_err());
        assert_eq!(
            points.column_type().name(),
            "Tuple(Float64, Float64, String)"
        );
    }
}
