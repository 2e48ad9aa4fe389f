//! Map column implementation
//!
//! **ClickHouse Documentation:** <https://clickhouse.com/docs/en/sql-reference/data-types/map>
//!
//! `Map(K, V)` travels exactly like `Array(Tuple(K, V))`: offsets, then all
//! keys, then all values.

use super::{
    check_slice,
    downcast_other,
    rejected,
    Column,
    ColumnArray,
    ColumnBox,
    ColumnTuple,
    Value,
};
use crate::{
    io::{
        ByteRead,
        ByteWrite,
    },
    types::Type,
    Error,
    Result,
};

/// Column for Map(K, V) type
pub struct ColumnMap {
    type_: Type,
    data: ColumnArray,
}

impl ColumnMap {
    pub fn new(keys: ColumnBox, values: ColumnBox) -> Self {
        let type_ = Type::map(
            keys.column_type().clone(),
            values.column_type().clone(),
        );
        let entries = ColumnTuple::new(vec![keys, values]);
        Self { type_, data: ColumnArray::new(Box::new(entries)) }
    }

    /// The underlying `Array(Tuple(K, V))`.
    pub fn data(&self) -> &ColumnArray {
        &self.data
    }

    fn entries(&self) -> Result<&ColumnTuple> {
        self.data.nested().downcast_ref::<ColumnTuple>().ok_or_else(|| {
            Error::Validation(format!(
                "{} is not backed by a key/value tuple",
                self.type_
            ))
        })
    }

    pub fn keys(&self) -> Option<&dyn Column> {
        self.entries().ok()?.column_at(0)
    }

    pub fn values(&self) -> Option<&dyn Column> {
        self.entries().ok()?.column_at(1)
    }

    /// Number of entries stored for row `index`, duplicates included.
    pub fn map_len(&self, index: usize) -> Option<usize> {
        self.data.array_len(index)
    }

    /// Value stored under `key` in row `index`; the last duplicate wins.
    pub fn get(&self, index: usize, key: &Value) -> Result<Option<Value>> {
        let Value::Map(entries) = self.value(index)? else {
            return Ok(None);
        };
        Ok(entries.into_iter().find(|(k, _)| k == key).map(|(_, v)| v))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Collapse duplicate keys: later entries overwrite earlier ones in the slot
/// of the first occurrence.
fn dedup_entries(pairs: Vec<Value>) -> Result<Vec<(Value, Value)>> {
    let mut entries: Vec<(Value, Value)> = Vec::with_capacity(pairs.len());
    for pair in pairs {
        let Value::Tuple(mut kv) = pair else {
            return Err(Error::Validation(
                "map entry is not a key/value tuple".to_string(),
            ));
        };
        let (Some(value), Some(key)) = (kv.pop(), kv.pop()) else {
            return Err(Error::Validation(
                "map entry is missing its key or value".to_string(),
            ));
        };
        match entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => entries.push((key, value)),
        }
    }
    Ok(entries)
}

impl Column for ColumnMap {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.data.size()
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    fn append_column(&mut self, other: &dyn Column) -> Result<()> {
        let other = downcast_other::<ColumnMap>(&self.type_, other)?;
        self.data.append_column(&other.data)
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        let Value::Map(entries) = value else {
            return Err(rejected(value, &self.type_));
        };
        let pairs = entries
            .iter()
            .map(|(k, v)| Value::Tuple(vec![k.clone(), v.clone()]))
            .collect();
        self.data.append_value(&Value::Array(pairs))
    }

    fn append_default(&mut self) {
        self.data.append_default();
    }

    fn can_accept(&self, value: &Value) -> bool {
        let (Value::Map(entries), Some(keys), Some(values)) =
            (value, self.keys(), self.values())
        else {
            return false;
        };
        entries
            .iter()
            .all(|(k, v)| keys.can_accept(k) && values.can_accept(v))
    }

    fn value(&self, index: usize) -> Result<Value> {
        let Value::Array(pairs) = self.data.value(index)? else {
            return Err(Error::Validation(format!(
                "{} row {} is not an array",
                self.type_, index
            )));
        };
        Ok(Value::Map(dedup_entries(pairs)?))
    }

    fn load_prefix(
        &mut self,
        reader: &mut dyn ByteRead,
        rows: usize,
    ) -> Result<()> {
        self.data.load_prefix(reader, rows)
    }

    fn load_body(
        &mut self,
        reader: &mut dyn ByteRead,
        rows: usize,
    ) -> Result<()> {
        self.data.load_body(reader, rows)
    }

    fn save_prefix(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        self.data.save_prefix(writer)
    }

    fn save_body(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        self.data.save_body(writer)
    }

    fn check_type(&mut self, wire_type: &Type) -> Result<()> {
        let Type::Map { key_type, value_type } = wire_type else {
            return Err(super::incompatible(wire_type, &self.type_));
        };
        let entry_type = Type::tuple(vec![
            key_type.as_ref().clone(),
            value_type.as_ref().clone(),
        ]);
        self.data.check_type(&Type::array(entry_type))?;
        self.type_ = wire_type.clone();
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.data.validate()
    }

    fn clone_empty(&self) -> ColumnBox {
        Box::new(ColumnMap {
            type_: self.type_.clone(),
            data: ColumnArray::new(self.data.nested().clone_empty()),
        })
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnBox> {
        check_slice(begin, len, self.size())?;
        let sliced = self.data.slice(begin, len)?;
        let data = sliced.as_any().downcast_ref::<ColumnArray>().ok_or_else(|| {
            Error::Validation(format!(
                "slice of {} is not an array",
                self.type_
            ))
        })?;
        let mut result = ColumnMap {
            type_: self.type_.clone(),
            data: ColumnArray::new(data.nested().clone_empty()),
        };
        result.data.append_column(data)?;
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
            ColumnString,
            ColumnUInt64,
        },
        io::SliceReader,
    };

    fn string_u64_map() -> ColumnMap {
        ColumnMap::new(
            Box::new(ColumnString::new()),
            Box::new(ColumnUInt64::new()),
        )
    }

    fn map_value(entries: &[(&str, u64)]) -> Value {
        Value::Map(entries.iter().map(|&(k, v)| (k.into(), v.into())).collect())
    }

    #[test]
    fn test_map_type() {
        let map = string_u64_map();
        assert_eq!(map.column_type().name(), "Map(String, UInt64)");
        assert_eq!(map.size(), 0);
    }

    #[test]
    fn test_duplicate_keys_last_wins_first_position() {
        let mut map = string_u64_map();
        map.append_value(&map_value(&[("a", 1), ("b", 2), ("a", 3)])).unwrap();

        assert_eq!(map.map_len(0), Some(3));
        assert_eq!(map.value(0).unwrap(), map_value(&[("a", 3), ("b", 2)]));
        assert_eq!(map.get(0, &"a".into()).unwrap(), Some(Value::UInt64(3)));
        assert_eq!(map.get(0, &"z".into()).unwrap(), None);
    }

    #[test]
    fn test_map_wire_layout_matches_array_of_tuples() {
        let mut map = string_u64_map();
        map.append_value(&map_value(&[("k", 5)])).unwrap();
        map.append_value(&map_value(&[])).unwrap();

        let mut buf = Vec::new();
        map.save_body(&mut buf).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(&1u64.to_le_bytes());
        expected.extend_from_slice(&1u64.to_le_bytes());
        expected.extend_from_slice(&[1, b'k']);
        expected.extend_from_slice(&5u64.to_le_bytes());
        assert_eq!(buf, expected);

        let mut decoded = string_u64_map();
        decoded.load_body(&mut SliceReader::new(&buf), 2).unwrap();
        assert_eq!(decoded.value(0).unwrap(), map_value(&[("k", 5)]));
        assert_eq!(decoded.value(1).unwrap(), map_value(&[]));
    }

    #[test]
    fn test_map_slice() {
        let mut map = string_u64_map();
        map.append_value(&map_value(&[("a", 1)])).unwrap();
        map.append_value(&map_value(&[("b", 2), ("c", 3)])).unwrap();

        let sliced = map.slice(1, 1).unwrap();
        assert_eq!(sliced.value(0).unwrap(), map_value(&[("b", 2), ("c", 3)]));
    }

    #[test]
    fn test_map_rejects_wrong_value() {
        let mut map = string_u64_map();
        assert!(map.can_accept(&map_value(&[("a", 1)])));
        assert!(!map.can_accept(&Value::Map(vec![(1u64.into(), 1u64.into())])));
        assert!(map.append_value(&Value::array([1u64])).is_err());
        assert_eq!(map.size(), 0);
    }
}
