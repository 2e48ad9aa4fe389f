//! LowCardinality column implementation
//!
//! **ClickHouse Documentation:** <https://clickhouse.com/docs/en/sql-reference/data-types/lowcardinality>
//!
//! Values are stored once in a dictionary column and rows reference them by
//! key. The key width on the wire is the narrowest of 1, 2 or 4 bytes that can
//! address the dictionary.
//!
//! ## Wire Format
//!
//! ```text
//! prefix:  [KeysSerializationVersion: UInt64 = 1]
//! body:    [serialization type: UInt64]   // width selector | flags
//!          [dictionary size: UInt64]
//!          [dictionary column data]
//!          [index count: UInt64]
//!          [index column data]
//! ```
//!
//! A body for zero rows is empty.
//!
//! `LowCardinality(Nullable(T))` keeps a plain `T` dictionary and reserves
//! slot 0 as the null placeholder.

use super::{
    check_slice,
    create_column,
    downcast_other,
    numeric::{
        ColumnVector,
        FixedSize,
    },
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
use cityhash_rs::cityhash_102_128;
use std::collections::HashMap;
use tracing::trace;

const KEYS_SERIALIZATION_VERSION: u64 = 1;

const INDEX_WIDTH_MASK: u64 = 0x0F;
const NEED_GLOBAL_DICTIONARY: u64 = 1 << 8;
const HAS_ADDITIONAL_KEYS: u64 = 1 << 9;
const NEED_UPDATE_DICTIONARY: u64 = 1 << 10;

/// Index width selector for a dictionary of `size` entries:
/// `floor(log2(size) / 8)`. 0, 1 and 2 select 1, 2 and 4 byte keys.
pub fn index_width_selector(size: u64) -> u64 {
    if size <= 1 {
        return 0;
    }
    u64::from(63 - size.leading_zeros()) / 8
}

/// Key storage. Grows in width as the dictionary grows; only the first three
/// widths can be serialized.
#[derive(Debug, Clone)]
enum IndexColumn {
    U8(ColumnVector<u8>),
    U16(ColumnVector<u16>),
    U32(ColumnVector<u32>),
    U64(ColumnVector<u64>),
}

impl IndexColumn {
    fn for_selector(selector: u64) -> Result<Self> {
        match selector {
            0 => Ok(IndexColumn::U8(ColumnVector::new())),
            1 => Ok(IndexColumn::U16(ColumnVector::new())),
            2 => Ok(IndexColumn::U32(ColumnVector::new())),
            other => Err(Error::UnsupportedIndexWidth(other)),
        }
    }

    fn selector(&self) -> u64 {
        match self {
            IndexColumn::U8(_) => 0,
            IndexColumn::U16(_) => 1,
            IndexColumn::U32(_) => 2,
            IndexColumn::U64(_) => 3,
        }
    }

    fn column(&self) -> &dyn Column {
        match self {
            IndexColumn::U8(c) => c,
            IndexColumn::U16(c) => c,
            IndexColumn::U32(c) => c,
            IndexColumn::U64(c) => c,
        }
    }

    fn column_mut(&mut self) -> &mut dyn Column {
        match self {
            IndexColumn::U8(c) => c,
            IndexColumn::U16(c) => c,
            IndexColumn::U32(c) => c,
            IndexColumn::U64(c) => c,
        }
    }

    fn len(&self) -> usize {
        self.column().size()
    }

    fn get(&self, index: usize) -> Option<u64> {
        match self {
            IndexColumn::U8(c) => c.get(index).map(u64::from),
            IndexColumn::U16(c) => c.get(index).map(u64::from),
            IndexColumn::U32(c) => c.get(index).map(u64::from),
            IndexColumn::U64(c) => c.get(index),
        }
    }

    fn keys(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.len()).filter_map(|i| self.get(i))
    }

    fn fits(&self, key: u64) -> bool {
        match self {
            IndexColumn::U8(_) => key <= u64::from(u8::MAX),
            IndexColumn::U16(_) => key <= u64::from(u16::MAX),
            IndexColumn::U32(_) => key <= u64::from(u32::MAX),
            IndexColumn::U64(_) => true,
        }
    }

    fn widened(&self) -> Self {
        match self {
            IndexColumn::U8(c) => IndexColumn::U16(widen(c)),
            IndexColumn::U16(c) => IndexColumn::U32(widen(c)),
            IndexColumn::U32(c) => IndexColumn::U64(widen(c)),
            IndexColumn::U64(c) => IndexColumn::U64(c.clone()),
        }
    }

    fn push(&mut self, key: u64) {
        while !self.fits(key) {
            *self = self.widened();
        }
        match self {
            IndexColumn::U8(c) => c.append(key as u8),
            IndexColumn::U16(c) => c.append(key as u16),
            IndexColumn::U32(c) => c.append(key as u32),
            IndexColumn::U64(c) => c.append(key),
        }
    }

    /// Re-encode the keys at exactly the width `selector` names.
    fn narrowed(&self, selector: u64) -> Result<Self> {
        let mut result = IndexColumn::for_selector(selector)?;
        for key in self.keys() {
            if !result.fits(key) {
                return Err(Error::Insert(format!(
                    "LowCardinality key {} does not fit index width {}",
                    key, selector
                )));
            }
            result.push(key);
        }
        Ok(result)
    }
}

fn widen<N, W>(keys: &ColumnVector<N>) -> ColumnVector<W>
where
    N: FixedSize,
    W: FixedSize + From<N>,
{
    ColumnVector::from_vec(keys.iter().map(|&k| W::from(k)).collect())
}

/// Column for LowCardinality type (dictionary encoding)
pub struct ColumnLowCardinality {
    type_: Type,
    nullable: bool,
    dictionary: ColumnBox,
    /// One-row column used to encode a candidate value for hashing.
    scratch: ColumnBox,
    index: IndexColumn,
    /// Hash of a dictionary entry's encoded bytes to its key.
    unique: HashMap<u128, u64>,
    unique_stale: bool,
}

impl ColumnLowCardinality {
    /// Create an empty column for `LowCardinality(inner_type)`.
    pub fn new(inner_type: &Type) -> Result<Self> {
        let dictionary = create_column(inner_type.unwrap_nullable())?;
        Ok(Self::with_dictionary(
            Type::low_cardinality(inner_type.clone()),
            inner_type.is_nullable(),
            dictionary,
        ))
    }

    fn with_dictionary(
        type_: Type,
        nullable: bool,
        dictionary: ColumnBox,
    ) -> Self {
        let scratch = dictionary.clone_empty();
        let mut col = Self {
            type_,
            nullable,
            dictionary,
            scratch,
            index: IndexColumn::U8(ColumnVector::new()),
            unique: HashMap::new(),
            unique_stale: false,
        };
        col.reset_dictionary();
        col
    }

    fn reset_dictionary(&mut self) {
        self.dictionary.clear();
        if self.nullable {
            self.dictionary.append_default();
        }
        self.unique.clear();
        self.unique_stale = false;
    }

    fn first_value_key(&self) -> usize {
        usize::from(self.nullable)
    }

    fn hash_of(column: &dyn Column) -> Result<u128> {
        let mut encoded = Vec::new();
        column.save_body(&mut encoded)?;
        Ok(cityhash_102_128(&encoded))
    }

    fn rebuild_unique(&mut self) -> Result<()> {
        if !self.unique_stale {
            return Ok(());
        }
        self.unique.clear();
        for key in self.first_value_key()..self.dictionary.size() {
            let hash = Self::hash_of(self.dictionary.slice(key, 1)?.as_ref())?;
            self.unique.entry(hash).or_insert(key as u64);
        }
        self.unique_stale = false;
        Ok(())
    }

    /// Look up the value `fill` writes into a one-row column, adding it to
    /// the dictionary when absent.
    fn intern<F>(&mut self, fill: F) -> Result<u64>
    where
        F: FnOnce(&mut dyn Column) -> Result<()>,
    {
        self.rebuild_unique()?;
        self.scratch.clear();
        fill(self.scratch.as_mut())?;

        let hash = Self::hash_of(self.scratch.as_ref())?;
        if let Some(&key) = self.unique.get(&hash) {
            return Ok(key);
        }
        let key = self.dictionary.size() as u64;
        self.dictionary.append_column(self.scratch.as_ref())?;
        self.unique.insert(hash, key);
        Ok(key)
    }

    pub fn dictionary(&self) -> &dyn Column {
        self.dictionary.as_ref()
    }

    pub fn dictionary_size(&self) -> usize {
        self.dictionary.size()
    }

    /// Dictionary key of row `index`.
    pub fn key_at(&self, index: usize) -> Option<u64> {
        self.index.get(index)
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.len() == 0
    }

    fn check_keys(&self) -> Option<(usize, u64)> {
        let size = self.dictionary.size() as u64;
        self.index.keys().enumerate().find(|&(_, key)| key >= size)
    }
}

impl Column for ColumnLowCardinality {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.index.len()
    }

    fn clear(&mut self) {
        self.index = IndexColumn::U8(ColumnVector::new());
        self.reset_dictionary();
    }

    fn reserve(&mut self, additional: usize) {
        self.index.column_mut().reserve(additional);
    }

    fn truncate(&mut self, len: usize) {
        self.index.column_mut().truncate(len);
    }

    fn append_column(&mut self, other: &dyn Column) -> Result<()> {
        let other = downcast_other::<ColumnLowCardinality>(&self.type_, other)?;
        for row in 0..other.size() {
            self.append_value(&other.value(row)?)?;
        }
        Ok(())
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        let key = if value.is_null() {
            if !self.nullable {
                return Err(rejected(value, &self.type_));
            }
            0
        } else {
            self.intern(|column| column.append_value(value))?
        };
        self.index.push(key);
        Ok(())
    }

    fn append_default(&mut self) {
        let key = if self.nullable {
            0
        } else {
            match self.intern(|column| {
                column.append_default();
                Ok(())
            }) {
                Ok(key) => key,
                Err(_) => {
                    self.dictionary.append_default();
                    self.unique_stale = true;
                    (self.dictionary.size() - 1) as u64
                }
            }
        };
        self.index.push(key);
    }

    fn can_accept(&self, value: &Value) -> bool {
        if value.is_null() {
            self.nullable
        } else {
            self.dictionary.can_accept(value)
        }
    }

    fn value(&self, index: usize) -> Result<Value> {
        let key = self
            .index
            .get(index)
            .ok_or_else(|| out_of_range(index, self.size()))?;
        if self.nullable && key == 0 {
            return Ok(Value::Null);
        }
        self.dictionary.value(key as usize)
    }

    fn load_prefix(
        &mut self,
        reader: &mut dyn ByteRead,
        _rows: usize,
    ) -> Result<()> {
        let version = reader
            .read_u64_le()
            .context("read keys serialization version")?;
        if version != KEYS_SERIALIZATION_VERSION {
            return Err(Error::Protocol(format!(
                "Unsupported LowCardinality keys serialization version {}",
                version
            )));
        }
        Ok(())
    }

    fn load_body(
        &mut self,
        reader: &mut dyn ByteRead,
        rows: usize,
    ) -> Result<()> {
        self.clear();
        if rows == 0 {
            return Ok(());
        }

        let serialization_type =
            reader.read_u64_le().context("read serialization type")?;
        if serialization_type & NEED_GLOBAL_DICTIONARY != 0 {
            return Err(Error::NotImplemented(
                "LowCardinality shared global dictionary".to_string(),
            ));
        }
        if serialization_type & HAS_ADDITIONAL_KEYS == 0 {
            return Err(Error::Protocol(
                "LowCardinality block without additional keys".to_string(),
            ));
        }
        let selector = serialization_type & INDEX_WIDTH_MASK;
        let mut index = IndexColumn::for_selector(selector)?;

        let dictionary_size =
            reader.read_u64_le().context("read dictionary size")?;
        let dictionary_rows = usize::try_from(dictionary_size).map_err(|_| {
            Error::Protocol(format!(
                "Dictionary size {} is too large",
                dictionary_size
            ))
        })?;
        self.dictionary
            .load_body(reader, dictionary_rows)
            .context("read dictionary")?;
        self.unique_stale = true;

        let count = reader.read_u64_le().context("read index count")?;
        if count != rows as u64 {
            return Err(Error::Protocol(format!(
                "LowCardinality index count {} does not match row count {}",
                count, rows
            )));
        }
        index
            .column_mut()
            .load_body(reader, rows)
            .context("read index column")?;
        self.index = index;

        trace!(
            rows,
            dictionary = dictionary_rows,
            selector,
            "low cardinality body"
        );

        if let Some((row, key)) = self.check_keys() {
            return Err(Error::Protocol(format!(
                "LowCardinality key {} at row {} is outside dictionary \
                 of {} entries",
                key, row, dictionary_rows
            )));
        }
        Ok(())
    }

    fn save_prefix(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        writer.write_u64_le(KEYS_SERIALIZATION_VERSION)
    }

    fn save_body(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        if self.size() == 0 {
            return Ok(());
        }

        let dictionary_size = self.dictionary.size() as u64;
        let selector = index_width_selector(dictionary_size);
        let index = self.index.narrowed(selector)?;

        let flags = HAS_ADDITIONAL_KEYS | NEED_UPDATE_DICTIONARY;
        writer.write_u64_le(selector | flags)?;
        writer.write_u64_le(dictionary_size)?;
        self.dictionary.save_body(writer).context("write dictionary")?;
        writer.write_u64_le(index.len() as u64)?;
        index.column().save_body(writer).context("write index column")
    }

    fn check_type(&mut self, wire_type: &Type) -> Result<()> {
        let Type::LowCardinality { nested_type } = wire_type else {
            return Err(super::incompatible(wire_type, &self.type_));
        };
        if nested_type.is_nullable() != self.nullable {
            return Err(super::incompatible(wire_type, &self.type_));
        }
        self.dictionary.check_type(nested_type.unwrap_nullable())?;
        self.scratch = self.dictionary.clone_empty();
        self.type_ = wire_type.clone();
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.nullable && self.dictionary.size() == 0 {
            return Err(Error::Insert(format!(
                "{} is missing its null placeholder",
                self.type_
            )));
        }
        if let Some((row, key)) = self.check_keys() {
            return Err(Error::Insert(format!(
                "{} row {} references key {} but the dictionary has {} entries",
                self.type_,
                row,
                key,
                self.dictionary.size()
            )));
        }
        self.dictionary.validate()
    }

    fn clone_empty(&self) -> ColumnBox {
        Box::new(ColumnLowCardinality::with_dictionary(
            self.type_.clone(),
            self.nullable,
            self.dictionary.clone_empty(),
        ))
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnBox> {
        check_slice(begin, len, self.size())?;
        let mut result = ColumnLowCardinality::with_dictionary(
            self.type_.clone(),
            self.nullable,
            self.dictionary.clone_empty(),
        );
        for row in begin..begin + len {
            result.append_value(&self.value(row)?)?;
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
