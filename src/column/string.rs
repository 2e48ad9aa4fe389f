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
            read_into,
            READ_CHUNK,
        },
        ByteRead,
        ByteWrite,
    },
    types::Type,
    Error,
    Result,
};

/// Column for fixed-length strings (all strings padded to same length)
#[derive(Debug, Clone)]
pub struct ColumnFixedString {
    type_: Type,
    string_size: usize,
    data: Vec<u8>,
}

impl ColumnFixedString {
    pub fn new(size: usize) -> Self {
        Self {
            type_: Type::fixed_string(size),
            string_size: size,
            data: Vec::new(),
        }
    }

    pub fn with_capacity(size: usize, capacity: usize) -> Self {
        Self {
            type_: Type::fixed_string(size),
            string_size: size,
            data: Vec::with_capacity(size * capacity),
        }
    }

    /// Append `bytes`, zero-padded to the fixed size. Longer input is
    /// rejected.
    pub fn append(&mut self, bytes: impl AsRef<[u8]>) -> Result<()> {
        let bytes = bytes.as_ref();
        if bytes.len() > self.string_size {
            return Err(Error::InvalidArgument(format!(
                "Value of {} bytes is too long for FixedString({})",
                bytes.len(),
                self.string_size
            )));
        }

        self.data.extend_from_slice(bytes);
        self.data.resize(self.data.len() + (self.string_size - bytes.len()), 0);
        Ok(())
    }

    /// Raw bytes of row `index`, padding included.
    pub fn at(&self, index: usize) -> Option<&[u8]> {
        if index >= self.size() {
            return None;
        }
        let start = index * self.string_size;
        Some(&self.data[start..start + self.string_size])
    }

    /// Row `index` as text with trailing zero padding removed.
    pub fn get(&self, index: usize) -> Option<&str> {
        let bytes = self.at(index)?;
        let actual_len =
            bytes.iter().rposition(|&b| b != 0).map_or(0, |pos| pos + 1);
        std::str::from_utf8(&bytes[..actual_len]).ok()
    }

    pub fn fixed_size(&self) -> usize {
        self.string_size
    }
}

impl Column for ColumnFixedString {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        if self.string_size == 0 {
            0
        } else {
            self.data.len() / self.string_size
        }
    }

    fn clear(&mut self) {
        self.data.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.data.reserve(self.string_size * additional);
    }

    fn truncate(&mut self, len: usize) {
        self.data.truncate(len * self.string_size);
    }

    fn append_column(&mut self, other: &dyn Column) -> Result<()> {
        let other = downcast_other::<ColumnFixedString>(&self.type_, other)?;
        if self.string_size != other.string_size {
            return Err(Error::TypeMismatch {
                expected: self.type_.name(),
                actual: other.type_.name(),
            });
        }

        self.data.extend_from_slice(&other.data);
        Ok(())
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        let bytes = value
            .as_bytes()
            .ok_or_else(|| rejected(value, &self.type_))?;
        self.append(bytes)
    }

    fn append_default(&mut self) {
        self.data.resize(self.data.len() + self.string_size, 0);
    }

    fn can_accept(&self, value: &Value) -> bool {
        value.as_bytes().is_some_and(|b| b.len() <= self.string_size)
    }

    fn value(&self, index: usize) -> Result<Value> {
        self.at(index)
            .map(|b| Value::Bytes(b.to_vec()))
            .ok_or_else(|| out_of_range(index, self.size()))
    }

    fn load_body(
        &mut self,
        reader: &mut dyn ByteRead,
        rows: usize,
    ) -> Result<()> {
        self.data.clear();
        let len = payload_len(rows, self.string_size)?;
        read_into(reader, &mut self.data, len)
    }

    fn save_body(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        writer.write_bytes(&self.data)
    }

    fn clone_empty(&self) -> ColumnBox {
        Box::new(ColumnFixedString::new(self.string_size))
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnBox> {
        check_slice(begin, len, self.size())?;
        let start = begin * self.string_size;
        let end = start + len * self.string_size;

        let mut result = ColumnFixedString::new(self.string_size);
        result.data = self.data[start..end].to_vec();
        Ok(Box::new(result))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

/// Column for variable-length strings
///
/// All rows share one byte arena; each row is a `(start, end)` span into it.
/// Reading a row borrows the arena, so a row view lives until the next
/// mutation or decode.
#[derive(Debug, Clone)]
pub struct ColumnString {
    type_: Type,
    arena: Vec<u8>,
    spans: Vec<(usize, usize)>,
}

impl ColumnString {
    pub fn new() -> Self {
        Self { type_: Type::string(), arena: Vec::new(), spans: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            type_: Type::string(),
            arena: Vec::new(),
            spans: Vec::with_capacity(capacity),
        }
    }

    pub fn from_vec<S: AsRef<[u8]>>(data: Vec<S>) -> Self {
        let mut column = Self::with_capacity(data.len());
        for s in data {
            column.append(s);
        }
        column
    }

    pub fn append(&mut self, s: impl AsRef<[u8]>) {
        let start = self.arena.len();
        self.arena.extend_from_slice(s.as_ref());
        self.spans.push((start, self.arena.len()));
    }

    /// Borrowed bytes of row `index`.
    pub fn at(&self, index: usize) -> Option<&[u8]> {
        self.spans.get(index).map(|&(start, end)| &self.arena[start..end])
    }

    /// Row `index` as text, `None` when out of range or not UTF-8.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.at(index).and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn len(&self) -> usize {
        self.spans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.spans.iter().map(|&(start, end)| &self.arena[start..end])
    }
}

impl Default for ColumnString {
    fn default() -> Self {
        Self::new()
    }
}

impl Column for ColumnString {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.spans.len()
    }

    fn clear(&mut self) {
        self.arena.clear();
        self.spans.clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.spans.reserve(additional);
    }

    fn truncate(&mut self, len: usize) {
        if len < self.spans.len() {
            let end = if len == 0 { 0 } else { self.spans[len - 1].1 };
            self.spans.truncate(len);
            self.arena.truncate(end);
        }
    }

    fn append_column(&mut self, other: &dyn Column) -> Result<()> {
        let other = downcast_other::<ColumnString>(&self.type_, other)?;
        self.spans.reserve(other.spans.len());
        for row in other.iter() {
            self.append(row);
        }
        Ok(())
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        let bytes = value
            .as_bytes()
            .ok_or_else(|| rejected(value, &self.type_))?;
        self.append(bytes);
        Ok(())
    }

    fn append_default(&mut self) {
        self.append([]);
    }

    fn can_accept(&self, value: &Value) -> bool {
        matches!(value, Value::String(_) | Value::Bytes(_))
    }

    fn value(&self, index: usize) -> Result<Value> {
        let bytes = self
            .at(index)
            .ok_or_else(|| out_of_range(index, self.size()))?;
        Ok(match std::str::from_utf8(bytes) {
            Ok(s) => Value::String(s.to_string()),
            Err(_) => Value::Bytes(bytes.to_vec()),
        })
    }

    fn load_body(
        &mut self,
        reader: &mut dyn ByteRead,
        rows: usize,
    ) -> Result<()> {
        self.clear();
        self.spans.reserve(rows.min(READ_CHUNK));
        for _ in 0..rows {
            let len = usize::try_from(reader.read_varint()?).map_err(|_| {
                Error::Protocol("String length exceeds address space".into())
            })?;
            let start = self.arena.len();
            read_into(reader, &mut self.arena, len)?;
            self.spans.push((start, self.arena.len()));
        }
        Ok(())
    }

    fn save_body(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        for row in self.iter() {
            writer.write_varint(row.len() as u64)?;
            writer.write_bytes(row)?;
        }
        Ok(())
    }

    fn clone_empty(&self) -> ColumnBox {
        Box::new(ColumnString::new())
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnBox> {
        check_slice(begin, len, self.size())?;
        let mut result = ColumnString::with_capacity(len);
        for row in self.iter().skip(begin).take(len) {
            result.append(row);
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

impl ColumnTyped for ColumnString {
    type Item = String;

    fn get(&self, index: usize) -> Option<String> {
        ColumnString::get(self, index).map(str::to_string)
    }

    fn push(&mut self, item: String) -> Result<()> {
        self.append(item);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SliceReader;
    use bytes::BytesMut;

    #[test]
    fn test_string_wire_layout() {
        let col = ColumnString::from_vec(vec!["hi", "", "abc"]);
        let mut buf = BytesMut::new();
        col.save_body(&mut buf).unwrap();
        assert_eq!(&buf[..], b"\x02hi\x00\x03abc");
    }

    #[test]
    fn test_string_roundtrip_and_views() {
        let col = ColumnString::from_vec(vec!["hello", "", "мир", "🦀"]);
        let mut buf = Vec::new();
        col.save_body(&mut buf).unwrap();

        let mut decoded = ColumnString::from_vec(vec!["stale"]);
        decoded.load_body(&mut SliceReader::new(&buf), 4).unwrap();
        assert_eq!(decoded.size(), 4);
        assert_eq!(decoded.get(0), Some("hello"));
        assert_eq!(decoded.at(1), Some(&b""[..]));
        assert_eq!(decoded.get(3), Some("🦀"));
    }

    #[test]
    fn test_string_binary_value() {
        let mut col = ColumnString::new();
        col.append_value(&Value::Bytes(vec![0xff, 0x00])).unwrap();
        assert_eq!(col.value(0).unwrap(), Value::Bytes(vec![0xff, 0x00]));
        assert!(col.append_value(&Value::Int32(1)).is_err());
    }

    #[test]
    fn test_string_truncated_payload() {
        let mut col = ColumnString::new();
        let data = b"\x05ab";
        assert!(col.load_body(&mut SliceReader::new(data), 1).is_err());
    }

    #[test]
    fn test_string_truncate() {
        let mut col = ColumnString::from_vec(vec!["a", "bb", "ccc"]);
        col.truncate(1);
        col.append("d");
        assert_eq!(col.iter().collect::<Vec<_>>(), vec![&b"a"[..], &b"d"[..]]);
    }

    #[test]
    fn test_fixed_string_padding() {
        let mut col = ColumnFixedString::new(4);
        col.append("ab").unwrap();
        assert!(col.append("abcde").is_err());
        assert_eq!(col.size(), 1);
        assert_eq!(col.at(0), Some(&b"ab\0\0"[..]));
        assert_eq!(col.get(0), Some("ab"));

        let mut buf = Vec::new();
        col.save_body(&mut buf).unwrap();
        let mut decoded = ColumnFixedString::new(4);
        decoded.load_body(&mut SliceReader::new(&buf), 1).unwrap();
        assert_eq!(decoded.value(0).unwrap(), Value::Bytes(b"ab\0\0".to_vec()));
    }
}
