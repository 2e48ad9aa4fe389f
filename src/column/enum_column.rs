//! Enum8 / Enum16 columns
//!
//! An enum column stores integer codes. The code↔name table comes from the
//! declared type string, e.g. `Enum8('red' = 1, 'green' = 2)`, and is parsed
//! lazily into an [`EnumCache`]. The cache remembers the string it was built
//! from and is rebuilt whenever the declared string differs, which happens
//! when a reused column is revalidated against a new block header.

use super::{
    check_slice,
    downcast_other,
    numeric::{
        ColumnVector,
        FixedSize,
    },
    out_of_range,
    rejected,
    Column,
    ColumnBox,
    ColumnTyped,
    Value,
};
use crate::{
    io::{
        ByteRead,
        ByteWrite,
    },
    types::{
        EnumItem,
        Type,
        TypeCode,
    },
    Error,
    Result,
};
use std::{
    collections::HashMap,
    sync::{
        Mutex,
        MutexGuard,
    },
};
use tracing::trace;

fn malformed(fragment: &str, reason: impl Into<String>) -> Error {
    Error::MalformedType {
        fragment: fragment.trim().to_string(),
        reason: reason.into(),
    }
}

/// Parse the body of an enum declaration: `'a' = 1, 'b' = -2`.
///
/// Names are single-quoted with `\'` and `\\` escapes. Values must fit i16;
/// narrower ranges are checked by [`parse_enum_type`].
pub fn parse_enum_items(body: &str) -> Result<Vec<EnumItem>> {
    let mut items = Vec::new();
    let mut rest = body;

    loop {
        let trimmed = rest.trim_start();
        let start_of_item = trimmed;
        let Some(after_quote) = trimmed.strip_prefix('\'') else {
            return Err(malformed(
                start_of_item,
                "enum name must be single-quoted",
            ));
        };

        let mut name = String::new();
        let mut chars = after_quote.char_indices();
        let mut end = None;
        while let Some((i, c)) = chars.next() {
            match c {
                '\'' => {
                    end = Some(i + 1);
                    break;
                }
                '\\' => match chars.next() {
                    Some((_, escaped)) => name.push(escaped),
                    None => break,
                },
                other => name.push(other),
            }
        }
        let Some(end) = end else {
            return Err(malformed(start_of_item, "unterminated enum name"));
        };

        let after_name = after_quote[end..].trim_start();
        let item_end = after_name.find(',').unwrap_or(after_name.len());
        let consumed = start_of_item.len() - after_name.len() + item_end;
        let item_text = &start_of_item[..consumed];

        let Some(value_text) = after_name[..item_end].strip_prefix('=') else {
            return Err(malformed(item_text, "missing '=' after enum name"));
        };
        let value_text = value_text.trim();
        let value: i64 = value_text.parse().map_err(|_| {
            malformed(item_text, format!("'{}' is not a number", value_text))
        })?;
        let value = i16::try_from(value).map_err(|_| {
            malformed(item_text, format!("value {} is out of range", value))
        })?;

        if items.iter().any(|i: &EnumItem| i.name == name || i.value == value) {
            return Err(malformed(item_text, "duplicate enum name or value"));
        }
        items.push(EnumItem { name, value });

        if item_end == after_name.len() {
            break;
        }
        rest = &after_name[item_end + 1..];
    }

    Ok(items)
}

/// Parse a full enum type string such as `Enum8('a' = 1)`, optionally
/// wrapped in `Nullable(...)`.
pub fn parse_enum_type(type_str: &str) -> Result<(TypeCode, Vec<EnumItem>)> {
    let mut s = type_str.trim();
    let unwrapped =
        s.strip_prefix("Nullable(").and_then(|r| r.strip_suffix(')'));
    if let Some(inner) = unwrapped {
        s = inner.trim();
    }

    let (code, body) = if let Some(rest) = s.strip_prefix("Enum8(") {
        (TypeCode::Enum8, rest)
    } else if let Some(rest) = s.strip_prefix("Enum16(") {
        (TypeCode::Enum16, rest)
    } else {
        return Err(malformed(s, "expected Enum8(...) or Enum16(...)"));
    };
    let body = body
        .strip_suffix(')')
        .ok_or_else(|| malformed(s, "missing closing parenthesis"))?;

    let items = parse_enum_items(body)?;
    if code == TypeCode::Enum8 {
        let wide = items.iter().find(|i| i8::try_from(i.value).is_err());
        if let Some(item) = wide {
            return Err(malformed(
                &format!("'{}' = {}", item.name, item.value),
                "value is out of range for Enum8",
            ));
        }
    }
    Ok((code, items))
}

/// Code↔name table derived from one declared type string.
#[derive(Debug, Default)]
pub struct EnumCache {
    /// The declared type string this table was built from.
    pub key: String,
    pub by_code: HashMap<i16, String>,
    pub by_name: HashMap<String, i16>,
}

impl EnumCache {
    fn rebuild(&mut self, declared: &str) -> Result<()> {
        let (_, items) = parse_enum_type(declared)?;
        trace!(declared, items = items.len(), "rebuilding enum table");
        self.by_code =
            items.iter().map(|i| (i.value, i.name.clone())).collect();
        self.by_name = items.into_iter().map(|i| (i.name, i.value)).collect();
        self.key = declared.to_string();
        Ok(())
    }
}

/// Integer storage of an enum column.
pub trait EnumCode: FixedSize + Into<i16> + TryFrom<i16> {
    const CODE: TypeCode;
}

impl EnumCode for i8 {
    const CODE: TypeCode = TypeCode::Enum8;
}

impl EnumCode for i16 {
    const CODE: TypeCode = TypeCode::Enum16;
}

/// Column for Enum8/Enum16 types
#[derive(Debug)]
pub struct ColumnEnum<T: EnumCode> {
    type_: Type,
    declared: String,
    data: ColumnVector<T>,
    cache: Mutex<EnumCache>,
}

pub type ColumnEnum8 = ColumnEnum<i8>;
pub type ColumnEnum16 = ColumnEnum<i16>;

impl<T: EnumCode> ColumnEnum<T> {
    pub fn new(type_: Type) -> Self {
        let declared = type_.name();
        Self {
            data: ColumnVector::with_type(type_.clone()),
            type_,
            declared,
            cache: Mutex::new(EnumCache::default()),
        }
    }

    /// Column for a declared type string, e.g. `Enum8('a' = 1)`.
    pub fn from_declared(type_str: &str) -> Result<Self> {
        let mut column = Self::new(Type::Simple(T::CODE));
        column.set_declared_type(type_str)?;
        Ok(column)
    }

    pub fn with_data(mut self, data: Vec<T>) -> Self {
        self.data = self.data.with_data(data);
        self
    }

    /// The declared type string the enum table is derived from.
    pub fn declared_type(&self) -> &str {
        &self.declared
    }

    /// Replace the declared type string. The enum table is rebuilt on the
    /// next lookup.
    pub fn set_declared_type(&mut self, type_str: &str) -> Result<()> {
        let (code, items) = parse_enum_type(type_str)?;
        if code != T::CODE {
            return Err(Error::IncompatibleType {
                wire_type: type_str.to_string(),
                accepted: vec![T::CODE.name().to_string()],
            });
        }
        self.type_ = match code {
            TypeCode::Enum8 => Type::enum8(items),
            _ => Type::enum16(items),
        };
        self.declared = type_str.to_string();
        Ok(())
    }

    fn table(&self) -> Result<MutexGuard<'_, EnumCache>> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if cache.key != self.declared {
            cache.rebuild(&self.declared)?;
        }
        Ok(cache)
    }

    pub fn name_of(&self, code: i16) -> Option<String> {
        self.table().ok()?.by_code.get(&code).cloned()
    }

    pub fn code_of(&self, name: &str) -> Option<i16> {
        self.table().ok()?.by_name.get(name).copied()
    }

    /// Append enum by numeric code; the code must be declared.
    pub fn append_code(&mut self, code: i16) -> Result<()> {
        if !self.table()?.by_code.contains_key(&code) {
            return Err(Error::InvalidArgument(format!(
                "Unknown code {} for {}",
                code, self.declared
            )));
        }
        let stored = T::try_from(code).map_err(|_| {
            Error::InvalidArgument(format!(
                "Code {} does not fit {}",
                code,
                T::CODE.name()
            ))
        })?;
        self.data.append(stored);
        Ok(())
    }

    /// Append enum by name
    pub fn append_name(&mut self, name: &str) -> Result<()> {
        let code = self.code_of(name).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Unknown name '{}' for {}",
                name, self.declared
            ))
        })?;
        self.append_code(code)
    }

    /// Get numeric value at index (panics if out of bounds)
    pub fn at(&self, index: usize) -> T {
        self.data.at(index)
    }

    pub fn name_at(&self, index: usize) -> Option<String> {
        self.name_of(self.data.get(index)?.into())
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl<T: EnumCode> Clone for ColumnEnum<T> {
    fn clone(&self) -> Self {
        Self {
            type_: self.type_.clone(),
            declared: self.declared.clone(),
            data: self.data.clone(),
            cache: Mutex::new(EnumCache::default()),
        }
    }
}

impl<T: EnumCode> Column for ColumnEnum<T> {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.data.len()
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
        let other = downcast_other::<ColumnEnum<T>>(&self.type_, other)?;
        if other.declared != self.declared {
            return Err(Error::TypeMismatch {
                expected: self.declared.clone(),
                actual: other.declared.clone(),
            });
        }
        self.data.append_column(&other.data)
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Enum { name, .. } if !name.is_empty() => {
                self.append_name(name)
            }
            Value::Enum { code, .. } => self.append_code(*code),
            Value::String(name) => self.append_name(name),
            other => match other.as_i128().and_then(|v| i16::try_from(v).ok()) {
                Some(code) => self.append_code(code),
                None => Err(rejected(value, &self.type_)),
            },
        }
    }

    fn append_default(&mut self) {
        self.data.append_default();
    }

    fn can_accept(&self, value: &Value) -> bool {
        match value {
            Value::Enum { code, .. } => self.name_of(*code).is_some(),
            _ => false,
        }
    }

    fn value(&self, index: usize) -> Result<Value> {
        let code: i16 = self
            .data
            .get(index)
            .ok_or_else(|| out_of_range(index, self.data.len()))?
            .into();
        let name = self.table()?.by_code.get(&code).cloned().ok_or_else(|| {
            Error::Protocol(format!(
                "Code {} is not declared in {}",
                code, self.declared
            ))
        })?;
        Ok(Value::Enum { code, name })
    }

    fn load_body(
        &mut self,
        reader: &mut dyn ByteRead,
        rows: usize,
    ) -> Result<()> {
        self.data.load_body(reader, rows)
    }

    fn save_body(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        self.data.save_body(writer)
    }

    /// Any enum header of the same width is accepted and replaces the
    /// declared table.
    fn check_type(&mut self, wire_type: &Type) -> Result<()> {
        if wire_type.code() != T::CODE {
            return Err(super::incompatible(wire_type, &self.type_));
        }
        self.set_declared_type(&wire_type.name())
    }

    fn clone_empty(&self) -> ColumnBox {
        let mut empty = self.clone();
        empty.data.clear();
        Box::new(empty)
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnBox> {
        check_slice(begin, len, self.data.len())?;
        let rows = self.data.data()[begin..begin + len].to_vec();
        Ok(Box::new(self.clone().with_data(rows)))
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

impl<T: EnumCode> ColumnTyped for ColumnEnum<T> {
    type Item = String;

    fn get(&self, index: usize) -> Option<String> {
        self.name_at(index)
    }

    fn push(&mut self, item: String) -> Result<()> {
        self.append_name(&item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn colors() -> Type {
        Type::enum8(vec![EnumItem::new("Red", 1), EnumItem::new("Green", 2)])
    }

    #[test]
    fn test_enum8_append_code() {
        let mut col = ColumnEnum8::new(colors());
        col.append_code(1).unwrap();
        col.append_code(2).unwrap();
        assert!(col.append_code(3).is_err());

        assert_eq!(col.len(), 2);
        assert_eq!(col.at(0), 1);
        assert_eq!(col.at(1), 2);
    }

    #[test]
    fn test_enum8_append_name() {
        let mut col = ColumnEnum8::new(colors());
        col.append_name("Red").unwrap();
        col.append_name("Green").unwrap();
        assert!(col.append_name("Blue").is_err());

        assert_eq!(col.name_at(0).as_deref(), Some("Red"));
        assert_eq!(
            col.value(1).unwrap(),
            Value::Enum { code: 2, name: "Green".to_string() }
        );
    }

    #[test]
    fn test_enum16() {
        let declared = "Enum16('Small' = 100, 'Large' = 1000)";
        let mut col = ColumnEnum16::from_declared(declared).unwrap();
        col.append_code(100).unwrap();
        col.append_value(&Value::from("Large")).unwrap();
        assert_eq!(col.data.data(), &[100, 1000]);
        assert_eq!(col.name_at(0).as_deref(), Some("Small"));
    }

    #[test]
    fn test_parse_items_with_escapes() {
        let items = parse_enum_items(r"'it\'s' = -1, 'a,b' = 2,'c'=3").unwrap();
        assert_eq!(
            items,
            vec![
                EnumItem::new("it's", -1),
                EnumItem::new("a,b", 2),
                EnumItem::new("c", 3),
            ]
        );
    }

    #[test]
    fn test_parse_errors_name_fragment() {
        match parse_enum_type("Enum8('a' = 1, 'b' 2)") {
            Err(Error::MalformedType { fragment, reason }) => {
                assert_eq!(fragment, "'b' 2");
                assert!(reason.contains('='));
            }
            other => panic!("unexpected: {:?}", other),
        }
        match parse_enum_type("Enum8('a' = x1)") {
            Err(Error::MalformedType { fragment, reason }) => {
                assert_eq!(fragment, "'a' = x1");
                assert!(reason.contains("not a number"));
            }
            other => panic!("unexpected: {:?}", other),
        }
        assert!(matches!(
            parse_enum_type("Enum8('a' = 300)"),
            Err(Error::MalformedType { .. })
        ));
        assert!(parse_enum_type("Enum16('a' = 300)").is_ok());
    }

    #[test]
    fn test_nullable_wrapper_stripped() {
        let (code, items) =
            parse_enum_type("Nullable(Enum8('x' = 5))").unwrap();
        assert_eq!(code, TypeCode::Enum8);
        assert_eq!(items, vec![EnumItem::new("x", 5)]);
    }

    #[test]
    fn test_cache_follows_declared_type() {
        let mut col = ColumnEnum8::from_declared("Enum8('a' = 1)").unwrap();
        assert_eq!(col.code_of("a"), Some(1));
        assert_eq!(col.name_of(1).as_deref(), Some("a"));

        col.check_type(&Type::parse("Enum8('b' = 2)").unwrap()).unwrap();
        assert_eq!(col.code_of("a"), None);
        assert_eq!(col.code_of("b"), Some(2));
        assert_eq!(col.name_of(1), None);
        assert_eq!(col.name_of(2).as_deref(), Some("b"));

        let wider = Type::parse("Enum16('c' = 3)").unwrap();
        assert!(col.check_type(&wider).is_err());
    }
}
