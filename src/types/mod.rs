//! # ClickHouse Type System
//!
//! This module models the declared wire types that travel in column headers
//! of the native block format, and parses them from their string form.
//!
//! ## ClickHouse Documentation References
//!
//! - [Integer Types](https://clickhouse.com/docs/en/sql-reference/data-types/int-uint)
//! - [Floating-Point Types](https://clickhouse.com/docs/en/sql-reference/data-types/float)
//! - [Decimal Types](https://clickhouse.com/docs/en/sql-reference/data-types/decimal)
//! - [String](https://clickhouse.com/docs/en/sql-reference/data-types/string)
//!   and [FixedString](https://clickhouse.com/docs/en/sql-reference/data-types/fixedstring)
//! - [Date](https://clickhouse.com/docs/en/sql-reference/data-types/date),
//!   [Date32](https://clickhouse.com/docs/en/sql-reference/data-types/date32),
//!   [DateTime](https://clickhouse.com/docs/en/sql-reference/data-types/datetime),
//!   [DateTime64](https://clickhouse.com/docs/en/sql-reference/data-types/datetime64)
//! - [Array](https://clickhouse.com/docs/en/sql-reference/data-types/array),
//!   [Tuple](https://clickhouse.com/docs/en/sql-reference/data-types/tuple),
//!   [Map](https://clickhouse.com/docs/en/sql-reference/data-types/map),
//!   [Nested](https://clickhouse.com/docs/en/sql-reference/data-types/nested-data-structures/nested)
//! - [Nullable](https://clickhouse.com/docs/en/sql-reference/data-types/nullable),
//!   [LowCardinality](https://clickhouse.com/docs/en/sql-reference/data-types/lowcardinality),
//!   [Variant](https://clickhouse.com/docs/en/sql-reference/data-types/variant)
//! - [Enum8/Enum16](https://clickhouse.com/docs/en/sql-reference/data-types/enum)
//! - [UUID](https://clickhouse.com/docs/en/sql-reference/data-types/uuid)
//!
//! ## Canonical names
//!
//! [`Type::name`] renders the canonical type string. The Variant column sorts
//! its members by this string, so the rendering must be stable: one space
//! after each comma, enum names single-quoted with `\'` escapes.

mod parser;

pub use parser::{
    parse_type_name,
    TypeAst,
    TypeMeta,
};

use crate::{
    Error,
    Result,
};

/// Trait for mapping Rust primitive types to ClickHouse types
///
/// This trait allows type inference in column constructors, eliminating the
/// need to pass Type explicitly when creating typed columns.
///
/// # Examples
///
/// ```
/// use clickhouse_columns::types::{Type, ToType};
///
/// assert_eq!(i32::to_type(), Type::int32());
/// assert_eq!(u64::to_type(), Type::uint64());
/// assert_eq!(f64::to_type(), Type::float64());
/// ```
pub trait ToType {
    /// Returns the corresponding ClickHouse [`Type`] for this Rust type.
    fn to_type() -> Type;
}

macro_rules! impl_to_type {
    ($($rust:ty => $ctor:ident),+ $(,)?) => {
        $(
            impl ToType for $rust {
                fn to_type() -> Type {
                    Type::$ctor()
                }
            }
        )+
    };
}

impl_to_type!(
    i8 => int8,
    i16 => int16,
    i32 => int32,
    i64 => int64,
    i128 => int128,
    u8 => uint8,
    u16 => uint16,
    u32 => uint32,
    u64 => uint64,
    u128 => uint128,
    f32 => float32,
    f64 => float64,
    uuid::Uuid => uuid,
);

/// Type code enumeration matching ClickHouse types
///
/// Each variant represents a base type in ClickHouse. For parametric types
/// (like Array, Nullable, etc.), see the [`Type`] enum which includes
/// parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeCode {
    /// Placeholder for names the parser does not know.
    Void = 0,
    Int8,
    Int16,
    Int32,
    Int64,
    Int128,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    UInt128,
    Float32,
    Float64,
    /// Variable-length byte string.
    String,
    /// Fixed-length byte string, padded with zero bytes.
    FixedString,
    /// Unix timestamp (UInt32), with optional timezone.
    DateTime,
    /// Sub-second timestamp stored as Int64 ticks.
    DateTime64,
    /// Days since 1970-01-01 (UInt16).
    Date,
    /// Days since 1970-01-01 (Int32), extended range.
    Date32,
    Array,
    Nullable,
    Tuple,
    Nested,
    Enum8,
    Enum16,
    UUID,
    /// Decimal with precision and scale; Decimal32/64/128 normalize to it.
    Decimal,
    LowCardinality,
    Map,
    /// Discriminated union over several member types.
    Variant,
}

impl TypeCode {
    /// Returns the ClickHouse type name string for this type code.
    pub fn name(&self) -> &'static str {
        match self {
            TypeCode::Void => "Void",
            TypeCode::Int8 => "Int8",
            TypeCode::Int16 => "Int16",
            TypeCode::Int32 => "Int32",
            TypeCode::Int64 => "Int64",
            TypeCode::Int128 => "Int128",
            TypeCode::UInt8 => "UInt8",
            TypeCode::UInt16 => "UInt16",
            TypeCode::UInt32 => "UInt32",
            TypeCode::UInt64 => "UInt64",
            TypeCode::UInt128 => "UInt128",
            TypeCode::Float32 => "Float32",
            TypeCode::Float64 => "Float64",
            TypeCode::String => "String",
            TypeCode::FixedString => "FixedString",
            TypeCode::DateTime => "DateTime",
            TypeCode::DateTime64 => "DateTime64",
            TypeCode::Date => "Date",
            TypeCode::Date32 => "Date32",
            TypeCode::Array => "Array",
            TypeCode::Nullable => "Nullable",
            TypeCode::Tuple => "Tuple",
            TypeCode::Nested => "Nested",
            TypeCode::Enum8 => "Enum8",
            TypeCode::Enum16 => "Enum16",
            TypeCode::UUID => "UUID",
            TypeCode::Decimal => "Decimal",
            TypeCode::LowCardinality => "LowCardinality",
            TypeCode::Map => "Map",
            TypeCode::Variant => "Variant",
        }
    }
}

/// Enum item for Enum8/Enum16 types, mapping a name to its integer value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumItem {
    /// The string name of this enum variant.
    pub name: String,
    /// The integer value associated with this enum variant.
    pub value: i16,
}

impl EnumItem {
    pub fn new(name: impl Into<String>, value: i16) -> Self {
        Self { name: name.into(), value }
    }
}

/// ClickHouse type definition, representing both simple and parametric types.
#[derive(Debug, Clone, PartialEq)]
pub enum Type {
    /// A non-parametric type identified by its [`TypeCode`].
    Simple(TypeCode),
    /// Fixed-length byte string with the given size in bytes.
    FixedString { size: usize },
    /// Date and time with optional timezone.
    DateTime { timezone: Option<String> },
    /// Sub-second date and time with precision (0 to 9) and optional timezone.
    DateTime64 { precision: usize, timezone: Option<String> },
    /// Decimal with given precision and scale.
    Decimal { precision: usize, scale: usize },
    /// Enum with Int8 storage.
    Enum8 { items: Vec<EnumItem> },
    /// Enum with Int16 storage.
    Enum16 { items: Vec<EnumItem> },
    /// Variable-length array of the given element type.
    Array { item_type: Box<Type> },
    /// Nullable wrapper around the given nested type.
    Nullable { nested_type: Box<Type> },
    /// Fixed-size tuple; `item_names` is empty for unnamed tuples.
    Tuple { item_types: Vec<Type>, item_names: Vec<String> },
    /// `Nested(name Type, ...)`, transmitted as an array of named tuples.
    Nested { fields: Vec<(String, Type)> },
    /// Dictionary-encoded wrapper around the given nested type.
    LowCardinality { nested_type: Box<Type> },
    /// Key-value map with typed keys and values.
    Map { key_type: Box<Type>, value_type: Box<Type> },
    /// Discriminated union; members in declared order.
    Variant { variants: Vec<Type> },
}

impl Type {
    /// Returns the [`TypeCode`] for this type.
    pub fn code(&self) -> TypeCode {
        match self {
            Type::Simple(code) => *code,
            Type::FixedString { .. } => TypeCode::FixedString,
            Type::DateTime { .. } => TypeCode::DateTime,
            Type::DateTime64 { .. } => TypeCode::DateTime64,
            Type::Decimal { .. } => TypeCode::Decimal,
            Type::Enum8 { .. } => TypeCode::Enum8,
            Type::Enum16 { .. } => TypeCode::Enum16,
            Type::Array { .. } => TypeCode::Array,
            Type::Nullable { .. } => TypeCode::Nullable,
            Type::Tuple { .. } => TypeCode::Tuple,
            Type::Nested { .. } => TypeCode::Nested,
            Type::LowCardinality { .. } => TypeCode::LowCardinality,
            Type::Map { .. } => TypeCode::Map,
            Type::Variant { .. } => TypeCode::Variant,
        }
    }

    /// Canonical type string, as sent in a column header.
    pub fn name(&self) -> String {
        match self {
            Type::Simple(code) => code.name().to_string(),
            Type::FixedString { size } => format!("FixedString({})", size),
            Type::DateTime { timezone: None } => "DateTime".to_string(),
            Type::DateTime { timezone: Some(tz) } => {
                format!("DateTime('{}')", tz)
            }
            Type::DateTime64 { precision, timezone: None } => {
                format!("DateTime64({})", precision)
            }
            Type::DateTime64 { precision, timezone: Some(tz) } => {
                format!("DateTime64({}, '{}')", precision, tz)
            }
            Type::Decimal { precision, scale } => {
                format!("Decimal({}, {})", precision, scale)
            }
            Type::Enum8 { items } => format!("Enum8({})", enum_body(items)),
            Type::Enum16 { items } => format!("Enum16({})", enum_body(items)),
            Type::Array { item_type } => format!("Array({})", item_type.name()),
            Type::Nullable { nested_type } => {
                format!("Nullable({})", nested_type.name())
            }
            Type::Tuple { item_types, item_names } => {
                let parts: Vec<String> = if item_names.len() == item_types.len()
                {
                    item_names
                        .iter()
                        .zip(item_types)
                        .map(|(n, t)| format!("{} {}", n, t.name()))
                        .collect()
                } else {
                    item_types.iter().map(|t| t.name()).collect()
                };
                format!("Tuple({})", parts.join(", "))
            }
            Type::Nested { fields } => {
                let parts: Vec<String> = fields
                    .iter()
                    .map(|(n, t)| format!("{} {}", n, t.name()))
                    .collect();
                format!("Nested({})", parts.join(", "))
            }
            Type::LowCardinality { nested_type } => {
                format!("LowCardinality({})", nested_type.name())
            }
            Type::Map { key_type, value_type } => {
                format!("Map({}, {})", key_type.name(), value_type.name())
            }
            Type::Variant { variants } => {
                let parts: Vec<String> =
                    variants.iter().map(|t| t.name()).collect();
                format!("Variant({})", parts.join(", "))
            }
        }
    }

    /// Size in bytes of one record for fixed-width types, `None` otherwise.
    pub fn storage_size_bytes(&self) -> Option<usize> {
        match self {
            Type::Simple(code) => match code {
                TypeCode::Int8 | TypeCode::UInt8 => Some(1),
                TypeCode::Int16 | TypeCode::UInt16 | TypeCode::Date => Some(2),
                TypeCode::Int32
                | TypeCode::UInt32
                | TypeCode::Float32
                | TypeCode::Date32 => Some(4),
                TypeCode::Int64 | TypeCode::UInt64 | TypeCode::Float64 => {
                    Some(8)
                }
                TypeCode::Int128 | TypeCode::UInt128 | TypeCode::UUID => {
                    Some(16)
                }
                _ => None,
            },
            Type::FixedString { size } => Some(*size),
            Type::DateTime { .. } => Some(4),
            Type::DateTime64 { .. } => Some(8),
            Type::Enum8 { .. } => Some(1),
            Type::Enum16 { .. } => Some(2),
            Type::Decimal { precision, .. } => Some(if *precision <= 9 {
                4
            } else if *precision <= 18 {
                8
            } else {
                16
            }),
            _ => None,
        }
    }

    pub fn int8() -> Self {
        Type::Simple(TypeCode::Int8)
    }

    pub fn int16() -> Self {
        Type::Simple(TypeCode::Int16)
    }

    pub fn int32() -> Self {
        Type::Simple(TypeCode::Int32)
    }

    pub fn int64() -> Self {
        Type::Simple(TypeCode::Int64)
    }

    pub fn int128() -> Self {
        Type::Simple(TypeCode::Int128)
    }

    pub fn uint8() -> Self {
        Type::Simple(TypeCode::UInt8)
    }

    pub fn uint16() -> Self {
        Type::Simple(TypeCode::UInt16)
    }

    pub fn uint32() -> Self {
        Type::Simple(TypeCode::UInt32)
    }

    pub fn uint64() -> Self {
        Type::Simple(TypeCode::UInt64)
    }

    pub fn uint128() -> Self {
        Type::Simple(TypeCode::UInt128)
    }

    pub fn float32() -> Self {
        Type::Simple(TypeCode::Float32)
    }

    pub fn float64() -> Self {
        Type::Simple(TypeCode::Float64)
    }

    pub fn string() -> Self {
        Type::Simple(TypeCode::String)
    }

    pub fn fixed_string(size: usize) -> Self {
        Type::FixedString { size }
    }

    pub fn date() -> Self {
        Type::Simple(TypeCode::Date)
    }

    pub fn date32() -> Self {
        Type::Simple(TypeCode::Date32)
    }

    pub fn datetime(timezone: Option<String>) -> Self {
        Type::DateTime { timezone }
    }

    pub fn datetime64(precision: usize, timezone: Option<String>) -> Self {
        Type::DateTime64 { precision, timezone }
    }

    pub fn decimal(precision: usize, scale: usize) -> Self {
        Type::Decimal { precision, scale }
    }

    pub fn uuid() -> Self {
        Type::Simple(TypeCode::UUID)
    }

    pub fn array(item_type: Type) -> Self {
        Type::Array { item_type: Box::new(item_type) }
    }

    pub fn nullable(nested_type: Type) -> Self {
        Type::Nullable { nested_type: Box::new(nested_type) }
    }

    pub fn tuple(item_types: Vec<Type>) -> Self {
        Type::Tuple { item_types, item_names: Vec::new() }
    }

    pub fn named_tuple(fields: Vec<(String, Type)>) -> Self {
        let (item_names, item_types) = fields.into_iter().unzip();
        Type::Tuple { item_types, item_names }
    }

    pub fn nested(fields: Vec<(String, Type)>) -> Self {
        Type::Nested { fields }
    }

    pub fn enum8(items: Vec<EnumItem>) -> Self {
        Type::Enum8 { items }
    }

    pub fn enum16(items: Vec<EnumItem>) -> Self {
        Type::Enum16 { items }
    }

    pub fn low_cardinality(nested_type: Type) -> Self {
        Type::LowCardinality { nested_type: Box::new(nested_type) }
    }

    pub fn map(key_type: Type, value_type: Type) -> Self {
        Type::Map {
            key_type: Box::new(key_type),
            value_type: Box::new(value_type),
        }
    }

    pub fn variant(variants: Vec<Type>) -> Self {
        Type::Variant { variants }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Nullable { .. })
    }

    /// Strip one `Nullable(...)` layer, if present.
    pub fn unwrap_nullable(&self) -> &Type {
        match self {
            Type::Nullable { nested_type } => nested_type,
            other => other,
        }
    }

    /// Items of an Enum8/Enum16 type.
    pub fn enum_items(&self) -> Option<&[EnumItem]> {
        match self {
            Type::Enum8 { items } | Type::Enum16 { items } => Some(items),
            _ => None,
        }
    }

    /// Build a [`Type`] from a parsed [`TypeAst`].
    pub fn from_ast(ast: &TypeAst) -> Result<Self> {
        match ast.meta {
            TypeMeta::Terminal => terminal_from_ast(ast),
            TypeMeta::Array => Ok(Type::array(Self::from_ast(single(ast)?)?)),
            TypeMeta::Nullable => {
                Ok(Type::nullable(Self::from_ast(single(ast)?)?))
            }
            TypeMeta::LowCardinality => {
                Ok(Type::low_cardinality(Self::from_ast(single(ast)?)?))
            }
            TypeMeta::Tuple => {
                let mut item_types = Vec::with_capacity(ast.elements.len());
                let mut item_names = Vec::new();
                for element in &ast.elements {
                    item_types.push(Self::from_ast(element)?);
                    if let Some(name) = &element.element_name {
                        item_names.push(name.clone());
                    }
                }
                let partly_named = !item_names.is_empty()
                    && item_names.len() != item_types.len();
                if partly_named {
                    return Err(malformed(
                        ast,
                        "either all tuple elements are named or none",
                    ));
                }
                Ok(Type::Tuple { item_types, item_names })
            }
            TypeMeta::Nested => {
                let mut fields = Vec::with_capacity(ast.elements.len());
                for element in &ast.elements {
                    let name = element.element_name.clone().ok_or_else(|| {
                        malformed(ast, "Nested fields must be named")
                    })?;
                    fields.push((name, Self::from_ast(element)?));
                }
                Ok(Type::Nested { fields })
            }
            TypeMeta::Map => {
                if ast.elements.len() != 2 {
                    return Err(malformed(
                        ast,
                        "Map requires exactly two type arguments",
                    ));
                }
                Ok(Type::map(
                    Self::from_ast(&ast.elements[0])?,
                    Self::from_ast(&ast.elements[1])?,
                ))
            }
            TypeMeta::Variant => {
                if ast.elements.is_empty() {
                    return Err(malformed(ast, "Variant requires members"));
                }
                let variants = ast
                    .elements
                    .iter()
                    .map(Self::from_ast)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Type::Variant { variants })
            }
            TypeMeta::Enum => {
                let (code, items) = crate::column::enum_column::parse_enum_type(
                    &format!("{}({})", ast.name, ast.value_string),
                )?;
                if code == TypeCode::Enum8 {
                    Ok(Type::Enum8 { items })
                } else {
                    Ok(Type::Enum16 { items })
                }
            }
            TypeMeta::SimpleAggregateFunction => {
                // SimpleAggregateFunction(func, Type) is transmitted as Type
                let inner = ast.elements.get(1).ok_or_else(|| {
                    malformed(
                        ast,
                        "SimpleAggregateFunction requires a type parameter",
                    )
                })?;
                Self::from_ast(inner)
            }
            TypeMeta::Number | TypeMeta::String => {
                Err(malformed(ast, "expected a type, found a literal"))
            }
        }
    }

    /// Parse a type from its string representation.
    pub fn parse(type_str: &str) -> Result<Self> {
        let ast = parse_type_name(type_str)?;
        Self::from_ast(&ast)
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

fn enum_body(items: &[EnumItem]) -> String {
    items
        .iter()
        .map(|item| {
            let escaped = item.name.replace('\\', "\\\\").replace('\'', "\\'");
            format!("'{}' = {}", escaped, item.value)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn malformed(ast: &TypeAst, reason: &str) -> Error {
    Error::MalformedType {
        fragment: ast.name.clone(),
        reason: reason.to_string(),
    }
}

fn single(ast: &TypeAst) -> Result<&TypeAst> {
    match ast.elements.as_slice() {
        [only] => Ok(only),
        _ => Err(malformed(ast, "expected exactly one type argument")),
    }
}

fn number_arg(ast: &TypeAst, index: usize, what: &str) -> Result<usize> {
    let element = ast
        .elements
        .get(index)
        .filter(|e| e.meta == TypeMeta::Number)
        .ok_or_else(|| malformed(ast, &format!("missing {}", what)))?;
    usize::try_from(element.value)
        .map_err(|_| malformed(ast, &format!("negative {}", what)))
}

fn string_arg(ast: &TypeAst, index: usize) -> Option<String> {
    ast.elements
        .get(index)
        .filter(|e| e.meta == TypeMeta::String)
        .map(|e| e.value_string.clone())
}

fn decimal_type(ast: &TypeAst, precision: usize, scale: usize) -> Result<Type> {
    if precision == 0 || precision > 38 {
        return Err(malformed(
            ast,
            &format!("decimal precision {} is outside 1..=38", precision),
        ));
    }
    if scale > precision {
        return Err(malformed(
            ast,
            &format!("decimal scale {} exceeds precision {}", scale, precision),
        ));
    }
    Ok(Type::Decimal { precision, scale })
}

fn terminal_from_ast(ast: &TypeAst) -> Result<Type> {
    match ast.name.as_str() {
        "FixedString" => {
            Ok(Type::FixedString { size: number_arg(ast, 0, "string size")? })
        }
        "DateTime" => Ok(Type::DateTime { timezone: string_arg(ast, 0) }),
        "DateTime64" => {
            let precision = number_arg(ast, 0, "precision")?;
            if precision > 9 {
                return Err(malformed(
                    ast,
                    &format!("DateTime64 precision {} is above 9", precision),
                ));
            }
            Ok(Type::DateTime64 { precision, timezone: string_arg(ast, 1) })
        }
        "Decimal" => decimal_type(
            ast,
            number_arg(ast, 0, "precision")?,
            number_arg(ast, 1, "scale")?,
        ),
        "Decimal32" => decimal_type(ast, 9, number_arg(ast, 0, "scale")?),
        "Decimal64" => decimal_type(ast, 18, number_arg(ast, 0, "scale")?),
        "Decimal128" => decimal_type(ast, 38, number_arg(ast, 0, "scale")?),
        "Decimal256" => Err(Error::NotImplemented(
            "Decimal256 columns are not supported".to_string(),
        )),
        _ if ast.code == TypeCode::Void => Err(malformed(ast, "unknown type")),
        _ => Ok(Type::Simple(ast.code)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_names() {
        assert_eq!(Type::int32().name(), "Int32");
        assert_eq!(Type::uuid().name(), "UUID");
        assert_eq!(Type::fixed_string(16).name(), "FixedString(16)");
    }

    #[test]
    fn test_parse_roundtrip_names() {
        for name in [
            "Array(Nullable(Int32))",
            "LowCardinality(Nullable(String))",
            "Map(String, Array(UInt64))",
            "Tuple(String, Int64)",
            "Tuple(a String, b Int64)",
            "Nested(id UInt32, tags Array(String))",
            "Variant(String, UInt64)",
            "DateTime('UTC')",
            "DateTime64(3, 'Europe/Moscow')",
            "Decimal(9, 2)",
            "Enum8('a' = 1, 'b' = 2)",
            "Enum16('it\\'s' = -5)",
        ] {
            let parsed = Type::parse(name).unwrap();
            let reparsed = Type::parse(&parsed.name()).unwrap();
            assert_eq!(parsed, reparsed, "unstable rendering for {}", name);
        }
    }

    #[test]
    fn test_parse_decimal_aliases() {
        assert_eq!(Type::parse("Decimal32(4)").unwrap(), Type::decimal(9, 4));
        assert_eq!(Type::parse("Decimal64(2)").unwrap(), Type::decimal(18, 2));
        assert_eq!(
            Type::parse("Decimal128(10)").unwrap(),
            Type::decimal(38, 10)
        );
        assert!(matches!(
            Type::parse("Decimal(5, 7)"),
            Err(Error::MalformedType { .. })
        ));
    }

    #[test]
    fn test_parse_bool_and_aggregate() {
        assert_eq!(Type::parse("Bool").unwrap(), Type::uint8());
        assert_eq!(
            Type::parse("SimpleAggregateFunction(sum, UInt64)").unwrap(),
            Type::uint64()
        );
    }

    #[test]
    fn test_parse_unknown() {
        assert!(Type::parse("NotAType").is_err());
        assert!(Type::parse("Map(String)").is_err());
        assert!(Type::parse("Array(String").is_err());
    }

    #[test]
    fn test_storage_size() {
        assert_eq!(Type::uint64().storage_size_bytes(), Some(8));
        assert_eq!(Type::decimal(12, 2).storage_size_bytes(), Some(8));
        assert_eq!(Type::string().storage_size_bytes(), None);
    }
}
