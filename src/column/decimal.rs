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
    io::{
        ByteRead,
        ByteWrite,
    },
    types::Type,
    Error,
    Result,
};

/// Storage for decimal values, sized by precision.
#[derive(Debug, Clone)]
enum DecimalStorage {
    I32(ColumnVector<i32>),
    I64(ColumnVector<i64>),
    I128(ColumnVector<i128>),
}

impl DecimalStorage {
    fn for_precision(precision: usize) -> Self {
        if precision <= 9 {
            DecimalStorage::I32(ColumnVector::new())
        } else if precision <= 18 {
            DecimalStorage::I64(ColumnVector::new())
        } else {
            DecimalStorage::I128(ColumnVector::new())
        }
    }

    fn column(&self) -> &dyn Column {
        match self {
            DecimalStorage::I32(c) => c,
            DecimalStorage::I64(c) => c,
            DecimalStorage::I128(c) => c,
        }
    }

    fn column_mut(&mut self) -> &mut dyn Column {
        match self {
            DecimalStorage::I32(c) => c,
            DecimalStorage::I64(c) => c,
            DecimalStorage::I128(c) => c,
        }
    }

    fn get(&self, index: usize) -> Option<i128> {
        match self {
            DecimalStorage::I32(c) => c.get(index).map(i128::from),
            DecimalStorage::I64(c) => c.get(index).map(i128::from),
            DecimalStorage::I128(c) => c.get(index),
        }
    }

    /// Push an unscaled value; fails if it does not fit the storage width.
    fn push(&mut self, value: i128) -> Option<()> {
        match self {
            DecimalStorage::I32(c) => c.append(i32::try_from(value).ok()?),
            DecimalStorage::I64(c) => c.append(i64::try_from(value).ok()?),
            DecimalStorage::I128(c) => c.append(value),
        }
        Some(())
    }
}

/// Column for Decimal types with precision and scale
/// Stores values as integers (scaled by 10^scale)
///
/// Uses efficient internal representation based on precision:
/// - precision <= 9: ColumnInt32 (4 bytes per value)
/// - precision <= 18: ColumnInt64 (8 bytes per value)
/// - precision > 18: ColumnInt128 (16 bytes per value)
#[derive(Debug, Clone)]
pub struct ColumnDecimal {
    type_: Type,
    precision: usize,
    scale: usize,
    data: DecimalStorage,
}

impl ColumnDecimal {
    pub fn new(precision: usize, scale: usize) -> Self {
        Self {
            type_: Type::decimal(precision, scale),
            precision,
            scale,
            data: DecimalStorage::for_precision(precision),
        }
    }

    /// Append a raw unscaled value.
    pub fn append(&mut self, value: i128) -> Result<()> {
        self.data.push(value).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Unscaled value {} does not fit {}",
                value, self.type_
            ))
        })
    }

    /// Append a decimal value parsed from a string like `"123.45"`.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid decimal or the
    /// fractional part exceeds the column's scale.
    pub fn append_from_string(&mut self, s: &str) -> Result<()> {
        let value = parse_decimal(s, self.scale)?;
        self.append(value)
    }

    /// Append a value given at another scale, rescaling it to ours.
    /// Dropping non-zero digits is an error.
    pub fn append_scaled(&mut self, value: i128, scale: usize) -> Result<()> {
        let rescaled = rescale(value, scale, self.scale).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "{} cannot be represented in {} without loss",
                format_decimal(value, scale),
                self.type_
            ))
        })?;
        self.append(rescaled)
    }

    /// Raw unscaled value at `index`.
    pub fn at(&self, index: usize) -> Option<i128> {
        self.data.get(index)
    }

    /// Format decimal at index as string
    pub fn as_string(&self, index: usize) -> Option<String> {
        self.at(index).map(|v| format_decimal(v, self.scale))
    }

    pub fn precision(&self) -> usize {
        self.precision
    }

    pub fn scale(&self) -> usize {
        self.scale
    }

    pub fn len(&self) -> usize {
        self.data.column().size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Column for ColumnDecimal {
    fn column_type(&self) -> &Type {
        &self.type_
    }

    fn size(&self) -> usize {
        self.data.column().size()
    }

    fn clear(&mut self) {
        self.data.column_mut().clear();
    }

    fn reserve(&mut self, additional: usize) {
        self.data.column_mut().reserve(additional);
    }

    fn truncate(&mut self, len: usize) {
        self.data.column_mut().truncate(len);
    }

    fn append_column(&mut self, other: &dyn Column) -> Result<()> {
        let other = downcast_other::<ColumnDecimal>(&self.type_, other)?;
        if self.precision != other.precision || self.scale != other.scale {
            return Err(Error::TypeMismatch {
                expected: self.type_.name(),
                actual: other.type_.name(),
            });
        }
        self.data.column_mut().append_column(other.data.column())
    }

    fn append_value(&mut self, value: &Value) -> Result<()> {
        match value {
            Value::Decimal { value, scale } => {
                self.append_scaled(*value, *scale)
            }
            Value::String(s) => self.append_from_string(s),
            other => match other.as_i128() {
                Some(v) => self.append_scaled(v, 0),
                None => Err(rejected(value, &self.type_)),
            },
        }
    }

    fn append_default(&mut self) {
        self.data.column_mut().append_default();
    }

    fn can_accept(&self, value: &Value) -> bool {
        matches!(value, Value::Decimal { .. })
    }

    fn value(&self, index: usize) -> Result<Value> {
        self.at(index)
            .map(|value| Value::Decimal { value, scale: self.scale })
            .ok_or_else(|| out_of_range(index, self.size()))
    }

    fn load_body(
        &mut self,
        reader: &mut dyn ByteRead,
        rows: usize,
    ) -> Result<()> {
        self.data.column_mut().load_body(reader, rows)
    }

    fn save_body(&self, writer: &mut dyn ByteWrite) -> Result<()> {
        self.data.column().save_body(writer)
    }

    fn clone_empty(&self) -> ColumnBox {
        Box::new(ColumnDecimal::new(self.precision, self.scale))
    }

    fn slice(&self, begin: usize, len: usize) -> Result<ColumnBox> {
        check_slice(begin, len, self.size())?;
        let mut result = ColumnDecimal::new(self.precision, self.scale);
        for index in begin..begin + len {
            if let Some(v) = self.at(index) {
                result.data.push(v);
            }
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

fn rescale(value: i128, from: usize, to: usize) -> Option<i128> {
    if from <= to {
        let factor = 10i128.checked_pow((to - from) as u32)?;
        value.checked_mul(factor)
    } else {
        let factor = 10i128.checked_pow((from - to) as u32)?;
        if value % factor != 0 {
            return None;
        }
        Some(value / factor)
    }
}

/// Parse decimal string to scaled integer
/// "123.45" with scale 2 -> 12345
pub(crate) fn parse_decimal(s: &str, scale: usize) -> Result<i128> {
    let invalid =
        || Error::InvalidArgument(format!("Invalid decimal: '{}'", s));

    let trimmed = s.trim();
    let (negative, digits) = if let Some(stripped) = trimmed.strip_prefix('-') {
        (true, stripped)
    } else if let Some(stripped) = trimmed.strip_prefix('+') {
        (false, stripped)
    } else {
        (false, trimmed)
    };

    let (integer, fraction) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if integer.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !integer.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    if fraction.len() > scale {
        return Err(Error::InvalidArgument(format!(
            "Decimal '{}' has more than {} fractional digits",
            s, scale
        )));
    }

    let mut value: i128 = 0;
    let padding = std::iter::repeat('0').take(scale - fraction.len());
    for c in integer.chars().chain(fraction.chars()).chain(padding) {
        let digit = c.to_digit(10).ok_or_else(invalid)? as i128;
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(digit))
            .ok_or_else(invalid)?;
    }

    Ok(if negative { -value } else { value })
}

/// Format scaled integer to decimal string
/// 12345 with scale 2 -> "123.45"
pub(crate) fn format_decimal(value: i128, scale: usize) -> String {
    let sign = if value < 0 { "-" } else { "" };
    let digits = value.unsigned_abs().to_string();
    if scale == 0 {
        return format!("{}{}", sign, digits);
    }

    let padded = format!("{:0>width$}", digits, width = scale + 1);
    let (integer, fraction) = padded.split_at(padded.len() - scale);
    format!("{}{}.{}", sign, integer, fraction)
}
