//! Date and time columns
//!
//! | Type | Storage | Unit |
//! |------|---------|------|
//! | `Date` | UInt16 | days since 1970-01-01 |
//! | `Date32` | Int32 | days since 1970-01-01 |
//! | `DateTime([tz])` | UInt32 | seconds since epoch |
//! | `DateTime64(p, [tz])` | Int64 | `10^-p` seconds since epoch |
//!
//! The timezone is display metadata only; stored values are always UTC.

use super::{
    check_slice,
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
use chrono::{
    DateTime,
    Duration,
    NaiveDate,
    Utc,
};

const SECONDS_PER_DAY: i64 = 86400;

fn epoch() -> Result<NaiveDate> {
    NaiveDate::from_ymd_opt(1970, 1, 1).ok_or_else(|| {
        Error::Validation("epoch date is not representable".to_string())
    })
}

fn days_to_date(days: i64) -> Result<NaiveDate> {
    epoch()?
        .checked_add_signed(Duration::days(days))
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Day number {} is out of range",
                days
            ))
        })
}

fn date_to_days(date: NaiveDate) -> Result<i64> {
    Ok(date.signed_duration_since(epoch()?).num_days())
}

fn seconds_to_datetime(seconds: i64, nanos: u32) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(seconds, nanos).ok_or_else(|| {
        Error::InvalidArgument(format!("Timestamp {} is out of range", seconds))
    })
}

/// Shared `Column` implementation over the raw storage vector. Each column
/// provides `raw_value`, `raw_from_value`, `accepts` and `adopt_type`.
macro_rules! impl_date_column {
    ($name:ident, $raw:ty) => {
        impl $name {
            /// Append a raw stored value.
            pub fn append(&mut self, raw: $raw) {
                self.data.append(raw);
            }

            /// Raw stored value at `index` (panics if out of bounds)
            pub fn at(&self, index: usize) -> $raw {
                self.data.at(index)
            }

            pub fn data(&self) -> &[$raw] {
                self.data.data()
            }

            pub fn len(&self) -> usize {
                self.data.len()
            }

            pub fn is_empty(&self) -> bool {
                self.data.is_empty()
            }
        }

        impl Column for $name {
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
                let other = super::downcast_other::<$name>(&self.type_, other)?;
                self.data.append_column(&other.data)
            }

            fn append_value(&mut self, value: &Value) -> Result<()> {
                let raw = self
                    .raw_from_value(value)
                    .ok_or_else(|| rejected(value, &self.type_))?;
                self.data.append(raw);
                Ok(())
            }

            fn append_default(&mut self) {
                self.data.append(<$raw>::default());
            }

            fn can_accept(&self, value: &Value) -> bool {
                Self::accepts(value)
            }

            fn value(&self, index: usize) -> Result<Value> {
                let raw = self
                    .data
                    .get(index)
                    .ok_or_else(|| out_of_range(index, self.data.len()))?;
                self.raw_value(raw)
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

            fn check_type(&mut self, wire_type: &Type) -> Result<()> {
                self.adopt_type(wire_type)
            }

            fn clone_empty(&self) -> ColumnBox {
                let mut empty = self.clone();
                empty.data.clear();
                Box::new(empty)
            }

            fn slice(&self, begin: usize, len: usize) -> Result<ColumnBox> {
                check_slice(begin, len, self.data.len())?;
                let mut sliced = self.clone();
                sliced.data = ColumnVector::from_vec(
                    self.data.data()[begin..begin + len].to_vec(),
                );
                Ok(Box::new(sliced))
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }
    };
}

/// Column for Date type (stored as UInt16 - days since Unix epoch 1970-01-01)
/// Range: 1970-01-01 to 2149-06-06
#[derive(Debug, Clone)]
pub struct ColumnDate {
    type_: Type,
    data: ColumnVector<u16>,
}

impl ColumnDate {
    pub fn new() -> Self {
        Self { type_: Type::date(), data: ColumnVector::new() }
    }

    /// Append a calendar date; dates outside the UInt16 day range are
    /// rejected.
    pub fn append_date(&mut self, date: NaiveDate) -> Result<()> {
        let days = u16::try_from(date_to_days(date)?).map_err(|_| {
            Error::InvalidArgument(format!(
                "Date {} is out of range for Date",
                date
            ))
        })?;
        self.data.append(days);
        Ok(())
    }

    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        self.data.get(index).and_then(|d| days_to_date(d as i64).ok())
    }

    /// Get Unix timestamp (seconds) at index
    pub fn timestamp_at(&self, index: usize) -> Option<i64> {
        self.data.get(index).map(|d| d as i64 * SECONDS_PER_DAY)
    }

    fn raw_value(&self, raw: u16) -> Result<Value> {
        Ok(Value::Date(days_to_date(raw as i64)?))
    }

    fn raw_from_value(&self, value: &Value) -> Option<u16> {
        match value {
            Value::Date(d) | Value::Date32(d) => {
                date_to_days(*d).ok().and_then(|days| u16::try_from(days).ok())
            }
            other => other.as_i128().and_then(|v| u16::try_from(v).ok()),
        }
    }

    fn accepts(value: &Value) -> bool {
        matches!(value, Value::Date(_))
    }

    fn adopt_type(&mut self, wire_type: &Type) -> Result<()> {
        if wire_type == &self.type_ {
            Ok(())
        } else {
            Err(super::incompatible(wire_type, &self.type_))
        }
    }
}

impl Default for ColumnDate {
    fn default() -> Self {
        Self::new()
    }
}

impl_date_column!(ColumnDate, u16);

/// Column for Date32 type (stored as Int32 - days since Unix epoch 1970-01-01)
/// Extended range: 1900-01-01 to 2299-12-31
#[derive(Debug, Clone)]
pub struct ColumnDate32 {
    type_: Type,
    data: ColumnVector<i32>,
}

impl ColumnDate32 {
    pub fn new() -> Self {
        Self { type_: Type::date32(), data: ColumnVector::new() }
    }

    pub fn append_date(&mut self, date: NaiveDate) -> Result<()> {
        let days = i32::try_from(date_to_days(date)?).map_err(|_| {
            Error::InvalidArgument(format!(
                "Date {} is out of range for Date32",
                date
            ))
        })?;
        self.data.append(days);
        Ok(())
    }

    pub fn date_at(&self, index: usize) -> Option<NaiveDate> {
        self.data.get(index).and_then(|d| days_to_date(d as i64).ok())
    }

    fn raw_value(&self, raw: i32) -> Result<Value> {
        Ok(Value::Date32(days_to_date(raw as i64)?))
    }

    fn raw_from_value(&self, value: &Value) -> Option<i32> {
        match value {
            Value::Date(d) | Value::Date32(d) => {
                date_to_days(*d).ok().and_then(|days| i32::try_from(days).ok())
            }
            other => other.as_i128().and_then(|v| i32::try_from(v).ok()),
        }
    }

    fn accepts(value: &Value) -> bool {
        matches!(value, Value::Date32(_))
    }

    fn adopt_type(&mut self, wire_type: &Type) -> Result<()> {
        if wire_type == &self.type_ {
            Ok(())
        } else {
            Err(super::incompatible(wire_type, &self.type_))
        }
    }
}

impl Default for ColumnDate32 {
    fn default() -> Self {
        Self::new()
    }
}

impl_date_column!(ColumnDate32, i32);

/// Column for DateTime type (stored as UInt32 - Unix timestamp)
#[derive(Debug, Clone)]
pub struct ColumnDateTime {
    type_: Type,
    data: ColumnVector<u32>,
    timezone: Option<String>,
}

impl ColumnDateTime {
    pub fn new(timezone: Option<String>) -> Self {
        Self {
            type_: Type::datetime(timezone.clone()),
            data: ColumnVector::new(),
            timezone,
        }
    }

    pub fn timezone(&self) -> Option<&str> {
        self.timezone.as_deref()
    }

    pub fn append_datetime(&mut self, time: DateTime<Utc>) -> Result<()> {
        let seconds = u32::try_from(time.timestamp()).map_err(|_| {
            Error::InvalidArgument(format!(
                "{} is out of range for DateTime",
                time
            ))
        })?;
        self.data.append(seconds);
        Ok(())
    }

    pub fn datetime_at(&self, index: usize) -> Option<DateTime<Utc>> {
        self.data.get(index).and_then(|s| seconds_to_datetime(s as i64, 0).ok())
    }

    fn raw_value(&self, raw: u32) -> Result<Value> {
        Ok(Value::DateTime(seconds_to_datetime(raw as i64, 0)?))
    }

    fn raw_from_value(&self, value: &Value) -> Option<u32> {
        match value {
            Value::DateTime(t) | Value::DateTime64(t) => {
                u32::try_from(t.timestamp()).ok()
            }
            other => other.as_i128().and_then(|v| u32::try_from(v).ok()),
        }
    }

    fn accepts(value: &Value) -> bool {
        matches!(value, Value::DateTime(_))
    }

    /// Any `DateTime` header is accepted; its timezone replaces ours.
    fn adopt_type(&mut self, wire_type: &Type) -> Result<()> {
        match wire_type {
            Type::DateTime { timezone } => {
                self.timezone = timezone.clone();
                self.type_ = wire_type.clone();
                Ok(())
            }
            _ => Err(super::incompatible(wire_type, &self.type_)),
        }
    }
}

impl_date_column!(ColumnDateTime, u32);

/// Column for DateTime64 type (stored as Int64 ticks of `10^-precision`
/// seconds)
#[derive(Debug, Clone)]
pub struct ColumnDateTime64 {
    type_: Type,
    data: ColumnVector<i64>,
    precision: usize,
    timezone: Option<String>,
}

impl ColumnDateTime64 {
    pub fn new(precision: usize, timezone: Option<String>) -> Self {
        Self {
            type_: Type::datetime64(precision, timezone.clone()),
            data: ColumnVector::new(),
            precision,
            timezone,
        }
    }

    pub fn precision(&self) -> usize {
        self.precision
    }

    pub fn timezone(&self) -> Option<&str> {
        self.timezone.as_deref()
    }

    fn ticks_per_second(&self) -> i64 {
        10i64.pow(self.precision.min(9) as u32)
    }

    pub fn append_datetime(&mut self, time: DateTime<Utc>) -> Result<()> {
        let ticks = self.ticks_from(time).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "{} is out of range for {}",
                time, self.type_
            ))
        })?;
        self.data.append(ticks);
        Ok(())
    }

    pub fn datetime_at(&self, index: usize) -> Option<DateTime<Utc>> {
        self.data.get(index).and_then(|t| self.ticks_to(t).ok())
    }

    fn ticks_from(&self, time: DateTime<Utc>) -> Option<i64> {
        let per_second = self.ticks_per_second();
        let nanos_per_tick = 1_000_000_000 / per_second;
        let sub = time.timestamp_subsec_nanos() as i64 / nanos_per_tick;
        time.timestamp().checked_mul(per_second)?.checked_add(sub)
    }

    fn ticks_to(&self, ticks: i64) -> Result<DateTime<Utc>> {
        let per_second = self.ticks_per_second();
        let seconds = ticks.div_euclid(per_second);
        let nanos = ticks.rem_euclid(per_second) * (1_000_000_000 / per_second);
        seconds_to_datetime(seconds, nanos as u32)
    }

    fn raw_value(&self, raw: i64) -> Result<Value> {
        Ok(Value::DateTime64(self.ticks_to(raw)?))
    }

    fn raw_from_value(&self, value: &Value) -> Option<i64> {
        match value {
            Value::DateTime(t) | Value::DateTime64(t) => self.ticks_from(*t),
            other => other.as_i128().and_then(|v| i64::try_from(v).ok()),
        }
    }

    fn accepts(value: &Value) -> bool {
        matches!(value, Value::DateTime64(_))
    }

    /// The precision must match; the header's timezone replaces ours.
    fn adopt_type(&mut self, wire_type: &Type) -> Result<()> {
        match wire_type {
            Type::DateTime64 { precision, timezone }
                if *precision == self.precision =>
            {
                self.timezone = timezone.clone();
                self.type_ = wire_type.clone();
                Ok(())
            }
            _ => Err(super::incompatible(wire_type, &self.type_)),
        }
    }
}

impl_date_column!(ColumnDateTime64, i64);
