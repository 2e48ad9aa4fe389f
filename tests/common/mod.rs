// Shared helpers for the integration tests.

#![allow(dead_code)]

use clickhouse_columns::{
    column::{
        create_column,
        Column,
        ColumnBox,
        Value,
    },
    io::SliceReader,
    Result,
};

/// Prefix and body bytes of `column`, in wire order.
pub fn encode(column: &dyn Column) -> Vec<u8> {
    let mut buf = Vec::new();
    column.save_prefix(&mut buf).unwrap();
    column.save_body(&mut buf).unwrap();
    buf
}

/// Decode `rows` rows of `column`'s type from `bytes`.
pub fn decode_as(
    column: &dyn Column,
    bytes: &[u8],
    rows: usize,
) -> Result<ColumnBox> {
    let mut decoded = create_column(column.column_type())?;
    let mut reader = SliceReader::new(bytes);
    decoded.load_prefix(&mut reader, rows)?;
    decoded.load_body(&mut reader, rows)?;
    let left = reader.remaining().len();
    assert!(reader.is_empty(), "{} bytes left after decode", left);
    Ok(decoded)
}

/// Encode `column`, decode the bytes into a fresh column of the same type.
pub fn roundtrip(column: &dyn Column) -> ColumnBox {
    decode_as(column, &encode(column), column.size()).unwrap()
}

pub fn values(column: &dyn Column) -> Vec<Value> {
    (0..column.size()).map(|i| column.value(i).unwrap()).collect()
}

/// Build a column of `type_str` holding `rows`.
pub fn column_of(type_str: &str, rows: &[Value]) -> ColumnBox {
    let type_ = clickhouse_columns::Type::parse(type_str).unwrap();
    let mut column = create_column(&type_).unwrap();
    for row in rows {
        column.append_value(row).unwrap();
    }
    column
}
