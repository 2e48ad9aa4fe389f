// Lengths and counts taken from corrupt input must fail as read errors
// without committing memory for the claimed size.

mod common;

use clickhouse_columns::{
    column::{
        create_column,
        Column,
    },
    io::{
        ByteWrite,
        SliceReader,
    },
    BlockReader,
    CodecOptions,
    Error,
    ErrorClass,
    Type,
};
use common::decode_as;

const HAS_ADDITIONAL_KEYS: u64 = 1 << 9;

fn empty(type_str: &str) -> Box<dyn Column> {
    create_column(&Type::parse(type_str).unwrap()).unwrap()
}

#[test]
fn test_array_element_count_overflows_payload() {
    let column = empty("Array(UInt64)");
    let bytes = (1u64 << 61).to_le_bytes();

    let err = decode_as(column.as_ref(), &bytes, 1).unwrap_err();
    assert!(matches!(err.root(), Error::Protocol(_)), "{}", err);
    assert_eq!(err.steps(), vec!["read array elements"]);
}

#[test]
fn test_array_of_strings_with_huge_offset() {
    let column = empty("Array(String)");
    let bytes = (1u64 << 60).to_le_bytes();

    let err = decode_as(column.as_ref(), &bytes, 1).unwrap_err();
    assert_eq!(err.class(), ErrorClass::Io);
    assert!(matches!(err.root(), Error::UnexpectedEof { available: 0, .. }));
}

#[test]
fn test_dictionary_size_beyond_input() {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&1u64.to_le_bytes());
    bytes.extend_from_slice(&HAS_ADDITIONAL_KEYS.to_le_bytes());
    bytes.extend_from_slice(&(1u64 << 60).to_le_bytes());

    let column = empty("LowCardinality(String)");
    let err = decode_as(column.as_ref(), &bytes, 1).unwrap_err();
    assert_eq!(err.steps(), vec!["read dictionary"]);
    assert_eq!(err.class(), ErrorClass::Io);
}

#[test]
fn test_fixed_string_payload_overflow() {
    let mut column = empty("FixedString(16)");
    let err = column
        .load_body(&mut SliceReader::new(&[0u8; 16]), usize::MAX / 4)
        .unwrap_err();
    assert!(matches!(err, Error::Protocol(_)), "{}", err);
    assert_eq!(column.size(), 0);
}

#[test]
fn test_null_map_longer_than_input() {
    let mut column = empty("Nullable(UInt8)");
    let err = column
        .load_body(&mut SliceReader::new(&[0u8, 1, 0]), 1 << 40)
        .unwrap_err();
    assert_eq!(err.steps(), vec!["read null map"]);
    assert_eq!(err.class(), ErrorClass::Io);
    assert_eq!(column.size(), 0);
}

#[test]
fn test_block_with_huge_column_count() {
    let mut bytes = Vec::new();
    // block info: field 1, is_overflows, field 2, bucket_num, end marker
    bytes.write_bytes(&[1, 0, 2, 0, 0, 0, 0, 0]).unwrap();
    bytes.write_varint(1 << 60).unwrap();
    bytes.write_varint(1).unwrap();

    let err = BlockReader::new(CodecOptions::default())
        .read_block(&mut SliceReader::new(&bytes))
        .unwrap_err();
    assert_eq!(err.class(), ErrorClass::Io);
    assert_eq!(err.steps(), vec!["read column name"]);
}
