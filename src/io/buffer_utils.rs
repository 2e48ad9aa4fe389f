//! Length-prefixed string helpers used for column headers.
//!
//! Column payload strings go through `ColumnString`; these helpers are for
//! the protocol-level strings around them (column name, type name).

use super::cursor::{
    ByteRead,
    ByteWrite,
};
use crate::{
    Error,
    Result,
};

/// Read a varint length followed by that many UTF-8 bytes.
///
/// `limit` bounds the accepted length so that a corrupt prefix cannot trigger
/// a huge allocation.
pub fn read_string(reader: &mut dyn ByteRead, limit: usize) -> Result<String> {
    let len = reader.read_varint()? as usize;

    if len > limit {
        return Err(Error::Protocol(format!(
            "String length too large: {} (limit {})",
            len, limit
        )));
    }

    let bytes = reader.read_bytes(len)?;
    String::from_utf8(bytes)
        .map_err(|e| Error::Protocol(format!("Invalid UTF-8 in string: {}", e)))
}

/// Write a varint length followed by the string bytes.
pub fn write_string(writer: &mut dyn ByteWrite, s: &str) -> Result<()> {
    writer.write_varint(s.len() as u64)?;
    writer.write_bytes(s.as_bytes())
}

/// Write a varint to a raw Vec<u8> (convenience for tests)
pub fn write_varint_to_vec(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}
