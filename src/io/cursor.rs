//! Byte cursors used by the column codec.
//!
//! Columns never see a socket or a file. They read through [`ByteRead`] and
//! write through [`ByteWrite`], both object safe so that decorator columns
//! can hand the same cursor down to the columns they wrap. All multi-byte
//! integers on the wire are little-endian.

use crate::{
    Error,
    Result,
};
use bytes::{
    Buf,
    BufMut,
    BytesMut,
};
use std::io::{
    Read,
    Write,
};

/// Upper bound on what one length or count read from the wire may allocate
/// up front. Larger payloads grow chunk by chunk as their bytes arrive.
pub(crate) const READ_CHUNK: usize = 64 * 1024;

const MAX_VARINT_LEN: usize = 10;

/// Append `len` bytes from `reader` to `buf`, one chunk at a time, so that
/// a corrupt length fails on EOF instead of allocating the claimed size.
/// `buf` is restored to its old length on failure.
pub(crate) fn read_into<R: ByteRead + ?Sized>(
    reader: &mut R,
    buf: &mut Vec<u8>,
    len: usize,
) -> Result<()> {
    let start = buf.len();
    let mut remaining = len;
    while remaining > 0 {
        let chunk = remaining.min(READ_CHUNK);
        let at = buf.len();
        buf.resize(at + chunk, 0);
        if let Err(e) = reader.read_exact_into(&mut buf[at..]) {
            buf.truncate(start);
            return Err(e);
        }
        remaining -= chunk;
    }
    Ok(())
}

/// Byte length of `rows` records of `width` bytes each.
pub(crate) fn payload_len(rows: usize, width: usize) -> Result<usize> {
    rows.checked_mul(width).ok_or_else(|| {
        Error::Protocol(format!(
            "{} rows of {} bytes overflow the payload length",
            rows, width
        ))
    })
}

/// Sequential reader over the native wire format.
pub trait ByteRead {
    /// Fill `buf` completely or fail.
    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()>;

    /// Number of bytes consumed so far.
    fn position(&self) -> u64;

    fn read_u8(&mut self) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_exact_into(&mut byte)?;
        Ok(byte[0])
    }

    fn read_u64_le(&mut self) -> Result<u64> {
        let mut bytes = [0u8; 8];
        self.read_exact_into(&mut bytes)?;
        Ok(u64::from_le_bytes(bytes))
    }

    /// Read a base-128 varint (low 7 bits first, high bit = continuation).
    ///
    /// At most ten bytes; the tenth may only carry bit 63.
    fn read_varint(&mut self) -> Result<u64> {
        let mut result: u64 = 0;

        for i in 0..MAX_VARINT_LEN {
            let byte = self.read_u8()?;
            if i == MAX_VARINT_LEN - 1 && byte > 1 {
                break;
            }
            result |= ((byte & 0x7F) as u64) << (7 * i);

            if byte & 0x80 == 0 {
                return Ok(result);
            }
        }

        Err(Error::Protocol("Varint overflow".to_string()))
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(len.min(READ_CHUNK));
        read_into(self, &mut buf, len)?;
        Ok(buf)
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        let mut remaining = len;
        let mut buf = [0u8; 4096];
        while remaining > 0 {
            let chunk = remaining.min(buf.len());
            self.read_exact_into(&mut buf[..chunk])?;
            remaining -= chunk;
        }
        Ok(())
    }
}

/// Sequential writer for the native wire format.
pub trait ByteWrite {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()>;

    fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    fn write_u64_le(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_varint(&mut self, mut value: u64) -> Result<()> {
        let mut buf = [0u8; 10];
        let mut len = 0;
        loop {
            let mut byte = (value & 0x7F) as u8;
            value >>= 7;
            if value != 0 {
                byte |= 0x80;
            }
            buf[len] = byte;
            len += 1;
            if value == 0 {
                break;
            }
        }
        self.write_bytes(&buf[..len])
    }
}

/// Reader over an in-memory byte slice.
#[derive(Debug, Clone)]
pub struct SliceReader<'a> {
    data: &'a [u8],
    position: u64,
}

impl<'a> SliceReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> &'a [u8] {
        self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl ByteRead for SliceReader<'_> {
    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()> {
        if self.data.len() < buf.len() {
            return Err(Error::UnexpectedEof {
                position: self.position,
                needed: buf.len(),
                available: self.data.len(),
            });
        }
        self.data.copy_to_slice(buf);
        self.position += buf.len() as u64;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn skip(&mut self, len: usize) -> Result<()> {
        if self.data.len() < len {
            return Err(Error::UnexpectedEof {
                position: self.position,
                needed: len,
                available: self.data.len(),
            });
        }
        self.data.advance(len);
        self.position += len as u64;
        Ok(())
    }
}

/// Blocking reader over any [`std::io::Read`].
pub struct IoReader<R> {
    inner: R,
    position: u64,
}

impl<R: Read> IoReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner, position: 0 }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> ByteRead for IoReader<R> {
    fn read_exact_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => {
                    return Err(Error::UnexpectedEof {
                        position: self.position + filled as u64,
                        needed: buf.len(),
                        available: filled,
                    });
                }
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        self.position += buf.len() as u64;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.position
    }
}

/// Blocking writer over any [`std::io::Write`].
pub struct IoWriter<W> {
    inner: W,
}

impl<W: Write> IoWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> ByteWrite for IoWriter<W> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        Ok(())
    }
}

impl ByteWrite for BytesMut {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.put_slice(bytes);
        Ok(())
    }
}

impl ByteWrite for Vec<u8> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.extend_from_slice(bytes);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_varint_roundtrip() {
        for value in [
            0u64,
            1,
            127,
            128,
            255,
            300,
            16384,
            u32::MAX as u64,
            u64::MAX,
        ] {
            let mut buf = BytesMut::new();
            buf.write_varint(value).unwrap();

            let mut reader = SliceReader::new(&buf);
            assert_eq!(reader.read_varint().unwrap(), value);
            assert!(reader.is_empty());
        }
    }

    #[test]
    fn test_varint_overflow() {
        let data = [0xFFu8; 11];
        let mut reader = SliceReader::new(&data);
        assert!(reader.read_varint().is_err());
    }

    #[test]
    fn test_varint_tenth_byte_carries_one_bit() {
        let mut data = vec![0xFFu8; 9];
        data.push(0x01);
        assert_eq!(SliceReader::new(&data).read_varint().unwrap(), u64::MAX);

        // 0x7F << 63 would drop six bits
        data[9] = 0x7F;
        match SliceReader::new(&data).read_varint() {
            Err(Error::Protocol(msg)) => assert_eq!(msg, "Varint overflow"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_read_bytes_fails_on_eof_for_huge_length() {
        let data = [7u8; 10];
        let mut reader = SliceReader::new(&data);
        let err = reader.read_bytes(usize::MAX / 2).unwrap_err();
        assert!(matches!(
            err,
            Error::UnexpectedEof { needed, available: 10, .. }
                if needed == READ_CHUNK
        ));
    }

    #[test]
    fn test_read_into_restores_buffer() {
        let data = [1u8, 2, 3];
        let mut buf = vec![9u8];
        let mut reader = SliceReader::new(&data);
        read_into(&mut reader, &mut buf, 2).unwrap();
        assert_eq!(buf, [9, 1, 2]);
        assert!(read_into(&mut reader, &mut buf, 4).is_err());
        assert_eq!(buf, [9, 1, 2]);
    }

    #[test]
    fn test_payload_len_overflow() {
        assert_eq!(payload_len(3, 8).unwrap(), 24);
        assert!(matches!(payload_len(1 << 61, 8), Err(Error::Protocol(_))));
    }

    #[test]
    fn test_short_read_reports_position() {
        let data = [1u8, 2, 3, 4, 5];
        let mut reader = SliceReader::new(&data);
        reader.skip(2).unwrap();

        let err = reader.read_u64_le().unwrap_err();
        match err {
            Error::UnexpectedEof { position, needed, available } => {
                assert_eq!(position, 2);
                assert_eq!(needed, 8);
                assert_eq!(available, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_io_reader_and_writer() {
        let mut sink = IoWriter::new(Vec::new());
        sink.write_u64_le(0xDEAD_BEEF).unwrap();
        sink.write_varint(1000).unwrap();
        sink.flush().unwrap();
        let bytes = sink.into_inner();

        let mut reader = IoReader::new(std::io::Cursor::new(bytes));
        assert_eq!(reader.read_u64_le().unwrap(), 0xDEAD_BEEF);
        assert_eq!(reader.read_varint().unwrap(), 1000);
        assert_eq!(reader.position(), 10);
        assert!(matches!(
            reader.read_u8(),
            Err(Error::UnexpectedEof { position: 10, .. })
        ));
    }
}
