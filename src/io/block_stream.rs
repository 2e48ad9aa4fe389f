use crate::{
    block::{
        Block,
        BlockInfo,
    },
    column::create_column,
    error::ResultExt,
    io::{
        buffer_utils,
        ByteRead,
        ByteWrite,
    },
    options::CodecOptions,
    types::Type,
    Error,
    Result,
};
use bytes::BytesMut;
use tracing::debug;

/// Column slots reserved up front from a header's column count.
const MAX_PRESIZED_COLUMNS: usize = 1024;

/// Reader for native blocks
pub struct BlockReader {
    options: CodecOptions,
}

impl BlockReader {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Read one block, building its columns from the header types.
    pub fn read_block(&self, reader: &mut dyn ByteRead) -> Result<Block> {
        if !self.options.column_headers {
            return Err(Error::InvalidArgument(
                "reading a block without column headers needs existing \
                 columns; use read_block_into"
                    .to_string(),
            ));
        }
        let start = reader.position();

        let info = self.read_block_info(reader)?;
        let (num_columns, num_rows) = read_counts(reader)?;

        let mut block =
            Block::with_capacity(num_columns.min(MAX_PRESIZED_COLUMNS));
        block.set_info(info);

        for _ in 0..num_columns {
            let (name, column_type) = self.read_header(reader)?;
            let mut column = create_column(&column_type)?;

            if num_rows > 0 {
                column
                    .load_prefix(reader, num_rows)
                    .and_then(|_| column.load_body(reader, num_rows))
                    .with_context(|| format!("read column '{}'", name))?;
            }

            block.append_column(name, column)?;
        }
        block.set_rows(num_rows);

        debug!(
            columns = num_columns,
            rows = num_rows,
            bytes = reader.position() - start,
            "block read"
        );
        Ok(block)
    }

    /// Read one block into the columns `block` already holds, replacing their
    /// content. Each header type is checked against its column first.
    pub fn read_block_into(
        &self,
        reader: &mut dyn ByteRead,
        block: &mut Block,
    ) -> Result<()> {
        let start = reader.position();

        let info = self.read_block_info(reader)?;
        let (num_columns, num_rows) = read_counts(reader)?;

        if num_columns != block.column_count() {
            return Err(Error::Protocol(format!(
                "Block has {} columns but {} were expected",
                num_columns,
                block.column_count()
            )));
        }

        for index in 0..num_columns {
            let header = if self.options.column_headers {
                Some(self.read_header(reader)?)
            } else {
                None
            };
            let expected_name =
                block.column_name(index).unwrap_or_default().to_string();
            let column = block.column_mut(index).ok_or_else(|| {
                Error::Protocol(format!("missing column {}", index))
            })?;

            if let Some((name, column_type)) = header {
                if name != expected_name {
                    return Err(Error::Protocol(format!(
                        "Expected column '{}' at position {}, got '{}'",
                        expected_name, index, name
                    )));
                }
                column
                    .check_type(&column_type)
                    .with_context(|| format!("check column '{}'", name))?;
            }

            if num_rows > 0 {
                column
                    .load_prefix(reader, num_rows)
                    .and_then(|_| column.load_body(reader, num_rows))
                    .with_context(|| {
                        format!("read column '{}'", expected_name)
                    })?;
            } else {
                column.clear();
            }
        }

        block.set_info(info);
        block.set_rows(num_rows);

        debug!(
            columns = num_columns,
            rows = num_rows,
            bytes = reader.position() - start,
            "block read into existing columns"
        );
        Ok(())
    }

    fn read_block_info(&self, reader: &mut dyn ByteRead) -> Result<BlockInfo> {
        if !self.options.has_block_info() {
            return Ok(BlockInfo::default());
        }

        let read = |reader: &mut dyn ByteRead| -> Result<BlockInfo> {
            let _field1 = reader.read_varint()?;
            let is_overflows = reader.read_u8()?;
            let _field2 = reader.read_varint()?;
            let mut bucket = [0u8; 4];
            reader.read_exact_into(&mut bucket)?;
            let _end = reader.read_varint()?;
            Ok(BlockInfo {
                is_overflows,
                bucket_num: i32::from_le_bytes(bucket),
            })
        };
        read(reader).context("read block info")
    }

    fn read_header(&self, reader: &mut dyn ByteRead) -> Result<(String, Type)> {
        let limit = self.options.max_header_string;
        let name = buffer_utils::read_string(reader, limit)
            .context("read column name")?;
        let type_name = buffer_utils::read_string(reader, limit)
            .with_context(|| format!("read type of column '{}'", name))?;

        if self.options.has_custom_serialization() {
            let custom = reader.read_u8().with_context(|| {
                format!("read serialization kind of column '{}'", name)
            })?;
            if custom != 0 {
                return Err(Error::Protocol(format!(
                    "Custom serialization of column '{}' is not supported",
                    name
                )));
            }
        }

        let column_type = Type::parse(&type_name)?;
        Ok((name, column_type))
    }
}

/// Column and row counts that follow the block info.
fn read_counts(reader: &mut dyn ByteRead) -> Result<(usize, usize)> {
    let columns = reader.read_varint().context("read column count")?;
    let rows = reader.read_varint().context("read row count")?;
    match (usize::try_from(columns), usize::try_from(rows)) {
        (Ok(columns), Ok(rows)) => Ok((columns, rows)),
        _ => Err(Error::Protocol(format!(
            "Block of {} columns and {} rows does not fit in memory",
            columns, rows
        ))),
    }
}

/// Writer for native blocks
pub struct BlockWriter {
    options: CodecOptions,
}

impl BlockWriter {
    pub fn new(options: CodecOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CodecOptions {
        &self.options
    }

    /// Encode `block` and hand the bytes to `writer` in one call. Nothing
    /// reaches the writer if encoding fails.
    pub fn write_block(
        &self,
        writer: &mut dyn ByteWrite,
        block: &Block,
    ) -> Result<()> {
        let buffer = self.encode(block)?;
        writer.write_bytes(&buffer)?;
        debug!(
            columns = block.column_count(),
            rows = block.row_count(),
            bytes = buffer.len(),
            "block written"
        );
        Ok(())
    }

    /// Write `block`, then drop its rows. On failure the rows stay buffered
    /// so the caller can fix them and retry.
    pub fn write_and_reset(
        &self,
        writer: &mut dyn ByteWrite,
        block: &mut Block,
    ) -> Result<()> {
        self.write_block(writer, block)?;
        block.reset();
        Ok(())
    }

    /// Serialize `block` into a fresh buffer.
    pub fn encode(&self, block: &Block) -> Result<BytesMut> {
        if self.options.validate_on_write {
            block.validate()?;
        }

        let mut buffer = BytesMut::new();

        if self.options.has_block_info() {
            buffer.write_varint(1)?;
            buffer.write_u8(block.info().is_overflows)?;
            buffer.write_varint(2)?;
            buffer.write_bytes(&block.info().bucket_num.to_le_bytes())?;
            buffer.write_varint(0)?;
        }

        let rows = block.row_count();
        buffer.write_varint(block.column_count() as u64)?;
        buffer.write_varint(rows as u64)?;

        for (name, type_, column) in block.iter() {
            if self.options.column_headers {
                buffer_utils::write_string(&mut buffer, name)?;
                buffer_utils::write_string(&mut buffer, &type_.name())?;
                if self.options.has_custom_serialization() {
                    buffer.write_u8(0)?;
                }
            }

            if rows > 0 {
                column
                    .save_prefix(&mut buffer)
                    .and_then(|_| column.save_body(&mut buffer))
                    .with_context(|| format!("write column '{}'", name))?;
            }
        }

        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        column::{
            numeric::ColumnUInt64,
            Column,
            ColumnBox,
            ColumnNullable,
            ColumnString,
            Value,
        },
        io::SliceReader,
    };

    fn uint64s(values: Vec<u64>) -> ColumnBox {
        Box::new(ColumnUInt64::from_vec(values))
    }

    fn strings(values: Vec<&str>) -> ColumnBox {
        Box::new(ColumnString::from_vec(values))
    }

    fn sample_block() -> Block {
        let mut block = Block::new();
        block.append_column("id", uint64s(vec![1, 2])).unwrap();
        block.append_column("name", strings(vec!["a", "bc"])).unwrap();
        block
    }

    fn encode(options: &CodecOptions, block: &Block) -> BytesMut {
        BlockWriter::new(options.clone()).encode(block).unwrap()
    }

    fn read_into(options: CodecOptions, buf: &[u8], target: &mut Block) {
        BlockReader::new(options)
            .read_block_into(&mut SliceReader::new(buf), target)
            .unwrap();
    }

    #[test]
    fn test_header_layout_with_custom_flag() {
        let mut block = Block::new();
        block.append_column("x", uint64s(vec![7])).unwrap();

        let buf = encode(&CodecOptions::default(), &block);

        // block info: field 1, is_overflows, field 2, bucket_num, end marker
        let mut expected = vec![1, 0, 2, 0, 0, 0, 0, 0];
        expected.extend_from_slice(&[1, 1]);
        expected.extend_from_slice(&[1, b'x', 6]);
        expected.extend_from_slice(b"UInt64");
        expected.push(0);
        expected.extend_from_slice(&7u64.to_le_bytes());
        assert_eq!(&buf[..], &expected[..]);
    }

    #[test]
    fn test_block_roundtrip() {
        let info = BlockInfo { is_overflows: 1, bucket_num: -1 };
        let mut block = sample_block();
        block.set_info(info.clone());

        let options = CodecOptions::new(54449);
        let buf = encode(&options, &block);

        let mut reader = SliceReader::new(&buf);
        let decoded =
            BlockReader::new(options).read_block(&mut reader).unwrap();
        assert!(reader.is_empty());

        assert_eq!(decoded.column_count(), 2);
        assert_eq!(decoded.row_count(), 2);
        assert_eq!(decoded.column_name(1), Some("name"));
        assert_eq!(decoded.info(), &info);
        assert_eq!(decoded[1].value(1).unwrap(), Value::from("bc"));
    }

    #[test]
    fn test_custom_serialization_rejected() {
        let mut block = Block::new();
        block.append_column("x", uint64s(vec![])).unwrap();
        let mut buf = encode(&CodecOptions::default(), &block).to_vec();
        let flag = buf.len() - 1;
        buf[flag] = 1;

        let err = BlockReader::new(CodecOptions::default())
            .read_block(&mut SliceReader::new(&buf))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(msg) if msg.contains("Custom serialization")
        ));
    }

    #[test]
    fn test_read_into_existing_columns() {
        let options = CodecOptions::default();
        let buf = encode(&options, &sample_block());

        let mut target = Block::new();
        target.append_column("id", uint64s(vec![9, 9, 9])).unwrap();
        target.append_column("name", strings(vec!["x", "y", "z"])).unwrap();

        read_into(options, &buf, &mut target);
        assert_eq!(target.row_count(), 2);
        assert_eq!(target[0].value(0).unwrap(), Value::UInt64(1));
    }

    #[test]
    fn test_read_into_rejects_incompatible_type() {
        let options = CodecOptions::default();
        let buf = encode(&options, &sample_block());

        let mut target = Block::new();
        target.append_column("id", strings(vec![])).unwrap();
        target.append_column("name", strings(vec![])).unwrap();

        let err = BlockReader::new(options)
            .read_block_into(&mut SliceReader::new(&buf), &mut target)
            .unwrap_err();
        assert_eq!(err.steps(), vec!["check column 'id'"]);
        assert!(matches!(err.root(), Error::IncompatibleType { .. }));
    }

    #[test]
    fn test_truncated_block_names_column() {
        let buf = encode(&CodecOptions::default(), &sample_block());
        let truncated = &buf[..buf.len() - 1];

        let err = BlockReader::new(CodecOptions::default())
            .read_block(&mut SliceReader::new(truncated))
            .unwrap_err();
        assert_eq!(err.steps(), vec!["read column 'name'"]);
        assert!(matches!(err.root(), Error::UnexpectedEof { .. }));
    }

    #[test]
    fn test_failed_write_keeps_rows() {
        let mut block = Block::new();
        let mut nullable = ColumnNullable::new(uint64s(vec![]));
        nullable.nested_mut().append_value(&Value::UInt64(1)).unwrap();
        block.append_column("n", Box::new(nullable)).unwrap();

        let writer = BlockWriter::new(CodecOptions::default());
        let mut sink = Vec::new();
        let err = writer.write_and_reset(&mut sink, &mut block).unwrap_err();
        assert!(err.is_recoverable());
        assert!(sink.is_empty());

        block
            .column_mut(0)
            .and_then(|c| c.downcast_mut::<ColumnNullable>())
            .unwrap()
            .append_present();
        writer.write_and_reset(&mut sink, &mut block).unwrap();
        assert!(!sink.is_empty());
        assert_eq!(block.column(0).unwrap().size(), 0);
    }

    #[test]
    fn test_headerless_block() {
        let options = CodecOptions::default().column_headers(false);
        let buf = encode(&options, &sample_block());

        let reader = BlockReader::new(options.clone());
        assert!(reader.read_block(&mut SliceReader::new(&buf)).is_err());

        let mut target = Block::new();
        target.append_column("id", uint64s(vec![])).unwrap();
        target.append_column("name", strings(vec![])).unwrap();
        read_into(options, &buf, &mut target);
        assert_eq!(target[1].value(0).unwrap(), Value::from("a"));
    }
}
