use crate::{
    column::{
        Column,
        ColumnBox,
    },
    error::ResultExt,
    types::Type,
    Error,
    Result,
};

fn row_mismatch(name: &str, expected: usize, got: usize) -> Error {
    Error::Validation(format!(
        "All columns in block must have same count of rows. \
         Name: '{}', expected: {}, got: {}",
        name, expected, got
    ))
}

/// Block metadata
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockInfo {
    pub is_overflows: u8,
    pub bucket_num: i32,
}

/// A block is a collection of named columns with the same number of rows
#[derive(Debug)]
pub struct Block {
    columns: Vec<ColumnItem>,
    rows: usize,
    info: BlockInfo,
}

#[derive(Debug)]
struct ColumnItem {
    name: String,
    column: ColumnBox,
}

impl Block {
    /// Create a new empty block
    pub fn new() -> Self {
        Self { columns: Vec::new(), rows: 0, info: BlockInfo::default() }
    }

    pub fn with_capacity(cols: usize) -> Self {
        Self {
            columns: Vec::with_capacity(cols),
            rows: 0,
            info: BlockInfo::default(),
        }
    }

    /// Append a named column to the block
    pub fn append_column(
        &mut self,
        name: impl Into<String>,
        column: ColumnBox,
    ) -> Result<()> {
        let name = name.into();

        if self.columns.is_empty() {
            self.rows = column.size();
        } else if column.size() != self.row_count() {
            return Err(row_mismatch(&name, self.row_count(), column.size()));
        }

        self.columns.push(ColumnItem { name, column });
        Ok(())
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Rows in the block, taken from the first column.
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(self.rows, |item| item.column.size())
    }

    pub fn column(&self, index: usize) -> Option<&dyn Column> {
        self.columns.get(index).map(|item| item.column.as_ref())
    }

    pub fn column_mut(&mut self, index: usize) -> Option<&mut dyn Column> {
        match self.columns.get_mut(index) {
            Some(item) => Some(item.column.as_mut()),
            None => None,
        }
    }

    pub fn column_name(&self, index: usize) -> Option<&str> {
        self.columns.get(index).map(|item| item.name.as_str())
    }

    pub fn column_by_name(&self, name: &str) -> Option<&dyn Column> {
        self.columns
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.column.as_ref())
    }

    pub fn column_by_name_mut(
        &mut self,
        name: &str,
    ) -> Option<&mut dyn Column> {
        match self.columns.iter_mut().find(|item| item.name == name) {
            Some(item) => Some(item.column.as_mut()),
            None => None,
        }
    }

    pub fn info(&self) -> &BlockInfo {
        &self.info
    }

    pub fn set_info(&mut self, info: BlockInfo) {
        self.info = info;
    }

    /// Remove all columns.
    pub fn clear(&mut self) {
        self.columns.clear();
        self.rows = 0;
    }

    /// Drop all rows but keep the columns, ready to buffer the next batch.
    pub fn reset(&mut self) {
        for item in &mut self.columns {
            item.column.clear();
        }
        self.rows = 0;
    }

    /// Reserve capacity in all columns
    pub fn reserve(&mut self, additional: usize) {
        for item in &mut self.columns {
            item.column.reserve(additional);
        }
    }

    /// Refresh and validate row count
    pub fn refresh_row_count(&mut self) -> Result<usize> {
        let Some(first) = self.columns.first() else {
            self.rows = 0;
            return Ok(0);
        };
        let first_rows = first.column.size();

        for item in &self.columns {
            let col_rows = item.column.size();
            if col_rows != first_rows {
                return Err(row_mismatch(&item.name, first_rows, col_rows));
            }
        }

        self.rows = first_rows;
        Ok(first_rows)
    }

    /// Check row counts across columns and each column's own consistency.
    pub fn validate(&self) -> Result<()> {
        let expected = self.row_count();
        for item in &self.columns {
            if item.column.size() != expected {
                return Err(row_mismatch(
                    &item.name,
                    expected,
                    item.column.size(),
                ));
            }
            item.column
                .validate()
                .with_context(|| format!("validate column '{}'", item.name))?;
        }
        Ok(())
    }

    /// Iterate over `(name, type, column)`.
    pub fn iter(&self) -> BlockIterator<'_> {
        BlockIterator { block: self, index: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0 || self.columns.is_empty()
    }

    pub(crate) fn set_rows(&mut self, rows: usize) {
        self.rows = rows;
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over block columns
pub struct BlockIterator<'a> {
    block: &'a Block,
    index: usize,
}

impl<'a> Iterator for BlockIterator<'a> {
    type Item = (&'a str, &'a Type, &'a dyn Column);

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.block.columns.get(self.index)?;
        self.index += 1;
        Some((&item.name, item.column.column_type(), item.column.as_ref()))
    }
}

impl<'a> IntoIterator for &'a Block {
    type Item = (&'a str, &'a Type, &'a dyn Column);
    type IntoIter = BlockIterator<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl std::ops::Index<usize> for Block {
    type Output = dyn Column;

    fn index(&self, index: usize) -> &Self::Output {
        self.columns[index].column.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{
        numeric::ColumnUInt64,
        ColumnNullable,
        ColumnString,
        Value,
    };

    fn u64_column(values: &[u64]) -> ColumnBox {
        Box::new(ColumnUInt64::from_vec(values.to_vec()))
    }

    #[test]
    fn test_block_creation() {
        let block = Block::new();
        assert_eq!(block.column_count(), 0);
        assert_eq!(block.row_count(), 0);
        assert!(block.is_empty());
    }

    #[test]
    fn test_block_append_column() {
        let mut block = Block::new();
        block.append_column("id", u64_column(&[1, 2, 3])).unwrap();

        assert_eq!(block.column_count(), 1);
        assert_eq!(block.row_count(), 3);
        assert!(!block.is_empty());
    }

    #[test]
    fn test_block_mismatched_rows() {
        let mut block = Block::new();
        block.append_column("id", u64_column(&[1, 2])).unwrap();
        let result = block.append_column("value", u64_column(&[100, 200, 300]));
        assert!(result.is_err());
    }

    #[test]
    fn test_block_lookup() {
        let mut block = Block::new();
        block.append_column("first", u64_column(&[1])).unwrap();
        block.append_column("second", u64_column(&[2])).unwrap();

        assert_eq!(block.column_name(1), Some("second"));
        let second = block.column_by_name("second").unwrap();
        assert_eq!(second.value(0).unwrap(), Value::UInt64(2));
        assert!(block.column_by_name("missing").is_none());
        assert!(block.column(2).is_none());
        assert_eq!(block[0].size(), 1);

        let names: Vec<&str> = block.iter().map(|(name, _, _)| name).collect();
        assert_eq!(names, vec!["first", "second"]);
    }

    #[test]
    fn test_block_column_mut() {
        let mut block = Block::new();
        block.append_column("id", u64_column(&[42])).unwrap();

        let col = block.column_by_name_mut("id").unwrap();
        col.downcast_mut::<ColumnUInt64>().unwrap().append(100);

        assert_eq!(block.row_count(), 2);
        let col = block[0].downcast_ref::<ColumnUInt64>().unwrap();
        assert_eq!(col.data(), &[42, 100]);
    }

    #[test]
    fn test_refresh_row_count_detects_drift() {
        let mut block = Block::new();
        block.append_column("a", u64_column(&[1])).unwrap();
        block.append_column("b", u64_column(&[2])).unwrap();
        block.column_mut(1).unwrap().append_default();

        assert!(block.refresh_row_count().is_err());
        assert!(block.validate().is_err());
    }

    #[test]
    fn test_validate_adds_column_context() {
        let mut block = Block::new();
        let mut nullable = ColumnNullable::new(Box::new(ColumnString::new()));
        nullable.nested_mut().append_value(&"x".into()).unwrap();
        block.append_column("name", Box::new(nullable)).unwrap();

        let err = block.validate().unwrap_err();
        assert_eq!(err.steps(), vec!["validate column 'name'"]);
        assert!(matches!(err.root(), Error::Insert(_)));
    }

    #[test]
    fn test_reset_keeps_columns() {
        let mut block = Block::new();
        block.append_column("id", u64_column(&[1, 2])).unwrap();
        block.set_info(BlockInfo { is_overflows: 1, bucket_num: 42 });
        block.reset();

        assert_eq!(block.column_count(), 1);
        assert_eq!(block.row_count(), 0);
        assert_eq!(block.info().bucket_num, 42);
    }
}
