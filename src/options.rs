//! Codec configuration.

/// Revision from which blocks start with a block-info section.
pub const DBMS_MIN_REVISION_WITH_BLOCK_INFO: u64 = 51903;
/// Revision from which each column header carries a custom-serialization byte.
pub const DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION: u64 = 54454;
/// Revision spoken when none is configured.
pub const DEFAULT_REVISION: u64 = 54459;

/// Options controlling block framing.
///
/// ```
/// use clickhouse_columns::CodecOptions;
///
/// let options = CodecOptions::default()
///     .revision(54449)
///     .validate_on_write(false);
/// assert_eq!(options.revision, 54449);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecOptions {
    /// Protocol revision negotiated with the peer
    pub revision: u64,
    /// Whether each column is preceded by its name and type
    pub column_headers: bool,
    /// Upper bound for a column name or type string in a header
    pub max_header_string: usize,
    /// Run insert-consistency checks before encoding a block
    pub validate_on_write: bool,
}

impl Default for CodecOptions {
    fn default() -> Self {
        Self {
            revision: DEFAULT_REVISION,
            column_headers: true,
            max_header_string: 0x00FF_FFFF,
            validate_on_write: true,
        }
    }
}

impl CodecOptions {
    pub fn new(revision: u64) -> Self {
        Self { revision, ..Default::default() }
    }

    pub fn revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    pub fn column_headers(mut self, enabled: bool) -> Self {
        self.column_headers = enabled;
        self
    }

    pub fn max_header_string(mut self, limit: usize) -> Self {
        self.max_header_string = limit;
        self
    }

    pub fn validate_on_write(mut self, enabled: bool) -> Self {
        self.validate_on_write = enabled;
        self
    }

    pub(crate) fn has_block_info(&self) -> bool {
        self.revision >= DBMS_MIN_REVISION_WITH_BLOCK_INFO
    }

    pub(crate) fn has_custom_serialization(&self) -> bool {
        self.revision >= DBMS_MIN_REVISION_WITH_CUSTOM_SERIALIZATION
    }
}
