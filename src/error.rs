use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(
        "Unexpected end of input at byte {position}: \
         need {needed} bytes, have {available}"
    )]
    UnexpectedEof { position: u64, needed: usize, available: usize },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error(
        "Incompatible column type: wire type {wire_type} \
         cannot be read into any of [{}]",
        accepted.join(", ")
    )]
    IncompatibleType { wire_type: String, accepted: Vec<String> },

    #[error("Malformed type '{fragment}': {reason}")]
    MalformedType { fragment: String, reason: String },

    #[error("Unsupported LowCardinality index width selector: {0}")]
    UnsupportedIndexWidth(u64),

    #[error("Insert error: {0}")]
    Insert(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("{step}: {source}")]
    Context {
        step: String,
        #[source]
        source: Box<Error>,
    },
}

/// Coarse classification of an [`Error`], used by callers to decide whether
/// the current block is lost or the buffered insert can be corrected and
/// retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The byte cursor failed or ran dry.
    Io,
    /// The wire type does not fit the column, or the stream is malformed.
    Structural,
    /// A type string or encoding parameter could not be interpreted.
    Metadata,
    /// Buffered insert data is internally inconsistent.
    Insert,
}

impl Error {
    /// Wrap `self` in a context frame naming the step that failed.
    pub fn context(self, step: impl Into<String>) -> Self {
        Error::Context { step: step.into(), source: Box::new(self) }
    }

    /// The innermost error, skipping all context frames.
    pub fn root(&self) -> &Error {
        let mut current = self;
        while let Error::Context { source, .. } = current {
            current = source;
        }
        current
    }

    /// Context steps from the outermost frame inwards.
    pub fn steps(&self) -> Vec<&str> {
        let mut steps = Vec::new();
        let mut current = self;
        while let Error::Context { step, source } = current {
            steps.push(step.as_str());
            current = source;
        }
        steps
    }

    pub fn class(&self) -> ErrorClass {
        match self.root() {
            Error::Io(_) | Error::UnexpectedEof { .. } => ErrorClass::Io,
            Error::MalformedType { .. } | Error::UnsupportedIndexWidth(_) => {
                ErrorClass::Metadata
            }
            Error::Insert(_) => ErrorClass::Insert,
            _ => ErrorClass::Structural,
        }
    }

    /// Metadata and insert errors leave the column usable: the caller may fix
    /// the buffered data and retry without re-allocating anything.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.class(), ErrorClass::Metadata | ErrorClass::Insert)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Adds a context frame to the error of a [`Result`].
pub trait ResultExt<T> {
    fn context(self, step: &str) -> Result<T>;

    fn with_context<F, S>(self, step: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, step: &str) -> Result<T> {
        self.map_err(|e| e.context(step))
    }

    fn with_context<F, S>(self, step: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| e.context(step()))
    }
}
