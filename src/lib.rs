pub mod block;
pub mod column;
pub mod error;
pub mod io;
pub mod options;
pub mod scan;
pub mod types;

pub use block::{
    Block,
    BlockInfo,
};
pub use column::{
    create_column,
    Column,
    ColumnBox,
    ColumnTyped,
    Value,
};
pub use error::{
    Error,
    ErrorClass,
    Result,
    ResultExt,
};
pub use io::{
    BlockReader,
    BlockWriter,
};
pub use options::CodecOptions;
pub use scan::{
    scan,
    FromValue,
};
pub use types::Type;
