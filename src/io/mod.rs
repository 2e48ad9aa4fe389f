//! I/O layer for the column codec.
//!
//! Provides the byte cursors columns read from and write to, and
//! `BlockReader` / `BlockWriter` which frame a set of columns as one native
//! block.

/// Block reader/writer for the native block framing.
pub mod block_stream;
pub mod buffer_utils;
pub mod cursor;

pub use block_stream::{
    BlockReader,
    BlockWriter,
};
pub use cursor::{
    ByteRead,
    ByteWrite,
    IoReader,
    IoWriter,
    SliceReader,
};
