//! Storage layer for the output file.
//!
//! A single file receives blocks at their absolute offsets while the same
//! file serves upload requests. Completion of individual pieces is tracked
//! for the announce bitfield.

pub mod file_store;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_fixtures;

pub use file_store::FileStore;

use crate::torrent::PieceIndex;

/// Errors that occur during storage operations.
///
/// Every failure is returned to the caller; the store never retries.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The file handle was released by `close`
    #[error("Output file is closed")]
    Closed,

    /// Requested piece or byte range lies outside the torrent
    #[error("Invalid range: piece {index} begin {begin} length {length}")]
    InvalidRange {
        /// Piece the range was addressed to
        index: PieceIndex,
        /// Offset inside the piece
        begin: u32,
        /// Number of bytes
        length: u32,
    },

    /// Standard I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
