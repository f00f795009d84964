//! Piece-level BitTorrent download state: metadata, pieces, bitfields and
//! the rarest-first scheduler.

pub mod bitfield;
pub mod completion;
pub mod creation;
pub mod metadata;
pub mod piece;
pub mod scheduler;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_data;

use std::fmt;

pub use bitfield::Bitfield;
pub use completion::{CompletionReport, format_size};
pub use creation::{DEFAULT_PIECE_SIZE, TorrentCreator, hash_piece};
pub use metadata::TorrentMetadata;
pub use piece::{BLOCK_SIZE, BlockRequest, Piece, PieceHash};
pub use scheduler::{BlockCheck, BlockOutcome, PieceScheduler, PieceState, SchedulerProgress};

use crate::storage::StorageError;

/// Zero-based index of a piece within a torrent.
///
/// Torrent files are divided into pieces for downloading and verification.
/// Each piece has a sequential index starting from 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PieceIndex(pub u32);

impl PieceIndex {
    /// Creates PieceIndex from zero-based index.
    pub fn new(index: u32) -> Self {
        Self(index)
    }

    /// Returns the underlying piece index as u32.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// Returns the index as a usize for slice addressing.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PieceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur during piece scheduling and assembly.
///
/// "No piece available for this peer" is not an error; scheduling calls
/// report it as `None`.
#[derive(Debug, thiserror::Error)]
pub enum TorrentError {
    #[error("Invalid torrent metadata: {reason}")]
    InvalidMetadata { reason: String },

    #[error("Piece index {index} out of range")]
    InvalidPieceIndex { index: PieceIndex },

    #[error("Block at piece {index} offset {offset} length {length} was never requested")]
    InvalidBlock {
        index: PieceIndex,
        offset: u32,
        length: u32,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Scheduler engine has shut down")]
    EngineShutdown,
}
