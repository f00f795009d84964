//! Metadata creation from local content.
//!
//! Splits content into pieces and computes their SHA-1 hashes. Used to seed
//! simulated swarms and to build fixtures with real digests.

use std::path::Path;

use sha1::{Digest, Sha1};
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use super::piece::PieceHash;
use super::{TorrentError, TorrentMetadata};

/// Standard BitTorrent piece size (256KB)
pub const DEFAULT_PIECE_SIZE: u32 = 262_144;

/// Builds single-file metadata from local content.
pub struct TorrentCreator {
    piece_size: u32,
}

impl Default for TorrentCreator {
    fn default() -> Self {
        Self::new()
    }
}

impl TorrentCreator {
    /// Creates torrent creator with default piece size (256KB)
    pub fn new() -> Self {
        Self {
            piece_size: DEFAULT_PIECE_SIZE,
        }
    }

    /// Creates torrent creator with custom piece size
    pub fn with_piece_size(piece_size: u32) -> Self {
        Self { piece_size }
    }

    /// Creates metadata for in-memory content.
    ///
    /// # Errors
    /// - `TorrentError::InvalidMetadata` - Empty content or zero piece size
    pub fn create_from_bytes(
        &self,
        name: impl Into<String>,
        content: &[u8],
    ) -> Result<TorrentMetadata, TorrentError> {
        if self.piece_size == 0 {
            return Err(TorrentError::InvalidMetadata {
                reason: "piece size is zero".to_string(),
            });
        }

        let piece_hashes = content
            .chunks(self.piece_size as usize)
            .map(hash_piece)
            .collect();

        TorrentMetadata::new(name, content.len() as u64, self.piece_size, piece_hashes)
    }

    /// Creates metadata by streaming a file from disk one piece at a time.
    ///
    /// # Errors
    /// - `TorrentError::Storage` - File could not be opened or read
    /// - `TorrentError::InvalidMetadata` - Empty file or invalid name
    pub async fn create_from_file(&self, file_path: &Path) -> Result<TorrentMetadata, TorrentError> {
        let name = file_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| TorrentError::InvalidMetadata {
                reason: format!("invalid file name: {}", file_path.display()),
            })?
            .to_string();

        let mut file = File::open(file_path)
            .await
            .map_err(crate::storage::StorageError::from)?;
        let file_size = file
            .metadata()
            .await
            .map_err(crate::storage::StorageError::from)?
            .len();

        let mut piece_hashes = Vec::new();
        let mut buffer = vec![0u8; self.piece_size as usize];
        let mut remaining = file_size;
        while remaining > 0 {
            let chunk = remaining.min(u64::from(self.piece_size)) as usize;
            file.read_exact(&mut buffer[..chunk])
                .await
                .map_err(crate::storage::StorageError::from)?;
            piece_hashes.push(hash_piece(&buffer[..chunk]));
            remaining -= chunk as u64;
        }

        TorrentMetadata::new(name, file_size, self.piece_size, piece_hashes)
    }
}

/// SHA-1 digest of one piece's bytes.
pub fn hash_piece(data: &[u8]) -> PieceHash {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&hasher.finalize());
    hash
}
