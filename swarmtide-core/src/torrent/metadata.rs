//! Single-file torrent metadata as supplied by the metainfo provider.

use super::piece::PieceHash;
use super::{PieceIndex, TorrentError};

/// Length of one SHA-1 entry in the concatenated piece hash table.
pub const HASH_LENGTH: usize = 20;

/// Metadata needed to schedule and verify a single-file download.
///
/// Piece hashes are stored in torrent order; entry `i` verifies piece `i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetadata {
    /// Output file name
    pub name: String,
    /// Total file size in bytes
    pub total_length: u64,
    /// Nominal piece length in bytes
    pub piece_length: u32,
    /// Expected SHA-1 digest per piece
    pub piece_hashes: Vec<PieceHash>,
}

impl TorrentMetadata {
    /// Builds metadata from the raw `pieces` field of a metainfo dictionary.
    ///
    /// The hash table is sliced into 20-byte spans, one per piece.
    ///
    /// # Errors
    /// - `TorrentError::InvalidMetadata` - Zero lengths, a hash table that is not
    ///   a multiple of 20 bytes, or a hash count that disagrees with the sizes
    pub fn from_concatenated_hashes(
        name: impl Into<String>,
        total_length: u64,
        piece_length: u32,
        hash_table: &[u8],
    ) -> Result<Self, TorrentError> {
        if hash_table.len() % HASH_LENGTH != 0 {
            return Err(TorrentError::InvalidMetadata {
                reason: format!(
                    "piece hash table length {} is not a multiple of {HASH_LENGTH}",
                    hash_table.len()
                ),
            });
        }

        let piece_hashes = hash_table
            .chunks_exact(HASH_LENGTH)
            .map(|span| {
                let mut hash = [0u8; HASH_LENGTH];
                hash.copy_from_slice(span);
                hash
            })
            .collect();

        Self::new(name, total_length, piece_length, piece_hashes)
    }

    /// Builds metadata from already split piece hashes.
    ///
    /// # Errors
    /// - `TorrentError::InvalidMetadata` - Zero lengths or mismatched hash count
    pub fn new(
        name: impl Into<String>,
        total_length: u64,
        piece_length: u32,
        piece_hashes: Vec<PieceHash>,
    ) -> Result<Self, TorrentError> {
        if total_length == 0 {
            return Err(TorrentError::InvalidMetadata {
                reason: "total length is zero".to_string(),
            });
        }
        if piece_length == 0 {
            return Err(TorrentError::InvalidMetadata {
                reason: "piece length is zero".to_string(),
            });
        }

        let expected = total_length.div_ceil(u64::from(piece_length));
        if piece_hashes.len() as u64 != expected {
            return Err(TorrentError::InvalidMetadata {
                reason: format!(
                    "expected {expected} piece hashes for {total_length} bytes, got {}",
                    piece_hashes.len()
                ),
            });
        }

        Ok(Self {
            name: name.into(),
            total_length,
            piece_length,
            piece_hashes,
        })
    }

    /// Number of pieces in the torrent.
    pub fn piece_count(&self) -> u32 {
        self.piece_hashes.len() as u32
    }

    /// Byte length of the given piece.
    ///
    /// Every piece has the nominal length except the last, which holds the
    /// remainder (or the nominal length when the remainder is zero).
    ///
    /// # Errors
    /// - `TorrentError::InvalidPieceIndex` - Index beyond the last piece
    pub fn piece_size(&self, index: PieceIndex) -> Result<u32, TorrentError> {
        let count = self.piece_count();
        if index.as_u32() >= count {
            return Err(TorrentError::InvalidPieceIndex { index });
        }

        if index.as_u32() + 1 < count {
            return Ok(self.piece_length);
        }

        let remainder = (self.total_length % u64::from(self.piece_length)) as u32;
        if remainder > 0 {
            Ok(remainder)
        } else {
            Ok(self.piece_length)
        }
    }

    /// Absolute file offset of the first byte of the given piece.
    pub fn piece_offset(&self, index: PieceIndex) -> u64 {
        u64::from(index.as_u32()) * u64::from(self.piece_length)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn hashes(count: usize) -> Vec<PieceHash> {
        (0..count).map(|i| [i as u8; HASH_LENGTH]).collect()
    }

    #[test]
    fn test_concatenated_hashes_are_split_in_order() {
        let mut table = Vec::new();
        table.extend_from_slice(&[0xaa; HASH_LENGTH]);
        table.extend_from_slice(&[0xbb; HASH_LENGTH]);

        let metadata =
            TorrentMetadata::from_concatenated_hashes("file.bin", 40_000, 32_768, &table).unwrap();

        assert_eq!(metadata.piece_count(), 2);
        assert_eq!(metadata.piece_hashes[0], [0xaa; HASH_LENGTH]);
        assert_eq!(metadata.piece_hashes[1], [0xbb; HASH_LENGTH]);
    }

    #[test]
    fn test_truncated_hash_table_rejected() {
        let result = TorrentMetadata::from_concatenated_hashes("file.bin", 100, 100, &[0u8; 19]);
        assert!(matches!(result, Err(TorrentError::InvalidMetadata { .. })));
    }

    #[test]
    fn test_hash_count_must_match_sizes() {
        let result = TorrentMetadata::new("file.bin", 65_536, 32_768, hashes(3));
        assert!(matches!(result, Err(TorrentError::InvalidMetadata { .. })));
    }

    #[test]
    fn test_zero_lengths_rejected() {
        assert!(TorrentMetadata::new("file.bin", 0, 32_768, hashes(0)).is_err());
        assert!(TorrentMetadata::new("file.bin", 10, 0, hashes(1)).is_err());
    }

    #[test]
    fn test_last_piece_holds_remainder() {
        let metadata = TorrentMetadata::new("file.bin", 100_000, 32_768, hashes(4)).unwrap();

        assert_eq!(metadata.piece_size(PieceIndex::new(0)).unwrap(), 32_768);
        assert_eq!(metadata.piece_size(PieceIndex::new(2)).unwrap(), 32_768);
        assert_eq!(metadata.piece_size(PieceIndex::new(3)).unwrap(), 1_696);
        assert!(metadata.piece_size(PieceIndex::new(4)).is_err());
    }

    #[test]
    fn test_exact_multiple_keeps_full_last_piece() {
        let metadata = TorrentMetadata::new("file.bin", 65_536, 32_768, hashes(2)).unwrap();
        assert_eq!(metadata.piece_size(PieceIndex::new(1)).unwrap(), 32_768);
        assert_eq!(metadata.piece_offset(PieceIndex::new(1)), 32_768);
    }

    proptest! {
        #[test]
        fn prop_piece_sizes_sum_to_total(total in 1u64..5_000_000, piece_length in 4_096u32..300_000) {
            let count = total.div_ceil(u64::from(piece_length)) as usize;
            let metadata = TorrentMetadata::new("file.bin", total, piece_length, hashes(count)).unwrap();

            let sizes: Vec<u32> = (0..metadata.piece_count())
                .map(|i| metadata.piece_size(PieceIndex::new(i)).unwrap())
                .collect();

            prop_assert_eq!(sizes.iter().map(|&s| u64::from(s)).sum::<u64>(), total);
            let last = sizes.len() - 1;
            for (i, &size) in sizes.iter().enumerate() {
                if i < last {
                    prop_assert_eq!(size, piece_length);
                } else {
                    prop_assert!(size <= piece_length && size > 0);
                }
            }
        }
    }
}
