//! Test data creation for scheduler and storage testing.
//!
//! Content is a deterministic byte pattern so hashes are real and
//! reproducible across runs.

use super::creation::TorrentCreator;
use super::{PieceIndex, TorrentMetadata};

/// Deterministic content of `length` bytes.
pub fn create_test_content(length: usize) -> Vec<u8> {
    (0..length)
        .map(|i| ((i * 31 + i / 251) % 256) as u8)
        .collect()
}

/// Metadata with real piece hashes plus the content it describes.
///
/// # Panics
///
/// Panics on zero `length` or `piece_length`; fixtures are always non-empty.
pub fn create_test_torrent(length: usize, piece_length: u32) -> (TorrentMetadata, Vec<u8>) {
    let content = create_test_content(length);
    let metadata = TorrentCreator::with_piece_size(piece_length)
        .create_from_bytes("test.bin", &content)
        .unwrap();
    (metadata, content)
}

/// Bytes of one block of the test content.
pub fn block_of(
    metadata: &TorrentMetadata,
    content: &[u8],
    piece: PieceIndex,
    offset: u32,
    length: u32,
) -> Vec<u8> {
    let start = (metadata.piece_offset(piece) + u64::from(offset)) as usize;
    content[start..start + length as usize].to_vec()
}
