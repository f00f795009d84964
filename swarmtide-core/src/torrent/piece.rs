//! Piece records and block segmentation.
//!
//! A piece is consumed in one linear pass: the scheduler asks for the next
//! block length, dispatches the request and advances the cursor. Arriving
//! blocks feed a running SHA-1 in offset order so the digest is ready the
//! moment the last byte lands.

use std::collections::BTreeMap;

use bytes::Bytes;
use sha1::{Digest, Sha1};

use super::PieceIndex;

/// Standard 16 KiB BitTorrent block size.
pub const BLOCK_SIZE: u32 = 16_384;

/// 20-byte SHA-1 digest of a piece.
pub type PieceHash = [u8; 20];

/// Single block request dispatched to a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockRequest {
    pub piece_index: PieceIndex,
    pub offset: u32,
    pub length: u32,
}

/// Result of handing an arrived block to its piece.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockAcceptance {
    /// Block already hashed or parked
    Duplicate,
    /// Block stored; piece still missing bytes
    Buffered,
    /// Every byte of the piece has been hashed
    Complete,
}

/// Unit of work: one hash-verified chunk of the output file.
#[derive(Debug, Clone)]
pub struct Piece {
    index: PieceIndex,
    expected_hash: PieceHash,
    length: u32,
    num_blocks: u32,
    offset: u32,
    downloaded: bool,
    running_hash: Sha1,
    hashed: u32,
    parked: BTreeMap<u32, Bytes>,
}

impl Piece {
    /// Creates an untouched piece of `length` bytes.
    pub fn new(index: PieceIndex, expected_hash: PieceHash, length: u32) -> Self {
        Self {
            index,
            expected_hash,
            length,
            num_blocks: length.div_ceil(BLOCK_SIZE),
            offset: 0,
            downloaded: false,
            running_hash: Sha1::new(),
            hashed: 0,
            parked: BTreeMap::new(),
        }
    }

    pub fn index(&self) -> PieceIndex {
        self.index
    }

    pub fn expected_hash(&self) -> &PieceHash {
        &self.expected_hash
    }

    pub fn length(&self) -> u32 {
        self.length
    }

    pub fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    /// Bytes already requested from peers.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Bytes fed to the running digest so far.
    pub fn hashed(&self) -> u32 {
        self.hashed
    }

    /// True once every block was written and the digest matched.
    pub fn is_downloaded(&self) -> bool {
        self.downloaded
    }

    /// True while some block of this piece has not been requested yet.
    pub fn has_unrequested_blocks(&self) -> bool {
        self.offset < self.length
    }

    /// Length of the next block to request, or `None` once the whole piece
    /// has been requested.
    ///
    /// Full blocks are handed out while they fit; the final block covers
    /// whatever remains, which handles both a short trailing block and the
    /// short last piece of the torrent.
    pub fn next_block_length(&self) -> Option<u32> {
        if self.offset + BLOCK_SIZE <= self.length {
            Some(BLOCK_SIZE)
        } else if self.length > self.offset {
            Some(self.length - self.offset)
        } else {
            None
        }
    }

    /// Expected length of the block starting at `offset`, if `offset` is a
    /// block boundary inside this piece.
    pub fn block_length_at(&self, offset: u32) -> Option<u32> {
        if offset % BLOCK_SIZE != 0 || offset >= self.length {
            return None;
        }
        Some(BLOCK_SIZE.min(self.length - offset))
    }

    /// True while the block at `offset` has been neither hashed nor parked.
    pub fn is_pending_offset(&self, offset: u32) -> bool {
        offset >= self.hashed && !self.parked.contains_key(&offset)
    }

    /// Moves the request cursor past a dispatched block.
    pub(crate) fn advance(&mut self, length: u32) {
        self.offset = (self.offset + length).min(self.length);
    }

    /// Feeds an arrived block into the running digest.
    ///
    /// Blocks that arrive ahead of the digest position are parked until the
    /// gap before them is filled.
    pub(crate) fn accept_block(&mut self, offset: u32, data: Bytes) -> BlockAcceptance {
        if !self.is_pending_offset(offset) {
            return BlockAcceptance::Duplicate;
        }

        self.parked.insert(offset, data);
        while let Some(block) = self.parked.remove(&self.hashed) {
            self.running_hash.update(&block);
            self.hashed += block.len() as u32;
        }

        if self.hashed >= self.length {
            BlockAcceptance::Complete
        } else {
            BlockAcceptance::Buffered
        }
    }

    /// Compares the finished digest against the expected hash.
    ///
    /// Marks the piece downloaded on success. The digest state is consumed
    /// either way; a failed piece must be reset before it is fetched again.
    pub(crate) fn verify(&mut self) -> bool {
        if self.hashed < self.length {
            return false;
        }

        let digest = self.running_hash.finalize_reset();
        let matches = digest.as_slice() == self.expected_hash.as_slice();
        if matches {
            self.downloaded = true;
            self.offset = self.length;
        } else {
            tracing::warn!(
                "Piece {} digest {} does not match expected {}",
                self.index,
                hex::encode(digest),
                hex::encode(self.expected_hash)
            );
        }
        matches
    }

    /// Discards all progress so the piece restarts from its first block.
    pub(crate) fn reset(&mut self) {
        self.offset = 0;
        self.downloaded = false;
        self.running_hash = Sha1::new();
        self.hashed = 0;
        self.parked.clear();
    }
}
