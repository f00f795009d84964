//! Packed piece-possession bit vector in BitTorrent wire order.
//!
//! The most significant bit of byte 0 is piece 0. Bits past the last piece
//! in the final byte are always zero.

use bytes::Bytes;

use super::PieceIndex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitfield {
    bytes: Vec<u8>,
    piece_count: u32,
}

impl Bitfield {
    /// Creates an all-clear bitfield for `piece_count` pieces.
    pub fn new(piece_count: u32) -> Self {
        Self {
            bytes: vec![0; piece_count.div_ceil(8) as usize],
            piece_count,
        }
    }

    /// Packs a per-piece possession vector.
    pub fn from_pieces(pieces: &[bool]) -> Self {
        let mut bitfield = Self::new(pieces.len() as u32);
        for (index, &present) in pieces.iter().enumerate() {
            if present {
                bitfield.set(PieceIndex::new(index as u32));
            }
        }
        bitfield
    }

    /// Decodes a peer-supplied bitfield payload.
    ///
    /// Short payloads are zero-extended and long ones truncated; padding bits
    /// past `piece_count` are cleared rather than rejected.
    pub fn from_bytes(payload: &[u8], piece_count: u32) -> Self {
        let mut bytes = vec![0; piece_count.div_ceil(8) as usize];
        let copied = payload.len().min(bytes.len());
        bytes[..copied].copy_from_slice(&payload[..copied]);

        let mut bitfield = Self { bytes, piece_count };
        bitfield.clear_padding();
        bitfield
    }

    /// Bitfield with every piece present.
    pub fn full(piece_count: u32) -> Self {
        let mut bitfield = Self {
            bytes: vec![0xff; piece_count.div_ceil(8) as usize],
            piece_count,
        };
        bitfield.clear_padding();
        bitfield
    }

    pub fn piece_count(&self) -> u32 {
        self.piece_count
    }

    pub fn has(&self, index: PieceIndex) -> bool {
        if index.as_u32() >= self.piece_count {
            return false;
        }
        let (byte, mask) = Self::locate(index);
        self.bytes[byte] & mask != 0
    }

    /// Marks a piece present. Out-of-range indices are ignored.
    pub fn set(&mut self, index: PieceIndex) {
        if index.as_u32() >= self.piece_count {
            return;
        }
        let (byte, mask) = Self::locate(index);
        self.bytes[byte] |= mask;
    }

    /// Indices of every present piece, ascending.
    pub fn iter_set(&self) -> impl Iterator<Item = PieceIndex> + '_ {
        (0..self.piece_count)
            .map(PieceIndex::new)
            .filter(|&index| self.has(index))
    }

    pub fn count_set(&self) -> u32 {
        self.bytes.iter().map(|byte| byte.count_ones()).sum()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Wire payload for an outbound `bitfield` message.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.bytes)
    }

    fn locate(index: PieceIndex) -> (usize, u8) {
        let bit = index.as_usize();
        (bit / 8, 0x80 >> (bit % 8))
    }

    fn clear_padding(&mut self) {
        let used = (self.piece_count % 8) as usize;
        if used != 0 {
            if let Some(last) = self.bytes.last_mut() {
                *last &= 0xffu8 << (8 - used);
            }
        }
    }
}
