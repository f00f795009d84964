//! Rarest-first piece scheduler.
//!
//! Every piece lives in exactly one of three queues:
//! - `needed`: not assigned to anyone, annotated with its rarity count
//! - `pending`: handed out to peers, blocks being requested or received
//! - `finished`: written and hash-verified
//!
//! Rarity only orders selection among available pieces; it never makes a
//! piece ineligible. The scheduler itself is single-threaded; concurrent
//! peers go through the engine actor which serializes every mutation.

use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;

use bytes::Bytes;
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use super::piece::BlockAcceptance;
use super::{
    Bitfield, BlockRequest, CompletionReport, Piece, PieceIndex, TorrentError, TorrentMetadata,
};
use crate::config::SchedulerConfig;

/// Queue a piece currently belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceState {
    Needed,
    Pending,
    Finished,
}

/// What happened to an arrived block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    /// Block recorded; piece still incomplete
    Accepted,
    /// Same block was already received
    Duplicate,
    /// Piece is no longer pending (abandoned or finished); block dropped
    Stale,
    /// Last block landed and the digest matched; piece is finished
    PieceVerified(PieceIndex),
    /// Last block landed but the digest did not match; piece is needed again
    PieceCorrupt(PieceIndex),
}

/// Whether an arrived block may be written to the output file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockCheck {
    /// Requested and not yet received; write it, then feed the digest
    Fresh,
    /// Offset already hashed or parked; the stored copy must not change
    Duplicate,
    /// Piece is no longer pending
    Stale,
}

/// Queue sizes at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerProgress {
    pub needed: u32,
    pub pending: u32,
    pub finished: u32,
    pub total: u32,
}

impl SchedulerProgress {
    /// Fraction of pieces verified (0.0 to 1.0).
    pub fn fraction_finished(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        self.finished as f32 / self.total as f32
    }
}

#[derive(Debug)]
struct RarityEntry {
    piece: Piece,
    rarity: u32,
}

/// Owns the needed/pending/finished queues for one download.
#[derive(Debug)]
pub struct PieceScheduler {
    total_size: u64,
    piece_count: u32,
    needed: Vec<RarityEntry>,
    pending: VecDeque<RarityEntry>,
    finished: BTreeMap<PieceIndex, Piece>,
    started_at: Instant,
}

impl PieceScheduler {
    /// Builds one piece per metadata entry and shuffles the needed queue.
    ///
    /// The shuffle spreads early requests from different peers across the
    /// file. A configured seed makes the order reproducible.
    ///
    /// # Errors
    /// - `TorrentError::InvalidMetadata` - Metadata without pieces
    pub fn new(metadata: &TorrentMetadata, config: &SchedulerConfig) -> Result<Self, TorrentError> {
        let piece_count = metadata.piece_count();
        if piece_count == 0 {
            return Err(TorrentError::InvalidMetadata {
                reason: "torrent has no pieces".to_string(),
            });
        }

        let mut needed = Vec::with_capacity(piece_count as usize);
        for (i, hash) in metadata.piece_hashes.iter().enumerate() {
            let index = PieceIndex::new(i as u32);
            let length = metadata.piece_size(index)?;
            needed.push(RarityEntry {
                piece: Piece::new(index, *hash, length),
                rarity: 0,
            });
        }

        match config.shuffle_seed {
            Some(seed) => needed.shuffle(&mut ChaCha8Rng::seed_from_u64(seed)),
            None => needed.shuffle(&mut rand::rng()),
        }

        tracing::debug!(
            "Scheduler initialized: {} pieces, {} bytes",
            piece_count,
            metadata.total_length
        );

        Ok(Self {
            total_size: metadata.total_length,
            piece_count,
            needed,
            pending: VecDeque::new(),
            finished: BTreeMap::new(),
            started_at: Instant::now(),
        })
    }

    pub fn piece_count(&self) -> u32 {
        self.piece_count
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Records that one more peer owns `index`.
    ///
    /// Only pieces still in `needed` are counted. Indices outside the torrent
    /// are ignored so malformed peer messages cannot disturb scheduling.
    pub fn record_have(&mut self, index: PieceIndex) {
        if index.as_u32() >= self.piece_count {
            tracing::debug!("Ignoring have for out-of-range piece {}", index);
            return;
        }

        if let Some(entry) = self.needed.iter_mut().find(|e| e.piece.index() == index) {
            entry.rarity = entry.rarity.saturating_add(1);
        }
    }

    /// Applies a peer's full bitfield as one `have` per set bit.
    pub fn record_bitfield(&mut self, bitfield: &Bitfield) {
        for index in bitfield.iter_set() {
            self.record_have(index);
        }
    }

    /// Picks the piece the requesting peer should work on next.
    ///
    /// Pending pieces with unrequested blocks are re-issued first, oldest
    /// first, regardless of what the peer advertises. Otherwise the rarest
    /// needed piece the peer has is moved to `pending`; ties go to the piece
    /// earliest in the shuffled queue. `None` means this peer has nothing we
    /// need right now.
    pub fn select_next(&mut self, available: &Bitfield) -> Option<PieceIndex> {
        if let Some(entry) = self
            .pending
            .iter()
            .find(|e| e.piece.has_unrequested_blocks())
        {
            return Some(entry.piece.index());
        }

        let position = self
            .needed
            .iter()
            .enumerate()
            .filter(|(_, entry)| available.has(entry.piece.index()))
            .min_by_key(|(_, entry)| entry.rarity)
            .map(|(position, _)| position)?;

        let entry = self.needed.remove(position);
        let index = entry.piece.index();
        tracing::debug!("Selected piece {} (rarity {})", index, entry.rarity);
        self.pending.push_back(entry);
        Some(index)
    }

    /// Hands out the next unrequested block of a pending piece and advances
    /// its cursor.
    pub fn request_block(&mut self, index: PieceIndex) -> Option<BlockRequest> {
        let entry = self.pending.iter_mut().find(|e| e.piece.index() == index)?;
        let length = entry.piece.next_block_length()?;
        let request = BlockRequest {
            piece_index: index,
            offset: entry.piece.offset(),
            length,
        };
        entry.piece.advance(length);
        Some(request)
    }

    /// Selects a piece for the peer and requests its next block.
    pub fn next_request(&mut self, available: &Bitfield) -> Option<BlockRequest> {
        let index = self.select_next(available)?;
        self.request_block(index)
    }

    /// Classifies a block before it is persisted.
    ///
    /// Only `BlockCheck::Fresh` blocks may touch the output file: a second
    /// copy of an offset the digest already consumed would otherwise leave
    /// the disk disagreeing with the verified hash.
    ///
    /// # Errors
    /// - `TorrentError::InvalidPieceIndex` - Index outside the torrent
    /// - `TorrentError::InvalidBlock` - Offset or length was never requested
    pub fn check_block(
        &self,
        index: PieceIndex,
        offset: u32,
        length: u32,
    ) -> Result<BlockCheck, TorrentError> {
        if index.as_u32() >= self.piece_count {
            return Err(TorrentError::InvalidPieceIndex { index });
        }

        let Some(entry) = self.pending.iter().find(|e| e.piece.index() == index) else {
            return Ok(BlockCheck::Stale);
        };

        let piece = &entry.piece;
        let requested = offset < piece.offset();
        if !requested || piece.block_length_at(offset) != Some(length) {
            return Err(TorrentError::InvalidBlock {
                index,
                offset,
                length,
            });
        }
        if !piece.is_pending_offset(offset) {
            return Ok(BlockCheck::Duplicate);
        }
        Ok(BlockCheck::Fresh)
    }

    /// Feeds a persisted block into its piece's digest.
    ///
    /// When the final block lands the piece is verified: a match moves it to
    /// `finished`, a mismatch resets it and returns it to `needed` with its
    /// rarity intact.
    ///
    /// # Errors
    /// - `TorrentError::InvalidPieceIndex` - Index outside the torrent
    /// - `TorrentError::InvalidBlock` - Offset or length was never requested
    pub fn block_received(
        &mut self,
        index: PieceIndex,
        offset: u32,
        data: Bytes,
    ) -> Result<BlockOutcome, TorrentError> {
        match self.check_block(index, offset, data.len() as u32)? {
            BlockCheck::Fresh => {}
            BlockCheck::Duplicate => return Ok(BlockOutcome::Duplicate),
            BlockCheck::Stale => return Ok(BlockOutcome::Stale),
        }

        let Some(position) = self.pending.iter().position(|e| e.piece.index() == index) else {
            return Ok(BlockOutcome::Stale);
        };

        match self.pending[position].piece.accept_block(offset, data) {
            BlockAcceptance::Duplicate => Ok(BlockOutcome::Duplicate),
            BlockAcceptance::Buffered => Ok(BlockOutcome::Accepted),
            BlockAcceptance::Complete => {
                let Some(mut entry) = self.pending.remove(position) else {
                    return Ok(BlockOutcome::Stale);
                };

                if entry.piece.verify() {
                    tracing::debug!("Piece {} verified", index);
                    self.finished.insert(index, entry.piece);
                    Ok(BlockOutcome::PieceVerified(index))
                } else {
                    tracing::warn!("Piece {} failed hash verification, requeueing", index);
                    entry.piece.reset();
                    self.needed.push(entry);
                    Ok(BlockOutcome::PieceCorrupt(index))
                }
            }
        }
    }

    /// Returns an abandoned pending piece to `needed`.
    ///
    /// Partial progress is discarded; the piece restarts from its first block
    /// and keeps the rarity count it had when it was selected. Returns false
    /// if the piece was not pending.
    pub fn abandon(&mut self, index: PieceIndex) -> bool {
        let Some(position) = self.pending.iter().position(|e| e.piece.index() == index) else {
            return false;
        };
        let Some(mut entry) = self.pending.remove(position) else {
            return false;
        };

        tracing::debug!("Piece {} abandoned, returning to needed", index);
        entry.piece.reset();
        self.needed.push(entry);
        true
    }

    /// True once nothing is needed or pending and no peer is still waiting
    /// on a response.
    pub fn check_done(&self, peers_waiting: bool) -> bool {
        self.needed.is_empty() && self.pending.is_empty() && !peers_waiting
    }

    /// Throughput report measured from scheduler creation until now.
    pub fn completion_report(&self) -> CompletionReport {
        CompletionReport::new(self.total_size, self.started_at.elapsed())
    }

    pub fn progress(&self) -> SchedulerProgress {
        SchedulerProgress {
            needed: self.needed.len() as u32,
            pending: self.pending.len() as u32,
            finished: self.finished.len() as u32,
            total: self.piece_count,
        }
    }

    /// Queue the given piece currently sits in.
    pub fn piece_state(&self, index: PieceIndex) -> Option<PieceState> {
        if self.needed.iter().any(|e| e.piece.index() == index) {
            Some(PieceState::Needed)
        } else if self.pending.iter().any(|e| e.piece.index() == index) {
            Some(PieceState::Pending)
        } else if self.finished.contains_key(&index) {
            Some(PieceState::Finished)
        } else {
            None
        }
    }

    /// Rarity count of a needed or pending piece.
    pub fn rarity(&self, index: PieceIndex) -> Option<u32> {
        self.needed
            .iter()
            .chain(self.pending.iter())
            .find(|e| e.piece.index() == index)
            .map(|e| e.rarity)
    }

    /// Piece record, wherever it currently lives.
    pub fn piece(&self, index: PieceIndex) -> Option<&Piece> {
        self.needed
            .iter()
            .chain(self.pending.iter())
            .map(|e| &e.piece)
            .find(|piece| piece.index() == index)
            .or_else(|| self.finished.get(&index))
    }

    /// Needed pieces in selection order.
    pub fn needed_order(&self) -> Vec<PieceIndex> {
        self.needed.iter().map(|e| e.piece.index()).collect()
    }

    /// Pending pieces, oldest first.
    pub fn pending_order(&self) -> Vec<PieceIndex> {
        self.pending.iter().map(|e| e.piece.index()).collect()
    }

    /// Finished pieces, ascending.
    pub fn finished_indices(&self) -> Vec<PieceIndex> {
        self.finished.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;
    use crate::torrent::BLOCK_SIZE;
    use crate::torrent::test_data::{block_of, create_test_torrent};

    fn seeded() -> SchedulerConfig {
        SchedulerConfig {
            shuffle_seed: Some(7),
            ..SchedulerConfig::default()
        }
    }

    fn scheduler_for(length: usize, piece_length: u32) -> (PieceScheduler, TorrentMetadata, Vec<u8>) {
        let (metadata, content) = create_test_torrent(length, piece_length);
        let scheduler = PieceScheduler::new(&metadata, &seeded()).unwrap();
        (scheduler, metadata, content)
    }

    fn only(piece_count: u32, indices: &[u32]) -> Bitfield {
        let mut bitfield = Bitfield::new(piece_count);
        for &i in indices {
            bitfield.set(PieceIndex::new(i));
        }
        bitfield
    }

    fn assert_partition(scheduler: &PieceScheduler) {
        let mut seen = HashSet::new();
        for index in scheduler
            .needed_order()
            .into_iter()
            .chain(scheduler.pending_order())
            .chain(scheduler.finished_indices())
        {
            assert!(seen.insert(index), "piece {index} in more than one queue");
        }
        assert_eq!(seen.len() as u32, scheduler.piece_count());
    }

    fn deliver_piece(
        scheduler: &mut PieceScheduler,
        metadata: &TorrentMetadata,
        content: &[u8],
        index: PieceIndex,
    ) -> BlockOutcome {
        let mut outcome = BlockOutcome::Stale;
        while let Some(request) = scheduler.request_block(index) {
            let data = block_of(metadata, content, index, request.offset, request.length);
            outcome = scheduler
                .block_received(index, request.offset, Bytes::from(data))
                .unwrap();
        }
        outcome
    }

    #[test]
    fn test_initial_state_all_needed() {
        let (scheduler, metadata, _) = scheduler_for(100_000, 32_768);

        assert_eq!(scheduler.progress().needed, 4);
        assert_partition(&scheduler);

        let total: u64 = (0..4)
            .map(|i| u64::from(scheduler.piece(PieceIndex::new(i)).unwrap().length()))
            .sum();
        assert_eq!(total, metadata.total_length);
        assert_eq!(scheduler.piece(PieceIndex::new(3)).unwrap().length(), 1_696);
        assert_eq!(scheduler.piece(PieceIndex::new(0)).unwrap().num_blocks(), 2);
    }

    #[test]
    fn test_seeded_shuffle_is_reproducible() {
        let (metadata, _) = create_test_torrent(64 * 1024, 1024);
        let first = PieceScheduler::new(&metadata, &seeded()).unwrap();
        let second = PieceScheduler::new(&metadata, &seeded()).unwrap();

        assert_eq!(first.needed_order(), second.needed_order());
        let sorted: Vec<PieceIndex> = (0..64).map(PieceIndex::new).collect();
        assert_ne!(first.needed_order(), sorted);
    }

    #[test]
    fn test_rarest_first() {
        let (mut scheduler, _, _) = scheduler_for(5 * 16_384, 16_384);
        let rare = PieceIndex::new(1);
        let common = PieceIndex::new(3);
        for _ in 0..2 {
            scheduler.record_have(rare);
        }
        for _ in 0..5 {
            scheduler.record_have(common);
        }

        let selected = scheduler.select_next(&only(5, &[1, 3]));
        assert_eq!(selected, Some(rare));
        assert_eq!(scheduler.piece_state(rare), Some(PieceState::Pending));
        assert_eq!(scheduler.piece_state(common), Some(PieceState::Needed));
    }

    #[test]
    fn test_ties_follow_queue_order() {
        let (mut scheduler, _, _) = scheduler_for(8 * 16_384, 16_384);
        let head = scheduler.needed_order()[0];

        assert_eq!(scheduler.select_next(&Bitfield::full(8)), Some(head));
    }

    #[test]
    fn test_nothing_available_is_not_an_error() {
        let (mut scheduler, _, _) = scheduler_for(4 * 16_384, 16_384);

        assert_eq!(scheduler.select_next(&Bitfield::new(4)), None);
        assert_eq!(scheduler.progress().needed, 4);
    }

    #[test]
    fn test_selection_respects_availability() {
        let (mut scheduler, _, _) = scheduler_for(6 * 16_384, 16_384);
        let available = only(6, &[2, 4]);

        let request = scheduler.next_request(&available).unwrap();
        assert!(available.has(request.piece_index));
        let request = scheduler.next_request(&available).unwrap();
        assert!(available.has(request.piece_index));
        assert_eq!(scheduler.next_request(&available), None);
    }

    #[test]
    fn test_pending_reissue_ignores_availability() {
        let (mut scheduler, _, _) = scheduler_for(4 * 32_768, 32_768);

        let first = scheduler.select_next(&only(4, &[0])).unwrap();
        assert_eq!(first, PieceIndex::new(0));

        // Piece 0 still has unrequested blocks, so it is re-issued even to a
        // peer that only advertises piece 2.
        let request = scheduler.next_request(&only(4, &[2])).unwrap();
        assert_eq!(request.piece_index, PieceIndex::new(0));
        assert_eq!(request.offset, 0);

        let request = scheduler.next_request(&only(4, &[2])).unwrap();
        assert_eq!(request.piece_index, PieceIndex::new(0));
        assert_eq!(request.offset, BLOCK_SIZE);

        // Fully requested pending pieces fall through to fresh selection.
        let request = scheduler.next_request(&only(4, &[2])).unwrap();
        assert_eq!(request.piece_index, PieceIndex::new(2));
        assert_partition(&scheduler);
    }

    #[test]
    fn test_have_ignored_when_out_of_range_or_not_needed() {
        let (mut scheduler, _, _) = scheduler_for(3 * 16_384, 16_384);
        scheduler.record_have(PieceIndex::new(3));
        scheduler.record_have(PieceIndex::new(u32::MAX));

        let index = scheduler.select_next(&only(3, &[1])).unwrap();
        scheduler.record_have(index);
        assert_eq!(scheduler.rarity(index), Some(0));
        assert_partition(&scheduler);
    }

    #[test]
    fn test_record_bitfield_counts_every_set_bit() {
        let (mut scheduler, _, _) = scheduler_for(10 * 16_384, 16_384);
        scheduler.record_bitfield(&only(10, &[0, 9]));
        scheduler.record_bitfield(&only(10, &[9]));

        assert_eq!(scheduler.rarity(PieceIndex::new(0)), Some(1));
        assert_eq!(scheduler.rarity(PieceIndex::new(9)), Some(2));
        assert_eq!(scheduler.rarity(PieceIndex::new(5)), Some(0));
    }

    #[test]
    fn test_full_download_reaches_done() {
        let (mut scheduler, metadata, content) = scheduler_for(100_000, 32_768);
        let everything = Bitfield::full(metadata.piece_count());

        while let Some(index) = scheduler.select_next(&everything) {
            assert!(!scheduler.check_done(false));
            let outcome = deliver_piece(&mut scheduler, &metadata, &content, index);
            assert_eq!(outcome, BlockOutcome::PieceVerified(index));
            assert!(scheduler.piece(index).unwrap().is_downloaded());
            assert_partition(&scheduler);
        }

        assert_eq!(scheduler.progress().finished, 4);
        assert!(!scheduler.check_done(true));
        assert!(scheduler.check_done(false));

        let report = scheduler.completion_report();
        assert_eq!(report.total_size, 100_000);
        assert_eq!(
            report.average_speed,
            100_000.0 / report.elapsed.max(std::time::Duration::from_nanos(1)).as_secs_f64()
        );
    }

    #[test]
    fn test_out_of_order_blocks_complete_piece() {
        let (mut scheduler, metadata, content) = scheduler_for(40_000, 40_000);
        let index = scheduler.select_next(&Bitfield::full(1)).unwrap();
        let requests: Vec<BlockRequest> =
            std::iter::from_fn(|| scheduler.request_block(index)).collect();
        assert_eq!(
            requests.iter().map(|r| r.length).collect::<Vec<_>>(),
            vec![16_384, 16_384, 7_232]
        );

        let mut outcomes = Vec::new();
        for request in requests.iter().rev() {
            let data = block_of(&metadata, &content, index, request.offset, request.length);
            outcomes.push(
                scheduler
                    .block_received(index, request.offset, Bytes::from(data))
                    .unwrap(),
            );
        }
        assert_eq!(
            outcomes,
            vec![
                BlockOutcome::Accepted,
                BlockOutcome::Accepted,
                BlockOutcome::PieceVerified(index)
            ]
        );
    }

    #[test]
    fn test_corrupt_piece_returns_to_needed_with_rarity() {
        let (mut scheduler, metadata, _) = scheduler_for(2 * 16_384, 16_384);
        let index = PieceIndex::new(1);
        scheduler.record_have(index);
        scheduler.record_have(index);

        assert_eq!(scheduler.select_next(&only(2, &[1])), Some(index));
        let request = scheduler.request_block(index).unwrap();
        let garbage = Bytes::from(vec![0xee; request.length as usize]);

        let outcome = scheduler
            .block_received(index, request.offset, garbage)
            .unwrap();
        assert_eq!(outcome, BlockOutcome::PieceCorrupt(index));
        assert_eq!(scheduler.piece_state(index), Some(PieceState::Needed));
        assert_eq!(scheduler.rarity(index), Some(2));

        let piece = scheduler.piece(index).unwrap();
        assert_eq!(piece.offset(), 0);
        assert!(!piece.is_downloaded());
        assert_eq!(metadata.piece_count(), 2);
        assert_partition(&scheduler);
    }

    #[test]
    fn test_abandon_preserves_rarity_and_is_eligible_again() {
        let (mut scheduler, _, _) = scheduler_for(3 * 32_768, 32_768);
        let index = PieceIndex::new(2);
        for _ in 0..3 {
            scheduler.record_have(index);
        }

        assert_eq!(scheduler.select_next(&only(3, &[2])), Some(index));
        scheduler.request_block(index).unwrap();
        assert!(scheduler.abandon(index));
        assert!(!scheduler.abandon(index));

        assert_eq!(scheduler.piece_state(index), Some(PieceState::Needed));
        assert_eq!(scheduler.rarity(index), Some(3));
        assert_eq!(scheduler.piece(index).unwrap().offset(), 0);

        let request = scheduler.next_request(&only(3, &[2])).unwrap();
        assert_eq!(request.piece_index, index);
        assert_eq!(request.offset, 0);
    }

    #[test]
    fn test_invalid_and_stale_blocks() {
        let (mut scheduler, _, _) = scheduler_for(2 * 32_768, 32_768);
        let index = scheduler.select_next(&Bitfield::full(2)).unwrap();
        scheduler.request_block(index).unwrap();

        // Second block was never requested.
        let result = scheduler.block_received(index, BLOCK_SIZE, Bytes::from(vec![0; 16_384]));
        assert!(matches!(result, Err(TorrentError::InvalidBlock { .. })));

        // Wrong length for the requested block.
        let result = scheduler.block_received(index, 0, Bytes::from(vec![0; 100]));
        assert!(matches!(result, Err(TorrentError::InvalidBlock { .. })));

        let result = scheduler.block_received(PieceIndex::new(9), 0, Bytes::new());
        assert!(matches!(result, Err(TorrentError::InvalidPieceIndex { .. })));

        let other = PieceIndex::new(1 - index.as_u32());
        let outcome = scheduler
            .block_received(other, 0, Bytes::from(vec![0; 16_384]))
            .unwrap();
        assert_eq!(outcome, BlockOutcome::Stale);
    }

    #[test]
    fn test_duplicate_block_is_reported() {
        let (mut scheduler, metadata, content) = scheduler_for(2 * 32_768, 32_768);
        let index = scheduler.select_next(&Bitfield::full(2)).unwrap();
        let request = scheduler.request_block(index).unwrap();
        let data = Bytes::from(block_of(&metadata, &content, index, 0, request.length));

        assert_eq!(
            scheduler.block_received(index, 0, data.clone()).unwrap(),
            BlockOutcome::Accepted
        );
        assert_eq!(
            scheduler.check_block(index, 0, request.length).unwrap(),
            BlockCheck::Duplicate
        );
        assert_eq!(
            scheduler.block_received(index, 0, data).unwrap(),
            BlockOutcome::Duplicate
        );
    }

    #[test]
    fn test_check_block_classifies_before_write() {
        let (mut scheduler, metadata, content) = scheduler_for(2 * 32_768, 32_768);
        let index = scheduler.select_next(&Bitfield::full(2)).unwrap();
        let first = scheduler.request_block(index).unwrap();
        let second = scheduler.request_block(index).unwrap();
        let other = PieceIndex::new(1 - index.as_u32());

        assert_eq!(
            scheduler.check_block(index, second.offset, second.length).unwrap(),
            BlockCheck::Fresh
        );
        assert_eq!(
            scheduler.check_block(other, 0, BLOCK_SIZE).unwrap(),
            BlockCheck::Stale
        );

        // Parked ahead of the digest still counts as received.
        let data = block_of(&metadata, &content, index, second.offset, second.length);
        scheduler
            .block_received(index, second.offset, Bytes::from(data))
            .unwrap();
        assert_eq!(
            scheduler.check_block(index, second.offset, second.length).unwrap(),
            BlockCheck::Duplicate
        );
        assert_eq!(
            scheduler.check_block(index, first.offset, first.length).unwrap(),
            BlockCheck::Fresh
        );
    }

    #[derive(Debug, Clone)]
    enum Op {
        Have(u32),
        Select(Vec<bool>),
        Request,
        Deliver,
        Abandon,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u32..12).prop_map(Op::Have),
            proptest::collection::vec(any::<bool>(), 10).prop_map(Op::Select),
            Just(Op::Request),
            Just(Op::Deliver),
            Just(Op::Abandon),
        ]
    }

    proptest! {
        #[test]
        fn prop_queues_always_partition_pieces(ops in proptest::collection::vec(op_strategy(), 1..80)) {
            let (mut scheduler, metadata, content) = scheduler_for(10 * 20_000, 20_000);

            for op in ops {
                match op {
                    Op::Have(i) => scheduler.record_have(PieceIndex::new(i)),
                    Op::Select(bits) => {
                        let available = Bitfield::from_pieces(&bits);
                        let reissue: Vec<PieceIndex> = scheduler
                            .pending_order()
                            .into_iter()
                            .filter(|&i| scheduler.piece(i).unwrap().has_unrequested_blocks())
                            .collect();
                        if let Some(index) = scheduler.select_next(&available) {
                            prop_assert!(available.has(index) || reissue.contains(&index));
                        }
                    }
                    Op::Request => {
                        if let Some(&index) = scheduler.pending_order().first() {
                            scheduler.request_block(index);
                        }
                    }
                    Op::Deliver => {
                        if let Some(&index) = scheduler.pending_order().first() {
                            deliver_piece(&mut scheduler, &metadata, &content, index);
                        }
                    }
                    Op::Abandon => {
                        if let Some(&index) = scheduler.pending_order().last() {
                            scheduler.abandon(index);
                        }
                    }
                }
                assert_partition(&scheduler);
            }
        }
    }
}
