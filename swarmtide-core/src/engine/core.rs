//! Engine state owned by the actor task.
//!
//! Wraps the scheduler with the output file and the per-peer bookkeeping the
//! scheduler itself does not know about: which blocks each peer still owes
//! and which peers are waiting on a response.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use super::commands::{EngineEvent, PieceFailure};
use crate::storage::FileStore;
use crate::torrent::{
    Bitfield, BlockCheck, BlockOutcome, BlockRequest, PieceIndex, PieceScheduler, SchedulerProgress,
    TorrentError,
};

/// Scheduler plus storage for a single download.
pub struct SchedulerEngine {
    scheduler: PieceScheduler,
    store: Arc<FileStore>,
    outstanding: HashMap<SocketAddr, HashSet<BlockRequest>>,
    waiting: HashSet<SocketAddr>,
    events: mpsc::UnboundedSender<EngineEvent>,
    completed: bool,
}

impl SchedulerEngine {
    pub fn new(
        scheduler: PieceScheduler,
        store: Arc<FileStore>,
        events: mpsc::UnboundedSender<EngineEvent>,
    ) -> Self {
        Self {
            scheduler,
            store,
            outstanding: HashMap::new(),
            waiting: HashSet::new(),
            events,
            completed: false,
        }
    }

    pub fn record_have(&mut self, index: PieceIndex) {
        self.scheduler.record_have(index);
    }

    pub fn record_bitfield(&mut self, bitfield: &Bitfield) {
        self.scheduler.record_bitfield(bitfield);
    }

    /// Hands the peer its next block and remembers it as outstanding.
    pub fn next_request(&mut self, peer: SocketAddr, available: &Bitfield) -> Option<BlockRequest> {
        if self.completed {
            return None;
        }

        let request = self.scheduler.next_request(available)?;
        self.outstanding.entry(peer).or_default().insert(request);
        tracing::trace!(
            "Peer {} assigned piece {} offset {} length {}",
            peer,
            request.piece_index,
            request.offset,
            request.length
        );
        Some(request)
    }

    /// Validates, persists, then hashes an arrived block.
    ///
    /// Duplicates are dropped before the write so the file always holds the
    /// bytes the digest consumed. A storage failure abandons the piece so it
    /// is downloaded again.
    ///
    /// # Errors
    /// - `TorrentError::InvalidPieceIndex` - Index outside the torrent
    /// - `TorrentError::InvalidBlock` - Block was never requested
    /// - `TorrentError::Storage` - Block could not be written
    pub async fn block_received(
        &mut self,
        peer: SocketAddr,
        index: PieceIndex,
        offset: u32,
        data: Bytes,
    ) -> Result<BlockOutcome, TorrentError> {
        let length = data.len() as u32;
        if let Some(requests) = self.outstanding.get_mut(&peer) {
            requests.remove(&BlockRequest {
                piece_index: index,
                offset,
                length,
            });
        }

        match self.scheduler.check_block(index, offset, length)? {
            BlockCheck::Fresh => {}
            BlockCheck::Duplicate => {
                tracing::debug!(
                    "Dropping duplicate block for piece {} offset {} from {}",
                    index,
                    offset,
                    peer
                );
                return Ok(BlockOutcome::Duplicate);
            }
            BlockCheck::Stale => {
                tracing::debug!("Dropping stale block for piece {} from {}", index, peer);
                return Ok(BlockOutcome::Stale);
            }
        }

        if let Err(e) = self.store.write_block(index, offset, data.clone()).await {
            tracing::error!("Failed to write block of piece {}: {}", index, e);
            self.abandon_piece(index, PieceFailure::Storage);
            return Err(e.into());
        }

        let outcome = self.scheduler.block_received(index, offset, data)?;
        match outcome {
            BlockOutcome::PieceVerified(index) => {
                self.forget_piece(index);
                self.emit(EngineEvent::PieceVerified(index));
            }
            BlockOutcome::PieceCorrupt(index) => {
                self.forget_piece(index);
                self.emit(EngineEvent::PieceFailed {
                    index,
                    reason: PieceFailure::HashMismatch,
                });
            }
            BlockOutcome::Accepted | BlockOutcome::Duplicate | BlockOutcome::Stale => {}
        }
        Ok(outcome)
    }

    /// A peer could not deliver a block; its piece starts over.
    ///
    /// Reports for requests the peer no longer owes (the piece was already
    /// abandoned, finished or restarted) are ignored.
    pub fn block_failed(&mut self, peer: SocketAddr, request: BlockRequest) {
        let owed = self
            .outstanding
            .get_mut(&peer)
            .is_some_and(|requests| requests.remove(&request));
        if !owed {
            tracing::debug!(
                "Ignoring failure of piece {} offset {} no longer owed by {}",
                request.piece_index,
                request.offset,
                peer
            );
            return;
        }
        tracing::debug!(
            "Peer {} failed block at piece {} offset {}",
            peer,
            request.piece_index,
            request.offset
        );
        self.abandon_piece(request.piece_index, PieceFailure::RequestFailed);
    }

    /// Abandons every piece the peer still owed blocks for.
    pub fn peer_disconnected(&mut self, peer: SocketAddr) {
        self.waiting.remove(&peer);
        let Some(requests) = self.outstanding.remove(&peer) else {
            return;
        };

        let pieces: HashSet<PieceIndex> = requests.iter().map(|r| r.piece_index).collect();
        tracing::debug!(
            "Peer {} disconnected with {} outstanding pieces",
            peer,
            pieces.len()
        );
        for index in pieces {
            self.abandon_piece(index, PieceFailure::PeerDisconnected);
        }
    }

    pub fn set_peer_waiting(&mut self, peer: SocketAddr, waiting: bool) {
        if waiting {
            self.waiting.insert(peer);
        } else {
            self.waiting.remove(&peer);
        }
    }

    pub fn progress(&self) -> SchedulerProgress {
        self.scheduler.progress()
    }

    pub fn outstanding_for(&self, peer: SocketAddr) -> usize {
        self.outstanding.get(&peer).map_or(0, HashSet::len)
    }

    /// Reports whether the download is done, finalizing it the first time.
    ///
    /// Finalizing closes the output file and emits `Completed` once.
    ///
    /// # Errors
    /// - `TorrentError::Storage` - Output file could not be flushed
    pub async fn check_done(&mut self) -> Result<bool, TorrentError> {
        if self.completed {
            return Ok(true);
        }
        if !self.scheduler.check_done(!self.waiting.is_empty()) {
            return Ok(false);
        }

        self.store.close().await?;
        self.completed = true;

        let report = self.scheduler.completion_report();
        tracing::info!("Download complete: {}", report);
        self.emit(EngineEvent::Completed(report));
        Ok(true)
    }

    /// Releases the output file without finishing the download.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.store.close().await {
            tracing::warn!("Failed to close output file on shutdown: {}", e);
        }
    }

    fn abandon_piece(&mut self, index: PieceIndex, reason: PieceFailure) {
        self.forget_piece(index);
        if self.scheduler.abandon(index) {
            self.emit(EngineEvent::PieceFailed { index, reason });
        }
    }

    fn forget_piece(&mut self, index: PieceIndex) {
        for requests in self.outstanding.values_mut() {
            requests.retain(|r| r.piece_index != index);
        }
    }

    fn emit(&self, event: EngineEvent) {
        // Nobody listening is fine.
        let _ = self.events.send(event);
    }
}
