//! Simulated peers driving the scheduler engine.
//!
//! A seeder announces its bitfield, then loops on `next_request`, serving
//! each block from the source content (or failing or corrupting it, per the
//! configured fault rates). A leecher repeatedly pulls ranges we announce
//! through `read_range`, flagging itself as waiting while it does.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use swarmtide_core::engine::EngineHandle;
use swarmtide_core::storage::StorageError;
use swarmtide_core::torrent::{
    BLOCK_SIZE, Bitfield, BlockOutcome, BlockRequest, PieceIndex, TorrentError, TorrentMetadata,
};

use crate::SimulationError;

/// Pause before asking again when the engine had nothing for a peer.
const IDLE_BACKOFF: Duration = Duration::from_millis(1);

/// Pause between two leecher reads.
const LEECH_INTERVAL: Duration = Duration::from_millis(2);

/// Role a simulated peer plays in the swarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// Serves blocks to us
    Seeder,
    /// Downloads blocks from us
    Leecher,
}

/// A simulated remote peer.
#[derive(Debug, Clone)]
pub struct SimulatedPeer {
    addr: SocketAddr,
    role: PeerRole,
    bitfield: Bitfield,
    seed: u64,
}

impl SimulatedPeer {
    /// Creates a peer announcing `bitfield`, with faults drawn from `seed`.
    pub fn new(addr: SocketAddr, role: PeerRole, bitfield: Bitfield, seed: u64) -> Self {
        Self {
            addr,
            role,
            bitfield,
            seed,
        }
    }

    /// Address the engine knows this peer by.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Whether the peer serves or downloads.
    pub fn role(&self) -> PeerRole {
        self.role
    }

    /// Pieces the peer announces.
    pub fn bitfield(&self) -> &Bitfield {
        &self.bitfield
    }
}

/// What one peer did during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerSummary {
    /// Peer address
    pub addr: SocketAddr,
    /// Seeder or leecher
    pub role: PeerRole,
    /// Requests handed to the peer by the engine
    pub requests: u64,
    /// Blocks delivered to the engine
    pub blocks_served: u64,
    /// Requests reported as failed
    pub failures_injected: u64,
    /// Blocks delivered with a flipped byte
    pub corruptions_injected: u64,
    /// Pieces whose final block came from this peer and verified
    pub pieces_verified: u64,
    /// Blocks the engine dropped because their piece was no longer pending
    pub stale_blocks: u64,
    /// Bytes read from us by a leecher
    pub bytes_uploaded: u64,
}

impl PeerSummary {
    fn new(peer: &SimulatedPeer) -> Self {
        Self {
            addr: peer.addr,
            role: peer.role,
            requests: 0,
            blocks_served: 0,
            failures_injected: 0,
            corruptions_injected: 0,
            pieces_verified: 0,
            stale_blocks: 0,
            bytes_uploaded: 0,
        }
    }
}

/// Shared inputs for every peer task in one run.
#[derive(Clone)]
pub(crate) struct PeerContext {
    pub handle: EngineHandle,
    pub content: Bytes,
    pub metadata: Arc<TorrentMetadata>,
    pub corrupt_rate: f64,
    pub failure_rate: f64,
    pub latency: Duration,
    pub done: Arc<AtomicBool>,
}

/// Serves blocks until the engine reports completion.
pub(crate) async fn run_seeder(
    peer: SimulatedPeer,
    context: PeerContext,
) -> Result<PeerSummary, SimulationError> {
    let mut summary = PeerSummary::new(&peer);
    let mut rng = ChaCha8Rng::seed_from_u64(peer.seed);
    let handle = &context.handle;

    handle.record_bitfield(peer.bitfield.clone()).await?;

    while !context.done.load(Ordering::Acquire) {
        let Some(request) = handle.next_request(peer.addr, peer.bitfield.clone()).await? else {
            if handle.check_done().await? {
                context.done.store(true, Ordering::Release);
                break;
            }
            tokio::time::sleep(IDLE_BACKOFF).await;
            continue;
        };
        summary.requests += 1;

        if !context.latency.is_zero() {
            tokio::time::sleep(context.latency).await;
        }

        if rng.random_bool(context.failure_rate) {
            summary.failures_injected += 1;
            handle.block_failed(peer.addr, request).await?;
            continue;
        }

        let mut data = block_bytes(&context, &request);
        if rng.random_bool(context.corrupt_rate) {
            summary.corruptions_injected += 1;
            let mut corrupted = data.to_vec();
            corrupted[0] ^= 0xFF;
            data = Bytes::from(corrupted);
        }

        let outcome = handle
            .block_received(peer.addr, request.piece_index, request.offset, data)
            .await?;
        summary.blocks_served += 1;
        match outcome {
            BlockOutcome::PieceVerified(_) => summary.pieces_verified += 1,
            BlockOutcome::Stale => summary.stale_blocks += 1,
            BlockOutcome::Accepted | BlockOutcome::Duplicate | BlockOutcome::PieceCorrupt(_) => {}
        }
    }

    handle.peer_disconnected(peer.addr).await?;
    tracing::debug!(
        "Seeder {} finished: {} blocks served",
        peer.addr,
        summary.blocks_served
    );
    Ok(summary)
}

/// Reads announced pieces from us until the download is complete.
pub(crate) async fn run_leecher(
    peer: SimulatedPeer,
    context: PeerContext,
) -> Result<PeerSummary, SimulationError> {
    let mut summary = PeerSummary::new(&peer);
    let mut rng = ChaCha8Rng::seed_from_u64(peer.seed);
    let handle = &context.handle;

    while !context.done.load(Ordering::Acquire) {
        let announced: Vec<PieceIndex> = handle.bitfield().iter_set().collect();
        if announced.is_empty() {
            tokio::time::sleep(IDLE_BACKOFF).await;
            continue;
        }

        let index = announced[rng.random_range(0..announced.len())];
        let length = context.metadata.piece_size(index)?.min(BLOCK_SIZE);

        summary.requests += 1;
        handle.set_peer_waiting(peer.addr, true).await?;
        let result = handle.read_range(index, 0, length).await;
        handle.set_peer_waiting(peer.addr, false).await?;

        match result {
            Ok(data) => summary.bytes_uploaded += data.len() as u64,
            Err(TorrentError::Storage(StorageError::Closed)) => break,
            Err(e) => return Err(e.into()),
        }
        tokio::time::sleep(LEECH_INTERVAL).await;
    }

    handle.peer_disconnected(peer.addr).await?;
    Ok(summary)
}

fn block_bytes(context: &PeerContext, request: &BlockRequest) -> Bytes {
    let start = (context.metadata.piece_offset(request.piece_index)
        + u64::from(request.offset)) as usize;
    context
        .content
        .slice(start..start + request.length as usize)
}
