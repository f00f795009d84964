//! Command and event definitions for the scheduler engine actor.

use std::net::SocketAddr;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::torrent::{
    Bitfield, BlockOutcome, BlockRequest, CompletionReport, PieceIndex, SchedulerProgress,
    TorrentError,
};

/// Commands that can be sent to the scheduler engine actor.
///
/// Each command that returns data carries a response channel. The actor
/// processes commands one at a time, so scheduler state never needs a lock.
pub enum EngineCommand {
    /// A peer announced a single piece.
    RecordHave { index: PieceIndex },
    /// A peer announced its full bitfield.
    RecordBitfield { bitfield: Bitfield },
    /// Pick the next block for a peer.
    NextRequest {
        peer: SocketAddr,
        available: Bitfield,
        responder: oneshot::Sender<Option<BlockRequest>>,
    },
    /// A requested block arrived.
    BlockReceived {
        peer: SocketAddr,
        index: PieceIndex,
        offset: u32,
        data: Bytes,
        responder: oneshot::Sender<Result<BlockOutcome, TorrentError>>,
    },
    /// A peer could not deliver a block.
    BlockFailed {
        peer: SocketAddr,
        request: BlockRequest,
    },
    /// A peer connection closed.
    PeerDisconnected { peer: SocketAddr },
    /// Whether a peer is still waiting on a response from us.
    SetPeerWaiting { peer: SocketAddr, waiting: bool },
    /// Queue sizes.
    GetProgress {
        responder: oneshot::Sender<SchedulerProgress>,
    },
    /// Completion check; finalizes the download the first time it is true.
    CheckDone {
        responder: oneshot::Sender<Result<bool, TorrentError>>,
    },
    /// Shutdown the engine actor gracefully.
    Shutdown { responder: oneshot::Sender<()> },
}

/// Notifications published by the engine as the download advances.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// Piece passed hash verification
    PieceVerified(PieceIndex),
    /// Piece went back to the needed queue
    PieceFailed {
        index: PieceIndex,
        reason: PieceFailure,
    },
    /// Every piece verified and the output file closed; sent once
    Completed(CompletionReport),
}

/// Why a piece had to be downloaded again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PieceFailure {
    HashMismatch,
    RequestFailed,
    PeerDisconnected,
    Storage,
}

impl std::fmt::Display for PieceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PieceFailure::HashMismatch => write!(f, "hash mismatch"),
            PieceFailure::RequestFailed => write!(f, "request failed"),
            PieceFailure::PeerDisconnected => write!(f, "peer disconnected"),
            PieceFailure::Storage => write!(f, "storage failure"),
        }
    }
}
