//! Handle for communicating with the scheduler engine actor.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use super::commands::EngineCommand;
use crate::storage::FileStore;
use crate::torrent::{
    Bitfield, BlockOutcome, BlockRequest, PieceIndex, SchedulerProgress, TorrentError,
};

/// Handle for communicating with the scheduler engine actor.
///
/// Cheap to clone; every peer task gets its own copy. Scheduler operations
/// go through the actor mailbox. Upload reads and the announce bitfield are
/// served straight from the shared file store so they never queue behind
/// block writes.
#[derive(Clone)]
pub struct EngineHandle {
    sender: mpsc::Sender<EngineCommand>,
    store: Arc<FileStore>,
}

impl EngineHandle {
    /// Creates a new handle with the given command sender.
    pub fn new(sender: mpsc::Sender<EngineCommand>, store: Arc<FileStore>) -> Self {
        Self { sender, store }
    }

    /// Counts one more peer holding `index`.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Actor has stopped
    pub async fn record_have(&self, index: PieceIndex) -> Result<(), TorrentError> {
        self.send(EngineCommand::RecordHave { index }).await
    }

    /// Counts a peer's whole bitfield.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Actor has stopped
    pub async fn record_bitfield(&self, bitfield: Bitfield) -> Result<(), TorrentError> {
        self.send(EngineCommand::RecordBitfield { bitfield }).await
    }

    /// Next block to request from `peer`, given the pieces it has.
    ///
    /// `None` means nothing is currently available from this peer.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Actor has stopped
    pub async fn next_request(
        &self,
        peer: SocketAddr,
        available: Bitfield,
    ) -> Result<Option<BlockRequest>, TorrentError> {
        let (responder, rx) = oneshot::channel();
        self.send(EngineCommand::NextRequest {
            peer,
            available,
            responder,
        })
        .await?;

        rx.await.map_err(|_| TorrentError::EngineShutdown)
    }

    /// Delivers a block received from `peer`.
    ///
    /// # Errors
    /// - `TorrentError::InvalidPieceIndex` - Index outside the torrent
    /// - `TorrentError::InvalidBlock` - Block was never requested
    /// - `TorrentError::Storage` - Block could not be written
    /// - `TorrentError::EngineShutdown` - Actor has stopped
    pub async fn block_received(
        &self,
        peer: SocketAddr,
        index: PieceIndex,
        offset: u32,
        data: Bytes,
    ) -> Result<BlockOutcome, TorrentError> {
        let (responder, rx) = oneshot::channel();
        self.send(EngineCommand::BlockReceived {
            peer,
            index,
            offset,
            data,
            responder,
        })
        .await?;

        rx.await.map_err(|_| TorrentError::EngineShutdown)?
    }

    /// Reports that `peer` failed to deliver `request`.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Actor has stopped
    pub async fn block_failed(
        &self,
        peer: SocketAddr,
        request: BlockRequest,
    ) -> Result<(), TorrentError> {
        self.send(EngineCommand::BlockFailed { peer, request }).await
    }

    /// Reports that `peer` went away.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Actor has stopped
    pub async fn peer_disconnected(&self, peer: SocketAddr) -> Result<(), TorrentError> {
        self.send(EngineCommand::PeerDisconnected { peer }).await
    }

    /// Marks whether `peer` still expects something from us.
    ///
    /// # Errors
    /// - `TorrentError::EngineShutdown` - Actor has stopped
    pub async fn set_peer_waiting(
        &self,
        peer: SocketAddr,
        waiting: bool,
    ) -> Result<(), TorrentError> {
        self.send(EngineCommand::SetPeerWaiting { peer, waiting })
            .await
    }

    /// Bitfield to announce to peers.
    pub fn bitfield(&self) -> Bitfield {
        self.store.bitfield()
    }

    /// Reads a range of the output file to answer a peer request.
    ///
    /// # Errors
    /// - `TorrentError::Storage` - Range invalid, file closed or read failed
    pub async fn read_range(
        &self,
        index: PieceIndex,
        begin: u32,
        length: u32,
    ) -> Result<Bytes, TorrentError> {
        Ok(self.store.read_range(index, begin, length).await?)
    }

    /// # Errors
    /// - `TorrentError::EngineShutdown` - Actor has stopped
    pub async fn progress(&self) -> Result<SchedulerProgress, TorrentError> {
        let (responder, rx) = oneshot::channel();
        self.send(EngineCommand::GetProgress { responder }).await?;

        rx.await.map_err(|_| TorrentError::EngineShutdown)
    }

    /// True once every piece is verified and no peer is waiting.
    ///
    /// The first true result closes the output file and publishes
    /// `EngineEvent::Completed`.
    ///
    /// # Errors
    /// - `TorrentError::Storage` - Output file could not be flushed
    /// - `TorrentError::EngineShutdown` - Actor has stopped
    pub async fn check_done(&self) -> Result<bool, TorrentError> {
        let (responder, rx) = oneshot::channel();
        self.send(EngineCommand::CheckDone { responder }).await?;

        rx.await.map_err(|_| TorrentError::EngineShutdown)?
    }

    /// Shuts down the engine actor gracefully.
    ///
    /// After this call, all subsequent operations will return `TorrentError::EngineShutdown`.
    pub async fn shutdown(&self) -> Result<(), TorrentError> {
        let (responder, rx) = oneshot::channel();
        self.send(EngineCommand::Shutdown { responder }).await?;

        rx.await.map_err(|_| TorrentError::EngineShutdown)
    }

    /// Checks if the engine actor is still running.
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }

    async fn send(&self, command: EngineCommand) -> Result<(), TorrentError> {
        self.sender
            .send(command)
            .await
            .map_err(|_| TorrentError::EngineShutdown)
    }
}
