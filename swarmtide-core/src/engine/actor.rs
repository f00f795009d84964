//! Actor implementation for the scheduler engine.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::commands::{EngineCommand, EngineEvent};
use super::core::SchedulerEngine;
use super::handle::EngineHandle;
use crate::config::SwarmtideConfig;
use crate::storage::FileStore;
use crate::torrent::{PieceScheduler, TorrentError, TorrentMetadata};

/// Opens the output file, spawns the engine actor and returns its handle.
///
/// The actor processes commands sequentially, so scheduler state is owned by
/// exactly one task. Progress events arrive on the returned receiver.
///
/// # Examples
/// ```rust,no_run
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// use swarmtide_core::config::SwarmtideConfig;
/// use swarmtide_core::engine::spawn_scheduler_engine;
/// use swarmtide_core::torrent::TorrentCreator;
///
/// let metadata = TorrentCreator::new().create_from_bytes("demo.bin", &[7u8; 100_000])?;
/// let (handle, mut events) =
///     spawn_scheduler_engine(metadata, "downloads/demo.bin", SwarmtideConfig::default()).await?;
/// # let _ = (&handle, &mut events);
/// # Ok(())
/// # }
/// ```
///
/// # Errors
/// - `TorrentError::InvalidMetadata` - Metadata without pieces
/// - `TorrentError::Storage` - Output file could not be created
pub async fn spawn_scheduler_engine(
    metadata: TorrentMetadata,
    output_path: impl AsRef<Path>,
    config: SwarmtideConfig,
) -> Result<(EngineHandle, mpsc::UnboundedReceiver<EngineEvent>), TorrentError> {
    let scheduler = PieceScheduler::new(&metadata, &config.scheduler)?;
    let store = Arc::new(FileStore::open(output_path, &metadata, &config.storage).await?);

    let (sender, receiver) = mpsc::channel(config.scheduler.command_buffer.max(1));
    let (event_sender, event_receiver) = mpsc::unbounded_channel();
    let engine = SchedulerEngine::new(scheduler, Arc::clone(&store), event_sender);

    tracing::info!(
        "Starting download of {} ({} pieces)",
        metadata.name,
        metadata.piece_count()
    );

    tokio::spawn(async move {
        run_actor_loop(engine, receiver).await;
    });

    Ok((EngineHandle::new(sender, store), event_receiver))
}

/// Processes commands in arrival order until shutdown or until every handle
/// is dropped.
async fn run_actor_loop(mut engine: SchedulerEngine, mut receiver: mpsc::Receiver<EngineCommand>) {
    tracing::debug!("Scheduler engine actor started");

    while let Some(command) = receiver.recv().await {
        match command {
            EngineCommand::Shutdown { responder } => {
                tracing::debug!("Scheduler engine actor shutting down");
                receiver.close();
                engine.shutdown().await;
                let _ = responder.send(());
                return;
            }
            command => handle_command(&mut engine, command).await,
        }
    }

    // Every handle dropped without an explicit shutdown.
    engine.shutdown().await;
    tracing::debug!("Scheduler engine actor stopped");
}

/// Handles a single non-shutdown command for the engine.
async fn handle_command(engine: &mut SchedulerEngine, command: EngineCommand) {
    match command {
        EngineCommand::RecordHave { index } => {
            engine.record_have(index);
        }

        EngineCommand::RecordBitfield { bitfield } => {
            engine.record_bitfield(&bitfield);
        }

        EngineCommand::NextRequest {
            peer,
            available,
            responder,
        } => {
            let request = engine.next_request(peer, &available);
            let _ = responder.send(request);
        }

        EngineCommand::BlockReceived {
            peer,
            index,
            offset,
            data,
            responder,
        } => {
            let result = engine.block_received(peer, index, offset, data).await;
            let _ = responder.send(result);
        }

        EngineCommand::BlockFailed { peer, request } => {
            engine.block_failed(peer, request);
        }

        EngineCommand::PeerDisconnected { peer } => {
            engine.peer_disconnected(peer);
        }

        EngineCommand::SetPeerWaiting { peer, waiting } => {
            engine.set_peer_waiting(peer, waiting);
        }

        EngineCommand::GetProgress { responder } => {
            let _ = responder.send(engine.progress());
        }

        EngineCommand::CheckDone { responder } => {
            let result = engine.check_done().await;
            let _ = responder.send(result);
        }

        // Intercepted by the actor loop.
        EngineCommand::Shutdown { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use bytes::Bytes;

    use super::*;
    use crate::storage::test_fixtures::create_temp_output_file;
    use crate::torrent::test_data::{block_of, create_test_torrent};
    use crate::torrent::{Bitfield, PieceIndex};

    #[tokio::test]
    async fn test_handle_round_trip() {
        let (_temp_dir, path) = create_temp_output_file("actor.bin");
        let (metadata, content) = create_test_torrent(20_000, 16_384);
        let (handle, mut events) =
            spawn_scheduler_engine(metadata.clone(), &path, SwarmtideConfig::for_testing())
                .await
                .unwrap();
        let peer = SocketAddr::from(([10, 0, 0, 1], 51413));
        let all = Bitfield::full(2);

        handle.record_bitfield(all.clone()).await.unwrap();
        while let Some(request) = handle.next_request(peer, all.clone()).await.unwrap() {
            let data = block_of(
                &metadata,
                &content,
                request.piece_index,
                request.offset,
                request.length,
            );
            handle
                .block_received(peer, request.piece_index, request.offset, Bytes::from(data))
                .await
                .unwrap();
        }

        let progress = handle.progress().await.unwrap();
        assert_eq!(progress.finished, 2);
        assert!(handle.check_done().await.unwrap());
        assert_eq!(handle.bitfield().count_set(), 2);

        let mut saw_completion = false;
        while let Ok(event) = events.try_recv() {
            if let EngineEvent::Completed(report) = event {
                assert_eq!(report.total_size, 20_000);
                saw_completion = true;
            }
        }
        assert!(saw_completion);
        assert_eq!(std::fs::read(&path).unwrap(), content);
    }

    #[tokio::test]
    async fn test_read_range_served_during_download() {
        let (_temp_dir, path) = create_temp_output_file("actor.bin");
        let (metadata, content) = create_test_torrent(3 * 16_384, 16_384);
        let (handle, _events) =
            spawn_scheduler_engine(metadata.clone(), &path, SwarmtideConfig::for_testing())
                .await
                .unwrap();
        let peer = SocketAddr::from(([10, 0, 0, 1], 51413));

        let request = handle
            .next_request(peer, Bitfield::full(3))
            .await
            .unwrap()
            .unwrap();
        let data = block_of(&metadata, &content, request.piece_index, 0, request.length);
        handle
            .block_received(peer, request.piece_index, 0, Bytes::from(data.clone()))
            .await
            .unwrap();

        let served = handle
            .read_range(request.piece_index, 100, 1_000)
            .await
            .unwrap();
        assert_eq!(served.as_ref(), &data[100..1_100]);
        assert!(handle.bitfield().has(request.piece_index));
        assert!(!handle.check_done().await.unwrap());
    }

    #[tokio::test]
    async fn test_operations_fail_after_shutdown() {
        let (_temp_dir, path) = create_temp_output_file("actor.bin");
        let (metadata, _) = create_test_torrent(16_384, 16_384);
        let (handle, _events) =
            spawn_scheduler_engine(metadata, &path, SwarmtideConfig::for_testing())
                .await
                .unwrap();

        handle.shutdown().await.unwrap();

        let result = handle.record_have(PieceIndex::new(0)).await;
        assert!(matches!(result, Err(TorrentError::EngineShutdown)));
        let result = handle.progress().await;
        assert!(matches!(result, Err(TorrentError::EngineShutdown)));
        assert!(!handle.is_running());

        let read = handle.read_range(PieceIndex::new(0), 0, 10).await;
        assert!(matches!(read, Err(TorrentError::Storage(_))));
    }

    #[tokio::test]
    async fn test_spawn_fails_for_unwritable_path() {
        let (metadata, _) = create_test_torrent(16_384, 16_384);
        let result =
            spawn_scheduler_engine(metadata, "/dev/null/out.bin", SwarmtideConfig::for_testing())
                .await;
        assert!(matches!(result, Err(TorrentError::Storage(_))));
    }
}
