//! Swarmtide Core - rarest-first piece scheduling and storage
//!
//! This crate provides the download-side building blocks of a BitTorrent
//! client: piece and block segmentation, a rarest-first scheduler with
//! in-order SHA-1 verification, an offset-addressed output file, and an
//! actor that serializes scheduler access for concurrent peers.

pub mod config;
pub mod engine;
pub mod storage;
pub mod torrent;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::SwarmtideConfig;
pub use engine::{EngineEvent, EngineHandle, spawn_scheduler_engine};
pub use storage::{FileStore, StorageError};
pub use torrent::{PieceScheduler, TorrentError, TorrentMetadata};

/// Core errors that can bubble up from any Swarmtide subsystem.
#[derive(Debug, thiserror::Error)]
pub enum SwarmtideError {
    #[error("Torrent error: {0}")]
    Torrent(#[from] TorrentError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SwarmtideError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subsystem_errors_aggregate() {
        let error = SwarmtideError::from(TorrentError::InvalidMetadata {
            reason: "no pieces".to_string(),
        });
        assert_eq!(
            error.to_string(),
            "Torrent error: Invalid torrent metadata: no pieces"
        );

        let error = SwarmtideError::from(StorageError::Closed);
        assert_eq!(error.to_string(), "Storage error: Output file is closed");
    }

    #[test]
    fn test_storage_error_converts_through_torrent_error() {
        let error: TorrentError = StorageError::Closed.into();
        assert_eq!(error.to_string(), "Storage error: Output file is closed");
    }
}
