//! Offset-addressed output file shared by the download and upload paths.
//!
//! Every read and write is positioned: it carries its own absolute offset
//! and never touches a shared cursor, so block writes for different pieces
//! and range reads for peers can run concurrently on one handle.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinError;

use super::StorageError;
use crate::config::StorageConfig;
use crate::torrent::{Bitfield, PieceIndex, TorrentMetadata};

/// Single-file storage for one torrent.
///
/// Keeps a per-piece "has data" marker that feeds the announce bitfield.
/// The marker is set as soon as any block of a piece is written; verified
/// completion is tracked by the scheduler, not here.
pub struct FileStore {
    path: PathBuf,
    total_size: u64,
    piece_length: u32,
    piece_count: u32,
    sync_on_close: bool,
    file: RwLock<Option<Arc<File>>>,
    pieces: Mutex<Vec<bool>>,
}

impl FileStore {
    /// Creates (or truncates) the output file for the torrent.
    ///
    /// Missing parent directories are created. With `preallocate` the file is
    /// sized to the full torrent length up front; otherwise it grows as
    /// blocks land.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - If the file or its directory cannot be created
    pub async fn open(
        path: impl AsRef<Path>,
        metadata: &TorrentMetadata,
        config: &StorageConfig,
    ) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let open_path = path.clone();
        let total_size = metadata.total_length;
        let preallocate = config.preallocate;

        let file = tokio::task::spawn_blocking(move || -> io::Result<File> {
            if let Some(parent) = open_path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(&open_path)?;
            if preallocate {
                file.set_len(total_size)?;
            }
            Ok(file)
        })
        .await
        .map_err(join_error)??;

        tracing::debug!(
            "Opened output file {} ({} bytes, preallocate={})",
            path.display(),
            total_size,
            preallocate
        );

        Ok(Self {
            path,
            total_size,
            piece_length: metadata.piece_length,
            piece_count: metadata.piece_count(),
            sync_on_close: config.sync_on_close,
            file: RwLock::new(Some(Arc::new(file))),
            pieces: Mutex::new(vec![false; metadata.piece_count() as usize]),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Writes one block at `index * piece_length + offset`.
    ///
    /// Blocks may arrive in any order across the file. On success the piece
    /// is marked as having data.
    ///
    /// # Errors
    ///
    /// - `StorageError::InvalidRange` - Block extends past its piece
    /// - `StorageError::Closed` - Store was closed
    /// - `StorageError::Io` - Positioned write failed
    pub async fn write_block(
        &self,
        index: PieceIndex,
        offset: u32,
        data: Bytes,
    ) -> Result<(), StorageError> {
        let position = self.locate(index, offset, data.len() as u32)?;
        let file = self.handle()?;

        tokio::task::spawn_blocking(move || write_at(&file, &data, position))
            .await
            .map_err(join_error)??;

        self.pieces.lock()[index.as_usize()] = true;
        Ok(())
    }

    /// Reads exactly `length` bytes starting at `begin` inside piece `index`.
    ///
    /// Used to answer peer block requests while the download is running.
    ///
    /// # Errors
    ///
    /// - `StorageError::InvalidRange` - Range extends past its piece
    /// - `StorageError::Closed` - Store was closed
    /// - `StorageError::Io` - Positioned read failed, including short files
    pub async fn read_range(
        &self,
        index: PieceIndex,
        begin: u32,
        length: u32,
    ) -> Result<Bytes, StorageError> {
        let position = self.locate(index, begin, length)?;
        let file = self.handle()?;

        let data = tokio::task::spawn_blocking(move || -> io::Result<Vec<u8>> {
            let mut buffer = vec![0u8; length as usize];
            read_at(&file, &mut buffer, position)?;
            Ok(buffer)
        })
        .await
        .map_err(join_error)??;

        Ok(Bytes::from(data))
    }

    /// Announce bitfield built from the per-piece data markers.
    pub fn bitfield(&self) -> Bitfield {
        Bitfield::from_pieces(&self.pieces.lock())
    }

    /// True once any block of the piece has been written.
    pub fn has_data(&self, index: PieceIndex) -> bool {
        self.pieces
            .lock()
            .get(index.as_usize())
            .copied()
            .unwrap_or(false)
    }

    /// Releases the file handle. Later reads and writes fail with `Closed`.
    ///
    /// Closing an already closed store is a no-op.
    ///
    /// # Errors
    ///
    /// - `StorageError::Io` - Final sync failed
    pub async fn close(&self) -> Result<(), StorageError> {
        let Some(file) = self.file.write().take() else {
            return Ok(());
        };

        if self.sync_on_close {
            tokio::task::spawn_blocking(move || file.sync_all())
                .await
                .map_err(join_error)??;
        }

        tracing::debug!("Closed output file {}", self.path.display());
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.file.read().is_none()
    }

    fn handle(&self) -> Result<Arc<File>, StorageError> {
        self.file.read().clone().ok_or(StorageError::Closed)
    }

    /// Validates a piece-relative range and returns its absolute offset.
    fn locate(&self, index: PieceIndex, begin: u32, length: u32) -> Result<u64, StorageError> {
        let invalid = StorageError::InvalidRange {
            index,
            begin,
            length,
        };
        if index.as_u32() >= self.piece_count {
            return Err(invalid);
        }

        let piece_start = u64::from(index.as_u32()) * u64::from(self.piece_length);
        let piece_end = (piece_start + u64::from(self.piece_length)).min(self.total_size);
        let start = piece_start + u64::from(begin);
        let end = start + u64::from(length);
        if end > piece_end {
            return Err(invalid);
        }
        Ok(start)
    }
}

fn join_error(error: JoinError) -> StorageError {
    StorageError::Io(io::Error::other(error))
}

#[cfg(unix)]
fn write_at(file: &File, buffer: &[u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(buffer, offset)
}

#[cfg(unix)]
fn read_at(file: &File, buffer: &mut [u8], offset: u64) -> io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buffer, offset)
}

#[cfg(windows)]
fn write_at(file: &File, mut buffer: &[u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buffer.is_empty() {
        match file.seek_write(buffer, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "failed to write whole block",
                ));
            }
            Ok(written) => {
                buffer = &buffer[written..];
                offset += written as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(windows)]
fn read_at(file: &File, mut buffer: &mut [u8], mut offset: u64) -> io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buffer.is_empty() {
        match file.seek_read(buffer, offset) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "failed to read whole range",
                ));
            }
            Ok(read) => {
                buffer = &mut buffer[read..];
                offset += read as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
