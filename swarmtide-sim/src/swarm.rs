//! Simulated swarm: a seeded set of peers run against one engine.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use swarmtide_core::engine::EngineHandle;
use swarmtide_core::torrent::test_data::create_test_content;
use swarmtide_core::torrent::{Bitfield, PieceIndex, TorrentCreator, TorrentMetadata, format_size};

use crate::SimulationError;
use crate::config::SwarmConfig;
use crate::peer::{PeerContext, PeerRole, PeerSummary, SimulatedPeer, run_leecher, run_seeder};

/// A swarm of simulated peers sharing one piece of content.
pub struct SimulatedSwarm {
    config: SwarmConfig,
    content: Bytes,
    metadata: Arc<TorrentMetadata>,
    peers: Vec<SimulatedPeer>,
}

impl SimulatedSwarm {
    /// Builds peers for `content` split into `piece_length` pieces.
    ///
    /// Each seeder announces every piece with probability
    /// `ownership_probability`; any piece left unannounced is handed to a
    /// random seeder so the swarm as a whole always has the full content.
    ///
    /// # Errors
    ///
    /// - `SimulationError::InvalidConfig` - Config failed validation
    /// - `SimulationError::Engine` - Content could not be split into pieces
    pub fn new(
        content: impl Into<Bytes>,
        piece_length: u32,
        config: SwarmConfig,
    ) -> Result<Self, SimulationError> {
        config.validate()?;
        let content = content.into();
        let metadata =
            TorrentCreator::with_piece_size(piece_length).create_from_bytes("swarm.bin", &content)?;
        let piece_count = metadata.piece_count() as usize;

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut ownership: Vec<Vec<bool>> = (0..config.peer_count)
            .map(|_| {
                (0..piece_count)
                    .map(|_| rng.random_bool(config.ownership_probability))
                    .collect()
            })
            .collect();

        for piece in 0..piece_count {
            if !ownership.iter().any(|owned| owned[piece]) {
                let owner = rng.random_range(0..config.peer_count);
                ownership[owner][piece] = true;
            }
        }

        let mut peers: Vec<SimulatedPeer> = ownership
            .iter()
            .enumerate()
            .map(|(i, owned)| {
                SimulatedPeer::new(
                    peer_addr(i),
                    PeerRole::Seeder,
                    Bitfield::from_pieces(owned),
                    rng.random(),
                )
            })
            .collect();

        for i in 0..config.leecher_count {
            peers.push(SimulatedPeer::new(
                peer_addr(config.peer_count + i),
                PeerRole::Leecher,
                Bitfield::new(piece_count as u32),
                rng.random(),
            ));
        }

        tracing::debug!(
            "Built swarm: {} seeders, {} leechers, {} pieces",
            config.peer_count,
            config.leecher_count,
            piece_count
        );

        Ok(Self {
            config,
            content,
            metadata: Arc::new(metadata),
            peers,
        })
    }

    /// Builds a swarm around deterministic generated content.
    ///
    /// # Errors
    ///
    /// - `SimulationError::InvalidConfig` - Config failed validation
    /// - `SimulationError::Engine` - Content could not be split into pieces
    pub fn with_generated_content(
        length: usize,
        piece_length: u32,
        config: SwarmConfig,
    ) -> Result<Self, SimulationError> {
        Self::new(create_test_content(length), piece_length, config)
    }

    /// Metadata for the engine under test.
    pub fn metadata(&self) -> &TorrentMetadata {
        &self.metadata
    }

    /// The content every verified download must reproduce.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// All simulated peers, seeders first.
    pub fn peers(&self) -> &[SimulatedPeer] {
        &self.peers
    }

    /// Number of seeders announcing `index`.
    pub fn owners_of(&self, index: PieceIndex) -> usize {
        self.peers
            .iter()
            .filter(|peer| peer.role() == PeerRole::Seeder && peer.bitfield().has(index))
            .count()
    }

    /// Runs every peer against `handle` until the engine reports completion.
    ///
    /// # Errors
    ///
    /// - `SimulationError::Timeout` - Download did not finish in time
    /// - `SimulationError::Engine` - Engine rejected an operation
    /// - `SimulationError::PeerTask` - A peer task panicked
    pub async fn run(&self, handle: EngineHandle) -> Result<SwarmRunSummary, SimulationError> {
        let started = Instant::now();
        let done = Arc::new(AtomicBool::new(false));
        let context = PeerContext {
            handle,
            content: self.content.clone(),
            metadata: Arc::clone(&self.metadata),
            corrupt_rate: self.config.corrupt_rate,
            failure_rate: self.config.failure_rate,
            latency: self.config.latency,
            done: Arc::clone(&done),
        };

        let tasks: Vec<_> = self
            .peers
            .iter()
            .cloned()
            .map(|peer| {
                let context = context.clone();
                match peer.role() {
                    PeerRole::Seeder => tokio::spawn(run_seeder(peer, context)),
                    PeerRole::Leecher => tokio::spawn(run_leecher(peer, context)),
                }
            })
            .collect();

        let joined =
            match tokio::time::timeout(self.config.timeout, futures::future::join_all(tasks)).await
            {
                Ok(joined) => joined,
                Err(_) => {
                    done.store(true, Ordering::Release);
                    return Err(SimulationError::Timeout {
                        limit: self.config.timeout,
                    });
                }
            };

        let mut peers = Vec::with_capacity(joined.len());
        for result in joined {
            let summary = result.map_err(|e| SimulationError::PeerTask {
                reason: e.to_string(),
            })??;
            peers.push(summary);
        }

        let summary = SwarmRunSummary {
            peers,
            elapsed: started.elapsed(),
        };
        tracing::info!("Swarm run finished: {}", summary);
        Ok(summary)
    }
}

/// Outcome of one swarm run.
#[derive(Debug, Clone)]
pub struct SwarmRunSummary {
    /// Per-peer counters, in peer order
    pub peers: Vec<PeerSummary>,
    /// Wall time of the run
    pub elapsed: Duration,
}

impl SwarmRunSummary {
    /// Blocks delivered to the engine by all seeders.
    pub fn blocks_served(&self) -> u64 {
        self.peers.iter().map(|p| p.blocks_served).sum()
    }

    /// Requests reported as failed.
    pub fn failures_injected(&self) -> u64 {
        self.peers.iter().map(|p| p.failures_injected).sum()
    }

    /// Blocks delivered corrupted.
    pub fn corruptions_injected(&self) -> u64 {
        self.peers.iter().map(|p| p.corruptions_injected).sum()
    }

    /// Pieces verified, counted at the peer that delivered the final block.
    pub fn pieces_verified(&self) -> u64 {
        self.peers.iter().map(|p| p.pieces_verified).sum()
    }

    /// Bytes served to leechers.
    pub fn bytes_uploaded(&self) -> u64 {
        self.peers.iter().map(|p| p.bytes_uploaded).sum()
    }
}

impl fmt::Display for SwarmRunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} blocks from {} peers in {:.2}s ({} failed, {} corrupt, {} uploaded)",
            self.blocks_served(),
            self.peers.len(),
            self.elapsed.as_secs_f64(),
            self.failures_injected(),
            self.corruptions_injected(),
            format_size(self.bytes_uploaded() as f64)
        )
    }
}

fn peer_addr(i: usize) -> SocketAddr {
    SocketAddr::from(([10, 0, (i / 250) as u8, (i % 250 + 1) as u8], 6881))
}
