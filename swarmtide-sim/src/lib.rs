//! Swarmtide Simulation - seeded swarms for exercising the scheduler engine.

#![warn(missing_docs)]
#![warn(clippy::missing_errors_doc)]
//!
//! Builds a set of simulated peers around known content, runs them
//! concurrently against an [`EngineHandle`](swarmtide_core::engine::EngineHandle),
//! and reports what each peer did. Piece ownership and fault injection are
//! drawn from a seed so a failing layout can be replayed.
//!
//! # Example
//!
//! ```rust,no_run
//! use swarmtide_core::config::SwarmtideConfig;
//! use swarmtide_core::engine::spawn_scheduler_engine;
//! use swarmtide_sim::{SimulatedSwarm, SwarmConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let swarm = SimulatedSwarm::with_generated_content(1_000_000, 65_536, SwarmConfig::unreliable(7))?;
//! let (handle, _events) = spawn_scheduler_engine(
//!     swarm.metadata().clone(),
//!     "downloads/swarm.bin",
//!     SwarmtideConfig::for_testing(),
//! )
//! .await?;
//!
//! let summary = swarm.run(handle).await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod peer;
pub mod swarm;

use std::time::Duration;

pub use config::SwarmConfig;
pub use peer::{PeerRole, PeerSummary, SimulatedPeer};
pub use swarm::{SimulatedSwarm, SwarmRunSummary};
use swarmtide_core::torrent::TorrentError;

/// Errors that can occur while building or running a simulated swarm.
#[derive(Debug, thiserror::Error)]
pub enum SimulationError {
    /// Swarm settings cannot produce a download
    #[error("Invalid swarm configuration: {reason}")]
    InvalidConfig {
        /// What was wrong
        reason: String,
    },

    /// Engine rejected an operation
    #[error("Engine error: {0}")]
    Engine(#[from] TorrentError),

    /// Download did not complete in time
    #[error("Swarm did not complete within {limit:?}")]
    Timeout {
        /// Configured limit
        limit: Duration,
    },

    /// A peer task panicked or was cancelled
    #[error("Peer task failed: {reason}")]
    PeerTask {
        /// Join error description
        reason: String,
    },
}
