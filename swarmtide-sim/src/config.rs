//! Swarm shape and fault injection settings.

use std::time::Duration;

use crate::SimulationError;

/// Configuration for a simulated swarm.
///
/// Every random decision (piece ownership, injected faults) is drawn from
/// RNGs derived from `seed`, so a run's peer layout is reproducible.
#[derive(Debug, Clone)]
pub struct SwarmConfig {
    /// Seed for piece ownership and per-peer fault RNGs
    pub seed: u64,
    /// Number of peers serving blocks
    pub peer_count: usize,
    /// Number of peers downloading from us through `read_range`
    pub leecher_count: usize,
    /// Probability that a peer announces any given piece
    pub ownership_probability: f64,
    /// Probability that a served block has a flipped byte
    pub corrupt_rate: f64,
    /// Probability that a request is reported as failed instead of served
    pub failure_rate: f64,
    /// Delay before each block is served
    pub latency: Duration,
    /// Upper bound on the whole run
    pub timeout: Duration,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self::ideal(42)
    }
}

impl SwarmConfig {
    /// Reliable peers that each announce about half the torrent.
    pub fn ideal(seed: u64) -> Self {
        Self {
            seed,
            peer_count: 4,
            leecher_count: 0,
            ownership_probability: 0.5,
            corrupt_rate: 0.0,
            failure_rate: 0.0,
            latency: Duration::ZERO,
            timeout: Duration::from_secs(30),
        }
    }

    /// Peers that occasionally drop requests and send bad data.
    pub fn unreliable(seed: u64) -> Self {
        Self {
            corrupt_rate: 0.05,
            failure_rate: 0.05,
            latency: Duration::from_micros(200),
            ..Self::ideal(seed)
        }
    }

    /// Many peers, each announcing few pieces, with leechers pulling from us.
    pub fn sparse(seed: u64) -> Self {
        Self {
            peer_count: 12,
            leecher_count: 2,
            ownership_probability: 0.1,
            ..Self::ideal(seed)
        }
    }

    /// Sets the number of serving peers.
    pub fn with_peer_count(mut self, peer_count: usize) -> Self {
        self.peer_count = peer_count;
        self
    }

    /// Sets the number of leechers.
    pub fn with_leechers(mut self, leecher_count: usize) -> Self {
        self.leecher_count = leecher_count;
        self
    }

    /// Sets the corrupt-block probability.
    pub fn with_corrupt_rate(mut self, rate: f64) -> Self {
        self.corrupt_rate = rate;
        self
    }

    /// Sets the failed-request probability.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate;
        self
    }

    /// Sets the overall run timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Checks that probabilities are usable and the swarm is not empty.
    ///
    /// Fault rates must stay below 1.0 or no block would ever land.
    ///
    /// # Errors
    ///
    /// - `SimulationError::InvalidConfig` - Empty swarm or out-of-range rate
    pub fn validate(&self) -> Result<(), SimulationError> {
        if self.peer_count == 0 {
            return Err(SimulationError::InvalidConfig {
                reason: "swarm needs at least one peer".to_string(),
            });
        }
        if !(self.ownership_probability > 0.0 && self.ownership_probability <= 1.0) {
            return Err(SimulationError::InvalidConfig {
                reason: format!(
                    "ownership probability {} outside (0, 1]",
                    self.ownership_probability
                ),
            });
        }
        for (name, rate) in [
            ("corrupt rate", self.corrupt_rate),
            ("failure rate", self.failure_rate),
        ] {
            if !(0.0..1.0).contains(&rate) {
                return Err(SimulationError::InvalidConfig {
                    reason: format!("{name} {rate} outside [0, 1)"),
                });
            }
        }
        Ok(())
    }
}
