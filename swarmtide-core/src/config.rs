//! Centralized configuration for Swarmtide.
//!
//! All tunable parameters and settings are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::str::FromStr;

use crate::SwarmtideError;

/// Central configuration for all Swarmtide components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct SwarmtideConfig {
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
}

/// Piece scheduling configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Seed for the initial needed-queue shuffle (None = thread RNG)
    pub shuffle_seed: Option<u64>,
    /// Capacity of the engine actor's command mailbox
    pub command_buffer: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shuffle_seed: None,
            command_buffer: 100,
        }
    }
}

/// Output file configuration.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Pre-size the output file to the torrent length on open
    pub preallocate: bool,
    /// Flush file data to disk before the handle is released
    pub sync_on_close: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            preallocate: true,
            sync_on_close: true,
        }
    }
}

impl SwarmtideConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Allows runtime configuration via environment variables while
    /// maintaining sensible defaults. Unset variables keep their default.
    ///
    /// # Errors
    /// - `SwarmtideError::Configuration` - A variable is set but unparsable,
    ///   or the command buffer is zero
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();

        if let Some(seed) = env_value::<u64>("SWARMTIDE_SHUFFLE_SEED")? {
            config.scheduler.shuffle_seed = Some(seed);
        }

        if let Some(capacity) = env_value::<usize>("SWARMTIDE_COMMAND_BUFFER")? {
            if capacity == 0 {
                return Err(SwarmtideError::Configuration {
                    reason: "SWARMTIDE_COMMAND_BUFFER must be at least 1".to_string(),
                });
            }
            config.scheduler.command_buffer = capacity;
        }

        if let Some(preallocate) = env_value::<bool>("SWARMTIDE_PREALLOCATE")? {
            config.storage.preallocate = preallocate;
        }

        Ok(config)
    }

    /// Creates a configuration optimized for testing.
    ///
    /// Fixed shuffle seed for reproducible selection order, no fsync.
    pub fn for_testing() -> Self {
        Self {
            scheduler: SchedulerConfig {
                shuffle_seed: Some(42),
                ..SchedulerConfig::default()
            },
            storage: StorageConfig {
                preallocate: true,
                sync_on_close: false,
            },
        }
    }
}

fn env_value<T: FromStr>(name: &str) -> crate::Result<Option<T>> {
    let Ok(raw) = std::env::var(name) else {
        return Ok(None);
    };
    raw.trim()
        .parse()
        .map(Some)
        .map_err(|_| SwarmtideError::Configuration {
            reason: format!("{name}={raw:?} is not a valid value"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_values() {
        let config = SwarmtideConfig::default();

        assert_eq!(config.scheduler.shuffle_seed, None);
        assert_eq!(config.scheduler.command_buffer, 100);
        assert!(config.storage.preallocate);
        assert!(config.storage.sync_on_close);
    }

    #[test]
    fn test_testing_preset() {
        let config = SwarmtideConfig::for_testing();
        assert_eq!(config.scheduler.shuffle_seed, Some(42));
        assert!(!config.storage.sync_on_close);
    }

    #[test]
    fn test_env_override() {
        unsafe {
            std::env::set_var("SWARMTIDE_SHUFFLE_SEED", "12345");
            std::env::set_var("SWARMTIDE_COMMAND_BUFFER", "8");
            std::env::set_var("SWARMTIDE_PREALLOCATE", "false");
        }

        let config = SwarmtideConfig::from_env().unwrap();

        assert_eq!(config.scheduler.shuffle_seed, Some(12345));
        assert_eq!(config.scheduler.command_buffer, 8);
        assert!(!config.storage.preallocate);

        // Bad values are reported instead of silently falling back.
        unsafe {
            std::env::set_var("SWARMTIDE_COMMAND_BUFFER", "0");
        }
        assert!(matches!(
            SwarmtideConfig::from_env(),
            Err(SwarmtideError::Configuration { .. })
        ));

        unsafe {
            std::env::set_var("SWARMTIDE_COMMAND_BUFFER", "8");
            std::env::set_var("SWARMTIDE_PREALLOCATE", "sometimes");
        }
        let error = SwarmtideConfig::from_env().unwrap_err();
        assert!(error.to_string().contains("SWARMTIDE_PREALLOCATE"));

        // Cleanup
        unsafe {
            std::env::remove_var("SWARMTIDE_SHUFFLE_SEED");
            std::env::remove_var("SWARMTIDE_COMMAND_BUFFER");
            std::env::remove_var("SWARMTIDE_PREALLOCATE");
        }
    }
}
