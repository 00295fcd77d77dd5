//! Block cache configuration.
//!
//! Built from the `[cache]` settings table (`enabled`, `refresh_lease_seconds`).

use std::time::Duration;

pub const DEFAULT_REFRESH_LEASE_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Master switch; when off every lookup misses and nothing is stored.
    pub enabled: bool,
    /// How long a refresh claim is honoured before another caller may retry.
    pub refresh_lease: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            refresh_lease: Duration::from_secs(DEFAULT_REFRESH_LEASE_SECS),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            enabled: settings.enabled,
            refresh_lease: settings.refresh_lease,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert!(config.enabled);
        assert_eq!(config.refresh_lease, Duration::from_secs(60));
    }

    #[test]
    fn follows_loaded_settings() {
        let settings = crate::config::CacheSettings {
            enabled: false,
            refresh_lease: Duration::from_secs(5),
        };
        let config = CacheConfig::from(&settings);
        assert!(!config.enabled);
        assert_eq!(config.refresh_lease, Duration::from_secs(5));
    }
}
