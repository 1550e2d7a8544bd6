//! Configuration for the load balancer
//!
//! `BalancerConfig` tunes the poll loop. `SiteConfig` describes a site
//! (fuse size and chargers) and is loaded from JSON.

use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::phase::{Amps, PerPhase};

/// Poll loop configuration
#[derive(Debug, Clone)]
pub struct BalancerConfig {
    /// Interval between balancing ticks
    pub poll_interval: Duration,

    /// Minimum time between two raises of the same charger.
    /// Reductions are always applied immediately.
    pub min_raise_interval: Duration,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            min_raise_interval: Duration::from_secs(30),
        }
    }
}

impl BalancerConfig {
    /// Set poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set minimum interval between raises
    pub fn with_min_raise_interval(mut self, interval: Duration) -> Self {
        self.min_raise_interval = interval;
        self
    }
}

/// Site description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    /// Main fuse rating per phase
    pub fuse_limit: PerPhase<Amps>,

    /// Load that is not a charger (house, heat pump, ...)
    #[serde(default)]
    pub base_load: PerPhase<Amps>,

    /// Safety margin kept free below the fuse limit
    #[serde(default)]
    pub margin: Amps,

    pub chargers: Vec<ChargerConfig>,
}

/// One charger on the site
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargerConfig {
    pub id: String,

    /// Hardware maximum
    pub max_current: Amps,

    /// Limit configured on the device at startup
    pub initial_current: Amps,

    /// Accepts independent per-phase limits
    #[serde(default)]
    pub synced_phase_limits: bool,

    /// Car plugged in and charging at startup
    #[serde(default = "default_true")]
    pub charging: bool,
}

fn default_true() -> bool {
    true
}

impl SiteConfig {
    /// Load and validate a site description from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    /// Parse and validate a site description
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: SiteConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (phase, limit) in self.fuse_limit.iter() {
            if *limit <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "fuse limit on {} must be positive, got {}",
                    phase, limit
                )));
            }
        }

        if self.margin < 0 {
            return Err(ConfigError::Invalid(format!("negative margin {}", self.margin)));
        }

        let mut seen = HashSet::new();
        for charger in &self.chargers {
            if !seen.insert(charger.id.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate charger id {}", charger.id)));
            }
            if charger.max_current <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "charger {} max current must be positive",
                    charger.id
                )));
            }
            if charger.initial_current < 0 || charger.initial_current > charger.max_current {
                return Err(ConfigError::Invalid(format!(
                    "charger {} initial current {} outside 0..={}",
                    charger.id, charger.initial_current, charger.max_current
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const SITE: &str = r#"{
        "fuse_limit": {"L1": 25, "L2": 25, "L3": 25},
        "base_load": {"L1": 4, "L2": 2, "L3": 1},
        "margin": 1,
        "chargers": [
            {"id": "garage", "max_current": 16, "initial_current": 16},
            {"id": "driveway", "max_current": 32, "initial_current": 10,
             "synced_phase_limits": true, "charging": false}
        ]
    }"#;

    #[test]
    fn test_config_builder() {
        let config = BalancerConfig::default()
            .with_poll_interval(Duration::from_millis(500))
            .with_min_raise_interval(Duration::from_secs(10));

        assert_eq!(config.poll_interval, Duration::from_millis(500));
        assert_eq!(config.min_raise_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_site_from_json() {
        let site = SiteConfig::from_json(SITE).unwrap();

        assert_eq!(site.fuse_limit, PerPhase::uniform(25));
        assert_eq!(site.base_load, PerPhase::new(4, 2, 1));
        assert_eq!(site.chargers.len(), 2);
        assert!(site.chargers[0].charging);
        assert!(!site.chargers[0].synced_phase_limits);
        assert!(!site.chargers[1].charging);
    }

    #[test]
    fn test_site_load_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = NamedTempFile::new()?;
        file.write_all(SITE.as_bytes())?;

        let site = SiteConfig::load(file.path())?;
        assert_eq!(site.margin, 1);
        Ok(())
    }

    #[test]
    fn test_site_validation() {
        let duplicate = SITE.replace("driveway", "garage");
        assert!(matches!(
            SiteConfig::from_json(&duplicate),
            Err(ConfigError::Invalid(_))
        ));

        let too_high = SITE.replace("\"initial_current\": 10", "\"initial_current\": 40");
        assert!(matches!(
            SiteConfig::from_json(&too_high),
            Err(ConfigError::Invalid(_))
        ));

        assert!(matches!(
            SiteConfig::from_json("{"),
            Err(ConfigError::Parse(_))
        ));
    }
}
