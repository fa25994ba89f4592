//! Daemon configuration loaded from a TOML file.
//!
//! ```toml
//! owner_pubkeys = ["<64-hex pubkey>"]
//! db_path = "db"
//! refresh_interval = 24        # hours
//! min_followers = 3
//! fetch_sync = true            # archive owner history every cycle
//! backup_relays = ["wss://backup.example.com"]
//! trust_hops = 2
//! ```
//!
//! Keys the engine does not use (relay name, landing page settings) are ignored.

use crate::scheduler::SchedulerConfig;
use crate::sync::{FetchConfig, ProfileConfig};
use crate::trust::TrustConfig;
use crate::{Error, Result};
use nostr_sdk::PublicKey;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest accepted refresh interval, in hours (one year).
pub const MAX_REFRESH_INTERVAL_HOURS: u64 = 24 * 365;

/// Longest accepted archival pass, in minutes.
pub const MAX_ARCHIVE_WINDOW_MINUTES: u64 = MAX_REFRESH_INTERVAL_HOURS * 60;

/// Relay configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Hex public keys of the relay owners. At least one is required.
    pub owner_pubkeys: Vec<String>,

    /// Directory for persistent state. The registry lives at `<db_path>/root_notes`.
    pub db_path: PathBuf,

    /// Hours between refresh cycles.
    pub refresh_interval: u64,

    /// Minimum follower count for a candidate to be trusted.
    pub min_followers: usize,

    /// Archive owner history on every refresh cycle.
    pub fetch_sync: bool,

    /// Relays every accepted client event is replicated to.
    pub backup_relays: Vec<String>,

    /// Relays used for contact lists, backfill and archival.
    pub seed_relays: Vec<String>,

    /// Levels of the follow graph walked when building the trust network.
    pub trust_hops: u8,

    /// Time budget of one archival pass. Defaults to `refresh_interval` minutes.
    pub archive_window_minutes: Option<u64>,

    /// Prometheus metrics port (0 disables the exporter).
    pub metrics_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            owner_pubkeys: Vec::new(),
            db_path: PathBuf::from("db"),
            refresh_interval: 24,
            min_followers: 3,
            fetch_sync: false,
            backup_relays: Vec::new(),
            seed_relays: chronicle_core::DEFAULT_SEED_RELAYS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            trust_hops: 2,
            archive_window_minutes: None,
            metrics_port: 0,
        }
    }
}

impl Config {
    /// Read, parse and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config =
            toml::from_str(raw).map_err(|e| Error::Config(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.owner_pubkeys.is_empty() {
            return Err(Error::Config("owner_pubkeys must list at least one key".into()));
        }
        self.owners()?;

        if self.refresh_interval == 0 {
            return Err(Error::Config("refresh_interval must be at least 1 hour".into()));
        }
        if self.refresh_interval > MAX_REFRESH_INTERVAL_HOURS {
            return Err(Error::Config(format!(
                "refresh_interval must be at most {} hours, got {}",
                MAX_REFRESH_INTERVAL_HOURS, self.refresh_interval
            )));
        }
        if !(1..=3).contains(&self.trust_hops) {
            return Err(Error::Config(format!(
                "trust_hops must be between 1 and 3, got {}",
                self.trust_hops
            )));
        }
        if self.seed_relays.is_empty() {
            return Err(Error::Config("seed_relays must not be empty".into()));
        }
        match self.archive_window_minutes {
            Some(0) => {
                return Err(Error::Config("archive_window_minutes must be positive".into()));
            }
            Some(minutes) if minutes > MAX_ARCHIVE_WINDOW_MINUTES => {
                return Err(Error::Config(format!(
                    "archive_window_minutes must be at most {}, got {}",
                    MAX_ARCHIVE_WINDOW_MINUTES, minutes
                )));
            }
            _ => {}
        }

        for url in self.seed_relays.iter().chain(&self.backup_relays) {
            if !(url.starts_with("wss://") || url.starts_with("ws://")) {
                return Err(Error::Config(format!("not a relay url: {}", url)));
            }
        }
        Ok(())
    }

    /// Parsed owner keys.
    pub fn owners(&self) -> Result<Vec<PublicKey>> {
        let mut owners = Vec::with_capacity(self.owner_pubkeys.len());
        for hex in &self.owner_pubkeys {
            owners.push(chronicle_core::parse_public_key(hex)?);
        }
        Ok(owners)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.db_path.join("root_notes")
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_secs(self.refresh_interval.saturating_mul(3600))
    }

    pub fn archive_budget(&self) -> Duration {
        let minutes = self.archive_window_minutes.unwrap_or(self.refresh_interval);
        Duration::from_secs(minutes.saturating_mul(60))
    }

    pub fn trust_config(&self) -> TrustConfig {
        TrustConfig {
            seed_relays: self.seed_relays.clone(),
            min_followers: self.min_followers,
            hops: self.trust_hops,
            ..Default::default()
        }
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            seed_relays: self.seed_relays.clone(),
            ..Default::default()
        }
    }

    pub fn profile_config(&self) -> ProfileConfig {
        ProfileConfig {
            seed_relays: self.seed_relays.clone(),
            ..Default::default()
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: self.refresh_period(),
            archive_enabled: self.fetch_sync,
            archive_budget: self.archive_budget(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "79be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml_str(&format!("owner_pubkeys = [\"{}\"]", OWNER)).unwrap();

        assert_eq!(config.refresh_interval, 24);
        assert_eq!(config.min_followers, 3);
        assert!(!config.fetch_sync);
        assert_eq!(config.seed_relays.len(), 14);
        assert_eq!(config.registry_path(), PathBuf::from("db").join("root_notes"));
        assert_eq!(config.archive_budget(), Duration::from_secs(24 * 60));
        assert_eq!(config.owners().unwrap().len(), 1);
    }

    #[test]
    fn test_full_config() {
        let raw = format!(
            r#"
            relay_name = "my relay"
            owner_pubkeys = ["{}"]
            db_path = "/var/lib/chronicle"
            refresh_interval = 6
            min_followers = 1
            fetch_sync = true
            backup_relays = ["wss://backup.example.com"]
            seed_relays = ["wss://seed.example.com"]
            trust_hops = 1
            archive_window_minutes = 15
            "#,
            OWNER
        );
        let config = Config::from_toml_str(&raw).unwrap();

        let scheduler = config.scheduler_config();
        assert_eq!(scheduler.interval, Duration::from_secs(6 * 3600));
        assert!(scheduler.archive_enabled);
        assert_eq!(scheduler.archive_budget, Duration::from_secs(15 * 60));
        assert_eq!(config.trust_config().hops, 1);
        assert_eq!(config.fetch_config().seed_relays, vec!["wss://seed.example.com"]);
        assert_eq!(config.profile_config().seed_relays, vec!["wss://seed.example.com"]);
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let cases = [
            String::new(),
            format!("owner_pubkeys = [\"{}\"]\nrefresh_interval = 0", OWNER),
            format!("owner_pubkeys = [\"{}\"]\ntrust_hops = 4", OWNER),
            format!("owner_pubkeys = [\"{}\"]\nbackup_relays = [\"https://x\"]", OWNER),
            format!("owner_pubkeys = [\"{}\"]\nseed_relays = []", OWNER),
            "owner_pubkeys = ".to_string(),
        ];

        for raw in cases {
            assert!(
                matches!(Config::from_toml_str(&raw), Err(Error::Config(_))),
                "accepted: {raw}"
            );
        }
    }

    #[test]
    fn test_bad_owner_key_reports_field() {
        let err = Config::from_toml_str("owner_pubkeys = [\"not-hex\"]").unwrap_err();
        assert!(matches!(err, Error::Core(_)));
        assert!(err.to_string().contains("pubkey"));
    }

    #[test]
    fn test_refresh_interval_upper_bound() {
        let max = format!(
            "owner_pubkeys = [\"{}\"]\nrefresh_interval = {}",
            OWNER, MAX_REFRESH_INTERVAL_HOURS
        );
        let config = Config::from_toml_str(&max).unwrap();
        assert_eq!(
            config.scheduler_config().interval,
            Duration::from_secs(MAX_REFRESH_INTERVAL_HOURS * 3600)
        );

        for hours in [MAX_REFRESH_INTERVAL_HOURS + 1, 6_000_000_000_000_000] {
            let raw = format!("owner_pubkeys = [\"{}\"]\nrefresh_interval = {}", OWNER, hours);
            assert!(
                matches!(Config::from_toml_str(&raw), Err(Error::Config(_))),
                "accepted refresh_interval = {hours}"
            );
        }
    }

    #[test]
    fn test_archive_window_upper_bound() {
        for minutes in [MAX_ARCHIVE_WINDOW_MINUTES + 1, u64::MAX / 2] {
            let raw = format!(
                "owner_pubkeys = [\"{}\"]\narchive_window_minutes = {}",
                OWNER, minutes
            );
            assert!(
                matches!(Config::from_toml_str(&raw), Err(Error::Config(_))),
                "accepted archive_window_minutes = {minutes}"
            );
        }
    }

    #[test]
    fn test_unvalidated_config_does_not_overflow() {
        let config = Config {
            refresh_interval: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.refresh_period(), Duration::from_secs(u64::MAX));
        assert_eq!(config.archive_budget(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            Config::load(&tmp.path().join("nope.toml")),
            Err(Error::Config(_))
        ));
    }
}
