use std::{
    env, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use bevy::prelude::Resource;
use serde::Deserialize;
use thiserror::Error;

pub const BUILTIN_RAID_CONFIG: &str = include_str!("data/raid_config.json");

/// Tunables for raid timing and participation limits.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RaidConfig {
    preparation_seconds: u64,
    max_attackers: usize,
    max_defenders: usize,
    max_concurrent_raids: usize,
}

impl RaidConfig {
    pub fn builtin() -> Arc<Self> {
        Arc::new(
            serde_json::from_str(BUILTIN_RAID_CONFIG).expect("builtin raid config should parse"),
        )
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn from_file(path: &Path) -> Result<Self, RaidConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| RaidConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config = RaidConfig::from_json_str(&contents)?;
        Ok(config)
    }

    pub fn preparation(&self) -> Duration {
        Duration::from_secs(self.preparation_seconds)
    }

    pub fn preparation_seconds(&self) -> u64 {
        self.preparation_seconds
    }

    pub fn max_attackers(&self) -> usize {
        self.max_attackers.max(1)
    }

    pub fn max_defenders(&self) -> usize {
        self.max_defenders
    }

    pub fn max_concurrent_raids(&self) -> usize {
        self.max_concurrent_raids.max(1)
    }

    pub fn with_preparation_seconds(mut self, seconds: u64) -> Self {
        self.preparation_seconds = seconds;
        self
    }

    pub fn with_max_attackers(mut self, limit: usize) -> Self {
        self.max_attackers = limit;
        self
    }

    pub fn with_max_defenders(mut self, limit: usize) -> Self {
        self.max_defenders = limit;
        self
    }

    pub fn with_max_concurrent_raids(mut self, limit: usize) -> Self {
        self.max_concurrent_raids = limit;
        self
    }
}

impl Default for RaidConfig {
    fn default() -> Self {
        Self {
            preparation_seconds: 60,
            max_attackers: 10,
            max_defenders: 10,
            max_concurrent_raids: 16,
        }
    }
}

#[derive(Debug, Error)]
pub enum RaidConfigError {
    #[error("failed to parse raid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read raid config from {path:?}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Resource, Debug, Clone)]
pub struct RaidConfigHandle(pub Arc<RaidConfig>);

impl RaidConfigHandle {
    pub fn new(config: Arc<RaidConfig>) -> Self {
        Self(config)
    }

    pub fn get(&self) -> Arc<RaidConfig> {
        Arc::clone(&self.0)
    }

    pub fn config(&self) -> &RaidConfig {
        &self.0
    }
}

/// Resolve the raid config: `RAID_CONFIG_PATH`, then the crate data file,
/// then the embedded copy.
pub fn load_raid_config_from_env() -> Arc<RaidConfig> {
    let override_path = env::var("RAID_CONFIG_PATH").ok().map(PathBuf::from);
    let default_path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("src/data/raid_config.json");

    let path = override_path.unwrap_or(default_path);
    match RaidConfig::from_file(&path) {
        Ok(config) => {
            tracing::info!(
                target: "guilds::config",
                path = %path.display(),
                preparation_seconds = config.preparation_seconds,
                max_attackers = config.max_attackers,
                "raid_config.loaded=file"
            );
            return Arc::new(config);
        }
        Err(err) => {
            tracing::warn!(
                target: "guilds::config",
                path = %path.display(),
                error = %err,
                "raid_config.load_failed"
            );
        }
    }

    let config = RaidConfig::builtin();
    tracing::info!(target: "guilds::config", "raid_config.loaded=builtin");
    config
}
