use std::{
    env,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    path::PathBuf,
    time::Duration,
};

use bevy::prelude::*;

use crate::raid::SimInstant;
use crate::raid_registry::RaidActivation;

pub const DATA_DIR_ENV: &str = "GUILDS_DATA_DIR";
pub const COMMAND_BIND_ENV: &str = "GUILDS_COMMAND_BIND";

/// Host-level settings for the authority loop and the command listener.
#[derive(Resource, Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub command_bind: SocketAddr,
    pub tick_interval: Duration,
    pub autosave_interval: Duration,
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command_bind: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 41101),
            tick_interval: Duration::from_millis(250),
            autosave_interval: Duration::from_secs(300),
            data_dir: PathBuf::from("guild_data"),
        }
    }
}

impl ServerConfig {
    /// Defaults with `GUILDS_DATA_DIR` and `GUILDS_COMMAND_BIND` applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(dir) = env::var(DATA_DIR_ENV) {
            if !dir.trim().is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(bind) = env::var(COMMAND_BIND_ENV) {
            match bind.parse() {
                Ok(addr) => config.command_bind = addr,
                Err(err) => tracing::warn!(
                    target: "guilds::config",
                    value = %bind,
                    error = %err,
                    "server_config.invalid_bind"
                ),
            }
        }
        config
    }
}

/// Instant the current tick is evaluated at.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaidClock {
    pub now: SimInstant,
}

impl Default for RaidClock {
    fn default() -> Self {
        Self {
            now: SimInstant::from_millis(0),
        }
    }
}

/// Number of ticks processed since startup.
#[derive(Resource, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerTick(pub u64);

/// Raids that went live during the most recent tick.
#[derive(Resource, Debug, Clone, Default)]
pub struct RaidActivations {
    pub this_tick: Vec<RaidActivation>,
}

impl RaidActivations {
    pub fn take(&mut self) -> Vec<RaidActivation> {
        std::mem::take(&mut self.this_tick)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_values() {
        let config = ServerConfig::default();
        assert_eq!(config.command_bind.port(), 41101);
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.autosave_interval, Duration::from_secs(300));
        assert_eq!(config.data_dir, PathBuf::from("guild_data"));
    }
}
