//! Whole-state persistence for the registries.
//!
//! Each registry is stored as its own bincode blob under the data directory.
//! Loading never fails: a missing or unreadable blob yields an empty registry.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use bevy::prelude::World;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::ErrorKind;
use crate::faction::FactionRoster;
use crate::raid_config::RaidConfig;
use crate::raid_registry::{RaidRegistry, RaidSnapshot};
use crate::territory::{TerritoryRegistry, TerritorySnapshot};

pub const TERRITORY_BLOB: &str = "territory.bin";
pub const RAIDS_BLOB: &str = "raids.bin";
pub const FACTIONS_BLOB: &str = "factions.bin";

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("i/o failure on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to encode {blob}: {source}")]
    Encode {
        blob: &'static str,
        #[source]
        source: bincode::Error,
    },
    #[error("failed to decode {blob}: {source}")]
    Decode {
        blob: &'static str,
        #[source]
        source: bincode::Error,
    },
}

impl PersistenceError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::PersistenceFailure
    }
}

/// Registries restored from disk at startup.
#[derive(Debug, Clone, Default)]
pub struct RestoredState {
    pub territory: TerritoryRegistry,
    pub raids: RaidSnapshot,
    pub roster: FactionRoster,
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, blob: &str) -> PathBuf {
        self.dir.join(blob)
    }

    fn read_blob<T: DeserializeOwned>(&self, blob: &'static str) -> Result<Option<T>, PersistenceError> {
        let path = self.path(blob);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(PersistenceError::Io { path, source }),
        };
        bincode::deserialize(&bytes)
            .map(Some)
            .map_err(|source| PersistenceError::Decode { blob, source })
    }

    /// Encode to a sibling temp file, then rename over the target.
    fn write_blob<T: Serialize>(&self, blob: &'static str, value: &T) -> Result<(), PersistenceError> {
        let bytes =
            bincode::serialize(value).map_err(|source| PersistenceError::Encode { blob, source })?;
        fs::create_dir_all(&self.dir).map_err(|source| PersistenceError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let target = self.path(blob);
        let staging = target.with_extension("bin.tmp");
        fs::write(&staging, &bytes).map_err(|source| PersistenceError::Io {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, &target).map_err(|source| PersistenceError::Io {
            path: target.clone(),
            source,
        })?;
        debug!(
            target: "guilds::persistence",
            blob,
            bytes = bytes.len(),
            "snapshot.written"
        );
        Ok(())
    }

    fn load_or_default<T: DeserializeOwned + Default>(&self, blob: &'static str) -> T {
        match self.read_blob(blob) {
            Ok(Some(value)) => value,
            Ok(None) => {
                info!(target: "guilds::persistence", blob, "snapshot.missing=empty");
                T::default()
            }
            Err(err) => {
                warn!(
                    target: "guilds::persistence",
                    blob,
                    error = %err,
                    "snapshot.load_failed=empty"
                );
                T::default()
            }
        }
    }

    pub fn load_territory(&self) -> TerritoryRegistry {
        let snapshot: TerritorySnapshot = self.load_or_default(TERRITORY_BLOB);
        TerritoryRegistry::from_snapshot(snapshot)
    }

    pub fn load_raid_snapshot(&self) -> RaidSnapshot {
        self.load_or_default(RAIDS_BLOB)
    }

    pub fn load_raids(&self, config: &RaidConfig) -> RaidRegistry {
        RaidRegistry::from_snapshot(config, self.load_raid_snapshot())
    }

    pub fn load_roster(&self) -> FactionRoster {
        let mut roster: FactionRoster = self.load_or_default(FACTIONS_BLOB);
        roster.reindex();
        roster
    }

    /// Load everything; the raid set is kept as a snapshot until a config is known.
    pub fn load_all(&self) -> RestoredState {
        let state = RestoredState {
            territory: self.load_territory(),
            raids: self.load_raid_snapshot(),
            roster: self.load_roster(),
        };
        info!(
            target: "guilds::persistence",
            dir = %self.dir.display(),
            cells = state.territory.len(),
            factions = state.roster.len(),
            "snapshot.restored"
        );
        state
    }

    pub fn save_territory(&self, territory: &TerritoryRegistry) -> Result<(), PersistenceError> {
        self.write_blob(TERRITORY_BLOB, &territory.snapshot())
    }

    pub fn save_raids(&self, raids: &RaidRegistry) -> Result<(), PersistenceError> {
        self.write_blob(RAIDS_BLOB, &raids.snapshot())
    }

    pub fn save_roster(&self, roster: &FactionRoster) -> Result<(), PersistenceError> {
        self.write_blob(FACTIONS_BLOB, roster)
    }

    /// Persist every registry present in the world.
    ///
    /// Takes the world exclusively so no mutation can interleave with the save.
    pub fn save_world(&self, world: &mut World) -> Result<(), PersistenceError> {
        if let Some(territory) = world.get_resource::<TerritoryRegistry>() {
            self.save_territory(territory)?;
        }
        if let Some(raids) = world.get_resource::<RaidRegistry>() {
            self.save_raids(raids)?;
        }
        if let Some(roster) = world.get_resource::<FactionRoster>() {
            self.save_roster(roster)?;
        }
        info!(target: "guilds::persistence", dir = %self.dir.display(), "snapshot.saved");
        Ok(())
    }
}
