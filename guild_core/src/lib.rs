//! Server-side territory and raid model for the guilds server.
//!
//! Owns the cell ownership map, the live raid set and the faction roster as
//! Bevy resources. Raids advance when [`run_tick`] is invoked; commands are
//! applied through [`dispatch::execute_command`] or the [`authority`] front door.

pub mod authority;
pub mod dispatch;
pub mod error;
pub mod faction;
pub mod protection;
pub mod raid;
pub mod raid_commands;
pub mod raid_config;
pub mod raid_registry;
mod resources;
pub mod snapshot;
mod systems;
pub mod territory;

use std::sync::Arc;

use bevy::prelude::*;

pub use authority::{Authority, AuthorityClosed, AuthorityHandle};
pub use error::ErrorKind;
pub use faction::{
    disband_faction, Disbandment, FactionDirectory, FactionId, FactionRoster, PactId,
    ParticipantId, RosterError,
};
pub use protection::{
    ActionKind, BoundaryNotice, Creature, DamageSource, Denial, ProtectionOracle, Verdict,
};
pub use raid::{JoinError, LeaveError, Raid, RaidId, RaidPhase, RaidSide, SimInstant, StartError};
pub use raid_commands::{activation_notice, execute_raid_command, CommandOutcome, RaidCommand};
pub use raid_config::{load_raid_config_from_env, RaidConfig, RaidConfigError, RaidConfigHandle};
pub use raid_registry::{
    CreateError, RaidActivation, RaidLimits, RaidRegistry, RaidSnapshot, Removal,
};
pub use resources::{RaidActivations, RaidClock, ServerConfig, ServerTick};
pub use snapshot::{PersistenceError, RestoredState, SnapshotStore};
pub use territory::{Cell, ClaimError, NeighborMask, TerritoryRegistry, TerritorySnapshot};

/// Construct a headless [`App`] with empty registries and config taken from
/// the environment.
pub fn build_headless_app() -> App {
    build_headless_app_with(
        ServerConfig::from_env(),
        load_raid_config_from_env(),
        RestoredState::default(),
    )
}

/// Construct a headless [`App`] around previously restored registries.
pub fn build_headless_app_with(
    server: ServerConfig,
    raid_config: Arc<RaidConfig>,
    restored: RestoredState,
) -> App {
    let mut app = App::new();
    let raids = RaidRegistry::from_snapshot(&raid_config, restored.raids);

    app.insert_resource(server)
        .insert_resource(RaidConfigHandle::new(raid_config))
        .insert_resource(restored.territory)
        .insert_resource(raids)
        .insert_resource(restored.roster)
        .insert_resource(RaidClock::default())
        .insert_resource(RaidActivations::default())
        .insert_resource(ServerTick::default())
        .add_plugins(MinimalPlugins)
        .add_systems(Update, (systems::advance_raids, systems::advance_tick).chain());

    app
}

/// Run one tick at `now` and return the raids that went live during it.
///
/// The tick is elapsed-time based, so calling this at any cadence (or twice
/// at the same instant) never activates a raid early or twice.
pub fn run_tick(app: &mut App, now: SimInstant) -> Vec<RaidActivation> {
    app.world.resource_mut::<RaidClock>().now = now;
    app.update();
    app.world.resource_mut::<RaidActivations>().take()
}
