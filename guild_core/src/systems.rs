use bevy::prelude::*;

use crate::raid_registry::RaidRegistry;
use crate::resources::{RaidActivations, RaidClock, ServerTick};

/// Promote raids whose preparation countdown has elapsed at the current clock.
pub fn advance_raids(
    clock: Res<RaidClock>,
    mut raids: ResMut<RaidRegistry>,
    mut activations: ResMut<RaidActivations>,
) {
    activations.this_tick = raids.advance_all(clock.now);
}

pub fn advance_tick(mut tick: ResMut<ServerTick>) {
    tick.0 = tick.0.wrapping_add(1);
    tracing::trace!(target: "guilds::raid", tick = tick.0, "tick.completed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy_ecs::system::RunSystemOnce;

    use crate::faction::{FactionId, ParticipantId};
    use crate::raid::SimInstant;
    use crate::raid_config::RaidConfig;

    fn world_with_started_raid() -> World {
        let mut raids = RaidRegistry::new(&RaidConfig::default().with_preparation_seconds(60));
        let id = raids
            .create(
                FactionId::new("north"),
                ParticipantId(7),
                &FactionId::new("south"),
            )
            .unwrap();
        raids.start(id, SimInstant::from_secs(1_000)).unwrap();

        let mut world = World::new();
        world.insert_resource(raids);
        world.insert_resource(RaidActivations::default());
        world.insert_resource(RaidClock {
            now: SimInstant::from_secs(1_030),
        });
        world
    }

    #[test]
    fn advance_raids_waits_for_deadline() {
        let mut world = world_with_started_raid();
        world.run_system_once(advance_raids);
        assert!(world.resource::<RaidActivations>().this_tick.is_empty());

        world.resource_mut::<RaidClock>().now = SimInstant::from_secs(1_060);
        world.run_system_once(advance_raids);
        let activations = world.resource::<RaidActivations>().this_tick.clone();
        assert_eq!(activations.len(), 1);
        assert_eq!(activations[0].defender, FactionId::new("north"));

        // Same instant again: nothing new, and the previous report is replaced.
        world.run_system_once(advance_raids);
        assert!(world.resource::<RaidActivations>().this_tick.is_empty());
        assert!(world
            .resource::<RaidRegistry>()
            .get_by_defender(&FactionId::new("north"))
            .unwrap()
            .is_active());
    }

    #[test]
    fn tick_counter_increments() {
        let mut world = World::new();
        world.insert_resource(ServerTick::default());
        world.run_system_once(advance_tick);
        world.run_system_once(advance_tick);
        assert_eq!(*world.resource::<ServerTick>(), ServerTick(2));
    }
}
