//! Applies parsed command envelopes to the registries held in the world.

use bevy::ecs::system::SystemState;
use bevy::prelude::*;
use guild_runtime::{CommandEnvelope, CommandPayload, CommandReply, FactionVerb, ProbeAction, RaidVerb};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::ErrorKind;
use crate::faction::{disband_faction, FactionDirectory, FactionId, FactionRoster, PactId, ParticipantId};
use crate::protection::{ActionKind, ProtectionOracle, Verdict};
use crate::raid::SimInstant;
use crate::raid_commands::{execute_raid_command, RaidCommand};
use crate::raid_registry::RaidRegistry;
use crate::territory::{Cell, ClaimError, TerritoryRegistry};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("{0} requires an issuing participant")]
    MissingIssuer(&'static str),
    #[error("{0} is handled by the server authority")]
    AuthorityOnly(&'static str),
}

impl EnvelopeError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvariantViolation
    }
}

impl From<ProbeAction> for ActionKind {
    fn from(action: ProbeAction) -> Self {
        match action {
            ProbeAction::Break { stateful } => ActionKind::Break { stateful },
            ProbeAction::Place { stateful } => ActionKind::Place { stateful },
            ProbeAction::Use { stateful } => ActionKind::Use { stateful },
            ProbeAction::PlaceFluid => ActionKind::PlaceFluid,
            ProbeAction::Trample => ActionKind::Trample,
        }
    }
}

impl From<&RaidVerb> for RaidCommand {
    fn from(verb: &RaidVerb) -> Self {
        match verb {
            RaidVerb::Join { target } => RaidCommand::Join(FactionId::new(target.as_str())),
            RaidVerb::Leave => RaidCommand::Leave,
            RaidVerb::Start => RaidCommand::Start,
            RaidVerb::Help => RaidCommand::Help,
        }
    }
}

type Registries<'w> = (
    ResMut<'w, TerritoryRegistry>,
    ResMut<'w, RaidRegistry>,
    ResMut<'w, FactionRoster>,
);

/// Execute one envelope against the world at `now`.
///
/// `Save` and `Shutdown` are rejected here; the authority loop owns them.
pub fn execute_command(world: &mut World, envelope: &CommandEnvelope, now: SimInstant) -> CommandReply {
    let label = envelope.payload.label();
    let reply = match validate(envelope) {
        Ok(issuer) => {
            let mut state: SystemState<Registries> = SystemState::new(world);
            let (mut territory, mut raids, mut roster) = state.get_mut(world);
            apply(
                &mut territory,
                &mut raids,
                &mut roster,
                issuer,
                &envelope.payload,
                now,
            )
        }
        Err(err) => {
            debug!(target: "guilds::server", command = label, error = %err, "command.rejected=envelope");
            CommandReply::rejected(err.to_string())
        }
    };
    reply.with_correlation(envelope.correlation_id)
}

fn validate(envelope: &CommandEnvelope) -> Result<Option<ParticipantId>, EnvelopeError> {
    let label = envelope.payload.label();
    if matches!(envelope.payload, CommandPayload::Save | CommandPayload::Shutdown) {
        return Err(EnvelopeError::AuthorityOnly(label));
    }
    match envelope.issuer {
        Some(issuer) => Ok(Some(ParticipantId(issuer))),
        None if envelope.payload.requires_issuer() => Err(EnvelopeError::MissingIssuer(label)),
        None => Ok(None),
    }
}

fn apply(
    territory: &mut TerritoryRegistry,
    raids: &mut RaidRegistry,
    roster: &mut FactionRoster,
    issuer: Option<ParticipantId>,
    payload: &CommandPayload,
    now: SimInstant,
) -> CommandReply {
    match (payload, issuer) {
        (CommandPayload::ResolveRaid { defender }, _) => {
            resolve(raids, &FactionId::new(defender.as_str()))
        }
        (CommandPayload::Save | CommandPayload::Shutdown, _) => {
            CommandReply::rejected(EnvelopeError::AuthorityOnly(payload.label()).to_string())
        }
        (_, None) => {
            CommandReply::rejected(EnvelopeError::MissingIssuer(payload.label()).to_string())
        }
        (CommandPayload::Raid(verb), Some(issuer)) => {
            execute_raid_command(raids, &*roster, issuer, &RaidCommand::from(verb), now).into()
        }
        (CommandPayload::Faction(verb), Some(issuer)) => {
            faction_command(territory, raids, roster, issuer, verb)
        }
        (CommandPayload::Claim { x, z }, Some(issuer)) => {
            claim(territory, roster, issuer, Cell::new(*x, *z))
        }
        (CommandPayload::Abandon { x, z }, Some(issuer)) => {
            abandon(territory, roster, issuer, Cell::new(*x, *z))
        }
        (CommandPayload::Probe { x, z, action }, Some(issuer)) => {
            let action = ActionKind::from(*action);
            let oracle = ProtectionOracle::new(&*territory, &*raids, &*roster);
            match oracle.permits(issuer, Cell::new(*x, *z), action) {
                Verdict::Permit => CommandReply::accepted("permitted"),
                Verdict::Deny(denial) => CommandReply::rejected(denial.message(action)),
            }
        }
    }
}

fn faction_command(
    territory: &mut TerritoryRegistry,
    raids: &mut RaidRegistry,
    roster: &mut FactionRoster,
    issuer: ParticipantId,
    verb: &FactionVerb,
) -> CommandReply {
    match verb {
        FactionVerb::Found { name } => {
            let faction = FactionId::new(name.as_str());
            match roster.found(faction.clone(), issuer) {
                Ok(()) => CommandReply::accepted(format!("Founded the guild {faction}."))
                    .with_broadcast(format!("The guild {faction} has been founded!")),
                Err(err) => CommandReply::rejected(err.to_string()),
            }
        }
        FactionVerb::Join { .. } | FactionVerb::Leave
            if raids.get_by_participant(issuer).is_some() =>
        {
            debug!(target: "guilds::factions", %issuer, "faction_command.rejected=in_raid");
            CommandReply::rejected("You cannot change guilds while part of a raid!")
        }
        FactionVerb::Join { name } => {
            let faction = FactionId::new(name.as_str());
            match roster.add_member(&faction, issuer) {
                Ok(()) => CommandReply::accepted(format!("You joined the guild {faction}.")),
                Err(err) => CommandReply::rejected(err.to_string()),
            }
        }
        FactionVerb::Leave => match roster.remove_member(issuer) {
            Ok(faction) => CommandReply::accepted(format!("You left the guild {faction}.")),
            Err(err) => CommandReply::rejected(err.to_string()),
        },
        FactionVerb::Pact { pact } => {
            let Some(faction) = roster.faction_of(issuer).cloned() else {
                return CommandReply::rejected("You are not part of a guild!");
            };
            let pact = pact.as_deref().map(PactId::new);
            let message = match &pact {
                Some(pact) => format!("The guild {faction} joined the pact {pact}."),
                None => format!("The guild {faction} left its pact."),
            };
            match roster.set_pact(&faction, pact) {
                Ok(()) => CommandReply::accepted(message),
                Err(err) => CommandReply::rejected(err.to_string()),
            }
        }
        FactionVerb::Disband => {
            let Some(faction) = roster.faction_of(issuer).cloned() else {
                return CommandReply::rejected("You are not part of a guild!");
            };
            match disband_faction(roster, territory, raids, &faction) {
                Ok(summary) => CommandReply::accepted(format!(
                    "Disbanded the guild {faction}; {} chunks released.",
                    summary.released_cells
                ))
                .with_broadcast(format!("The guild {faction} has been disbanded!")),
                Err(err) => CommandReply::rejected(err.to_string()),
            }
        }
    }
}

fn claim(
    territory: &mut TerritoryRegistry,
    roster: &FactionRoster,
    issuer: ParticipantId,
    cell: Cell,
) -> CommandReply {
    let Some(faction) = roster.faction_of(issuer) else {
        return CommandReply::rejected("Only those who are in a guild may claim land!");
    };
    match territory.claim(cell, faction.clone()) {
        Ok(()) => CommandReply::accepted(format!("Claimed chunk {cell} for {faction}.")),
        Err(ClaimError::AlreadyOwned { owner, .. }) if owner == *faction => {
            CommandReply::rejected("Your guild already owns this chunk!")
        }
        Err(ClaimError::AlreadyOwned { owner, .. }) => {
            CommandReply::rejected(format!("This chunk is already claimed by {owner}!"))
        }
        Err(ClaimError::NotAdjacent { .. }) => {
            CommandReply::rejected("Claims must border your guild's existing territory!")
        }
    }
}

fn abandon(
    territory: &mut TerritoryRegistry,
    roster: &FactionRoster,
    issuer: ParticipantId,
    cell: Cell,
) -> CommandReply {
    let Some(faction) = roster.faction_of(issuer) else {
        return CommandReply::rejected("You are not part of a guild!");
    };
    if territory.owner_of(cell) != Some(faction) {
        return CommandReply::rejected("Your guild does not own this chunk!");
    }
    if territory.release(cell) {
        CommandReply::accepted(format!("Abandoned chunk {cell}."))
    } else {
        CommandReply::rejected("Abandoning this chunk would split your guild's territory!")
    }
}

fn resolve(raids: &mut RaidRegistry, defender: &FactionId) -> CommandReply {
    let Some(raid_id) = raids.get_by_defender(defender).map(|raid| raid.id()) else {
        return CommandReply::rejected(format!("There is no raid on {defender}."));
    };
    match raids.resolve_and_remove(raid_id) {
        Some(raid) => {
            info!(
                target: "guilds::raid",
                raid = %raid_id,
                defender = %defender,
                phase = %raid.phase(),
                "raid.resolved=external"
            );
            CommandReply::accepted(format!("Resolved the raid on {defender}."))
                .with_broadcast(format!("The raid on {defender} has ended!"))
        }
        None => CommandReply::rejected(format!("There is no raid on {defender}.")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raid_config::RaidConfig;

    fn world() -> World {
        let mut world = World::new();
        world.insert_resource(TerritoryRegistry::default());
        world.insert_resource(RaidRegistry::new(&RaidConfig::default()));
        world.insert_resource(FactionRoster::default());
        world
    }

    fn run(world: &mut World, issuer: u64, payload: CommandPayload) -> CommandReply {
        execute_command(
            world,
            &CommandEnvelope::from_participant(issuer, payload),
            SimInstant::from_secs(10),
        )
    }

    fn found(name: &str) -> CommandPayload {
        CommandPayload::Faction(FactionVerb::Found { name: name.into() })
    }

    #[test]
    fn envelope_validation() {
        let mut world = world();
        let reply = execute_command(
            &mut world,
            &CommandEnvelope::admin(CommandPayload::Claim { x: 0, z: 0 }).with_correlation(4),
            SimInstant::from_secs(0),
        );
        assert!(!reply.accepted);
        assert_eq!(reply.correlation_id, Some(4));
        assert_eq!(reply.messages, vec!["claim requires an issuing participant".to_string()]);

        let reply = execute_command(
            &mut world,
            &CommandEnvelope::admin(CommandPayload::Save),
            SimInstant::from_secs(0),
        );
        assert!(!reply.accepted);
    }

    #[test]
    fn claim_and_abandon_follow_registry_rules() {
        let mut world = world();
        assert!(!run(&mut world, 1, CommandPayload::Claim { x: 0, z: 0 }).accepted);
        assert!(run(&mut world, 1, found("north")).accepted);
        assert!(run(&mut world, 1, CommandPayload::Claim { x: 0, z: 0 }).accepted);
        assert!(run(&mut world, 1, CommandPayload::Claim { x: 1, z: 0 }).accepted);

        let reply = run(&mut world, 1, CommandPayload::Claim { x: 5, z: 5 });
        insta::assert_snapshot!(reply.messages[0], @"Claims must border your guild's existing territory!");

        assert!(run(&mut world, 2, found("south")).accepted);
        let reply = run(&mut world, 2, CommandPayload::Claim { x: 0, z: 0 });
        insta::assert_snapshot!(reply.messages[0], @"This chunk is already claimed by north!");
        let reply = run(&mut world, 2, CommandPayload::Abandon { x: 0, z: 0 });
        assert!(!reply.accepted);

        assert!(run(&mut world, 1, CommandPayload::Abandon { x: 1, z: 0 }).accepted);
        assert_eq!(world.resource::<TerritoryRegistry>().len(), 1);
    }

    #[test]
    fn probe_reports_oracle_verdict() {
        let mut world = world();
        run(&mut world, 1, found("north"));
        run(&mut world, 1, CommandPayload::Claim { x: 0, z: 0 });
        run(&mut world, 2, found("south"));

        let probe = CommandPayload::Probe {
            x: 0,
            z: 0,
            action: ProbeAction::Break { stateful: false },
        };
        assert!(run(&mut world, 1, probe.clone()).accepted);
        let reply = run(&mut world, 2, probe);
        insta::assert_snapshot!(reply.messages[0], @"You cannot break blocks in the territory of north!");
    }

    #[test]
    fn raid_verbs_and_resolution() {
        let mut world = world();
        run(&mut world, 1, found("north"));
        run(&mut world, 2, found("south"));
        let reply = run(
            &mut world,
            2,
            CommandPayload::Raid(RaidVerb::Join {
                target: "north".into(),
            }),
        );
        assert!(reply.accepted);
        let reply = run(&mut world, 2, CommandPayload::Raid(RaidVerb::Start));
        assert_eq!(
            reply.broadcast,
            vec!["The raid on north will begin in 60 seconds!".to_string()]
        );

        let reply = execute_command(
            &mut world,
            &CommandEnvelope::admin(CommandPayload::ResolveRaid {
                defender: "north".into(),
            }),
            SimInstant::from_secs(20),
        );
        assert!(reply.accepted);
        assert!(world.resource::<RaidRegistry>().is_empty());
    }

    #[test]
    fn disband_releases_everything() {
        let mut world = world();
        run(&mut world, 1, found("north"));
        run(&mut world, 1, CommandPayload::Claim { x: 0, z: 0 });
        run(&mut world, 1, CommandPayload::Claim { x: 0, z: 1 });
        let reply = run(&mut world, 1, CommandPayload::Faction(FactionVerb::Disband));
        assert!(reply.accepted);
        assert!(world.resource::<TerritoryRegistry>().is_empty());
        assert!(world.resource::<FactionRoster>().is_empty());
    }

    #[test]
    fn raid_participants_cannot_switch_guilds() {
        let mut world = world();
        run(&mut world, 1, found("north"));
        run(&mut world, 2, found("south"));
        run(&mut world, 3, found("east"));
        let join_north = CommandPayload::Raid(RaidVerb::Join {
            target: "north".into(),
        });
        assert!(run(&mut world, 2, join_north).accepted);

        let leave = CommandPayload::Faction(FactionVerb::Leave);
        let reply = run(&mut world, 2, leave.clone());
        assert!(!reply.accepted);
        insta::assert_snapshot!(reply.messages[0], @"You cannot change guilds while part of a raid!");
        let reply = run(
            &mut world,
            2,
            CommandPayload::Faction(FactionVerb::Join {
                name: "north".into(),
            }),
        );
        assert!(!reply.accepted);
        assert_eq!(
            world
                .resource::<FactionRoster>()
                .faction_of(ParticipantId(2)),
            Some(&FactionId::new("south"))
        );

        // The attacker can still back out through the raid itself, then move freely.
        assert!(run(&mut world, 2, CommandPayload::Raid(RaidVerb::Leave)).accepted);
        assert!(world.resource::<RaidRegistry>().is_empty());
        assert!(run(&mut world, 3, leave).accepted);
        assert!(run(
            &mut world,
            3,
            CommandPayload::Faction(FactionVerb::Join {
                name: "north".into(),
            }),
        )
        .accepted);
    }

    #[test]
    fn disbanding_attackers_frees_the_defender() {
        let mut world = world();
        run(&mut world, 1, found("north"));
        run(&mut world, 2, found("south"));
        run(&mut world, 3, found("west"));
        let join_north = CommandPayload::Raid(RaidVerb::Join {
            target: "north".into(),
        });
        assert!(run(&mut world, 2, join_north.clone()).accepted);
        assert!(run(&mut world, 2, CommandPayload::Raid(RaidVerb::Start)).accepted);

        assert!(run(&mut world, 2, CommandPayload::Faction(FactionVerb::Disband)).accepted);
        let raids = world.resource::<RaidRegistry>();
        assert!(raids.get_by_participant(ParticipantId(2)).is_none());
        assert!(raids.get_by_defender(&FactionId::new("north")).is_none());

        // North can be raided afresh.
        assert!(run(&mut world, 3, join_north).accepted);
    }

    #[test]
    fn pact_requires_membership() {
        let mut world = world();
        let pact = CommandPayload::Faction(FactionVerb::Pact {
            pact: Some("crown".into()),
        });
        assert!(!run(&mut world, 1, pact.clone()).accepted);
        run(&mut world, 1, found("north"));
        assert!(run(&mut world, 1, pact).accepted);
        assert_eq!(
            world
                .resource::<FactionRoster>()
                .pact_of(&FactionId::new("north")),
            Some(&PactId::new("crown"))
        );
    }
}
