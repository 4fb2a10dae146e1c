//! Participant-facing raid verbs executed against the raid registry.

use tracing::debug;

use crate::faction::{FactionDirectory, FactionId, ParticipantId};
use crate::raid::{JoinError, SimInstant};
use crate::raid_registry::{CreateError, RaidActivation, RaidRegistry, Removal};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaidCommand {
    Join(FactionId),
    Leave,
    Start,
    Help,
}

impl RaidCommand {
    fn label(&self) -> &'static str {
        match self {
            RaidCommand::Join(_) => "join",
            RaidCommand::Leave => "leave",
            RaidCommand::Start => "start",
            RaidCommand::Help => "help",
        }
    }
}

/// Result of a command: lines for the issuer plus lines for everyone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutcome {
    pub accepted: bool,
    pub messages: Vec<String>,
    pub broadcast: Vec<String>,
}

impl CommandOutcome {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            accepted: true,
            messages: vec![message.into()],
            broadcast: Vec::new(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            accepted: false,
            messages: vec![message.into()],
            broadcast: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }

    pub fn with_broadcast(mut self, line: impl Into<String>) -> Self {
        self.broadcast.push(line.into());
        self
    }

    /// First line addressed to the issuer, if any.
    pub fn message(&self) -> &str {
        self.messages.first().map(String::as_str).unwrap_or_default()
    }
}

impl From<CommandOutcome> for guild_runtime::CommandReply {
    fn from(outcome: CommandOutcome) -> Self {
        Self {
            correlation_id: None,
            accepted: outcome.accepted,
            messages: outcome.messages,
            broadcast: outcome.broadcast,
        }
    }
}

/// Line announced to everyone when a raid goes live.
pub fn activation_notice(activation: &RaidActivation) -> String {
    format!("The raid on {} has begun!", activation.defender)
}

fn reject(
    issuer: ParticipantId,
    command: &RaidCommand,
    reason: &'static str,
    message: impl Into<String>,
) -> CommandOutcome {
    debug!(
        target: "guilds::raid",
        %issuer,
        command = command.label(),
        reason,
        "raid_command.rejected"
    );
    CommandOutcome::rejected(message)
}

pub fn execute_raid_command<D: FactionDirectory + ?Sized>(
    raids: &mut RaidRegistry,
    factions: &D,
    issuer: ParticipantId,
    command: &RaidCommand,
    now: SimInstant,
) -> CommandOutcome {
    match command {
        RaidCommand::Help => help(raids, factions, issuer, command),
        RaidCommand::Join(target) => join(raids, factions, issuer, command, target),
        RaidCommand::Leave => leave(raids, factions, issuer, command),
        RaidCommand::Start => start(raids, issuer, command, now),
    }
}

fn help<D: FactionDirectory + ?Sized>(
    raids: &RaidRegistry,
    factions: &D,
    issuer: ParticipantId,
    command: &RaidCommand,
) -> CommandOutcome {
    if factions.faction_of(issuer).is_none() {
        return reject(
            issuer,
            command,
            "no_faction",
            "Only those who are in a guild can use raid commands!",
        );
    }
    let outcome = CommandOutcome::accepted("/raid help - Displays raid commands.");
    match raids.get_by_participant(issuer) {
        None => outcome.with_message("/raid join <guild> - Join a raid on a guild"),
        Some(raid) if !raid.is_started() => outcome
            .with_message("/raid start - Start the raid.")
            .with_message("/raid leave - Leave the current raiding party."),
        Some(_) => outcome,
    }
}

fn join<D: FactionDirectory + ?Sized>(
    raids: &mut RaidRegistry,
    factions: &D,
    issuer: ParticipantId,
    command: &RaidCommand,
    target: &FactionId,
) -> CommandOutcome {
    let Some(own_faction) = factions.faction_of(issuer) else {
        return reject(
            issuer,
            command,
            "no_faction",
            "Only those who are in a guild may join a raid!",
        );
    };
    if raids.get_by_participant(issuer).is_some() {
        return reject(issuer, command, "already_in_raid", "You are already part of a raid!");
    }
    if own_faction == target {
        return reject(
            issuer,
            command,
            "own_faction",
            "You cannot join a raid on your own guild!",
        );
    }
    if !factions.faction_exists(target) {
        return reject(
            issuer,
            command,
            "unknown_faction",
            format!("The guild {target} does not exist!"),
        );
    }

    let Some(raid) = raids.get_by_defender(target) else {
        return match raids.create(target.clone(), issuer, own_faction) {
            Ok(_) => CommandOutcome::accepted(format!("Successfully joined the raid on {target}!")),
            Err(CreateError::RaidLimitReached { .. }) => reject(
                issuer,
                command,
                "raid_limit",
                "No more raids can be started at the moment!",
            ),
            Err(err) => reject(issuer, command, "create_failed", err.to_string()),
        };
    };
    if raid.is_active() {
        return reject(
            issuer,
            command,
            "already_active",
            format!("The raid on {target} has already begun!"),
        );
    }

    let raid_id = raid.id();
    let started = raid.is_started();
    if factions.are_allied(own_faction, target) {
        if !started {
            return reject(
                issuer,
                command,
                "not_started",
                "A raid has not been started for that guild!",
            );
        }
        return match raids.add_defender(raid_id, issuer) {
            Ok(()) => CommandOutcome::accepted(format!(
                "Successfully joined the raid on {target} as a defender!"
            )),
            Err(JoinError::CapacityReached { .. }) => reject(
                issuer,
                command,
                "defender_capacity",
                "No more defenders can join the raid at the moment!",
            ),
            Err(err) => reject(issuer, command, "join_failed", err.to_string()),
        };
    }

    // Guilds without a pact are not turned away here; they join as attackers.
    match raids.add_attacker(raid_id, issuer) {
        Ok(()) => CommandOutcome::accepted(format!("Successfully joined the raid on {target}!")),
        Err(JoinError::CapacityReached { .. } | JoinError::WrongPhase { .. }) => reject(
            issuer,
            command,
            "attackers_closed",
            "No more attackers can join the raid at the moment!",
        ),
        Err(err) => reject(issuer, command, "join_failed", err.to_string()),
    }
}

fn leave<D: FactionDirectory + ?Sized>(
    raids: &mut RaidRegistry,
    factions: &D,
    issuer: ParticipantId,
    command: &RaidCommand,
) -> CommandOutcome {
    let Some(own_faction) = factions.faction_of(issuer) else {
        return reject(issuer, command, "no_faction", "You are not part of a guild!");
    };
    let Some(raid) = raids.get_by_participant(issuer) else {
        return reject(
            issuer,
            command,
            "not_in_raid",
            "You are not currently a part of a raid!",
        );
    };
    // Members of the defending faction are never told a raid exists.
    if raid.defending_faction() == own_faction {
        return reject(
            issuer,
            command,
            "not_in_raid",
            "You are not currently a part of a raid!",
        );
    }
    if raid.is_started() {
        return reject(
            issuer,
            command,
            "already_started",
            "The raid preparation has already begun!",
        );
    }

    let raid_id = raid.id();
    let defender = raid.defending_faction().clone();
    match raids.remove_participant(raid_id, issuer) {
        Ok(Removal::Removed(_)) => CommandOutcome::accepted("You have successfully left the raid."),
        Ok(Removal::Dissolved) => CommandOutcome::accepted("You have successfully left the raid.")
            .with_message(format!("The raid on {defender} has been called off.")),
        Err(err) => reject(issuer, command, "leave_failed", err.to_string()),
    }
}

fn start(
    raids: &mut RaidRegistry,
    issuer: ParticipantId,
    command: &RaidCommand,
    now: SimInstant,
) -> CommandOutcome {
    let Some(raid) = raids.get_by_participant(issuer) else {
        return reject(
            issuer,
            command,
            "not_in_raid",
            "You are not currently a part of a raid!",
        );
    };
    if !raid.is_attacker(issuer) {
        return reject(
            issuer,
            command,
            "not_attacker",
            "Only attackers can start a raid!",
        );
    }
    if raid.is_started() {
        return reject(issuer, command, "already_started", "Raid is already started!");
    }

    let raid_id = raid.id();
    let defender = raid.defending_faction().clone();
    match raids.start(raid_id, now) {
        Ok(()) => {
            let seconds = raids.limits().preparation.as_secs();
            CommandOutcome::accepted(format!("The raid on {defender} has been started."))
                .with_broadcast(format!(
                    "The raid on {defender} will begin in {seconds} seconds!"
                ))
        }
        Err(err) => reject(issuer, command, "start_failed", err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faction::{FactionRoster, PactId};
    use crate::raid::RaidPhase;
    use crate::raid_config::RaidConfig;

    const NORTH_MEMBER: ParticipantId = ParticipantId(1);
    const RAIDER_A: ParticipantId = ParticipantId(10);
    const RAIDER_B: ParticipantId = ParticipantId(11);
    const ALLY: ParticipantId = ParticipantId(20);
    const LONER: ParticipantId = ParticipantId(99);

    fn fid(name: &str) -> FactionId {
        FactionId::new(name)
    }

    struct Fixture {
        raids: RaidRegistry,
        roster: FactionRoster,
    }

    impl Fixture {
        fn new() -> Self {
            let mut roster = FactionRoster::default();
            roster.found(fid("north"), NORTH_MEMBER).unwrap();
            roster.found(fid("south"), RAIDER_A).unwrap();
            roster.add_member(&fid("south"), RAIDER_B).unwrap();
            roster.found(fid("east"), ALLY).unwrap();
            roster
                .set_pact(&fid("north"), Some(PactId::new("crown")))
                .unwrap();
            roster
                .set_pact(&fid("east"), Some(PactId::new("crown")))
                .unwrap();
            let config = RaidConfig::default()
                .with_preparation_seconds(30)
                .with_max_attackers(2);
            Self {
                raids: RaidRegistry::new(&config),
                roster,
            }
        }

        fn run(&mut self, issuer: ParticipantId, command: RaidCommand) -> CommandOutcome {
            execute_raid_command(
                &mut self.raids,
                &self.roster,
                issuer,
                &command,
                SimInstant::from_secs(100),
            )
        }
    }

    #[test]
    fn help_depends_on_situation() {
        let mut fixture = Fixture::new();
        let outcome = fixture.run(LONER, RaidCommand::Help);
        assert!(!outcome.accepted);
        insta::assert_snapshot!(outcome.message(), @"Only those who are in a guild can use raid commands!");

        let outcome = fixture.run(RAIDER_A, RaidCommand::Help);
        assert_eq!(
            outcome.messages,
            vec![
                "/raid help - Displays raid commands.".to_string(),
                "/raid join <guild> - Join a raid on a guild".to_string(),
            ]
        );

        fixture.run(RAIDER_A, RaidCommand::Join(fid("north")));
        let outcome = fixture.run(RAIDER_A, RaidCommand::Help);
        assert_eq!(outcome.messages.len(), 3);
        assert_eq!(outcome.messages[1], "/raid start - Start the raid.");
    }

    #[test]
    fn join_creates_then_adds_attackers() {
        let mut fixture = Fixture::new();
        let outcome = fixture.run(RAIDER_A, RaidCommand::Join(fid("north")));
        assert!(outcome.accepted);
        insta::assert_snapshot!(outcome.message(), @"Successfully joined the raid on north!");

        assert!(fixture.run(RAIDER_B, RaidCommand::Join(fid("north"))).accepted);
        let raid = fixture.raids.get_by_defender(&fid("north")).unwrap();
        assert_eq!(raid.attackers(), &[RAIDER_A, RAIDER_B]);

        let outcome = fixture.run(RAIDER_B, RaidCommand::Join(fid("north")));
        insta::assert_snapshot!(outcome.message(), @"You are already part of a raid!");
    }

    #[test]
    fn join_rejections() {
        let mut fixture = Fixture::new();
        let outcome = fixture.run(LONER, RaidCommand::Join(fid("north")));
        insta::assert_snapshot!(outcome.message(), @"Only those who are in a guild may join a raid!");

        let outcome = fixture.run(NORTH_MEMBER, RaidCommand::Join(fid("north")));
        insta::assert_snapshot!(outcome.message(), @"You cannot join a raid on your own guild!");

        let outcome = fixture.run(RAIDER_A, RaidCommand::Join(fid("nowhere")));
        insta::assert_snapshot!(outcome.message(), @"The guild nowhere does not exist!");

        assert!(fixture.raids.is_empty());
    }

    #[test]
    fn allies_defend_only_after_start() {
        let mut fixture = Fixture::new();
        fixture.run(RAIDER_A, RaidCommand::Join(fid("north")));

        let outcome = fixture.run(ALLY, RaidCommand::Join(fid("north")));
        assert!(!outcome.accepted);
        insta::assert_snapshot!(outcome.message(), @"A raid has not been started for that guild!");

        let outcome = fixture.run(RAIDER_A, RaidCommand::Start);
        assert!(outcome.accepted);
        assert_eq!(
            outcome.broadcast,
            vec!["The raid on north will begin in 30 seconds!".to_string()]
        );

        let outcome = fixture.run(ALLY, RaidCommand::Join(fid("north")));
        insta::assert_snapshot!(outcome.message(), @"Successfully joined the raid on north as a defender!");
        let raid = fixture.raids.get_by_defender(&fid("north")).unwrap();
        assert_eq!(raid.defenders(), &[ALLY]);
    }

    #[test]
    fn attackers_cannot_join_after_start_or_over_capacity() {
        let mut fixture = Fixture::new();
        fixture.run(RAIDER_A, RaidCommand::Join(fid("north")));
        fixture.run(RAIDER_A, RaidCommand::Start);
        let outcome = fixture.run(RAIDER_B, RaidCommand::Join(fid("north")));
        insta::assert_snapshot!(outcome.message(), @"No more attackers can join the raid at the moment!");

        fixture.raids.advance_all(SimInstant::from_secs(130));
        let outcome = fixture.run(RAIDER_B, RaidCommand::Join(fid("north")));
        insta::assert_snapshot!(outcome.message(), @"The raid on north has already begun!");
    }

    #[test]
    fn leave_rules() {
        let mut fixture = Fixture::new();
        let outcome = fixture.run(RAIDER_A, RaidCommand::Leave);
        insta::assert_snapshot!(outcome.message(), @"You are not currently a part of a raid!");

        fixture.run(RAIDER_A, RaidCommand::Join(fid("north")));
        fixture.run(RAIDER_B, RaidCommand::Join(fid("north")));
        let outcome = fixture.run(RAIDER_B, RaidCommand::Leave);
        assert!(outcome.accepted);
        assert_eq!(outcome.messages.len(), 1);

        let outcome = fixture.run(RAIDER_A, RaidCommand::Leave);
        assert_eq!(
            outcome.messages[1],
            "The raid on north has been called off."
        );
        assert!(fixture.raids.is_empty());
    }

    #[test]
    fn leave_after_start_is_refused() {
        let mut fixture = Fixture::new();
        fixture.run(RAIDER_A, RaidCommand::Join(fid("north")));
        fixture.run(RAIDER_A, RaidCommand::Start);
        let outcome = fixture.run(RAIDER_A, RaidCommand::Leave);
        insta::assert_snapshot!(outcome.message(), @"The raid preparation has already begun!");
    }

    #[test]
    fn start_twice_is_rejected() {
        let mut fixture = Fixture::new();
        fixture.run(RAIDER_A, RaidCommand::Join(fid("north")));
        assert!(fixture.run(RAIDER_A, RaidCommand::Start).accepted);
        let outcome = fixture.run(RAIDER_A, RaidCommand::Start);
        assert!(!outcome.accepted);
        insta::assert_snapshot!(outcome.message(), @"Raid is already started!");
        assert_eq!(
            fixture.raids.get_by_defender(&fid("north")).unwrap().phase(),
            RaidPhase::PreparationCountdown {
                started_at: SimInstant::from_secs(100)
            }
        );
    }

    #[test]
    fn defenders_cannot_start_raids() {
        let mut fixture = Fixture::new();
        fixture.run(RAIDER_A, RaidCommand::Join(fid("north")));
        fixture.run(RAIDER_A, RaidCommand::Start);
        assert!(fixture.run(ALLY, RaidCommand::Join(fid("north"))).accepted);

        let outcome = fixture.run(ALLY, RaidCommand::Start);
        assert!(!outcome.accepted);
        insta::assert_snapshot!(outcome.message(), @"Only attackers can start a raid!");
    }

    #[test]
    fn guild_without_pact_joins_existing_raid_as_attacker() {
        let mut fixture = Fixture::new();
        fixture.run(RAIDER_A, RaidCommand::Join(fid("north")));
        assert_eq!(fixture.roster.pact_of(&fid("south")), None);
        let outcome = fixture.run(RAIDER_B, RaidCommand::Join(fid("north")));
        insta::assert_snapshot!(outcome.message(), @"Successfully joined the raid on north!");
        let raid = fixture.raids.get_by_defender(&fid("north")).unwrap();
        assert!(raid.is_attacker(RAIDER_B));
    }

    #[test]
    fn activation_notice_names_defender() {
        let activation = RaidActivation {
            raid: crate::raid::RaidId(1),
            defender: fid("north"),
            attackers: 2,
            defenders: 0,
        };
        insta::assert_snapshot!(activation_notice(&activation), @"The raid on north has begun!");
    }
}
