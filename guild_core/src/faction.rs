use std::collections::{HashMap, HashSet};
use std::fmt;

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::error::ErrorKind;
use crate::raid_registry::RaidRegistry;
use crate::territory::TerritoryRegistry;

/// Identifier for a faction that can own territory and be raided.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactionId(pub String);

impl FactionId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for a cross-faction pact. Factions sharing a pact defend each other.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PactId(pub String);

impl PactId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for PactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for an individual participant (a player).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParticipantId(pub u64);

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-side contract the core consumes from whatever owns faction membership.
pub trait FactionDirectory {
    fn faction_exists(&self, faction: &FactionId) -> bool;

    fn is_member(&self, faction: &FactionId, participant: ParticipantId) -> bool;

    fn pact_of(&self, faction: &FactionId) -> Option<&PactId>;

    /// Reverse lookup used by the command surface to find the issuer's faction.
    fn faction_of(&self, participant: ParticipantId) -> Option<&FactionId>;

    fn territory_claim_count(&self, faction: &FactionId, territory: &TerritoryRegistry) -> usize {
        territory.territory_count(faction)
    }

    /// Two factions are allied when both have the same pact.
    fn are_allied(&self, a: &FactionId, b: &FactionId) -> bool {
        match (self.pact_of(a), self.pact_of(b)) {
            (Some(left), Some(right)) => left == right,
            _ => false,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RosterError {
    #[error("faction {0} already exists")]
    DuplicateFaction(FactionId),
    #[error("faction {0} does not exist")]
    UnknownFaction(FactionId),
    #[error("participant {participant} already belongs to faction {faction}")]
    AlreadyMember {
        participant: ParticipantId,
        faction: FactionId,
    },
    #[error("participant {0} is not in a faction")]
    NotMember(ParticipantId),
}

impl RosterError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RosterError::DuplicateFaction(_) | RosterError::AlreadyMember { .. } => {
                ErrorKind::InvariantViolation
            }
            RosterError::UnknownFaction(_) | RosterError::NotMember(_) => ErrorKind::NotFound,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactionRecord {
    pub members: HashSet<ParticipantId>,
    pub pact: Option<PactId>,
}

/// In-memory faction directory used by the server and tests.
#[derive(Resource, Debug, Clone, Default, Serialize, Deserialize)]
pub struct FactionRoster {
    factions: HashMap<FactionId, FactionRecord>,
    #[serde(skip)]
    membership: HashMap<ParticipantId, FactionId>,
}

impl FactionRoster {
    /// Rebuild the reverse membership index after deserialization.
    pub fn reindex(&mut self) {
        self.membership.clear();
        for (faction, record) in &self.factions {
            for participant in &record.members {
                self.membership.insert(*participant, faction.clone());
            }
        }
    }

    pub fn found(&mut self, faction: FactionId, founder: ParticipantId) -> Result<(), RosterError> {
        if self.factions.contains_key(&faction) {
            return Err(RosterError::DuplicateFaction(faction));
        }
        if let Some(existing) = self.membership.get(&founder) {
            return Err(RosterError::AlreadyMember {
                participant: founder,
                faction: existing.clone(),
            });
        }
        let mut record = FactionRecord::default();
        record.members.insert(founder);
        self.membership.insert(founder, faction.clone());
        self.factions.insert(faction.clone(), record);
        info!(target: "guilds::factions", %faction, %founder, "faction.founded");
        Ok(())
    }

    pub fn add_member(
        &mut self,
        faction: &FactionId,
        participant: ParticipantId,
    ) -> Result<(), RosterError> {
        if let Some(existing) = self.membership.get(&participant) {
            return Err(RosterError::AlreadyMember {
                participant,
                faction: existing.clone(),
            });
        }
        let record = self
            .factions
            .get_mut(faction)
            .ok_or_else(|| RosterError::UnknownFaction(faction.clone()))?;
        record.members.insert(participant);
        self.membership.insert(participant, faction.clone());
        Ok(())
    }

    pub fn remove_member(&mut self, participant: ParticipantId) -> Result<FactionId, RosterError> {
        let faction = self
            .membership
            .remove(&participant)
            .ok_or(RosterError::NotMember(participant))?;
        if let Some(record) = self.factions.get_mut(&faction) {
            record.members.remove(&participant);
        }
        Ok(faction)
    }

    pub fn set_pact(&mut self, faction: &FactionId, pact: Option<PactId>) -> Result<(), RosterError> {
        let record = self
            .factions
            .get_mut(faction)
            .ok_or_else(|| RosterError::UnknownFaction(faction.clone()))?;
        record.pact = pact;
        Ok(())
    }

    /// Remove the faction record and every membership pointing at it.
    pub fn remove_faction(&mut self, faction: &FactionId) -> Result<FactionRecord, RosterError> {
        let record = self
            .factions
            .remove(faction)
            .ok_or_else(|| RosterError::UnknownFaction(faction.clone()))?;
        for participant in &record.members {
            self.membership.remove(participant);
        }
        Ok(record)
    }

    pub fn members(&self, faction: &FactionId) -> impl Iterator<Item = ParticipantId> + '_ {
        self.factions
            .get(faction)
            .into_iter()
            .flat_map(|record| record.members.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.factions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factions.is_empty()
    }
}

impl FactionDirectory for FactionRoster {
    fn faction_exists(&self, faction: &FactionId) -> bool {
        self.factions.contains_key(faction)
    }

    fn is_member(&self, faction: &FactionId, participant: ParticipantId) -> bool {
        self.membership.get(&participant) == Some(faction)
    }

    fn pact_of(&self, faction: &FactionId) -> Option<&PactId> {
        self.factions
            .get(faction)
            .and_then(|record| record.pact.as_ref())
    }

    fn faction_of(&self, participant: ParticipantId) -> Option<&FactionId> {
        self.membership.get(&participant)
    }
}

/// Summary of what a disbandment tore down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disbandment {
    pub faction: FactionId,
    pub released_cells: usize,
    pub resolved_raid: bool,
    pub former_members: usize,
    /// Former members pulled out of raids they were attacking or defending.
    pub withdrawn_participants: usize,
}

/// Disband a faction: drop its record, release all of its territory without
/// the connectivity gate, resolve any raid against it, and pull its former
/// members out of every other raid.
pub fn disband_faction(
    roster: &mut FactionRoster,
    territory: &mut TerritoryRegistry,
    raids: &mut RaidRegistry,
    faction: &FactionId,
) -> Result<Disbandment, RosterError> {
    let record = roster.remove_faction(faction)?;
    let released_cells = territory.release_all(faction);
    let resolved_raid = match raids.get_by_defender(faction).map(|raid| raid.id()) {
        Some(raid_id) => raids.resolve_and_remove(raid_id).is_some(),
        None => false,
    };
    let withdrawn_participants = record
        .members
        .iter()
        .filter(|member| raids.withdraw(**member).is_some())
        .count();
    info!(
        target: "guilds::factions",
        %faction,
        released_cells,
        resolved_raid,
        withdrawn_participants,
        "faction.disbanded"
    );
    Ok(Disbandment {
        faction: faction.clone(),
        released_cells,
        resolved_raid,
        former_members: record.members.len(),
        withdrawn_participants,
    })
}
