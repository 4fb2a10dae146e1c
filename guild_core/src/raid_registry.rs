use std::collections::HashMap;
use std::time::Duration;

use bevy::prelude::Resource;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::error::ErrorKind;
use crate::faction::{FactionId, ParticipantId};
use crate::raid::{JoinError, LeaveError, Raid, RaidId, RaidSide, SimInstant, StartError};
use crate::raid_config::RaidConfig;

/// Limits copied out of [`RaidConfig`] so the registry does not hold the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RaidLimits {
    pub preparation: Duration,
    pub max_attackers: usize,
    pub max_defenders: usize,
    pub max_concurrent_raids: usize,
}

impl From<&RaidConfig> for RaidLimits {
    fn from(config: &RaidConfig) -> Self {
        Self {
            preparation: config.preparation(),
            max_attackers: config.max_attackers(),
            max_defenders: config.max_defenders(),
            max_concurrent_raids: config.max_concurrent_raids(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CreateError {
    #[error("faction {faction} is already under {raid}")]
    AlreadyRaided { faction: FactionId, raid: RaidId },
    #[error("faction {0} cannot raid itself")]
    SelfRaid(FactionId),
    #[error("participant {participant} is already part of {raid}")]
    AlreadyInRaid {
        participant: ParticipantId,
        raid: RaidId,
    },
    #[error("the server already hosts the maximum of {limit} raids")]
    RaidLimitReached { limit: usize },
}

impl CreateError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvariantViolation
    }
}

/// Raid that crossed into `Active` during an [`RaidRegistry::advance_all`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaidActivation {
    pub raid: RaidId,
    pub defender: FactionId,
    pub attackers: usize,
    pub defenders: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed(RaidSide),
    /// The last attacker of a forming raid left; the raid no longer exists.
    Dissolved,
}

/// Persisted form of the live raid set. Indices are derived on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaidSnapshot {
    pub next_id: u64,
    pub raids: Vec<Raid>,
}

/// Owner of every live raid, indexed by defending faction and by participant.
#[derive(Resource, Debug, Clone)]
pub struct RaidRegistry {
    limits: RaidLimits,
    raids: HashMap<RaidId, Raid>,
    by_defender: HashMap<FactionId, RaidId>,
    by_participant: HashMap<ParticipantId, RaidId>,
    next_id: u64,
}

impl RaidRegistry {
    pub fn new(config: &RaidConfig) -> Self {
        Self {
            limits: RaidLimits::from(config),
            raids: HashMap::new(),
            by_defender: HashMap::new(),
            by_participant: HashMap::new(),
            next_id: 1,
        }
    }

    /// Rebuild from a snapshot. Raids that would break an index invariant are dropped.
    pub fn from_snapshot(config: &RaidConfig, snapshot: RaidSnapshot) -> Self {
        let mut registry = Self::new(config);
        let mut raids = snapshot.raids;
        raids.sort_unstable_by_key(|raid| raid.id());
        let mut max_id = 0;
        for raid in raids {
            max_id = max_id.max(raid.id().0);
            if raid.has_no_attackers() {
                warn!(target: "guilds::raid", raid = %raid.id(), "snapshot.raid_dropped=no_attackers");
                continue;
            }
            if registry.by_defender.contains_key(raid.defending_faction())
                || registry.raids.contains_key(&raid.id())
            {
                warn!(target: "guilds::raid", raid = %raid.id(), "snapshot.raid_dropped=duplicate");
                continue;
            }
            if raid
                .participants()
                .any(|participant| registry.by_participant.contains_key(&participant))
            {
                warn!(
                    target: "guilds::raid",
                    raid = %raid.id(),
                    "snapshot.raid_dropped=participant_overlap"
                );
                continue;
            }
            registry.index(raid);
        }
        registry.next_id = snapshot.next_id.max(max_id + 1);
        registry
    }

    pub fn snapshot(&self) -> RaidSnapshot {
        let mut raids: Vec<Raid> = self.raids.values().cloned().collect();
        raids.sort_unstable_by_key(|raid| raid.id());
        RaidSnapshot {
            next_id: self.next_id,
            raids,
        }
    }

    pub fn limits(&self) -> RaidLimits {
        self.limits
    }

    /// Swap in new limits. Live raids keep their rosters even if now over capacity.
    pub fn apply_config(&mut self, config: &RaidConfig) {
        self.limits = RaidLimits::from(config);
    }

    pub fn len(&self) -> usize {
        self.raids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Raid> {
        self.raids.values()
    }

    pub fn get(&self, raid: RaidId) -> Option<&Raid> {
        self.raids.get(&raid)
    }

    pub fn get_by_defender(&self, faction: &FactionId) -> Option<&Raid> {
        self.by_defender
            .get(faction)
            .and_then(|id| self.raids.get(id))
    }

    pub fn get_by_participant(&self, participant: ParticipantId) -> Option<&Raid> {
        self.by_participant
            .get(&participant)
            .and_then(|id| self.raids.get(id))
    }

    /// Open a raid against `defender` with `first_attacker`, whose own faction
    /// is `attacker_faction`.
    pub fn create(
        &mut self,
        defender: FactionId,
        first_attacker: ParticipantId,
        attacker_faction: &FactionId,
    ) -> Result<RaidId, CreateError> {
        if *attacker_faction == defender {
            return Err(CreateError::SelfRaid(defender));
        }
        if let Some(raid) = self.by_defender.get(&defender) {
            return Err(CreateError::AlreadyRaided {
                faction: defender,
                raid: *raid,
            });
        }
        if let Some(raid) = self.by_participant.get(&first_attacker) {
            return Err(CreateError::AlreadyInRaid {
                participant: first_attacker,
                raid: *raid,
            });
        }
        if self.raids.len() >= self.limits.max_concurrent_raids {
            return Err(CreateError::RaidLimitReached {
                limit: self.limits.max_concurrent_raids,
            });
        }

        let id = RaidId(self.next_id);
        self.next_id += 1;
        info!(
            target: "guilds::raid",
            raid = %id,
            defender = %defender,
            attacker = %first_attacker,
            "raid.created"
        );
        self.index(Raid::new(id, defender, first_attacker));
        Ok(id)
    }

    pub fn add_attacker(&mut self, raid: RaidId, participant: ParticipantId) -> Result<(), JoinError> {
        self.ensure_unassigned(participant)?;
        let capacity = self.limits.max_attackers;
        let entry = self.raids.get_mut(&raid).ok_or(JoinError::UnknownRaid(raid))?;
        entry.add_attacker(participant, capacity)?;
        self.by_participant.insert(participant, raid);
        debug!(target: "guilds::raid", raid = %raid, %participant, "raid.attacker_joined");
        Ok(())
    }

    pub fn add_defender(&mut self, raid: RaidId, participant: ParticipantId) -> Result<(), JoinError> {
        self.ensure_unassigned(participant)?;
        let capacity = self.limits.max_defenders;
        let entry = self.raids.get_mut(&raid).ok_or(JoinError::UnknownRaid(raid))?;
        entry.add_defender(participant, capacity)?;
        self.by_participant.insert(participant, raid);
        debug!(target: "guilds::raid", raid = %raid, %participant, "raid.defender_joined");
        Ok(())
    }

    /// Remove a participant from whichever roster holds them. A forming raid
    /// that loses its last attacker is deleted.
    pub fn remove_participant(
        &mut self,
        raid: RaidId,
        participant: ParticipantId,
    ) -> Result<Removal, LeaveError> {
        let entry = self.raids.get_mut(&raid).ok_or(LeaveError::UnknownRaid(raid))?;
        let side = entry.remove(participant)?;
        let dissolved = entry.has_no_attackers();
        self.by_participant.remove(&participant);
        debug!(target: "guilds::raid", raid = %raid, %participant, ?side, "raid.participant_left");

        if dissolved {
            self.resolve_and_remove(raid);
            return Ok(Removal::Dissolved);
        }
        Ok(Removal::Removed(side))
    }

    /// Pull `participant` out of whatever raid they are on, in any phase.
    ///
    /// Used when membership changes underneath a raid. A raid left without
    /// attackers is deleted.
    pub fn withdraw(&mut self, participant: ParticipantId) -> Option<Removal> {
        let raid = *self.by_participant.get(&participant)?;
        let entry = self.raids.get_mut(&raid)?;
        let side = entry.evict(participant)?;
        let dissolved = entry.has_no_attackers();
        self.by_participant.remove(&participant);
        debug!(target: "guilds::raid", raid = %raid, %participant, ?side, "raid.participant_withdrawn");

        if dissolved {
            self.resolve_and_remove(raid);
            return Some(Removal::Dissolved);
        }
        Some(Removal::Removed(side))
    }

    pub fn start(&mut self, raid: RaidId, now: SimInstant) -> Result<(), StartError> {
        let entry = self.raids.get_mut(&raid).ok_or(StartError::UnknownRaid(raid))?;
        entry.start(now)?;
        info!(
            target: "guilds::raid",
            raid = %raid,
            defender = %entry.defending_faction(),
            started_at = now.as_millis(),
            "raid.countdown_started"
        );
        Ok(())
    }

    /// Promote every raid whose countdown has elapsed. Safe at any cadence:
    /// a raid transitions once, on the first call at or after its deadline.
    pub fn advance_all(&mut self, now: SimInstant) -> Vec<RaidActivation> {
        let preparation = self.limits.preparation;
        let mut activated: Vec<RaidActivation> = self
            .raids
            .values_mut()
            .filter_map(|raid| {
                raid.activate_if_due(now, preparation)
                    .then(|| RaidActivation {
                        raid: raid.id(),
                        defender: raid.defending_faction().clone(),
                        attackers: raid.attackers().len(),
                        defenders: raid.defenders().len(),
                    })
            })
            .collect();
        activated.sort_unstable_by_key(|activation| activation.raid);
        for activation in &activated {
            info!(
                target: "guilds::raid",
                raid = %activation.raid,
                defender = %activation.defender,
                attackers = activation.attackers,
                defenders = activation.defenders,
                "raid.active"
            );
        }
        activated
    }

    /// Delete a raid and every index entry pointing at it.
    pub fn resolve_and_remove(&mut self, raid: RaidId) -> Option<Raid> {
        let removed = self.raids.remove(&raid)?;
        self.by_defender.remove(removed.defending_faction());
        for participant in removed.participants() {
            self.by_participant.remove(&participant);
        }
        info!(
            target: "guilds::raid",
            raid = %raid,
            defender = %removed.defending_faction(),
            phase = %removed.phase(),
            "raid.removed"
        );
        Some(removed)
    }

    fn ensure_unassigned(&self, participant: ParticipantId) -> Result<(), JoinError> {
        match self.by_participant.get(&participant) {
            Some(existing) => Err(JoinError::AlreadyInRaid {
                participant,
                raid: *existing,
            }),
            None => Ok(()),
        }
    }

    fn index(&mut self, raid: Raid) {
        let id = raid.id();
        self.by_defender.insert(raid.defending_faction().clone(), id);
        for participant in raid.participants() {
            self.by_participant.insert(participant, id);
        }
        self.raids.insert(id, raid);
    }

    #[cfg(test)]
    fn assert_consistent(&self) {
        assert_eq!(self.by_defender.len(), self.raids.len());
        for (faction, id) in &self.by_defender {
            assert_eq!(self.raids[id].defending_faction(), faction);
        }
        let participant_total: usize = self.raids.values().map(|raid| raid.participants().count()).sum();
        assert_eq!(self.by_participant.len(), participant_total);
        for (participant, id) in &self.by_participant {
            assert!(self.raids[id].side_of(*participant).is_some());
        }
    }
}
