//! Read-side permission checks over territory, raids and faction membership.
//!
//! World-event interceptors translate whatever happened (block broken, bucket
//! emptied, explosion, damage) into an [`ActionKind`] or one of the dedicated
//! queries here, and cancel or allow the event based on the answer.

use crate::faction::{FactionDirectory, FactionId, ParticipantId};
use crate::raid::Raid;
use crate::raid_registry::RaidRegistry;
use crate::territory::{Cell, TerritoryRegistry};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ActionKind {
    Break { stateful: bool },
    Place { stateful: bool },
    Use { stateful: bool },
    PlaceFluid,
    Trample,
}

impl ActionKind {
    /// Actions a faction's own members lose while their territory is under an active raid.
    pub fn is_locked_during_raid(self) -> bool {
        matches!(
            self,
            ActionKind::Break { stateful: true }
                | ActionKind::Place { stateful: true }
                | ActionKind::Use { stateful: true }
                | ActionKind::PlaceFluid
        )
    }

    fn verb(self) -> &'static str {
        match self {
            ActionKind::Break { .. } => "break blocks",
            ActionKind::Place { .. } => "place blocks",
            ActionKind::Use { .. } => "interact with blocks",
            ActionKind::PlaceFluid => "place fluids",
            ActionKind::Trample => "trample crops",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Denial {
    /// Actor is not a member of the owning faction and no raid lets them in.
    ForeignTerritory { owner: FactionId },
    /// Actor is a member, but the faction is under an active raid.
    RaidLockdown { owner: FactionId },
}

impl Denial {
    pub fn owner(&self) -> &FactionId {
        match self {
            Denial::ForeignTerritory { owner } | Denial::RaidLockdown { owner } => owner,
        }
    }

    /// Player-facing explanation for a cancelled action.
    pub fn message(&self, action: ActionKind) -> String {
        match (self, action) {
            (Denial::ForeignTerritory { owner }, action) => {
                format!("You cannot {} in the territory of {owner}!", action.verb())
            }
            (Denial::RaidLockdown { .. }, ActionKind::PlaceFluid) => {
                "You cannot use fluids during a raid!".to_string()
            }
            (Denial::RaidLockdown { .. }, ActionKind::Use { .. }) => {
                "You cannot use this block during a raid!".to_string()
            }
            (Denial::RaidLockdown { .. }, ActionKind::Place { .. }) => {
                "You cannot place this block during a raid!".to_string()
            }
            (Denial::RaidLockdown { .. }, _) => "You cannot break this block during a raid!".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Permit,
    Deny(Denial),
}

impl Verdict {
    pub fn is_permitted(&self) -> bool {
        matches!(self, Verdict::Permit)
    }
}

/// A non-player creature taking damage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Creature {
    /// Tameable creature; `owner` is set once it has been tamed.
    Pet { owner: Option<ParticipantId> },
    /// Passive livestock.
    Animal,
    /// Anything else (monsters, golems).
    Other,
}

/// Who dealt the damage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DamageSource {
    /// No attacking entity: fire, falling, suffocation and the like.
    Environment,
    Participant(ParticipantId),
    /// A non-player entity, which never belongs to a faction.
    Creature,
}

/// Notice shown when a participant crosses an ownership boundary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BoundaryNotice {
    Wilderness,
    Territory(FactionId),
}

impl BoundaryNotice {
    pub fn message(&self) -> String {
        match self {
            BoundaryNotice::Wilderness => "Entering Wilderness.".to_string(),
            BoundaryNotice::Territory(owner) => format!("Entering the Territory of {owner}"),
        }
    }
}

pub struct ProtectionOracle<'a, D: FactionDirectory + ?Sized> {
    territory: &'a TerritoryRegistry,
    raids: &'a RaidRegistry,
    factions: &'a D,
}

impl<'a, D: FactionDirectory + ?Sized> ProtectionOracle<'a, D> {
    pub fn new(territory: &'a TerritoryRegistry, raids: &'a RaidRegistry, factions: &'a D) -> Self {
        Self {
            territory,
            raids,
            factions,
        }
    }

    fn active_raid_against(&self, owner: &FactionId) -> Option<&'a Raid> {
        self.raids
            .get_by_defender(owner)
            .filter(|raid| raid.is_active())
    }

    /// Decide whether `actor` may perform `action` at `cell`.
    pub fn permits(&self, actor: ParticipantId, cell: Cell, action: ActionKind) -> Verdict {
        let Some(owner) = self.territory.owner_of(cell) else {
            return Verdict::Permit;
        };
        let active_raid = self.active_raid_against(owner);

        if self.factions.is_member(owner, actor) {
            if active_raid.is_some() && action.is_locked_during_raid() {
                return Verdict::Deny(Denial::RaidLockdown {
                    owner: owner.clone(),
                });
            }
            return Verdict::Permit;
        }

        match active_raid {
            Some(raid) if raid.is_attacker(actor) => Verdict::Permit,
            _ => Verdict::Deny(Denial::ForeignTerritory {
                owner: owner.clone(),
            }),
        }
    }

    /// Whether an explosion leaves the block at `cell` intact.
    ///
    /// Claimed blocks are protected unless the owner is under an active raid;
    /// stateful fixtures stay protected even then.
    pub fn explosion_spares(&self, cell: Cell, stateful: bool) -> bool {
        let Some(owner) = self.territory.owner_of(cell) else {
            return false;
        };
        match self.active_raid_against(owner) {
            Some(_) => stateful,
            None => true,
        }
    }

    /// Whether damage to `victim` standing at `cell` should be cancelled.
    ///
    /// Members are safe inside their own territory until a raid against it goes live.
    pub fn player_damage_blocked(&self, victim: ParticipantId, cell: Cell) -> bool {
        let Some(owner) = self.territory.owner_of(cell) else {
            return false;
        };
        self.factions.is_member(owner, victim) && self.active_raid_against(owner).is_none()
    }

    /// Whether damage to a non-player `creature` at `cell` should be cancelled.
    ///
    /// Inside claimed territory: nothing is hurt by sourceless damage, owned pets
    /// of members and animals are only hurt by members. Raids do not change this.
    pub fn creature_damage_blocked(&self, cell: Cell, creature: Creature, source: DamageSource) -> bool {
        let Some(owner) = self.territory.owner_of(cell) else {
            return false;
        };
        let attacker_is_member = match source {
            DamageSource::Environment => return true,
            DamageSource::Participant(attacker) => self.factions.is_member(owner, attacker),
            DamageSource::Creature => false,
        };
        match creature {
            Creature::Pet { owner: Some(pet_owner) } => {
                self.factions.is_member(owner, pet_owner) && !attacker_is_member
            }
            Creature::Pet { owner: None } | Creature::Other => false,
            Creature::Animal => !attacker_is_member,
        }
    }

    /// Notice to show when moving from `from` into `to`, if ownership changes.
    pub fn boundary_notice(&self, from: Cell, to: Cell) -> Option<BoundaryNotice> {
        let previous = self.territory.owner_of(from);
        match self.territory.owner_of(to) {
            None if previous.is_some() => Some(BoundaryNotice::Wilderness),
            None => None,
            Some(owner) if previous != Some(owner) => Some(BoundaryNotice::Territory(owner.clone())),
            Some(_) => None,
        }
    }
}
