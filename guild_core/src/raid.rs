//! Raid value type and its phase machine.
//!
//! `Forming` → `PreparationCountdown` → `Active`. Resolution removes the raid
//! from the registry; no terminal phase is kept in memory.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::faction::{FactionId, ParticipantId};

/// Wall-clock instant in milliseconds since the Unix epoch.
///
/// Raids persist across restarts, so countdowns are anchored to wall time
/// rather than a process-local monotonic clock.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct SimInstant(pub u64);

impl SimInstant {
    pub fn from_millis(millis: u64) -> Self {
        Self(millis)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs.saturating_mul(1_000))
    }

    pub fn now() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self(millis)
    }

    pub fn as_millis(self) -> u64 {
        self.0
    }

    /// Time elapsed since `earlier`, zero if `earlier` is in the future.
    pub fn saturating_since(self, earlier: SimInstant) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(millis))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RaidId(pub u64);

impl fmt::Display for RaidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "raid#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaidPhase {
    /// Attackers gather; allied defenders cannot join yet.
    Forming,
    /// Start was called; the raid goes live once the preparation time elapses.
    PreparationCountdown { started_at: SimInstant },
    /// Protections on the defender's territory are relaxed.
    Active { started_at: SimInstant },
}

impl RaidPhase {
    pub fn is_started(self) -> bool {
        !matches!(self, RaidPhase::Forming)
    }

    pub fn is_active(self) -> bool {
        matches!(self, RaidPhase::Active { .. })
    }

    pub fn started_at(self) -> Option<SimInstant> {
        match self {
            RaidPhase::Forming => None,
            RaidPhase::PreparationCountdown { started_at } | RaidPhase::Active { started_at } => {
                Some(started_at)
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RaidPhase::Forming => "forming",
            RaidPhase::PreparationCountdown { .. } => "preparation",
            RaidPhase::Active { .. } => "active",
        }
    }
}

impl fmt::Display for RaidPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RaidSide {
    Attacker,
    Defender,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JoinError {
    #[error("{0} does not exist")]
    UnknownRaid(RaidId),
    #[error("participant {participant} is already part of {raid}")]
    AlreadyInRaid {
        participant: ParticipantId,
        raid: RaidId,
    },
    #[error("{raid} already has the maximum of {limit} participants on that side")]
    CapacityReached { raid: RaidId, limit: usize },
    #[error("{raid} cannot accept that side while {phase}")]
    WrongPhase { raid: RaidId, phase: RaidPhase },
}

impl JoinError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            JoinError::UnknownRaid(_) => ErrorKind::NotFound,
            JoinError::AlreadyInRaid { .. } | JoinError::CapacityReached { .. } => {
                ErrorKind::InvariantViolation
            }
            JoinError::WrongPhase { .. } => ErrorKind::PhaseViolation,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StartError {
    #[error("{0} does not exist")]
    UnknownRaid(RaidId),
    #[error("{0} has already been started")]
    AlreadyStarted(RaidId),
}

impl StartError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StartError::UnknownRaid(_) => ErrorKind::NotFound,
            StartError::AlreadyStarted(_) => ErrorKind::PhaseViolation,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LeaveError {
    #[error("{0} does not exist")]
    UnknownRaid(RaidId),
    #[error("participant {participant} is not part of {raid}")]
    NotInRaid {
        participant: ParticipantId,
        raid: RaidId,
    },
    #[error("attackers cannot leave {0} once preparation has begun")]
    AlreadyStarted(RaidId),
}

impl LeaveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LeaveError::UnknownRaid(_) | LeaveError::NotInRaid { .. } => ErrorKind::NotFound,
            LeaveError::AlreadyStarted(_) => ErrorKind::PhaseViolation,
        }
    }
}

/// A single adversarial contest against one defending faction.
///
/// A raid is always built with its first attacker, and attackers can only be
/// removed while forming, so a started raid never has an empty attacker roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Raid {
    id: RaidId,
    defender: FactionId,
    attackers: Vec<ParticipantId>,
    defenders: Vec<ParticipantId>,
    phase: RaidPhase,
}

impl Raid {
    pub fn new(id: RaidId, defender: FactionId, first_attacker: ParticipantId) -> Self {
        Self {
            id,
            defender,
            attackers: vec![first_attacker],
            defenders: Vec::new(),
            phase: RaidPhase::Forming,
        }
    }

    pub fn id(&self) -> RaidId {
        self.id
    }

    pub fn defending_faction(&self) -> &FactionId {
        &self.defender
    }

    pub fn attackers(&self) -> &[ParticipantId] {
        &self.attackers
    }

    pub fn defenders(&self) -> &[ParticipantId] {
        &self.defenders
    }

    pub fn phase(&self) -> RaidPhase {
        self.phase
    }

    pub fn is_started(&self) -> bool {
        self.phase.is_started()
    }

    pub fn is_active(&self) -> bool {
        self.phase.is_active()
    }

    pub fn participants(&self) -> impl Iterator<Item = ParticipantId> + '_ {
        self.attackers.iter().chain(self.defenders.iter()).copied()
    }

    pub fn side_of(&self, participant: ParticipantId) -> Option<RaidSide> {
        if self.attackers.contains(&participant) {
            Some(RaidSide::Attacker)
        } else if self.defenders.contains(&participant) {
            Some(RaidSide::Defender)
        } else {
            None
        }
    }

    pub fn is_attacker(&self, participant: ParticipantId) -> bool {
        self.attackers.contains(&participant)
    }

    pub fn can_attacker_join(&self, capacity: usize) -> bool {
        !self.is_started() && self.attackers.len() < capacity
    }

    /// Instant the raid becomes active, once a countdown is running.
    pub fn preparation_deadline(&self, preparation: Duration) -> Option<SimInstant> {
        self.phase
            .started_at()
            .map(|started_at| started_at.saturating_add(preparation))
    }

    pub(crate) fn add_attacker(
        &mut self,
        participant: ParticipantId,
        capacity: usize,
    ) -> Result<(), JoinError> {
        if self.is_started() {
            return Err(JoinError::WrongPhase {
                raid: self.id,
                phase: self.phase,
            });
        }
        if self.side_of(participant).is_some() {
            return Err(JoinError::AlreadyInRaid {
                participant,
                raid: self.id,
            });
        }
        if self.attackers.len() >= capacity {
            return Err(JoinError::CapacityReached {
                raid: self.id,
                limit: capacity,
            });
        }
        self.attackers.push(participant);
        Ok(())
    }

    pub(crate) fn add_defender(
        &mut self,
        participant: ParticipantId,
        capacity: usize,
    ) -> Result<(), JoinError> {
        if !self.is_started() {
            return Err(JoinError::WrongPhase {
                raid: self.id,
                phase: self.phase,
            });
        }
        if self.side_of(participant).is_some() {
            return Err(JoinError::AlreadyInRaid {
                participant,
                raid: self.id,
            });
        }
        if self.defenders.len() >= capacity {
            return Err(JoinError::CapacityReached {
                raid: self.id,
                limit: capacity,
            });
        }
        self.defenders.push(participant);
        Ok(())
    }

    /// Attackers may only leave while forming; defenders may leave at any time.
    pub(crate) fn remove(&mut self, participant: ParticipantId) -> Result<RaidSide, LeaveError> {
        match self.side_of(participant) {
            Some(RaidSide::Attacker) => {
                if self.is_started() {
                    return Err(LeaveError::AlreadyStarted(self.id));
                }
                self.attackers.retain(|id| *id != participant);
                Ok(RaidSide::Attacker)
            }
            Some(RaidSide::Defender) => {
                self.defenders.retain(|id| *id != participant);
                Ok(RaidSide::Defender)
            }
            None => Err(LeaveError::NotInRaid {
                participant,
                raid: self.id,
            }),
        }
    }

    /// Remove `participant` from either roster regardless of phase.
    pub(crate) fn evict(&mut self, participant: ParticipantId) -> Option<RaidSide> {
        let side = self.side_of(participant)?;
        match side {
            RaidSide::Attacker => self.attackers.retain(|id| *id != participant),
            RaidSide::Defender => self.defenders.retain(|id| *id != participant),
        }
        Some(side)
    }

    pub(crate) fn has_no_attackers(&self) -> bool {
        self.attackers.is_empty()
    }

    pub(crate) fn start(&mut self, now: SimInstant) -> Result<(), StartError> {
        if self.is_started() {
            return Err(StartError::AlreadyStarted(self.id));
        }
        self.phase = RaidPhase::PreparationCountdown { started_at: now };
        Ok(())
    }

    /// Move to `Active` once the countdown has run for `preparation`.
    ///
    /// Returns true only on the call that performs the transition.
    pub(crate) fn activate_if_due(&mut self, now: SimInstant, preparation: Duration) -> bool {
        let RaidPhase::PreparationCountdown { started_at } = self.phase else {
            return false;
        };
        if now.saturating_since(started_at) < preparation {
            return false;
        }
        self.phase = RaidPhase::Active { started_at };
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREP: Duration = Duration::from_secs(30);

    fn forming_raid() -> Raid {
        Raid::new(RaidId(1), FactionId::new("north"), ParticipantId(10))
    }

    #[test]
    fn forming_accepts_attackers_up_to_capacity() {
        let mut raid = forming_raid();
        raid.add_attacker(ParticipantId(11), 2).unwrap();
        assert_eq!(
            raid.add_attacker(ParticipantId(12), 2),
            Err(JoinError::CapacityReached {
                raid: RaidId(1),
                limit: 2
            })
        );
        assert!(!raid.can_attacker_join(2));
        assert_eq!(raid.attackers(), &[ParticipantId(10), ParticipantId(11)]);
    }

    #[test]
    fn defenders_wait_for_countdown() {
        let mut raid = forming_raid();
        let err = raid.add_defender(ParticipantId(20), 5).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PhaseViolation);

        raid.start(SimInstant::from_secs(100)).unwrap();
        raid.add_defender(ParticipantId(20), 5).unwrap();
        assert_eq!(raid.side_of(ParticipantId(20)), Some(RaidSide::Defender));

        let err = raid.add_attacker(ParticipantId(21), 5).unwrap_err();
        assert!(matches!(err, JoinError::WrongPhase { .. }));
    }

    #[test]
    fn second_start_keeps_original_countdown() {
        let mut raid = forming_raid();
        raid.start(SimInstant::from_secs(100)).unwrap();
        assert_eq!(
            raid.start(SimInstant::from_secs(200)),
            Err(StartError::AlreadyStarted(RaidId(1)))
        );
        assert_eq!(
            raid.phase(),
            RaidPhase::PreparationCountdown {
                started_at: SimInstant::from_secs(100)
            }
        );
        assert_eq!(
            raid.preparation_deadline(PREP),
            Some(SimInstant::from_secs(130))
        );
    }

    #[test]
    fn activation_is_elapsed_time_based() {
        let mut raid = forming_raid();
        assert!(!raid.activate_if_due(SimInstant::from_secs(1_000), PREP));

        raid.start(SimInstant::from_secs(100)).unwrap();
        assert!(!raid.activate_if_due(SimInstant::from_millis(129_999), PREP));
        assert!(raid.activate_if_due(SimInstant::from_secs(130), PREP));
        assert!(!raid.activate_if_due(SimInstant::from_secs(130), PREP));
        assert!(!raid.activate_if_due(SimInstant::from_secs(500), PREP));
        assert_eq!(
            raid.phase(),
            RaidPhase::Active {
                started_at: SimInstant::from_secs(100)
            }
        );
    }

    #[test]
    fn clock_going_backwards_does_not_activate() {
        let mut raid = forming_raid();
        raid.start(SimInstant::from_secs(100)).unwrap();
        assert!(!raid.activate_if_due(SimInstant::from_secs(50), PREP));
    }

    #[test]
    fn attackers_leave_only_while_forming() {
        let mut raid = forming_raid();
        raid.add_attacker(ParticipantId(11), 5).unwrap();
        assert_eq!(raid.remove(ParticipantId(11)), Ok(RaidSide::Attacker));
        assert!(raid.side_of(ParticipantId(11)).is_none());

        raid.start(SimInstant::from_secs(1)).unwrap();
        assert_eq!(
            raid.remove(ParticipantId(10)),
            Err(LeaveError::AlreadyStarted(RaidId(1)))
        );
        raid.add_defender(ParticipantId(20), 5).unwrap();
        assert_eq!(raid.remove(ParticipantId(20)), Ok(RaidSide::Defender));
        assert!(!raid.has_no_attackers());
    }
}
