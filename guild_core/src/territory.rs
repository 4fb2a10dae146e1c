//! Cell ownership map.
//!
//! Every claimed cell maps to exactly one faction. Claims after a faction's
//! first must touch its existing territory on one of the four sides, and
//! releases are gated by a local neighbour check so the common single-cell
//! bridge cannot be cut. The release check only looks at the four direct
//! neighbours; longer cycles are not analysed.

use std::collections::HashMap;
use std::fmt;

use bevy::prelude::Resource;
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::error::ErrorKind;
use crate::faction::FactionId;

/// Fixed-size ownership unit addressed by integer coordinates.
///
/// `z` grows to the south, so the northern neighbour is `z - 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    pub x: i32,
    pub z: i32,
}

impl Cell {
    pub const fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Pack both coordinates into a single map key.
    #[inline]
    pub fn pack(self) -> u64 {
        (u64::from(self.x as u32) << 32) | u64::from(self.z as u32)
    }

    #[inline]
    pub fn unpack(key: u64) -> Self {
        Self {
            x: (key >> 32) as u32 as i32,
            z: key as u32 as i32,
        }
    }

    pub fn north(self) -> Self {
        Self::new(self.x, self.z.wrapping_sub(1))
    }

    pub fn south(self) -> Self {
        Self::new(self.x, self.z.wrapping_add(1))
    }

    pub fn east(self) -> Self {
        Self::new(self.x.wrapping_add(1), self.z)
    }

    pub fn west(self) -> Self {
        Self::new(self.x.wrapping_sub(1), self.z)
    }

    pub fn neighbors(self) -> [Cell; 4] {
        [self.north(), self.south(), self.east(), self.west()]
    }

    pub fn is_adjacent(self, other: Cell) -> bool {
        self.neighbors().contains(&other)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

bitflags! {
    /// Which of a cell's four neighbours share its owner.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct NeighborMask: u8 {
        const NORTH = 0b0001;
        const SOUTH = 0b0010;
        const EAST = 0b0100;
        const WEST = 0b1000;
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClaimError {
    #[error("cell {cell} is already owned by {owner}")]
    AlreadyOwned { cell: Cell, owner: FactionId },
    #[error("cell {cell} does not touch territory of {faction}")]
    NotAdjacent { cell: Cell, faction: FactionId },
}

impl ClaimError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvariantViolation
    }
}

/// Persisted form of the registry. Per-faction counts are derived on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritorySnapshot {
    pub cells: Vec<(Cell, FactionId)>,
}

#[derive(Resource, Debug, Clone, Default)]
pub struct TerritoryRegistry {
    cells: HashMap<u64, FactionId>,
    counts: HashMap<FactionId, usize>,
}

impl TerritoryRegistry {
    /// Rebuild a registry from a snapshot. Duplicate cells keep the first owner.
    pub fn from_snapshot(snapshot: TerritorySnapshot) -> Self {
        let mut registry = Self::default();
        for (cell, faction) in snapshot.cells {
            if registry.cells.contains_key(&cell.pack()) {
                debug!(
                    target: "guilds::territory",
                    %cell,
                    %faction,
                    "snapshot.duplicate_cell_skipped"
                );
                continue;
            }
            registry.insert(cell, faction);
        }
        registry
    }

    pub fn snapshot(&self) -> TerritorySnapshot {
        let mut cells: Vec<(Cell, FactionId)> = self
            .cells
            .iter()
            .map(|(key, faction)| (Cell::unpack(*key), faction.clone()))
            .collect();
        cells.sort_unstable_by_key(|(cell, _)| *cell);
        TerritorySnapshot { cells }
    }

    pub fn owner_of(&self, cell: Cell) -> Option<&FactionId> {
        self.cells.get(&cell.pack())
    }

    pub fn territory_count(&self, faction: &FactionId) -> usize {
        self.counts.get(faction).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells_of<'a>(&'a self, faction: &'a FactionId) -> impl Iterator<Item = Cell> + 'a {
        self.cells
            .iter()
            .filter(move |(_, owner)| *owner == faction)
            .map(|(key, _)| Cell::unpack(*key))
    }

    /// True for a faction's first claim or when a four-neighbour is already theirs.
    pub fn can_claim(&self, cell: Cell, faction: &FactionId) -> bool {
        if self.territory_count(faction) == 0 {
            return true;
        }
        cell.neighbors()
            .iter()
            .any(|neighbor| self.owner_of(*neighbor) == Some(faction))
    }

    pub fn claim(&mut self, cell: Cell, faction: FactionId) -> Result<(), ClaimError> {
        if let Some(owner) = self.owner_of(cell) {
            debug!(
                target: "guilds::territory",
                %cell,
                %faction,
                %owner,
                "claim.rejected=already_owned"
            );
            return Err(ClaimError::AlreadyOwned {
                cell,
                owner: owner.clone(),
            });
        }
        if !self.can_claim(cell, &faction) {
            debug!(
                target: "guilds::territory",
                %cell,
                %faction,
                "claim.rejected=not_adjacent"
            );
            return Err(ClaimError::NotAdjacent { cell, faction });
        }
        info!(target: "guilds::territory", %cell, %faction, "claim.accepted");
        self.insert(cell, faction);
        Ok(())
    }

    /// Neighbours of `cell` that belong to `owner`.
    pub fn neighbor_mask(&self, cell: Cell, owner: &FactionId) -> NeighborMask {
        let mut mask = NeighborMask::empty();
        let owned = |neighbor: Cell| self.owner_of(neighbor) == Some(owner);
        mask.set(NeighborMask::NORTH, owned(cell.north()));
        mask.set(NeighborMask::SOUTH, owned(cell.south()));
        mask.set(NeighborMask::EAST, owned(cell.east()));
        mask.set(NeighborMask::WEST, owned(cell.west()));
        mask
    }

    /// Local bridge heuristic.
    ///
    /// With a southern neighbour, the cell is held only when north, east and
    /// west are owned as well. Without one, it is held whenever both east and
    /// west are owned. Unclaimed cells are never releasable.
    pub fn can_release(&self, cell: Cell) -> bool {
        let Some(owner) = self.owner_of(cell) else {
            return false;
        };
        let mask = self.neighbor_mask(cell, owner);
        let east_west = mask.contains(NeighborMask::EAST | NeighborMask::WEST);
        if mask.contains(NeighborMask::SOUTH) {
            !(mask.contains(NeighborMask::NORTH) && east_west)
        } else {
            !east_west
        }
    }

    pub fn release(&mut self, cell: Cell) -> bool {
        if !self.can_release(cell) {
            debug!(target: "guilds::territory", %cell, "release.rejected");
            return false;
        }
        if let Some(faction) = self.remove(cell) {
            info!(target: "guilds::territory", %cell, %faction, "release.accepted");
        }
        true
    }

    /// Drop every cell owned by `faction`, bypassing the connectivity gate.
    pub fn release_all(&mut self, faction: &FactionId) -> usize {
        let before = self.cells.len();
        self.cells.retain(|_, owner| *owner != *faction);
        self.counts.remove(faction);
        let released = before - self.cells.len();
        info!(target: "guilds::territory", %faction, released, "release_all.completed");
        released
    }

    fn insert(&mut self, cell: Cell, faction: FactionId) {
        *self.counts.entry(faction.clone()).or_insert(0) += 1;
        self.cells.insert(cell.pack(), faction);
    }

    fn remove(&mut self, cell: Cell) -> Option<FactionId> {
        let faction = self.cells.remove(&cell.pack())?;
        if let Some(count) = self.counts.get_mut(&faction) {
            *count -= 1;
            if *count == 0 {
                self.counts.remove(&faction);
            }
        }
        Some(faction)
    }
}
