//! Entity handles and the live-entity allocator.
//!
//! An entity handle is a dense `usize` index used as the key into indexed
//! property stores. Indices are recycled after removal: a handle is unique
//! among currently-live entities, not over the simulation's lifetime.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ContractError;

/// A handle to a live entity.
///
/// Handles are non-negative by construction (`usize`), so the negative-index
/// precondition of the property-store contract is discharged by the type
/// system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub usize);

impl EntityId {
    /// Returns the raw index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Issues entity handles densely and recycles removed ones.
///
/// Removal pushes the index onto a free list; the next creation pops from
/// the list before extending the dense range. Live entities iterate in
/// ascending index order so that full scans are deterministic.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    live: Vec<bool>,
    free: Vec<usize>,
    live_count: usize,
}

impl EntityAllocator {
    /// Creates an empty allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a handle, reusing a removed index when one is available.
    pub fn create(&mut self) -> EntityId {
        let index = match self.free.pop() {
            Some(index) => {
                self.live[index] = true;
                index
            }
            None => {
                self.live.push(true);
                self.live.len() - 1
            }
        };
        self.live_count += 1;
        EntityId(index)
    }

    /// Releases a handle back to the free list.
    ///
    /// # Errors
    ///
    /// Returns `ContractError::EntityNotAlive` if the handle is not live.
    pub fn remove(&mut self, id: EntityId) -> Result<(), ContractError> {
        if !self.is_alive(id) {
            return Err(ContractError::EntityNotAlive { id });
        }
        self.live[id.0] = false;
        self.free.push(id.0);
        self.live_count -= 1;
        Ok(())
    }

    /// Returns true if the handle refers to a live entity.
    #[must_use]
    pub fn is_alive(&self, id: EntityId) -> bool {
        self.live.get(id.0).copied().unwrap_or(false)
    }

    /// Number of live entities.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.live_count
    }

    /// Returns true if no entity is live.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.live_count == 0
    }

    /// Highest index ever issued plus one (the dense range).
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.live.len()
    }

    /// Iterates live entities in ascending index order.
    pub fn iter_live(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.live
            .iter()
            .enumerate()
            .filter_map(|(index, &alive)| alive.then_some(EntityId(index)))
    }
}
