//! Weighted pool list of an aggregator
//!
//! An arena of slots with a position map from pool to slot. Removal swaps
//! the last slot into the freed position, so slot numbers are not stable
//! across removals.

use std::collections::BTreeMap;

use aegis_common::error::IndexError;
use aegis_common::PoolId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub pool: PoolId,
    pub alloc_point: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolSlots {
    slots: Vec<Slot>,
    positions: BTreeMap<PoolId, usize>,
    total_alloc_point: u64,
}

impl PoolSlots {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, slot: usize) -> Option<&Slot> {
        self.slots.get(slot)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Slot> {
        self.slots.iter()
    }

    pub fn pools(&self) -> impl Iterator<Item = PoolId> + '_ {
        self.slots.iter().map(|s| s.pool)
    }

    pub fn position(&self, pool: &PoolId) -> Option<usize> {
        self.positions.get(pool).copied()
    }

    pub fn contains(&self, pool: &PoolId) -> bool {
        self.positions.contains_key(pool)
    }

    pub fn alloc_point_of(&self, pool: &PoolId) -> u64 {
        self.position(pool)
            .map_or(0, |slot| self.slots[slot].alloc_point)
    }

    /// Sum of every listed pool's weight
    pub fn total_alloc_point(&self) -> u64 {
        self.total_alloc_point
    }

    /// Compare-and-set guard: the slot's current weight must be `expected`.
    /// The slot one past the end reads as weight zero.
    pub fn check(&self, slot: usize, expected: u64) -> Result<(), IndexError> {
        let found = match slot.cmp(&self.slots.len()) {
            std::cmp::Ordering::Less => self.slots[slot].alloc_point,
            std::cmp::Ordering::Equal => 0,
            std::cmp::Ordering::Greater => {
                return Err(IndexError::SlotOutOfRange {
                    slot,
                    len: self.slots.len(),
                })
            }
        };
        if found != expected {
            return Err(IndexError::AllocPointConflict {
                slot,
                expected,
                found,
            });
        }
        Ok(())
    }

    /// Append a pool; returns its slot
    pub fn push(&mut self, pool: PoolId, alloc_point: u64) -> Result<usize, IndexError> {
        if self.positions.contains_key(&pool) {
            return Err(IndexError::DuplicatePool(pool.to_string()));
        }
        let slot = self.slots.len();
        let total = self
            .total_alloc_point
            .checked_add(alloc_point)
            .ok_or(IndexError::AllocPointOverflow { slot, alloc_point })?;
        self.slots.push(Slot { pool, alloc_point });
        self.positions.insert(pool, slot);
        self.total_alloc_point = total;
        Ok(slot)
    }

    /// Put `pool` into an occupied slot; returns the previous occupant
    pub fn replace(&mut self, slot: usize, pool: PoolId, alloc_point: u64) -> Result<PoolId, IndexError> {
        let len = self.slots.len();
        let current = *self
            .slots
            .get(slot)
            .ok_or(IndexError::SlotOutOfRange { slot, len })?;
        if current.pool != pool && self.positions.contains_key(&pool) {
            return Err(IndexError::DuplicatePool(pool.to_string()));
        }

        // The stored total always includes the current weight
        let total = (self.total_alloc_point - current.alloc_point)
            .checked_add(alloc_point)
            .ok_or(IndexError::AllocPointOverflow { slot, alloc_point })?;

        self.positions.remove(&current.pool);
        self.positions.insert(pool, slot);
        self.total_alloc_point = total;
        self.slots[slot] = Slot { pool, alloc_point };
        Ok(current.pool)
    }

    /// Swap-and-pop removal; returns the removed slot
    pub fn swap_remove(&mut self, slot: usize) -> Result<Slot, IndexError> {
        let len = self.slots.len();
        if slot >= len {
            return Err(IndexError::SlotOutOfRange { slot, len });
        }
        let removed = self.slots.swap_remove(slot);
        self.positions.remove(&removed.pool);
        if let Some(moved) = self.slots.get(slot) {
            self.positions.insert(moved.pool, slot);
        }
        self.total_alloc_point -= removed.alloc_point;
        Ok(removed)
    }
}
