//! Depletable and renewable point resources.
//!
//! The table is a fixed-capacity arena declared at engine construction;
//! `add`/`remove` flip an `active` flag instead of reallocating. A resource
//! whose amount reaches zero without a replenish rate is retired.

use crate::EngineError;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Configuration for one resource point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub position: Vec3,
    pub amount: f32,
    /// Consumption range around the position.
    pub radius: f32,
    /// Units restored per step; zero makes the resource depletable.
    pub replenish_rate: f32,
    pub max_amount: f32,
}

impl ResourceConfig {
    /// A one-shot resource that disappears once drained.
    #[must_use]
    pub fn depletable(position: Vec3, amount: f32, radius: f32) -> Self {
        Self {
            position,
            amount,
            radius,
            replenish_rate: 0.0,
            max_amount: amount,
        }
    }

    /// A resource that regrows toward `max_amount` every step.
    #[must_use]
    pub fn renewable(
        position: Vec3,
        amount: f32,
        radius: f32,
        replenish_rate: f32,
        max_amount: f32,
    ) -> Self {
        Self {
            position,
            amount,
            radius,
            replenish_rate,
            max_amount,
        }
    }

    fn validate(&self) -> Result<(), EngineError> {
        let ok = self.position.is_finite()
            && self.amount.is_finite()
            && self.amount >= 0.0
            && self.radius.is_finite()
            && self.radius > 0.0
            && self.replenish_rate.is_finite()
            && self.replenish_rate >= 0.0
            && self.max_amount.is_finite()
            && self.max_amount >= self.amount;
        if ok {
            Ok(())
        } else {
            Err(EngineError::InvalidConfig(
                "resource amounts and radius must be finite and non-negative",
            ))
        }
    }
}

/// Fixed-capacity resource arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceTable {
    capacity: usize,
    configs: Vec<ResourceConfig>,
    pub(crate) positions: Vec<Vec3>,
    pub(crate) amounts: Vec<f32>,
    pub(crate) max_amounts: Vec<f32>,
    pub(crate) radii: Vec<f32>,
    pub(crate) replenish_rates: Vec<f32>,
    pub(crate) active: Vec<bool>,
}

impl ResourceTable {
    #[must_use]
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            configs: Vec::with_capacity(capacity),
            positions: Vec::with_capacity(capacity),
            amounts: Vec::with_capacity(capacity),
            max_amounts: Vec::with_capacity(capacity),
            radii: Vec::with_capacity(capacity),
            replenish_rates: Vec::with_capacity(capacity),
            active: Vec::with_capacity(capacity),
        }
    }

    /// Number of slots ever allocated (active or not).
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true when no resources have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Declared capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of currently active resources.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.iter().filter(|&&a| a).count()
    }

    /// Whether `id` refers to an allocated, active resource.
    #[must_use]
    pub fn is_active(&self, id: usize) -> bool {
        self.active.get(id).copied().unwrap_or(false)
    }

    /// Remaining amount of resource `id`, if allocated.
    #[must_use]
    pub fn amount(&self, id: usize) -> Option<f32> {
        self.amounts.get(id).copied()
    }

    /// Allocate a new resource slot.
    pub fn add(&mut self, config: ResourceConfig) -> Result<usize, EngineError> {
        config.validate()?;
        if self.positions.len() >= self.capacity {
            return Err(EngineError::CapacityExceeded {
                kind: "resource",
                max: self.capacity,
            });
        }
        let id = self.positions.len();
        self.configs.push(config);
        self.positions.push(config.position);
        self.amounts.push(config.amount);
        self.max_amounts.push(config.max_amount);
        self.radii.push(config.radius);
        self.replenish_rates.push(config.replenish_rate);
        self.active.push(true);
        Ok(id)
    }

    /// Retire a resource; the slot stays allocated.
    pub fn remove(&mut self, id: usize) -> Result<(), EngineError> {
        if id >= self.positions.len() {
            return Err(EngineError::UnknownId {
                kind: "resource",
                id,
            });
        }
        self.active[id] = false;
        Ok(())
    }

    /// Move a resource (dynamic environments).
    pub fn update_position(&mut self, id: usize, position: Vec3) -> Result<(), EngineError> {
        if id >= self.positions.len() || !position.is_finite() {
            return Err(EngineError::UnknownId {
                kind: "resource",
                id,
            });
        }
        self.positions[id] = position;
        self.configs[id].position = position;
        Ok(())
    }

    /// Regrow active renewable resources toward their maximum.
    pub(crate) fn regenerate(&mut self) {
        for id in 0..self.amounts.len() {
            if self.active[id] && self.replenish_rates[id] > 0.0 {
                self.amounts[id] =
                    (self.amounts[id] + self.replenish_rates[id]).min(self.max_amounts[id]);
            }
        }
    }

    /// Restore every slot to its configured initial state.
    pub(crate) fn reset(&mut self) {
        for id in 0..self.configs.len() {
            let config = self.configs[id];
            self.positions[id] = config.position;
            self.amounts[id] = config.amount;
            self.max_amounts[id] = config.max_amount;
            self.radii[id] = config.radius;
            self.replenish_rates[id] = config.replenish_rate;
            self.active[id] = true;
        }
    }
}
