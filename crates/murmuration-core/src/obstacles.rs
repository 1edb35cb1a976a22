//! Static obstacles with signed-distance evaluation.
//!
//! Agents are repelled along the SDF gradient with an exponentially decaying
//! magnitude; the gradient is estimated by forward differences, which keeps
//! one evaluator per shape instead of one analytic gradient each.

use crate::EngineError;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Cylinder orientation axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Obstacle geometry variants sharing one signed-distance evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "shape")]
pub enum ObstacleShape {
    Sphere {
        center: Vec3,
        radius: f32,
    },
    Box {
        center: Vec3,
        half_extents: Vec3,
    },
    Cylinder {
        center: Vec3,
        radius: f32,
        height: f32,
        axis: Axis,
    },
}

impl ObstacleShape {
    /// Signed distance from `p` to the surface (negative inside).
    #[must_use]
    pub fn signed_distance(&self, p: Vec3) -> f32 {
        match *self {
            Self::Sphere { center, radius } => (p - center).length() - radius,
            Self::Box {
                center,
                half_extents,
            } => {
                let q = (p - center).abs() - half_extents;
                q.max(Vec3::ZERO).length() + q.max_element().min(0.0)
            }
            Self::Cylinder {
                center,
                radius,
                height,
                axis,
            } => {
                let rel = p - center;
                let (axial, r1, r2) = match axis {
                    Axis::X => (rel.x, rel.y, rel.z),
                    Axis::Y => (rel.y, rel.x, rel.z),
                    Axis::Z => (rel.z, rel.x, rel.y),
                };
                let d_radial = (r1 * r1 + r2 * r2).sqrt() - radius;
                let d_axial = axial.abs() - height * 0.5;
                let outside =
                    (d_radial.max(0.0).powi(2) + d_axial.max(0.0).powi(2)).sqrt();
                outside + d_radial.max(d_axial).min(0.0)
            }
        }
    }

    fn center(&self) -> Vec3 {
        match *self {
            Self::Sphere { center, .. }
            | Self::Box { center, .. }
            | Self::Cylinder { center, .. } => center,
        }
    }

    fn with_center(self, center: Vec3) -> Self {
        match self {
            Self::Sphere { radius, .. } => Self::Sphere { center, radius },
            Self::Box { half_extents, .. } => Self::Box {
                center,
                half_extents,
            },
            Self::Cylinder {
                radius,
                height,
                axis,
                ..
            } => Self::Cylinder {
                center,
                radius,
                height,
                axis,
            },
        }
    }

    fn validate(&self) -> Result<(), EngineError> {
        let ok = match *self {
            Self::Sphere { center, radius } => center.is_finite() && radius > 0.0,
            Self::Box {
                center,
                half_extents,
            } => center.is_finite() && half_extents.is_finite() && half_extents.min_element() > 0.0,
            Self::Cylinder {
                center,
                radius,
                height,
                ..
            } => center.is_finite() && radius > 0.0 && height > 0.0,
        };
        if ok {
            Ok(())
        } else {
            Err(EngineError::InvalidConfig(
                "obstacle dimensions must be finite and positive",
            ))
        }
    }
}

/// One obstacle plus its repulsion response.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObstacleConfig {
    pub shape: ObstacleShape,
    /// Repulsion magnitude at the surface.
    pub strength: f32,
    /// Decay length of the repulsion.
    pub decay: f32,
}

impl ObstacleConfig {
    #[must_use]
    pub fn new(shape: ObstacleShape) -> Self {
        Self {
            shape,
            strength: 10.0,
            decay: 2.0,
        }
    }
}

const GRADIENT_EPS: f32 = 1.0e-3;

/// Fixed-capacity obstacle arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObstacleTable {
    capacity: usize,
    entries: Vec<ObstacleConfig>,
    active: Vec<bool>,
}

impl ObstacleTable {
    #[must_use]
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity),
            active: Vec::with_capacity(capacity),
        }
    }

    /// Number of slots ever allocated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no obstacles have been added.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `id` refers to an allocated, active obstacle.
    #[must_use]
    pub fn is_active(&self, id: usize) -> bool {
        self.active.get(id).copied().unwrap_or(false)
    }

    /// Allocate a new obstacle slot.
    pub fn add(&mut self, config: ObstacleConfig) -> Result<usize, EngineError> {
        config.shape.validate()?;
        if !(config.strength.is_finite() && config.strength >= 0.0 && config.decay > 0.0) {
            return Err(EngineError::InvalidConfig(
                "obstacle strength must be non-negative and decay positive",
            ));
        }
        if self.entries.len() >= self.capacity {
            return Err(EngineError::CapacityExceeded {
                kind: "obstacle",
                max: self.capacity,
            });
        }
        let id = self.entries.len();
        self.entries.push(config);
        self.active.push(true);
        Ok(id)
    }

    /// Retire an obstacle; the slot stays allocated.
    pub fn remove(&mut self, id: usize) -> Result<(), EngineError> {
        if id >= self.entries.len() {
            return Err(EngineError::UnknownId {
                kind: "obstacle",
                id,
            });
        }
        self.active[id] = false;
        Ok(())
    }

    /// Move an obstacle (dynamic environments).
    pub fn update_position(&mut self, id: usize, center: Vec3) -> Result<(), EngineError> {
        if id >= self.entries.len() || !center.is_finite() {
            return Err(EngineError::UnknownId {
                kind: "obstacle",
                id,
            });
        }
        self.entries[id].shape = self.entries[id].shape.with_center(center);
        Ok(())
    }

    /// Center of obstacle `id`, if allocated.
    #[must_use]
    pub fn center(&self, id: usize) -> Option<Vec3> {
        self.entries.get(id).map(|entry| entry.shape.center())
    }

    /// Total repulsion exerted on a point by all active obstacles.
    #[must_use]
    pub(crate) fn force_at(&self, p: Vec3) -> Vec3 {
        let mut force = Vec3::ZERO;
        for (entry, &active) in self.entries.iter().zip(&self.active) {
            if !active {
                continue;
            }
            let d0 = entry.shape.signed_distance(p);
            if d0 >= 3.0 * entry.decay {
                continue;
            }
            let dx = entry.shape.signed_distance(p + Vec3::X * GRADIENT_EPS) - d0;
            let dy = entry.shape.signed_distance(p + Vec3::Y * GRADIENT_EPS) - d0;
            let dz = entry.shape.signed_distance(p + Vec3::Z * GRADIENT_EPS) - d0;
            let normal = Vec3::new(dx, dy, dz) / GRADIENT_EPS;
            let norm = normal.length();
            if norm > 1.0e-6 {
                force += entry.strength * (-d0 / entry.decay).exp() * (normal / norm);
            }
        }
        force
    }
}
