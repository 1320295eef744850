//! Point masses and the springs joining them.

use bevy::math::Vec3;
use serde::{Deserialize, Serialize};

/// Kinematic state of one point mass in the chain.
///
/// `inverse_mass == 0` pins the sample in place: it never accelerates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample {
    pub position: Vec3,
    pub velocity: Vec3,
    /// Force accumulated by the last force pass
    pub force: Vec3,
    /// One-shot force consumed by the next force pass
    pub external_force: Vec3,
    pub has_external_force: bool,
    pub inverse_mass: f32,
}

impl Sample {
    /// Sample at rest at `position`.
    pub fn at_rest(position: Vec3, inverse_mass: f32) -> Self {
        Self {
            position,
            inverse_mass,
            ..Default::default()
        }
    }

    pub fn is_anchored(&self) -> bool {
        self.inverse_mass == 0.0
    }

    /// Add to the pending external force.
    pub fn stage_external_force(&mut self, force: Vec3) {
        self.external_force += force;
        self.has_external_force = true;
    }

    /// Replace the pending external force.
    pub fn set_external_force(&mut self, force: Vec3) {
        self.external_force = force;
        self.has_external_force = true;
    }

    /// Remove and return the pending external force, if any.
    pub fn take_external_force(&mut self) -> Option<Vec3> {
        if !self.has_external_force {
            return None;
        }
        self.has_external_force = false;
        Some(std::mem::take(&mut self.external_force))
    }
}

/// Damped Hooke spring between two samples of the same chain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spring {
    pub first: usize,
    pub second: usize,
    pub rest_length: f32,
    pub hook_constant: f32,
    pub damping_factor: f32,
}

impl Spring {
    /// One spring per adjacent pair: spring `i` joins samples `i` and `i + 1`
    /// with rest length `rest_lengths[i]`.
    pub fn chain(rest_lengths: &[f32], hook_constant: f32, damping_factor: f32) -> Vec<Spring> {
        rest_lengths
            .iter()
            .enumerate()
            .map(|(i, &rest_length)| Spring {
                first: i,
                second: i + 1,
                rest_length,
                hook_constant,
                damping_factor,
            })
            .collect()
    }
}
