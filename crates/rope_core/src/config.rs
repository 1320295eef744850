//! Spawn-time rope configuration and simulation tuning.
//!
//! [`RopeConfig`] is what a level designer sets per rope (segment count,
//! models, attachment policy). [`RopeTuning`] holds the simulation constants
//! shared by every rope; the defaults are the values the rope was tuned with
//! and changing them changes how the rope feels.

use std::collections::HashMap;
use std::path::Path;

use bevy::math::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{RopeError, RopeIoResult, RopeResult};

/// Hard upper bound on segments per rope. Requested counts are clamped to
/// `[1, MAX_SEGMENTS - 1]`.
pub const MAX_SEGMENTS: usize = 63;

/// One more sample than segments.
pub const MAX_SAMPLES: usize = MAX_SEGMENTS + 1;

/// Body model used when none is configured.
pub const DEFAULT_BODY_MODEL: &str = "models/rope16.mdl";

/// Which game rules the rope runs under. Affects segment visibility only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Ruleset {
    #[default]
    SinglePlayer,
    Multiplayer,
}

/// Simulation constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RopeTuning {
    /// Time step fed to each RK4 pass (seconds)
    pub integration_step: f32,
    /// Virtual clock advance per RK4 pass (seconds)
    pub sub_step: f32,
    /// Upper bound on RK4 passes in one tick
    pub max_sub_steps: u32,
    /// Drag applied while a sample moves along gravity
    pub light_drag: f32,
    /// Drag applied while a sample moves against gravity
    pub strong_drag: f32,
    /// Push-out force when a segment near a rider is blocked
    pub rider_collision_force: f32,
    /// Push-out force when a free rope segment is blocked
    pub free_collision_force: f32,
    /// Distance a blocked free segment is moved off the surface
    pub surface_offset: f32,
    /// Trace overshoot for segments within `rider_trace_span` of the rider
    pub rider_trace_distance: f32,
    /// Trace overshoot for the remaining segments while a rider is attached
    pub far_trace_distance: f32,
    /// Segments on either side of the rider that use the long trace
    pub rider_trace_span: usize,
    /// Rider climb speed along the rope (units/sec)
    pub climb_speed: f32,
    /// Multiplier applied to player input forces
    pub player_force: f32,
    /// Ropes shorter than this have player forces scaled down
    pub short_rope_segments: usize,
    /// Rider segment speed above which the rope may creak
    pub creak_speed: f32,
    /// One in `creak_chance` ticks creaks when fast enough
    pub creak_chance: u32,
    /// Seconds after a detach before the rope accepts a rider again
    pub detach_cooldown: f32,
}

impl Default for RopeTuning {
    fn default() -> Self {
        Self {
            integration_step: 0.025,
            sub_step: 0.007,
            max_sub_steps: 512,
            light_drag: 0.04,
            strong_drag: 1.0,
            rider_collision_force: 20000.0,
            free_collision_force: 40000.0,
            surface_offset: 10.0,
            rider_trace_distance: 50.0,
            far_trace_distance: 10.0,
            rider_trace_span: 2,
            climb_speed: 128.0,
            player_force: 20000.0,
            short_rope_segments: 26,
            creak_speed: 20.0,
            creak_chance: 5,
            detach_cooldown: 2.0,
        }
    }
}

/// Per-rope spawn configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RopeConfig {
    /// Requested segment count before clamping
    pub segments: usize,
    /// Model for every segment but the last
    pub body_model: String,
    /// Model for the last segment
    pub tip_model: String,
    /// Refuse riders entirely
    pub disallow_player_attachment: bool,
    /// Emit creak sounds while ridden
    pub make_sound: bool,
    pub gravity: [f32; 3],
    /// Spring stiffness (Hooke's law)
    pub hook_constant: f32,
    /// Relative-velocity damping along each spring
    pub spring_damping: f32,
    /// Mass of every interior sample
    pub default_mass: f32,
    /// Inverse mass of the free end
    pub tip_inverse_mass: f32,
    pub ruleset: Ruleset,
    /// Fixed RNG seed, for reproducible creaks and sparks
    pub seed: Option<u64>,
    pub tuning: RopeTuning,
}

impl Default for RopeConfig {
    fn default() -> Self {
        Self {
            segments: 8,
            body_model: DEFAULT_BODY_MODEL.to_string(),
            tip_model: DEFAULT_BODY_MODEL.to_string(),
            disallow_player_attachment: false,
            make_sound: true,
            gravity: [0.0, 0.0, -50.0],
            hook_constant: 2500.0,
            spring_damping: 0.1,
            default_mass: 1.0,
            tip_inverse_mass: 0.2,
            ruleset: Ruleset::SinglePlayer,
            seed: None,
            tuning: RopeTuning::default(),
        }
    }
}

impl RopeConfig {
    /// Config with the given segment count and defaults elsewhere.
    pub fn with_segments(segments: usize) -> Self {
        Self {
            segments,
            ..Default::default()
        }
    }

    /// Requested segment count clamped into `[1, MAX_SEGMENTS - 1]`.
    pub fn clamped_segments(&self) -> usize {
        self.segments.clamp(1, MAX_SEGMENTS - 1)
    }

    pub fn gravity_vec(&self) -> Vec3 {
        Vec3::from_array(self.gravity)
    }

    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> RopeIoResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Load a rope config from a JSON file.
pub fn load_rope_config<P: AsRef<Path>>(path: P) -> RopeIoResult<RopeConfig> {
    let json = std::fs::read_to_string(path)?;
    RopeConfig::from_json_str(&json)
}

/// Measured body lengths of the segment models, keyed by model name.
///
/// A segment's length is the distance from its origin to its attachment
/// point, which is where the next segment hangs.
#[derive(Debug, Clone)]
pub struct SegmentModels {
    lengths: HashMap<String, f32>,
}

impl Default for SegmentModels {
    fn default() -> Self {
        let mut models = Self::empty();
        models.register("models/rope16.mdl", 16.0);
        models.register("models/rope24.mdl", 24.0);
        models.register("models/rope32.mdl", 32.0);
        models
    }
}

impl SegmentModels {
    /// Registry with no models.
    pub fn empty() -> Self {
        Self {
            lengths: HashMap::new(),
        }
    }

    pub fn register(&mut self, name: impl Into<String>, length: f32) {
        self.lengths.insert(name.into(), length);
    }

    pub fn length_of(&self, name: &str) -> RopeResult<f32> {
        self.lengths
            .get(name)
            .copied()
            .ok_or_else(|| RopeError::UnknownModel(name.to_string()))
    }
}
