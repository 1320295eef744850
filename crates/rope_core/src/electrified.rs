//! Electrified wire: a rope that sparks, jolts and arcs while powered.

use bevy::log::{debug, info};
use bevy::math::Vec3;
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::rope::{rope_rng, Rope, ThinkReport};
use crate::trace::WorldTrace;

/// Bounded retries when picking a second segment for lightning.
const LIGHTNING_ATTEMPTS: u32 = 10;

/// Effect tuning for an electrified wire.
///
/// Frequencies are "one in N" chances rolled every `spark_interval`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectrifiedWireConfig {
    pub tip_spark_frequency: u32,
    pub body_spark_frequency: u32,
    pub lightning_frequency: u32,
    /// Per-axis bound of the random jolt a body spark applies
    pub jolt_force: [f32; 3],
    /// Segments at the free end that spark on their own
    pub uninsulated_tip_segments: usize,
    pub spark_interval: f32,
    pub start_active: bool,
}

impl Default for ElectrifiedWireConfig {
    fn default() -> Self {
        Self {
            tip_spark_frequency: 3,
            body_spark_frequency: 100,
            lightning_frequency: 150,
            jolt_force: [10000.0; 3],
            uninsulated_tip_segments: 1,
            spark_interval: 0.1,
            start_active: true,
        }
    }
}

/// Visual effect the host should draw.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WireEffect {
    Spark { segment: usize, position: Vec3 },
    /// Arc between two distinct segments
    Lightning { from: usize, to: usize },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WireThinkReport {
    pub rope: ThinkReport,
    pub effects: Vec<WireEffect>,
}

#[derive(Debug, Clone)]
pub struct ElectrifiedWire {
    rope: Rope,
    config: ElectrifiedWireConfig,
    active: bool,
    last_spark_time: f32,
    rng: StdRng,
}

impl ElectrifiedWire {
    pub fn new(rope: Rope, config: ElectrifiedWireConfig) -> Self {
        let seed = rope.config().seed.map(|s| s.wrapping_add(1));
        let mut wire = Self {
            rope,
            config,
            active: false,
            last_spark_time: 0.0,
            rng: rope_rng(seed),
        };
        wire.set_active(config.start_active);
        wire
    }

    pub fn rope(&self) -> &Rope {
        &self.rope
    }

    pub fn rope_mut(&mut self) -> &mut Rope {
        &mut self.rope
    }

    /// Swap in a restored rope, keeping the wire's power state.
    pub fn replace_rope(&mut self, rope: Rope) {
        self.rope = rope;
        self.set_active(self.active);
    }

    pub fn config(&self) -> &ElectrifiedWireConfig {
        &self.config
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Powered wires shock on touch and can't be grabbed.
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        self.rope.set_segment_flags(active, !active);
    }

    pub fn toggle_active(&mut self) {
        self.set_active(!self.active);
        info!(
            "Electrified wire {}",
            if self.active { "powered" } else { "unpowered" }
        );
    }

    /// Roll effects, then advance the rope.
    pub fn think<W: WorldTrace + ?Sized>(&mut self, now: f32, world: &W) -> WireThinkReport {
        let mut effects = Vec::new();
        if self.active && now - self.last_spark_time > self.config.spark_interval {
            self.last_spark_time = now;
            self.roll_effects(&mut effects);
        }

        WireThinkReport {
            rope: self.rope.think(now, world),
            effects,
        }
    }

    fn roll_effects(&mut self, effects: &mut Vec<WireEffect>) {
        let count = self.rope.segment_count();
        let tip_segments = self.config.uninsulated_tip_segments.min(count);

        for segment in count - tip_segments..count {
            if self.should_do_effect(self.config.tip_spark_frequency) {
                effects.push(self.spark(segment, false));
            }
        }

        if self.should_do_effect(self.config.body_spark_frequency) {
            let segment = self.rng.gen_range(0..count);
            effects.push(self.spark(segment, true));
        }

        if self.should_do_effect(self.config.lightning_frequency) {
            if let Some(effect) = self.lightning() {
                effects.push(effect);
            }
        }
    }

    fn should_do_effect(&mut self, frequency: u32) -> bool {
        frequency != 0 && self.rng.gen_range(1..=frequency) == 1
    }

    fn spark(&mut self, segment: usize, jolt: bool) -> WireEffect {
        if jolt {
            let [x, y, z] = self.config.jolt_force.map(f32::abs);
            let force = Vec3::new(
                self.rng.gen_range(-x..=x),
                self.rng.gen_range(-y..=y),
                self.rng.gen_range(-z..=z),
            );
            self.rope.apply_force_to_segment(force, segment);
        }
        WireEffect::Spark {
            segment,
            position: self.rope.segment_attachment_point(segment),
        }
    }

    fn lightning(&mut self) -> Option<WireEffect> {
        let count = self.rope.segment_count();
        let from = self.rng.gen_range(0..count);
        for _ in 0..LIGHTNING_ATTEMPTS {
            let to = self.rng.gen_range(0..count);
            if to != from {
                return Some(WireEffect::Lightning { from, to });
            }
        }
        debug!("No second segment for lightning from segment {}", from);
        None
    }
}
