//! Riders: objects hanging on the rope at some distance along its arc.
//!
//! A rider's position is stored as a segment index plus an offset along that
//! segment's measured length, so it stays on the rope however the samples
//! swing.

use bevy::log::info;
use bevy::math::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::RopeResult;
use crate::rope::Rope;
use crate::segment::{SegmentId, SegmentSet};

/// Damage dealt by touching a live segment.
pub const SHOCK_DAMAGE: f32 = 1.0;

/// Rider state of a rope.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Attachment {
    pub attached: bool,
    /// Segment the rider is on, in `[0, segment_count)`
    pub segment: usize,
    /// Distance from the segment's sample toward the next sample
    pub offset: f32,
    /// When the last rider let go
    pub detach_time: Option<f32>,
}

/// Result of something touching a segment.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TouchOutcome {
    /// Shock damage dealt to the toucher
    pub damage: Option<f32>,
    /// The toucher is now riding the rope
    pub grabbed: bool,
}

impl Rope {
    /// True when no rider is attached, the detach cooldown has passed, and
    /// the rope allows riders at all.
    pub fn is_accepting_attachment(&self, now: f32) -> bool {
        if self.attachment.attached || self.config.disallow_player_attachment {
            return false;
        }
        self.attachment
            .detach_time
            .map_or(true, |t| now - t >= self.config.tuning.detach_cooldown)
    }

    /// Attach a rider at the start of the given segment.
    pub fn attach_object_to_segment(&mut self, id: SegmentId) -> RopeResult<()> {
        let index = self.segment(id)?.sample_index;
        self.attachment.attached = true;
        self.attachment.segment = index;
        self.attachment.offset = 0.0;
        info!("Rider attached to rope segment {}", index);
        Ok(())
    }

    pub fn detach_object(&mut self, now: f32) {
        if self.attachment.attached {
            info!(
                "Rider detached from rope segment {}",
                self.attachment.segment
            );
        }
        self.attachment.attached = false;
        self.attachment.detach_time = Some(now);
    }

    pub fn is_object_attached(&self) -> bool {
        self.attachment.attached
    }

    pub fn attachment(&self) -> &Attachment {
        &self.attachment
    }

    /// Segment the rider is on.
    pub fn attached_segment(&self) -> Option<usize> {
        self.attachment.attached.then_some(self.attachment.segment)
    }

    /// Climb toward the anchor. Stops at the top of the first segment.
    ///
    /// Returns whether a rider is attached.
    pub fn move_up(&mut self, dt: f32) -> bool {
        if !self.attachment.attached {
            return false;
        }
        let mut distance = dt * self.config.tuning.climb_speed;
        while distance > 0.0 {
            if distance <= self.attachment.offset {
                self.attachment.offset -= distance;
                break;
            }
            if self.attachment.segment == 0 {
                self.attachment.offset = 0.0;
                break;
            }
            distance -= self.attachment.offset;
            self.attachment.segment -= 1;
            self.attachment.offset = self.segment_length(self.attachment.segment);
        }
        true
    }

    /// Slide toward the free end.
    ///
    /// Returns `false` once the rider passes the end of the last segment;
    /// the rider is then left at the tip.
    pub fn move_down(&mut self, dt: f32) -> bool {
        if !self.attachment.attached {
            return false;
        }
        let mut distance = dt * self.config.tuning.climb_speed;
        loop {
            let length = self.segment_length(self.attachment.segment);
            let room = length - self.attachment.offset;
            if distance <= room {
                self.attachment.offset += distance;
                return true;
            }
            distance -= room;
            if self.attachment.segment + 1 >= self.segment_count {
                self.attachment.offset = length;
                return false;
            }
            self.attachment.segment += 1;
            self.attachment.offset = 0.0;
        }
    }

    /// World position of the rider, if any.
    pub fn attached_object_position(&self) -> Option<Vec3> {
        if !self.attachment.attached {
            return None;
        }
        let sample = self.samples().get(self.attachment.segment)?;
        Some(sample.position + self.attachment.offset * self.segment_direction(self.attachment.segment))
    }

    /// Unit vector from segment `index`'s sample to the next sample.
    /// Zero for indices past the last segment.
    pub fn segment_direction(&self, index: usize) -> Vec3 {
        if index >= self.segment_count {
            return Vec3::ZERO;
        }
        let samples = self.samples();
        (samples[index + 1].position - samples[index].position).normalize_or_zero()
    }

    /// Far end of segment `index`, following the simulated samples.
    pub fn segment_attachment_point(&self, index: usize) -> Vec3 {
        let Some(sample) = self.samples().get(index) else {
            return self.last_end_position();
        };
        sample.position + self.segment_direction(index) * self.segment_length(index)
    }

    /// Push the rope from the rider's segment.
    ///
    /// Short ropes move too easily under a full-strength push, so their
    /// force is scaled by `segments / short_rope_segments`.
    pub fn apply_force_from_player(&mut self, force: Vec3) {
        if !self.attachment.attached {
            return;
        }
        let tuning = self.config.tuning;
        let mut scale = tuning.player_force;
        if self.segment_count < tuning.short_rope_segments {
            scale *= self.segment_count as f32 / tuning.short_rope_segments as f32;
        }
        self.apply_force_to_segment(force * scale, self.attachment.segment);
    }

    /// A player or other object touched a segment.
    pub fn touch_segment(&mut self, id: SegmentId, toucher_is_player: bool, now: f32) -> RopeResult<TouchOutcome> {
        let segment = self.segment(id)?;
        let mut outcome = TouchOutcome::default();
        if !toucher_is_player || !segment.state.is_solid() {
            return Ok(outcome);
        }

        if segment.causes_damage {
            outcome.damage = Some(SHOCK_DAMAGE);
        }
        if segment.can_be_grabbed && self.is_accepting_attachment(now) {
            self.attach_object_to_segment(id)?;
            outcome.grabbed = true;
        }
        Ok(outcome)
    }

    fn segment_length(&self, index: usize) -> f32 {
        self.segments(SegmentSet::Visible)
            .get(index)
            .map_or(0.0, |s| s.length)
    }
}
