//! Line traces against world geometry.
//!
//! The rope never owns collision geometry. Whatever hosts it supplies a
//! [`WorldTrace`] and the rope traces each segment's movement through it
//! once per tick.

use bevy::math::Vec3;

/// Outcome of a line trace from `start` to `end`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceResult {
    /// Fraction of the line travelled before the first hit (1.0 = clear)
    pub fraction: f32,
    /// Where the trace stopped
    pub end_position: Vec3,
    /// Surface normal at the hit, zero when clear
    pub plane_normal: Vec3,
    /// The trace began inside solid geometry
    pub started_solid: bool,
    /// The whole trace lies inside solid geometry
    pub all_solid: bool,
}

impl TraceResult {
    /// Unobstructed trace ending at `end`.
    pub fn clear(end: Vec3) -> Self {
        Self {
            fraction: 1.0,
            end_position: end,
            plane_normal: Vec3::ZERO,
            started_solid: false,
            all_solid: false,
        }
    }

    pub fn is_clear(&self) -> bool {
        self.fraction >= 1.0
    }
}

/// World collision capability consumed by the rope.
pub trait WorldTrace {
    fn trace_line(&self, start: Vec3, end: Vec3) -> TraceResult;
}

/// Empty world: every trace is clear.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenWorld;

impl WorldTrace for OpenWorld {
    fn trace_line(&self, _start: Vec3, end: Vec3) -> TraceResult {
        TraceResult::clear(end)
    }
}

/// Solid half-space behind an infinite plane.
///
/// Points with `(p - point) · normal < 0` are inside the solid.
#[derive(Debug, Clone, Copy)]
pub struct PlaneWorld {
    pub point: Vec3,
    pub normal: Vec3,
}

impl PlaneWorld {
    pub fn new(point: Vec3, normal: Vec3) -> Self {
        Self {
            point,
            normal: normal.normalize_or_zero(),
        }
    }
}

impl WorldTrace for PlaneWorld {
    fn trace_line(&self, start: Vec3, end: Vec3) -> TraceResult {
        let d_start = (start - self.point).dot(self.normal);
        let d_end = (end - self.point).dot(self.normal);

        if d_start < 0.0 {
            return TraceResult {
                fraction: 0.0,
                end_position: start,
                plane_normal: self.normal,
                started_solid: true,
                all_solid: d_end < 0.0,
            };
        }
        if d_end >= 0.0 {
            return TraceResult::clear(end);
        }

        let fraction = d_start / (d_start - d_end);
        TraceResult {
            fraction,
            end_position: start + (end - start) * fraction,
            plane_normal: self.normal,
            started_solid: false,
            all_solid: false,
        }
    }
}
