//! Static level geometry the ropes trace against.
//!
//! Colliders live in rope space (Z up), the same frame rope samples are
//! simulated in.

use bevy::prelude::*;
use rapier3d::prelude as rapier;
use rapier::nalgebra::{Point3, Vector3};
use rope_core::{TraceResult, WorldTrace};

#[derive(Resource)]
pub struct CollisionWorld {
    pub rigid_body_set: rapier::RigidBodySet,
    pub collider_set: rapier::ColliderSet,
    pub query_pipeline: rapier::QueryPipeline,
    dirty: bool,
}

impl CollisionWorld {
    pub fn new() -> Self {
        Self {
            rigid_body_set: rapier::RigidBodySet::new(),
            collider_set: rapier::ColliderSet::new(),
            query_pipeline: rapier::QueryPipeline::new(),
            dirty: false,
        }
    }

    /// Add a fixed box. Takes effect after the next [`refresh`](Self::refresh).
    pub fn add_fixed_cuboid(&mut self, center: Vec3, half_extents: Vec3) -> rapier::ColliderHandle {
        let body = rapier::RigidBodyBuilder::fixed().translation(Vector3::new(center.x, center.y, center.z));
        let body_handle = self.rigid_body_set.insert(body);
        let collider = rapier::ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z);
        let handle = self
            .collider_set
            .insert_with_parent(collider, body_handle, &mut self.rigid_body_set);
        self.dirty = true;
        handle
    }

    pub fn collider_count(&self) -> usize {
        self.collider_set.len()
    }

    pub fn needs_refresh(&self) -> bool {
        self.dirty
    }

    /// Rebuild the query acceleration structure after colliders change.
    pub fn refresh(&mut self) {
        self.query_pipeline.update(&self.collider_set);
        self.dirty = false;
    }

    /// Is `point` inside any collider?
    pub fn contains_point(&self, point: Vec3) -> bool {
        self.query_pipeline
            .project_point(
                &self.rigid_body_set,
                &self.collider_set,
                &to_point(point),
                true,
                rapier::QueryFilter::default(),
            )
            .is_some_and(|(_, projection)| projection.is_inside)
    }

    /// Direction out of the nearest surface for a point inside geometry.
    fn escape_normal(&self, point: Vec3) -> Vec3 {
        self.query_pipeline
            .project_point(
                &self.rigid_body_set,
                &self.collider_set,
                &to_point(point),
                false,
                rapier::QueryFilter::default(),
            )
            .map_or(Vec3::ZERO, |(_, projection)| {
                let p = projection.point;
                (Vec3::new(p.x, p.y, p.z) - point).normalize_or_zero()
            })
    }
}

impl Default for CollisionWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl WorldTrace for CollisionWorld {
    fn trace_line(&self, start: Vec3, end: Vec3) -> TraceResult {
        if self.contains_point(start) {
            return TraceResult {
                fraction: 0.0,
                end_position: start,
                plane_normal: self.escape_normal(start),
                started_solid: true,
                all_solid: self.contains_point(end),
            };
        }

        let delta = end - start;
        let length = delta.length();
        if length < 1e-6 {
            return TraceResult::clear(end);
        }
        let dir = delta / length;
        let ray = rapier::Ray::new(to_point(start), Vector3::new(dir.x, dir.y, dir.z));

        match self.query_pipeline.cast_ray_and_get_normal(
            &self.rigid_body_set,
            &self.collider_set,
            &ray,
            length,
            true,
            rapier::QueryFilter::default(),
        ) {
            Some((_, hit)) => TraceResult {
                fraction: hit.time_of_impact / length,
                end_position: start + dir * hit.time_of_impact,
                plane_normal: Vec3::new(hit.normal.x, hit.normal.y, hit.normal.z),
                started_solid: false,
                all_solid: false,
            },
            None => TraceResult::clear(end),
        }
    }
}

fn to_point(v: Vec3) -> Point3<f32> {
    Point3::new(v.x, v.y, v.z)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rope_core::{OpenWorld, Rope, RopeConfig, SegmentModels, SegmentSet};

    /// 200x200 slab whose top face sits at z=0.
    fn floor() -> CollisionWorld {
        let mut world = CollisionWorld::new();
        world.add_fixed_cuboid(Vec3::new(0.0, 0.0, -10.0), Vec3::new(100.0, 100.0, 10.0));
        world.refresh();
        world
    }

    #[test]
    fn test_empty_world_is_clear() {
        let world = CollisionWorld::new();
        let tr = world.trace_line(Vec3::ZERO, Vec3::new(0.0, 0.0, -50.0));
        assert!(tr.is_clear());
        assert_eq!(tr.end_position, Vec3::new(0.0, 0.0, -50.0));
    }

    #[test]
    fn test_add_cuboid_marks_dirty() {
        let mut world = CollisionWorld::new();
        world.add_fixed_cuboid(Vec3::ZERO, Vec3::ONE);
        assert!(world.needs_refresh());
        assert_eq!(world.collider_count(), 1);
        world.refresh();
        assert!(!world.needs_refresh());
    }

    #[test]
    fn test_trace_hits_floor() {
        let world = floor();
        let tr = world.trace_line(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -30.0));
        assert!((tr.fraction - 0.25).abs() < 1e-4, "fraction was {}", tr.fraction);
        assert!(tr.end_position.z.abs() < 1e-3);
        assert!((tr.plane_normal - Vec3::Z).length() < 1e-4);
        assert!(!tr.started_solid);
    }

    #[test]
    fn test_trace_from_inside_is_started_solid() {
        let world = floor();
        let tr = world.trace_line(Vec3::new(0.0, 0.0, -5.0), Vec3::new(0.0, 0.0, 20.0));
        assert!(tr.started_solid);
        assert!(!tr.all_solid);
        assert_eq!(tr.fraction, 0.0);
        assert!((tr.plane_normal - Vec3::Z).length() < 1e-4, "normal was {}", tr.plane_normal);

        let tr = world.trace_line(Vec3::new(0.0, 0.0, -5.0), Vec3::new(3.0, 0.0, -8.0));
        assert!(tr.all_solid);
    }

    #[test]
    fn test_trace_above_floor_is_clear() {
        let world = floor();
        let tr = world.trace_line(Vec3::new(-50.0, 0.0, 5.0), Vec3::new(50.0, 0.0, 5.0));
        assert!(tr.is_clear());
    }

    #[test]
    fn test_rope_clear_of_geometry_matches_open_world() {
        let world = floor();
        let config = RopeConfig {
            seed: Some(1),
            ..RopeConfig::with_segments(4)
        };
        let mut a = Rope::setup(Vec3::new(0.0, 0.0, 200.0), &config, &SegmentModels::default()).unwrap();
        let mut b = a.clone();
        for n in 0..50 {
            let now = n as f32 * 0.01;
            a.think(now, &world);
            b.think(now, &OpenWorld);
        }
        assert_eq!(a.samples(), b.samples());
        assert_eq!(a.segments(SegmentSet::Visible), b.segments(SegmentSet::Visible));
    }

    #[test]
    fn test_rope_resting_on_floor_stays_above_it() {
        let world = floor();
        let config = RopeConfig {
            seed: Some(1),
            ..RopeConfig::with_segments(6)
        };
        // 96 units of rope hanging from 60 units up
        let mut rope = Rope::setup(Vec3::new(0.0, 0.0, 60.0), &config, &SegmentModels::default()).unwrap();
        for n in 0..300 {
            rope.think(n as f32 * 0.01, &world);
        }
        for set in [SegmentSet::Visible, SegmentSet::Hidden] {
            for segment in rope.segments(set) {
                assert!(segment.origin.is_finite());
            }
        }
        assert!(rope.samples().iter().all(|s| s.position.is_finite()));
    }
}
