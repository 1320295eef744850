//! The rope controller.
//!
//! Owns the sample chain, springs and both segment arrays, and runs the
//! per-tick loop:
//!
//! 1. Initialize springs on the first think
//! 2. Flip the toggle
//! 3. Integrate samples up to the current time
//! 4. Trace the primary segment array from where the other array was drawn
//!    to the new sample positions, correcting against world geometry
//! 5. Show the primary array and hide the other
//!
//! Nothing outside the rope writes sample state directly. Collision
//! corrections and external pushes are staged as one-shot forces that the
//! next integration pass consumes.

use bevy::log::{debug, info, warn};
use bevy::math::Vec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::attachment::Attachment;
use crate::config::{RopeConfig, RopeTuning, Ruleset, SegmentModels};
use crate::error::{RopeError, RopeResult};
use crate::integrator::{ForceModel, Integrator};
use crate::sample::{Sample, Spring};
use crate::segment::{
    alignment_angles, truncate_epsilon, ProxyState, Segment, SegmentId, SegmentSet, Toggle,
};
use crate::trace::WorldTrace;

/// Sounds played while a rider swings on the rope.
pub const CREAK_SOUNDS: [&str; 3] = ["items/rope1.wav", "items/rope2.wav", "items/rope3.wav"];

/// Lifecycle of a rope's simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RopePhase {
    /// Spawned or restored; springs not built yet
    Uninitialized,
    /// Springs built, first integration pending
    SpringsInitialized,
    Simulating,
}

/// A sound the host should play.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RopeSound {
    pub name: &'static str,
    pub position: Vec3,
}

/// What one think did.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ThinkReport {
    /// RK4 passes run to catch up
    pub sub_steps: u32,
    pub sound: Option<RopeSound>,
}

/// A mass-spring rope with double-buffered visual segments.
#[derive(Debug, Clone)]
pub struct Rope {
    pub(crate) config: RopeConfig,
    pub(crate) gravity: Vec3,
    pub(crate) hook_constant: f32,
    pub(crate) damping_factor: f32,
    pub(crate) segment_count: usize,
    pub(crate) springs: Vec<Spring>,
    pub(crate) phase: RopePhase,
    pub(crate) integrator: Integrator,
    pub(crate) segments: [Vec<Segment>; 2],
    pub(crate) toggle: Toggle,
    pub(crate) last_end_position: Vec3,
    pub(crate) attachment: Attachment,
    pub(crate) rng: StdRng,
}

pub(crate) fn rope_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

impl Rope {
    /// Build a rope hanging from `origin` in a straight line along gravity.
    pub fn setup(origin: Vec3, config: &RopeConfig, models: &SegmentModels) -> RopeResult<Self> {
        let gravity = config.gravity_vec();
        if !gravity.is_finite() || gravity.length_squared() == 0.0 {
            return Err(RopeError::InvalidGravity);
        }

        let segment_count = config.clamped_segments();
        if segment_count != config.segments {
            warn!(
                "Rope segment count {} clamped to {}",
                config.segments, segment_count
            );
        }

        let body_length = models.length_of(&config.body_model)?;
        let tip_length = models.length_of(&config.tip_model)?;
        let down = gravity.normalize();

        let mut segments = Vec::with_capacity(segment_count);
        let mut cursor = origin;
        for i in 0..segment_count {
            let (model, length) = if i + 1 == segment_count {
                (&config.tip_model, tip_length)
            } else {
                (&config.body_model, body_length)
            };
            segments.push(Segment::new(i, model.as_str(), length, cursor));
            cursor += down * length;
        }
        let tip = cursor;

        for i in 0..segment_count {
            let end = segments.get(i + 1).map_or(tip, |next| next.origin);
            segments[i].angles = alignment_angles(segments[i].origin, end);
            segments[i].state = ProxyState::Shown;
        }
        let mut hidden = segments.clone();
        for segment in &mut hidden {
            segment.state = ProxyState::Concealed;
        }

        let interior_inverse_mass = 1.0 / config.default_mass.max(f32::EPSILON);
        let samples = (0..=segment_count)
            .map(|i| {
                let position = segments.get(i).map_or(tip, |s| s.origin);
                let inverse_mass = if i == 0 {
                    0.0
                } else if i == segment_count {
                    config.tip_inverse_mass
                } else {
                    interior_inverse_mass
                };
                Sample::at_rest(position, inverse_mass)
            })
            .collect();

        info!(
            "Rope spawned at {:?} with {} segments ({} samples)",
            origin,
            segment_count,
            segment_count + 1
        );

        Ok(Self {
            config: config.clone(),
            gravity,
            hook_constant: config.hook_constant,
            damping_factor: config.spring_damping,
            segment_count,
            springs: Vec::new(),
            phase: RopePhase::Uninitialized,
            integrator: Integrator::new(samples),
            segments: [segments, hidden],
            toggle: Toggle::default(),
            last_end_position: tip,
            attachment: Attachment::default(),
            rng: rope_rng(config.seed),
        })
    }

    /// Build one spring per segment from the measured segment lengths.
    pub fn initialize_springs(&mut self) {
        let rest_lengths: Vec<f32> = self.segments[SegmentSet::Visible.index()]
            .iter()
            .map(|s| s.length)
            .collect();
        self.springs = Spring::chain(&rest_lengths, self.hook_constant, self.damping_factor);
        self.phase = RopePhase::SpringsInitialized;
        debug!("Rope springs initialized ({})", self.springs.len());
    }

    /// Advance the rope to time `now` and place its segments.
    pub fn think<W: WorldTrace + ?Sized>(&mut self, now: f32, world: &W) -> ThinkReport {
        if self.phase == RopePhase::Uninitialized {
            self.initialize_springs();
        }

        self.toggle = self.toggle.flipped();
        let sub_steps = self.run_sim_on_samples(now);
        self.phase = RopePhase::Simulating;

        let (primary, other) = self.toggle.sets();
        self.set_rope_segments(primary, other, world);

        ThinkReport {
            sub_steps,
            sound: self.creak(),
        }
    }

    /// Integrate the chain up to `now` in fixed sub-steps.
    pub fn run_sim_on_samples(&mut self, now: f32) -> u32 {
        let model = self.force_model();
        self.integrator
            .run(now, &self.springs, &model, &self.config.tuning)
    }

    /// Trace `primary` into place, then show it and conceal `hidden`.
    pub fn set_rope_segments<W: WorldTrace + ?Sized>(
        &mut self,
        primary: SegmentSet,
        hidden: SegmentSet,
        world: &W,
    ) {
        self.trace_models(primary, hidden, world);

        let (mut shown, mut concealed) = (primary, hidden);
        // Clients stop drawing segments whose identity changes every tick at
        // multiplayer tick rates, so the visible array always stays drawn there.
        if self.toggle == Toggle::BVisible && self.config.ruleset == Ruleset::Multiplayer {
            std::mem::swap(&mut shown, &mut concealed);
        }

        for segment in &mut self.segments[shown.index()] {
            segment.state = ProxyState::Shown;
        }
        for segment in &mut self.segments[concealed.index()] {
            segment.state = ProxyState::Concealed;
        }
    }

    /// Move `primary` segments to the simulated sample positions, stopping
    /// them at world geometry and staging push-out forces where blocked.
    pub fn trace_models<W: WorldTrace + ?Sized>(
        &mut self,
        primary: SegmentSet,
        hidden: SegmentSet,
        world: &W,
    ) {
        if primary == hidden {
            return;
        }
        let tuning = self.config.tuning;
        let count = self.segment_count;
        let Rope {
            segments,
            integrator,
            attachment,
            last_end_position,
            ..
        } = self;
        let [visible_set, hidden_set] = segments;
        let (prim, prev) = match primary {
            SegmentSet::Visible => (visible_set, &*hidden_set),
            SegmentSet::Hidden => (hidden_set, &*visible_set),
        };
        let samples = integrator.samples_mut();

        prim[0].origin = truncate_epsilon(samples[0].position);

        if attachment.attached {
            for i in 1..count {
                let target = samples[i].position;
                let from = prev[i].origin;
                let reach = if i.abs_diff(attachment.segment) <= tuning.rider_trace_span {
                    tuning.rider_trace_distance
                } else {
                    tuning.far_trace_distance
                };
                let overshoot = (target - from).normalize_or_zero() * reach;

                let tr = world.trace_line(from, target + overshoot);
                if tr.all_solid {
                    break;
                }
                if !tr.is_clear() || tr.started_solid {
                    prim[i].origin = truncate_epsilon(tr.end_position - overshoot);
                    samples[i].set_external_force(
                        tr.plane_normal.normalize_or_zero() * tuning.rider_collision_force,
                    );
                } else {
                    prim[i].origin = truncate_epsilon(target);
                }
            }
        } else {
            for i in 1..count {
                let target = samples[i].position;
                let tr = world.trace_line(prev[i].origin, target);
                if tr.is_clear() {
                    prim[i].origin = truncate_epsilon(target);
                } else {
                    let normal = tr.plane_normal.normalize_or_zero();
                    prim[i].origin = truncate_epsilon(tr.end_position + normal * tuning.surface_offset);
                    samples[i].set_external_force(normal * tuning.free_collision_force);
                }
            }
        }

        for i in 1..count {
            prim[i - 1].angles = alignment_angles(prim[i - 1].origin, prim[i].origin);
        }

        let tip = &mut samples[count];
        let tr = world.trace_line(*last_end_position, tip.position);
        if tr.is_clear() {
            *last_end_position = tip.position;
        } else {
            *last_end_position = tr.end_position;
            tip.set_external_force(tr.plane_normal.normalize_or_zero() * tuning.free_collision_force);
        }
        prim[count - 1].angles = alignment_angles(prim[count - 1].origin, *last_end_position);
    }

    /// Stage a one-shot force for the next integration pass.
    ///
    /// `index == segment_count` addresses the end of the rope and lands on
    /// the last segment's sample.
    pub fn apply_force_to_segment(&mut self, force: Vec3, index: usize) {
        let count = self.segment_count;
        let samples = self.integrator.samples_mut();
        if index < count {
            samples[index].stage_external_force(force);
        } else if index == count {
            samples[count - 1].stage_external_force(force);
        } else {
            debug!("Ignoring force for segment {} of {}", index, count);
        }
    }

    /// Set touch behaviour on every segment of both arrays.
    pub fn set_segment_flags(&mut self, causes_damage: bool, can_be_grabbed: bool) {
        for segment in self.segments.iter_mut().flatten() {
            segment.causes_damage = causes_damage;
            segment.can_be_grabbed = can_be_grabbed;
        }
    }

    fn creak(&mut self) -> Option<RopeSound> {
        if !self.config.make_sound || !self.attachment.attached {
            return None;
        }
        let tuning = self.config.tuning;
        let sample = *self.integrator.samples().get(self.attachment.segment)?;
        if sample.velocity.length() <= tuning.creak_speed {
            return None;
        }
        if self.rng.gen_range(1..=tuning.creak_chance.max(1)) != 1 {
            return None;
        }
        let name = CREAK_SOUNDS[self.rng.gen_range(0..CREAK_SOUNDS.len())];
        Some(RopeSound {
            name,
            position: sample.position,
        })
    }

    pub(crate) fn force_model(&self) -> ForceModel {
        ForceModel::new(self.gravity, &self.config.tuning)
    }

    pub fn config(&self) -> &RopeConfig {
        &self.config
    }

    pub fn tuning(&self) -> &RopeTuning {
        &self.config.tuning
    }

    pub fn gravity(&self) -> Vec3 {
        self.gravity
    }

    pub fn hook_constant(&self) -> f32 {
        self.hook_constant
    }

    pub fn damping_factor(&self) -> f32 {
        self.damping_factor
    }

    pub fn segment_count(&self) -> usize {
        self.segment_count
    }

    pub fn sample_count(&self) -> usize {
        self.segment_count + 1
    }

    pub fn phase(&self) -> RopePhase {
        self.phase
    }

    pub fn toggle(&self) -> Toggle {
        self.toggle
    }

    /// Latest integrated sample state.
    pub fn samples(&self) -> &[Sample] {
        self.integrator.samples()
    }

    /// Empty until the first think.
    pub fn springs(&self) -> &[Spring] {
        &self.springs
    }

    pub fn segments(&self, set: SegmentSet) -> &[Segment] {
        &self.segments[set.index()]
    }

    pub fn segment(&self, id: SegmentId) -> RopeResult<&Segment> {
        self.segments[id.set.index()]
            .get(id.index)
            .ok_or(RopeError::SegmentOutOfRange {
                index: id.index,
                count: self.segment_count,
            })
    }

    /// Where the tip was last placed, after collision.
    pub fn last_end_position(&self) -> Vec3 {
        self.last_end_position
    }

    /// Simulated time of the last think.
    pub fn last_update(&self) -> f32 {
        self.integrator.last_time()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{OpenWorld, PlaneWorld};

    const TICK: f32 = 0.01;

    fn rope(segments: usize) -> Rope {
        let config = RopeConfig {
            seed: Some(7),
            ..RopeConfig::with_segments(segments)
        };
        Rope::setup(Vec3::new(0.0, 0.0, 200.0), &config, &SegmentModels::default()).unwrap()
    }

    fn run_ticks<W: WorldTrace>(rope: &mut Rope, world: &W, ticks: usize) {
        let start = rope.last_update();
        for n in 0..ticks {
            rope.think(start + n as f32 * TICK, world);
        }
    }

    fn assert_pairing(rope: &Rope) {
        let visible = rope.segments(SegmentSet::Visible);
        let hidden = rope.segments(SegmentSet::Hidden);
        assert_eq!(visible.len(), hidden.len());
        for (i, (v, h)) in visible.iter().zip(hidden).enumerate() {
            assert_eq!(v.sample_index, i);
            assert_eq!(h.sample_index, i);
            assert_ne!(v.state, h.state, "segment {} pair must differ", i);
            assert_eq!(v.state.is_solid(), v.state.is_drawn());
        }
    }

    #[test]
    fn test_setup_builds_straight_chain() {
        let rope = rope(5);
        assert_eq!(rope.segment_count(), 5);
        assert_eq!(rope.samples().len(), 6);
        assert_eq!(rope.phase(), RopePhase::Uninitialized);

        let samples = rope.samples();
        assert_eq!(samples[0].inverse_mass, 0.0);
        assert_eq!(samples[5].inverse_mass, 0.2);
        assert!(samples[1..5].iter().all(|s| s.inverse_mass == 1.0));

        for (i, s) in samples.iter().enumerate() {
            assert_eq!(s.position, Vec3::new(0.0, 0.0, 200.0 - 16.0 * i as f32));
            assert_eq!(s.velocity, Vec3::ZERO);
        }
        assert_eq!(rope.last_end_position(), Vec3::new(0.0, 0.0, 120.0));
        assert_pairing(&rope);
    }

    #[test]
    fn test_setup_clamps_segments() {
        assert_eq!(rope(0).segment_count(), 1);
        assert_eq!(rope(100).segment_count(), 62);
        assert_eq!(rope(100).samples().len(), 63);
    }

    #[test]
    fn test_setup_tip_model_length() {
        let config = RopeConfig {
            tip_model: "models/rope32.mdl".to_string(),
            ..RopeConfig::with_segments(3)
        };
        let rope = Rope::setup(Vec3::ZERO, &config, &SegmentModels::default()).unwrap();
        assert_eq!(rope.segments(SegmentSet::Visible)[2].length, 32.0);
        assert_eq!(rope.samples()[3].position, Vec3::new(0.0, 0.0, -64.0));
    }

    #[test]
    fn test_setup_rejects_bad_input() {
        let models = SegmentModels::default();
        let no_gravity = RopeConfig {
            gravity: [0.0; 3],
            ..Default::default()
        };
        assert_eq!(
            Rope::setup(Vec3::ZERO, &no_gravity, &models).unwrap_err(),
            RopeError::InvalidGravity
        );

        let bad_model = RopeConfig {
            body_model: "models/chain.mdl".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            Rope::setup(Vec3::ZERO, &bad_model, &models),
            Err(RopeError::UnknownModel(_))
        ));
    }

    #[test]
    fn test_first_think_initializes_springs() {
        let mut rope = rope(4);
        assert!(rope.springs().is_empty());

        let report = rope.think(1.0, &OpenWorld);
        assert_eq!(report.sub_steps, 1);
        assert_eq!(rope.phase(), RopePhase::Simulating);
        assert_eq!(rope.springs().len(), 4);
        assert!(rope.springs().iter().all(|s| s.rest_length == 16.0));
    }

    #[test]
    fn test_toggle_flips_every_think() {
        let mut rope = rope(3);
        let initial = rope.toggle();
        for n in 1..=10 {
            rope.think(n as f32 * TICK, &OpenWorld);
            if n % 2 == 0 {
                assert_eq!(rope.toggle(), initial);
            } else {
                assert_ne!(rope.toggle(), initial);
            }
        }
    }

    #[test]
    fn test_segment_pairing_every_tick() {
        let mut rope = rope(6);
        for n in 0..50 {
            rope.think(n as f32 * TICK, &OpenWorld);
            assert_pairing(&rope);
        }
    }

    #[test]
    fn test_primary_array_alternates_in_single_player() {
        let mut rope = rope(3);
        rope.think(0.0, &OpenWorld);
        assert_eq!(rope.toggle(), Toggle::BVisible);
        assert_eq!(rope.segments(SegmentSet::Hidden)[0].state, ProxyState::Shown);

        rope.think(TICK, &OpenWorld);
        assert_eq!(rope.segments(SegmentSet::Visible)[0].state, ProxyState::Shown);
    }

    #[test]
    fn test_multiplayer_keeps_visible_array_drawn() {
        let config = RopeConfig {
            ruleset: Ruleset::Multiplayer,
            ..RopeConfig::with_segments(3)
        };
        let mut rope = Rope::setup(Vec3::ZERO, &config, &SegmentModels::default()).unwrap();
        for n in 0..8 {
            rope.think(n as f32 * TICK, &OpenWorld);
            assert!(rope
                .segments(SegmentSet::Visible)
                .iter()
                .all(|s| s.state == ProxyState::Shown));
            assert_pairing(&rope);
        }
    }

    #[test]
    fn test_anchor_never_moves() {
        let mut rope = rope(8);
        let anchor = rope.samples()[0].position;
        rope.apply_force_to_segment(Vec3::new(5000.0, 0.0, 0.0), 4);
        for n in 0..300 {
            rope.think(n as f32 * TICK, &OpenWorld);
            assert_eq!(rope.samples()[0].position, anchor);
            assert_eq!(rope.samples()[0].velocity, Vec3::ZERO);
            assert_eq!(rope.segments(SegmentSet::Visible)[0].origin, anchor);
        }
    }

    #[test]
    fn test_straight_rope_settles_along_gravity() {
        let mut rope = rope(5);
        rope.think(0.0, &OpenWorld);
        rope.apply_force_to_segment(Vec3::new(30000.0, 10000.0, 0.0), 5);
        run_ticks(&mut rope, &OpenWorld, 500);

        let samples = rope.samples();
        let down = Vec3::NEG_Z;
        for pair in samples.windows(2) {
            let dir = (pair[1].position - pair[0].position).normalize();
            assert!(
                dir.dot(down) > 0.99,
                "segment should hang along gravity, direction was {}",
                dir
            );
        }
    }

    #[test]
    fn test_energy_does_not_explode() {
        let mut rope = rope(10);
        let bound = 10.0 * 16.0 * 10.0;
        let origin = rope.samples()[0].position;
        for n in 0..400 {
            if n % 50 == 0 {
                rope.apply_force_to_segment(Vec3::new(20000.0, -20000.0, 20000.0), 1 + n % 9);
            }
            rope.think(n as f32 * TICK, &OpenWorld);
            for s in rope.samples() {
                assert!(s.position.is_finite() && s.velocity.is_finite());
                assert!((s.position - origin).abs().max_element() < bound);
                assert!(s.velocity.abs().max_element() < bound);
            }
        }
    }

    #[test]
    fn test_collision_deflects_free_segment() {
        let mut rope = rope(3);
        // Sample 2 projected through a floor at z=160
        rope.integrator.samples_mut()[2].position = Vec3::new(0.0, 0.0, 150.0);
        let floor = PlaneWorld::new(Vec3::new(0.0, 0.0, 160.0), Vec3::Z);

        rope.trace_models(SegmentSet::Visible, SegmentSet::Hidden, &floor);

        let segment = &rope.segments(SegmentSet::Visible)[2];
        assert!(
            (segment.origin - Vec3::new(0.0, 0.0, 170.0)).length() < 1e-3,
            "segment should sit 10 units off the floor, was at {}",
            segment.origin
        );
        let sample = &rope.samples()[2];
        assert!(sample.has_external_force);
        assert!((sample.external_force - Vec3::Z * 40000.0).length() < 1e-2);

        // Unblocked neighbours follow their samples and get no push
        assert_eq!(rope.segments(SegmentSet::Visible)[1].origin, Vec3::new(0.0, 0.0, 184.0));
        assert!(!rope.samples()[1].has_external_force);
    }

    #[test]
    fn test_collision_with_rider_snaps_back_from_hit() {
        let mut rope = rope(4);
        rope.attach_object_to_segment(SegmentId::new(SegmentSet::Visible, 2)).unwrap();
        rope.integrator.samples_mut()[2].position = Vec3::new(0.0, 0.0, 150.0);
        let floor = PlaneWorld::new(Vec3::new(0.0, 0.0, 160.0), Vec3::Z);

        rope.trace_models(SegmentSet::Visible, SegmentSet::Hidden, &floor);

        // Trace overshoots by 50 near the rider; the segment backs off by the same
        let segment = &rope.segments(SegmentSet::Visible)[2];
        assert!(
            (segment.origin - Vec3::new(0.0, 0.0, 210.0)).length() < 1e-3,
            "segment was at {}",
            segment.origin
        );
        let sample = &rope.samples()[2];
        assert!((sample.external_force - Vec3::Z * 20000.0).length() < 1e-2);
    }

    #[test]
    fn test_tip_collision_records_end_position() {
        let mut rope = rope(2);
        rope.integrator.samples_mut()[2].position = Vec3::new(0.0, 0.0, 150.0);
        let floor = PlaneWorld::new(Vec3::new(0.0, 0.0, 160.0), Vec3::Z);

        rope.trace_models(SegmentSet::Visible, SegmentSet::Hidden, &floor);

        assert!((rope.last_end_position().z - 160.0).abs() < 1e-3);
        assert!(rope.samples()[2].has_external_force);
    }

    #[test]
    fn test_positions_truncated_to_one_decimal() {
        let mut rope = rope(4);
        rope.think(0.0, &OpenWorld);
        rope.apply_force_to_segment(Vec3::new(1234.5, 678.9, 0.0), 2);
        run_ticks(&mut rope, &OpenWorld, 20);

        for set in [SegmentSet::Visible, SegmentSet::Hidden] {
            for segment in rope.segments(set) {
                let scaled = segment.origin * 10.0;
                assert!((scaled - scaled.round()).abs().max_element() < 1e-2);
            }
        }
    }

    #[test]
    fn test_apply_force_to_segment_indices() {
        let mut rope = rope(3);
        rope.apply_force_to_segment(Vec3::X, 1);
        rope.apply_force_to_segment(Vec3::Y, 3);
        rope.apply_force_to_segment(Vec3::Z, 9);

        let samples = rope.samples();
        assert_eq!(samples[1].external_force, Vec3::X);
        assert_eq!(samples[2].external_force, Vec3::Y);
        assert!(!samples[3].has_external_force);
    }

    #[test]
    fn test_single_segment_rope() {
        let mut rope = rope(1);
        for n in 0..100 {
            rope.think(n as f32 * TICK, &OpenWorld);
        }
        assert_eq!(rope.springs().len(), 1);
        assert_pairing(&rope);
        let tip = rope.samples()[1].position;
        assert!(tip.is_finite());
        assert!((tip - rope.samples()[0].position).length() > 15.0);
    }
}
