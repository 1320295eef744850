//! Force accumulation and RK4 stepping for a sample chain.
//!
//! # Pipeline (per sub-step)
//!
//! 1. Per-sample forces: gravity, pending external force, drag
//! 2. Spring forces between adjacent samples
//! 3. Four RK4 stages, each re-evaluating forces on a stage state
//! 4. Combine stage deltas into the target buffer, then swap buffers
//!
//! The chain lives in two equally sized buffers. `current` is the latest
//! state and the only one anything outside this module reads; `target`
//! receives each new step and is swapped in once complete.

use bevy::log::{debug, warn};
use bevy::math::Vec3;

use crate::config::RopeTuning;
use crate::sample::{Sample, Spring};

/// Stage step weights, as fractions of the integration step.
const STAGE_WEIGHTS: [f32; 4] = [0.5, 0.5, 0.5, 1.0];

/// Below this separation a spring has no direction and applies no force.
const MIN_SPRING_DISTANCE: f32 = 1e-6;

/// Global forces acting on every sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceModel {
    pub gravity: Vec3,
    pub light_drag: f32,
    pub strong_drag: f32,
}

impl ForceModel {
    pub fn new(gravity: Vec3, tuning: &RopeTuning) -> Self {
        Self {
            gravity,
            light_drag: tuning.light_drag,
            strong_drag: tuning.strong_drag,
        }
    }
}

/// Reset `sample.force` to gravity, pending external force and drag.
///
/// Gravity is divided by inverse mass, so it scales with mass. Drag is light
/// while the sample moves with gravity and strong while it moves against it,
/// which stops the rope bouncing back up after a fall.
pub fn compute_sample_force(sample: &mut Sample, model: &ForceModel) {
    sample.force = Vec3::ZERO;

    if sample.inverse_mass != 0.0 {
        sample.force += model.gravity / sample.inverse_mass;
    }

    if let Some(external) = sample.take_external_force() {
        sample.force += external;
    }

    if model.gravity.dot(sample.velocity) >= 0.0 {
        sample.force -= sample.velocity * model.light_drag;
    } else {
        sample.force -= sample.velocity * model.strong_drag;
    }
}

/// Apply a damped Hooke spring between `a` and `b`.
///
/// The force on `a` is `-(damping / distance + hooke) * dir(a - b)`, and
/// `b` receives the opposite.
pub fn compute_spring_force(a: &mut Sample, b: &mut Sample, spring: &Spring) {
    let delta = a.position - b.position;
    let distance = delta.length();
    if distance < MIN_SPRING_DISTANCE {
        return;
    }

    let hooke = (distance - spring.rest_length) * spring.hook_constant;
    let damping = (a.velocity - b.velocity).dot(delta) * spring.damping_factor;
    let factor = -(damping / distance + hooke);
    let force = delta / distance * factor;

    a.force += force;
    b.force -= force;
}

/// Sample forces for every sample, then every spring on top of them.
pub fn compute_forces(samples: &mut [Sample], springs: &[Spring], model: &ForceModel) {
    for sample in samples.iter_mut() {
        compute_sample_force(sample, model);
    }

    for spring in springs {
        if let Some((a, b)) = pair_mut(samples, spring.first, spring.second) {
            compute_spring_force(a, b, spring);
        }
    }
}

/// Two distinct mutable samples out of one slice.
fn pair_mut(samples: &mut [Sample], i: usize, j: usize) -> Option<(&mut Sample, &mut Sample)> {
    if i == j || i.max(j) >= samples.len() {
        return None;
    }
    if i < j {
        let (lo, hi) = samples.split_at_mut(j);
        Some((&mut lo[i], &mut hi[0]))
    } else {
        let (lo, hi) = samples.split_at_mut(i);
        Some((&mut hi[0], &mut lo[j]))
    }
}

/// Store the scaled derivative of `state` in `out`: `velocity` holds the
/// position delta, `force` the velocity delta.
fn derivative(state: &[Sample], h: f32, out: &mut [Sample]) {
    for (k, s) in out.iter_mut().zip(state) {
        k.velocity = s.velocity * h;
        k.force = s.force * s.inverse_mass * h;
    }
}

/// Advance `source` by `dt` into `target`.
///
/// `source.force` must already hold the forces for its state. `target` is
/// used for the intermediate stage states before receiving the result, and
/// `scratch[k]` receives stage `k`'s deltas.
pub fn rk4_integrate(
    dt: f32,
    source: &[Sample],
    target: &mut [Sample],
    scratch: &mut [Vec<Sample>; 4],
    springs: &[Spring],
    model: &ForceModel,
) {
    derivative(source, dt * STAGE_WEIGHTS[0], &mut scratch[0]);

    for stage in 1..STAGE_WEIGHTS.len() {
        let (done, rest) = scratch.split_at_mut(stage);
        let prev = &done[stage - 1];

        for ((state, src), k) in target.iter_mut().zip(source).zip(prev) {
            *state = Sample {
                position: src.position + k.velocity,
                velocity: src.velocity + k.force,
                inverse_mass: src.inverse_mass,
                ..Default::default()
            };
        }
        compute_forces(target, springs, model);
        derivative(target, dt * STAGE_WEIGHTS[stage], &mut rest[0]);
    }

    let [k1, k2, k3, k4] = scratch;
    for (i, (out, src)) in target.iter_mut().zip(source).enumerate() {
        let dx = (k1[i].velocity + 2.0 * k2[i].velocity + 2.0 * k3[i].velocity + k4[i].velocity) / 6.0;
        let dv = (k1[i].force + 2.0 * k2[i].force + 2.0 * k3[i].force + k4[i].force) / 6.0;
        *out = Sample {
            position: src.position + dx,
            velocity: src.velocity + dv,
            force: src.force,
            inverse_mass: src.inverse_mass,
            ..Default::default()
        };
    }
}

/// Double-buffered integration state for one chain.
#[derive(Debug, Clone)]
pub struct Integrator {
    current: Vec<Sample>,
    target: Vec<Sample>,
    scratch: [Vec<Sample>; 4],
    last_time: f32,
    initial_tick: bool,
}

impl Integrator {
    /// Seed the simulation from `samples`. The next run uses a zero step.
    pub fn new(samples: Vec<Sample>) -> Self {
        let target = samples
            .iter()
            .map(|s| Sample::at_rest(Vec3::ZERO, s.inverse_mass))
            .collect();
        let scratch = std::array::from_fn(|_| vec![Sample::default(); samples.len()]);
        Self {
            current: samples,
            target,
            scratch,
            last_time: 0.0,
            initial_tick: true,
        }
    }

    /// Pick up a saved chain. Scratch buffers start zeroed and the next run
    /// uses a zero step.
    pub fn resume(samples: Vec<Sample>, last_time: f32) -> Self {
        Self {
            last_time,
            ..Self::new(samples)
        }
    }

    /// Latest sample state.
    pub fn samples(&self) -> &[Sample] {
        &self.current
    }

    pub fn samples_mut(&mut self) -> &mut [Sample] {
        &mut self.current
    }

    /// Simulated time the chain has caught up to.
    pub fn last_time(&self) -> f32 {
        self.last_time
    }

    pub fn is_initial_tick(&self) -> bool {
        self.initial_tick
    }

    /// Force the next run to start with a zero step.
    pub fn reset_clock(&mut self) {
        self.initial_tick = true;
    }

    /// One force pass and one RK4 pass of `dt`.
    pub fn step(&mut self, dt: f32, springs: &[Spring], model: &ForceModel) {
        compute_forces(&mut self.current, springs, model);
        rk4_integrate(
            dt,
            &self.current,
            &mut self.target,
            &mut self.scratch,
            springs,
            model,
        );
        std::mem::swap(&mut self.current, &mut self.target);
    }

    /// Step until the virtual clock reaches `now`. Returns the number of steps.
    ///
    /// At least one step always runs. The first run after creation or
    /// [`reset_clock`](Self::reset_clock) uses `dt = 0`.
    pub fn run(&mut self, now: f32, springs: &[Spring], model: &ForceModel, tuning: &RopeTuning) -> u32 {
        let mut dt = tuning.integration_step;
        if self.initial_tick {
            self.initial_tick = false;
            self.last_time = now;
            dt = 0.0;
        }

        let mut steps = 0;
        loop {
            steps += 1;
            self.step(dt, springs, model);
            self.last_time += tuning.sub_step;

            if now <= self.last_time {
                break;
            }
            if steps >= tuning.max_sub_steps {
                warn!(
                    "Rope fell {:.3}s behind after {} sub-steps, dropping the backlog",
                    now - self.last_time,
                    steps
                );
                break;
            }
        }
        debug!("Rope advanced {} sub-steps to t={:.3}", steps, now);

        self.last_time = now;
        steps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(gravity: Vec3) -> ForceModel {
        ForceModel::new(gravity, &RopeTuning::default())
    }

    fn spring(rest_length: f32) -> Spring {
        Spring {
            first: 0,
            second: 1,
            rest_length,
            hook_constant: 2500.0,
            damping_factor: 0.1,
        }
    }

    #[test]
    fn test_sample_force_gravity_scales_with_mass() {
        let m = model(Vec3::new(0.0, 0.0, -50.0));
        let mut heavy = Sample::at_rest(Vec3::ZERO, 0.2);
        compute_sample_force(&mut heavy, &m);
        assert_eq!(heavy.force, Vec3::new(0.0, 0.0, -250.0));

        let mut anchor = Sample::at_rest(Vec3::ZERO, 0.0);
        compute_sample_force(&mut anchor, &m);
        assert_eq!(anchor.force, Vec3::ZERO);
    }

    #[test]
    fn test_sample_force_drag_asymmetry() {
        let m = model(Vec3::new(0.0, 0.0, -50.0));

        // Falling with gravity: light drag
        let mut falling = Sample::at_rest(Vec3::ZERO, 1.0);
        falling.velocity = Vec3::new(0.0, 0.0, -10.0);
        compute_sample_force(&mut falling, &m);
        assert!((falling.force.z - (-50.0 + 0.4)).abs() < 1e-4, "force was {}", falling.force);

        // Rebounding against gravity: strong drag
        let mut rising = Sample::at_rest(Vec3::ZERO, 1.0);
        rising.velocity = Vec3::new(0.0, 0.0, 10.0);
        compute_sample_force(&mut rising, &m);
        assert!((rising.force.z - (-50.0 - 10.0)).abs() < 1e-4, "force was {}", rising.force);
    }

    #[test]
    fn test_external_force_applied_once() {
        let m = model(Vec3::ZERO);
        let mut sample = Sample::at_rest(Vec3::ZERO, 1.0);
        sample.stage_external_force(Vec3::X * 100.0);

        compute_sample_force(&mut sample, &m);
        assert_eq!(sample.force, Vec3::X * 100.0);
        assert!(!sample.has_external_force);

        compute_sample_force(&mut sample, &m);
        assert_eq!(sample.force, Vec3::ZERO);
    }

    #[test]
    fn test_spring_force_zero_at_rest_length() {
        let mut a = Sample::at_rest(Vec3::ZERO, 1.0);
        let mut b = Sample::at_rest(Vec3::new(0.0, 0.0, -16.0), 1.0);
        compute_spring_force(&mut a, &mut b, &spring(16.0));
        assert!(a.force.length() < 1e-4);
        assert!(b.force.length() < 1e-4);
    }

    #[test]
    fn test_spring_force_equal_and_opposite() {
        let mut a = Sample::at_rest(Vec3::ZERO, 1.0);
        let mut b = Sample::at_rest(Vec3::new(0.0, 0.0, -20.0), 1.0);
        b.velocity = Vec3::new(1.0, 0.0, -3.0);
        compute_spring_force(&mut a, &mut b, &spring(16.0));

        assert!((a.force + b.force).length() < 1e-3);
        // Stretched by 4: pulls a down toward b
        assert!(a.force.z < 0.0);
        assert!((a.force.z - (-4.0 * 2500.0 - 0.1 * 3.0 * 20.0 / 20.0)).abs() < 1e-2);
    }

    #[test]
    fn test_spring_force_coincident_samples_is_zero() {
        let mut a = Sample::at_rest(Vec3::ONE, 1.0);
        let mut b = Sample::at_rest(Vec3::ONE, 1.0);
        compute_spring_force(&mut a, &mut b, &spring(16.0));
        assert_eq!(a.force, Vec3::ZERO);
        assert_eq!(b.force, Vec3::ZERO);
    }

    #[test]
    fn test_zero_step_leaves_state_unchanged() {
        let samples = vec![
            Sample::at_rest(Vec3::ZERO, 0.0),
            Sample::at_rest(Vec3::new(0.0, 0.0, -30.0), 1.0),
        ];
        let mut integrator = Integrator::new(samples.clone());
        integrator.step(0.0, &[spring(16.0)], &model(Vec3::new(0.0, 0.0, -50.0)));
        assert_eq!(integrator.samples()[1].position, samples[1].position);
        assert_eq!(integrator.samples()[1].velocity, Vec3::ZERO);
    }

    #[test]
    fn test_anchor_stays_pinned() {
        let anchor = Vec3::new(3.0, -2.0, 100.0);
        let mut samples = vec![Sample::at_rest(anchor, 0.0)];
        for i in 1..6 {
            let mut s = Sample::at_rest(anchor + Vec3::new(5.0 * i as f32, 0.0, 0.0), 1.0);
            s.velocity = Vec3::new(0.0, 20.0, 0.0);
            samples.push(s);
        }
        let springs = Spring::chain(&[16.0; 5], 2500.0, 0.1);
        let m = model(Vec3::new(0.0, 0.0, -50.0));
        let mut integrator = Integrator::new(samples);

        for _ in 0..2000 {
            integrator.step(0.025, &springs, &m);
            assert_eq!(integrator.samples()[0].position, anchor);
            assert_eq!(integrator.samples()[0].velocity, Vec3::ZERO);
        }
    }

    #[test]
    fn test_single_spring_converges_to_rest_length() {
        let samples = vec![
            Sample::at_rest(Vec3::ZERO, 0.0),
            Sample::at_rest(Vec3::new(0.0, 0.0, -30.0), 1.0),
        ];
        let springs = [spring(16.0)];
        let m = model(Vec3::ZERO);
        let mut integrator = Integrator::new(samples);

        for _ in 0..20000 {
            integrator.step(0.025, &springs, &m);
        }

        let distance = integrator.samples()[1].position.length();
        assert!(
            (distance - 16.0).abs() < 1e-2,
            "spring should settle at rest length, distance was {}",
            distance
        );
    }

    #[test]
    fn test_run_first_tick_uses_zero_step() {
        let samples = vec![
            Sample::at_rest(Vec3::ZERO, 0.0),
            Sample::at_rest(Vec3::new(0.0, 0.0, -30.0), 1.0),
        ];
        let tuning = RopeTuning::default();
        let m = model(Vec3::new(0.0, 0.0, -50.0));
        let mut integrator = Integrator::new(samples);

        let steps = integrator.run(5.0, &[spring(16.0)], &m, &tuning);
        assert_eq!(steps, 1);
        assert_eq!(integrator.samples()[1].position, Vec3::new(0.0, 0.0, -30.0));
        assert_eq!(integrator.last_time(), 5.0);
        assert!(!integrator.is_initial_tick());
    }

    #[test]
    fn test_run_catches_up_with_fixed_sub_steps() {
        let samples = vec![
            Sample::at_rest(Vec3::ZERO, 0.0),
            Sample::at_rest(Vec3::new(0.0, 0.0, -16.0), 1.0),
        ];
        let tuning = RopeTuning::default();
        let m = model(Vec3::new(0.0, 0.0, -50.0));
        let springs = [spring(16.0)];
        let mut integrator = Integrator::new(samples);
        integrator.run(1.0, &springs, &m, &tuning);

        // 0.1s at 7ms per step: 15 steps (the 15th crosses the target)
        let steps = integrator.run(1.1, &springs, &m, &tuning);
        assert_eq!(steps, 15);
        assert_eq!(integrator.last_time(), 1.1);

        // No time passed: still one step
        assert_eq!(integrator.run(1.1, &springs, &m, &tuning), 1);
    }

    #[test]
    fn test_run_backlog_is_capped() {
        let samples = vec![Sample::at_rest(Vec3::ZERO, 0.0), Sample::at_rest(-Vec3::Z, 1.0)];
        let tuning = RopeTuning {
            max_sub_steps: 10,
            ..Default::default()
        };
        let m = model(Vec3::new(0.0, 0.0, -50.0));
        let mut integrator = Integrator::new(samples);
        integrator.run(0.0, &[spring(1.0)], &m, &tuning);

        assert_eq!(integrator.run(1000.0, &[spring(1.0)], &m, &tuning), 10);
        assert_eq!(integrator.last_time(), 1000.0);
    }
}
