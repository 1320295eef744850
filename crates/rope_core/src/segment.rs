//! Visual segment proxies.
//!
//! Every joint of the rope is drawn by one of two interchangeable segment
//! proxies. Each tick the rope places one set at the freshly simulated
//! positions and shows it while the other set, still sitting where it was
//! drawn last tick, is hidden. Swapping whole sets avoids the popping you get
//! from moving a visible entity and its collision at the same time.

use bevy::math::{Quat, Vec3};
use serde::{Deserialize, Serialize};

/// One of the two physical segment arrays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentSet {
    Visible,
    Hidden,
}

impl SegmentSet {
    pub fn index(self) -> usize {
        match self {
            SegmentSet::Visible => 0,
            SegmentSet::Hidden => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            SegmentSet::Visible => SegmentSet::Hidden,
            SegmentSet::Hidden => SegmentSet::Visible,
        }
    }
}

/// Which segment array is primary this tick. Flips once per think.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Toggle {
    /// The visible array is traced and shown
    #[default]
    AVisible,
    /// The hidden array is traced and shown
    BVisible,
}

impl Toggle {
    pub fn flipped(self) -> Self {
        match self {
            Toggle::AVisible => Toggle::BVisible,
            Toggle::BVisible => Toggle::AVisible,
        }
    }

    /// `(primary, other)` arrays for this tick.
    pub fn sets(self) -> (SegmentSet, SegmentSet) {
        match self {
            Toggle::AVisible => (SegmentSet::Visible, SegmentSet::Hidden),
            Toggle::BVisible => (SegmentSet::Hidden, SegmentSet::Visible),
        }
    }
}

/// Render/collision state written onto a proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProxyState {
    /// Solid (touchable) and drawn
    Shown,
    /// Non-solid and not drawn
    #[default]
    Concealed,
}

impl ProxyState {
    pub fn is_solid(self) -> bool {
        self == ProxyState::Shown
    }

    pub fn is_drawn(self) -> bool {
        self == ProxyState::Shown
    }
}

/// Addresses one proxy of a rope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SegmentId {
    pub set: SegmentSet,
    pub index: usize,
}

impl SegmentId {
    pub fn new(set: SegmentSet, index: usize) -> Self {
        Self { set, index }
    }
}

/// A renderable, touchable proxy anchored to one sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Sample this proxy follows; equal to the segment's slot
    pub sample_index: usize,
    pub model: String,
    /// Body-to-attachment distance of the model
    pub length: f32,
    pub causes_damage: bool,
    pub can_be_grabbed: bool,
    pub origin: Vec3,
    /// Euler angles in degrees: pitch, yaw, roll
    pub angles: Vec3,
    pub state: ProxyState,
}

impl Segment {
    pub fn new(sample_index: usize, model: impl Into<String>, length: f32, origin: Vec3) -> Self {
        Self {
            sample_index,
            model: model.into(),
            length,
            causes_damage: false,
            can_be_grabbed: true,
            origin,
            angles: Vec3::ZERO,
            state: ProxyState::Concealed,
        }
    }

    /// Rope-space orientation from `angles`. The model's local +Y axis
    /// points from this segment's origin toward the next joint.
    pub fn rotation(&self) -> Quat {
        let [pitch, yaw, roll] = self.angles.to_array().map(f32::to_radians);
        Quat::from_rotation_z(yaw) * Quat::from_rotation_y(pitch) * Quat::from_rotation_x(-roll)
    }
}

/// Round each component to one decimal place.
///
/// Placing proxies at full float precision makes them shimmer as the
/// simulation drifts by fractions of a unit.
pub fn truncate_epsilon(v: Vec3) -> Vec3 {
    (v * 10.0).round() / 10.0
}

/// Angles that align a segment hanging from `top` so its end meets `bottom`.
pub fn alignment_angles(top: Vec3, bottom: Vec3) -> Vec3 {
    let mut delta = bottom - top;
    let dir = delta.normalize_or_zero();
    let roll = dir.dot(Vec3::Y).clamp(-1.0, 1.0).acos().to_degrees();

    delta.y = 0.0;
    let flat = delta.normalize_or_zero();
    let pitch = flat.dot(Vec3::Z).clamp(-1.0, 1.0).acos().to_degrees();

    Vec3::new(if flat.x >= 0.0 { pitch } else { -pitch }, 0.0, -roll)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_round_trip() {
        let t = Toggle::default();
        assert_eq!(t.flipped().flipped(), t);
        assert_eq!(t.sets(), (SegmentSet::Visible, SegmentSet::Hidden));
        assert_eq!(t.flipped().sets(), (SegmentSet::Hidden, SegmentSet::Visible));
    }

    #[test]
    fn test_truncate_epsilon_one_decimal() {
        let v = truncate_epsilon(Vec3::new(1.234, -5.678, 0.04));
        assert!((v.x - 1.2).abs() < 1e-6);
        assert!((v.y + 5.7).abs() < 1e-6);
        assert_eq!(v.z, 0.0);
    }

    #[test]
    fn test_alignment_angles_hanging_down() {
        let angles = alignment_angles(Vec3::ZERO, Vec3::new(0.0, 0.0, -16.0));
        assert!((angles.x - 180.0).abs() < 1e-3, "pitch was {}", angles.x);
        assert_eq!(angles.y, 0.0);
        assert!((angles.z + 90.0).abs() < 1e-3, "roll was {}", angles.z);
    }

    #[test]
    fn test_alignment_angles_pitch_sign_follows_x() {
        let left = alignment_angles(Vec3::ZERO, Vec3::new(-4.0, 0.0, -16.0));
        let right = alignment_angles(Vec3::ZERO, Vec3::new(4.0, 0.0, -16.0));
        assert!(left.x < 0.0);
        assert!(right.x > 0.0);
        assert!((left.x + right.x).abs() < 1e-3);
    }

    #[test]
    fn test_alignment_angles_degenerate_is_finite() {
        let angles = alignment_angles(Vec3::ONE, Vec3::ONE);
        assert!(angles.is_finite());
    }

    #[test]
    fn test_rotation_points_local_y_at_next_joint() {
        let top = Vec3::new(2.0, -1.0, 40.0);
        for bottom in [
            Vec3::new(0.0, 0.0, 24.0),
            Vec3::new(6.0, 0.0, 26.0),
            Vec3::new(-5.0, 3.0, 27.0),
            Vec3::new(1.0, -9.0, 30.0),
        ] {
            let mut segment = Segment::new(0, "models/rope16.mdl", 16.0, top);
            segment.angles = alignment_angles(top, bottom);
            let along = segment.rotation() * Vec3::Y;
            let expected = (bottom - top).normalize();
            assert!(
                (along - expected).length() < 1e-4,
                "{:?} pointed {:?}, expected {:?}",
                segment.angles,
                along,
                expected
            );
        }
    }
}
