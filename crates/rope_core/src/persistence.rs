//! Rope save/restore.
//!
//! Supports two formats:
//! - `.ropesave` (or any other extension) - Binary format
//! - `.json` - JSON format
//!
//! Only durable state is saved. RK4 scratch buffers and springs are rebuilt
//! after a restore, and the first think after it runs with a zero step.
//!
//! # Example
//!
//! ```ignore
//! use rope_core::{load_rope, save_rope, Rope, SegmentModels};
//!
//! save_rope(&rope.snapshot(), "saves/rope.ropesave")?;
//! let rope = Rope::restore(load_rope("saves/rope.ropesave")?, &SegmentModels::default())?;
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use bevy::log::info;
use bevy::math::Vec3;
use serde::{Deserialize, Serialize};

use crate::attachment::Attachment;
use crate::config::{RopeConfig, SegmentModels, MAX_SEGMENTS};
use crate::error::{RopeError, RopeIoError, RopeIoResult, RopeResult};
use crate::integrator::Integrator;
use crate::rope::{rope_rng, Rope, RopePhase};
use crate::sample::Sample;
use crate::segment::{Segment, Toggle};

/// Magic bytes for binary rope files
const MAGIC: &[u8; 8] = b"ROPESAVE";

/// Current file format version
const VERSION: u32 = 1;

/// Durable state of one rope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RopeSnapshot {
    pub config: RopeConfig,
    pub segment_count: usize,
    pub gravity: Vec3,
    pub hook_constant: f32,
    pub damping_factor: f32,
    pub sample_count: usize,
    pub toggle: Toggle,
    pub last_update: f32,
    pub last_end_position: Vec3,
    pub attachment: Attachment,
    pub samples: Vec<Sample>,
    pub visible: Vec<Segment>,
    pub hidden: Vec<Segment>,
}

impl RopeSnapshot {
    fn validate(&self, models: &SegmentModels) -> RopeResult<()> {
        let invalid = |msg: String| Err(RopeError::InvalidSnapshot(msg));

        if self.segment_count == 0 || self.segment_count >= MAX_SEGMENTS {
            return invalid(format!("segment count {} out of range", self.segment_count));
        }
        if self.sample_count != self.segment_count + 1 || self.samples.len() != self.sample_count {
            return invalid(format!(
                "{} samples for {} segments",
                self.samples.len(),
                self.segment_count
            ));
        }
        if self.visible.len() != self.segment_count || self.hidden.len() != self.segment_count {
            return invalid(format!(
                "segment arrays of {} and {} for {} segments",
                self.visible.len(),
                self.hidden.len(),
                self.segment_count
            ));
        }
        if !self.gravity.is_finite() || self.gravity.length_squared() == 0.0 {
            return Err(RopeError::InvalidGravity);
        }
        if self.attachment.attached && self.attachment.segment >= self.segment_count {
            return invalid(format!(
                "rider on segment {} of {}",
                self.attachment.segment, self.segment_count
            ));
        }
        for (i, (visible, hidden)) in self.visible.iter().zip(&self.hidden).enumerate() {
            if visible.sample_index != i || hidden.sample_index != i {
                return invalid(format!(
                    "slot {} holds samples {} and {}",
                    i, visible.sample_index, hidden.sample_index
                ));
            }
        }
        for segment in self.visible.iter().chain(&self.hidden) {
            models.length_of(&segment.model)?;
        }
        Ok(())
    }
}

impl Rope {
    /// Capture the rope's durable state.
    pub fn snapshot(&self) -> RopeSnapshot {
        let [visible, hidden] = &self.segments;
        RopeSnapshot {
            config: self.config.clone(),
            segment_count: self.segment_count,
            gravity: self.gravity,
            hook_constant: self.hook_constant,
            damping_factor: self.damping_factor,
            sample_count: self.sample_count(),
            toggle: self.toggle,
            last_update: self.last_update(),
            last_end_position: self.last_end_position,
            attachment: self.attachment,
            samples: self.samples().to_vec(),
            visible: visible.clone(),
            hidden: hidden.clone(),
        }
    }

    /// Rebuild a rope from a snapshot.
    ///
    /// Springs are rebuilt on the next think, which also runs with a zero
    /// step so restored samples don't jump.
    pub fn restore(snapshot: RopeSnapshot, models: &SegmentModels) -> RopeResult<Self> {
        snapshot.validate(models)?;
        info!(
            "Rope restored with {} segments at t={:.3}",
            snapshot.segment_count, snapshot.last_update
        );

        let rng = rope_rng(snapshot.config.seed);
        Ok(Self {
            gravity: snapshot.gravity,
            hook_constant: snapshot.hook_constant,
            damping_factor: snapshot.damping_factor,
            segment_count: snapshot.segment_count,
            springs: Vec::new(),
            phase: RopePhase::Uninitialized,
            integrator: Integrator::resume(snapshot.samples, snapshot.last_update),
            segments: [snapshot.visible, snapshot.hidden],
            toggle: snapshot.toggle,
            last_end_position: snapshot.last_end_position,
            attachment: snapshot.attachment,
            rng,
            config: snapshot.config,
        })
    }
}

/// Save a rope snapshot to a file.
///
/// Format is determined by file extension: `.json` is JSON, anything else
/// is binary.
pub fn save_rope<P: AsRef<Path>>(snapshot: &RopeSnapshot, path: P) -> RopeIoResult<()> {
    let path = path.as_ref();
    if is_json(path) {
        save_rope_json(snapshot, path)
    } else {
        save_rope_binary(snapshot, path)
    }
}

/// Load a rope snapshot from a file. See [`save_rope`] for formats.
pub fn load_rope<P: AsRef<Path>>(path: P) -> RopeIoResult<RopeSnapshot> {
    let path = path.as_ref();
    if is_json(path) {
        load_rope_json(path)
    } else {
        load_rope_binary(path)
    }
}

fn is_json(path: &Path) -> bool {
    path.to_string_lossy().to_lowercase().ends_with(".json")
}

pub fn save_rope_binary<P: AsRef<Path>>(snapshot: &RopeSnapshot, path: P) -> RopeIoResult<()> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    writer.write_all(MAGIC)?;
    writer.write_all(&VERSION.to_le_bytes())?;

    let data = bincode::serialize(snapshot)?;
    writer.write_all(&(data.len() as u64).to_le_bytes())?;
    writer.write_all(&data)?;

    writer.flush()?;
    Ok(())
}

pub fn load_rope_binary<P: AsRef<Path>>(path: P) -> RopeIoResult<RopeSnapshot> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);

    let mut magic = [0u8; 8];
    reader.read_exact(&mut magic)?;
    if &magic != MAGIC {
        return Err(RopeIoError::InvalidFormat(
            "Invalid magic bytes - not a rope save".to_string(),
        ));
    }

    let mut version_bytes = [0u8; 4];
    reader.read_exact(&mut version_bytes)?;
    let version = u32::from_le_bytes(version_bytes);
    if version > VERSION {
        return Err(RopeIoError::UnsupportedVersion(version));
    }

    let mut size_bytes = [0u8; 8];
    reader.read_exact(&mut size_bytes)?;
    let size = u64::from_le_bytes(size_bytes);

    // The length prefix is untrusted; only read what the file actually holds
    let mut data = Vec::new();
    reader.take(size).read_to_end(&mut data)?;
    if data.len() as u64 != size {
        return Err(RopeIoError::InvalidFormat(format!(
            "Truncated rope save: expected {} bytes, found {}",
            size,
            data.len()
        )));
    }
    Ok(bincode::deserialize(&data)?)
}

pub fn save_rope_json<P: AsRef<Path>>(snapshot: &RopeSnapshot, path: P) -> RopeIoResult<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, snapshot)?;
    Ok(())
}

pub fn load_rope_json<P: AsRef<Path>>(path: P) -> RopeIoResult<RopeSnapshot> {
    let reader = BufReader::new(File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
