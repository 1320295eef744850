//! Mass-spring rope simulation.
//!
//! This crate provides:
//! - RK4 integration of a chain of point masses joined by damped springs
//! - Double-buffered visible/hidden segment proxies placed by world traces
//! - Riders that climb, slide and push along the rope
//! - An electrified wire variant with sparks and lightning
//! - Rope save/restore
//!
//! Nothing here depends on an ECS. Hosts drive a [`Rope`] by calling
//! [`Rope::think`] once per tick with a [`WorldTrace`] for collision.

pub mod attachment;
pub mod config;
pub mod electrified;
pub mod error;
pub mod integrator;
pub mod persistence;
pub mod rope;
pub mod sample;
pub mod segment;
pub mod trace;

pub use attachment::{Attachment, TouchOutcome, SHOCK_DAMAGE};
pub use config::{
    load_rope_config, RopeConfig, RopeTuning, Ruleset, SegmentModels, DEFAULT_BODY_MODEL,
    MAX_SAMPLES, MAX_SEGMENTS,
};
pub use electrified::{ElectrifiedWire, ElectrifiedWireConfig, WireEffect, WireThinkReport};
pub use error::{RopeError, RopeIoError, RopeIoResult, RopeResult};
pub use integrator::{ForceModel, Integrator};
pub use persistence::{
    load_rope, load_rope_binary, load_rope_json, save_rope, save_rope_binary, save_rope_json,
    RopeSnapshot,
};
pub use rope::{Rope, RopePhase, RopeSound, ThinkReport, CREAK_SOUNDS};
pub use sample::{Sample, Spring};
pub use segment::{ProxyState, Segment, SegmentId, SegmentSet, Toggle};
pub use trace::{OpenWorld, PlaneWorld, TraceResult, WorldTrace};
