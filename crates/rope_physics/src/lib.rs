//! Bevy integration for rope_core ropes.
//!
//! Spawn an entity with a [`RopeController`] and the plugin takes care of the
//! rest: it thinks every rope on the fixed clock against the
//! [`CollisionWorld`], and keeps `2 * segment_count` proxy entities per rope
//! placed, oriented and shown or hidden to match.

use bevy::prelude::*;

pub mod collision;
pub mod systems;

pub use collision::CollisionWorld;
pub use systems::{
    despawn_orphan_proxies, render_from_rope, rope_think_system, spawn_segment_proxies,
    sync_segment_proxies, RopeController, RopeModels, RopeProxies, RopeSegmentVisuals,
    RopeSimSettings, RopeSoundMessage, SegmentProxy, WireEffectMessage,
};

use systems::{apply_sim_settings, refresh_collision_world, sim_running};

pub struct RopePhysicsPlugin;

impl Plugin for RopePhysicsPlugin {
    fn build(&self, app: &mut App) {
        let settings = app
            .world()
            .get_resource::<RopeSimSettings>()
            .copied()
            .unwrap_or_default();

        app.insert_resource(settings)
            .insert_resource(Time::<Fixed>::from_hz(settings.tick_hz))
            .init_resource::<CollisionWorld>()
            .init_resource::<RopeModels>()
            .add_message::<RopeSoundMessage>()
            .add_message::<WireEffectMessage>()
            .add_systems(PreUpdate, (despawn_orphan_proxies, spawn_segment_proxies).chain())
            .add_systems(
                FixedUpdate,
                (apply_sim_settings, refresh_collision_world, rope_think_system)
                    .chain()
                    .run_if(sim_running),
            )
            .add_systems(
                PostUpdate,
                sync_segment_proxies.before(bevy::transform::TransformSystems::Propagate),
            );
    }
}
