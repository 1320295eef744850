//! ECS glue: rope controllers as components, their segment proxies as
//! entities.

use std::f32::consts::FRAC_PI_2;

use bevy::prelude::*;
use rope_core::{
    ElectrifiedWire, ProxyState, Rope, RopeSound, SegmentId, SegmentModels, SegmentSet,
    ThinkReport, WireEffect,
};

use crate::collision::CollisionWorld;

/// Rotation from rope space (Z up) into render space (Y up).
pub fn render_from_rope() -> Quat {
    Quat::from_rotation_x(-FRAC_PI_2)
}

/// A simulated rope owned by an entity.
#[derive(Component, Debug, Clone)]
pub enum RopeController {
    Plain(Rope),
    Electrified(ElectrifiedWire),
}

impl RopeController {
    pub fn rope(&self) -> &Rope {
        match self {
            RopeController::Plain(rope) => rope,
            RopeController::Electrified(wire) => wire.rope(),
        }
    }

    pub fn rope_mut(&mut self) -> &mut Rope {
        match self {
            RopeController::Plain(rope) => rope,
            RopeController::Electrified(wire) => wire.rope_mut(),
        }
    }

    pub fn wire(&self) -> Option<&ElectrifiedWire> {
        match self {
            RopeController::Plain(_) => None,
            RopeController::Electrified(wire) => Some(wire),
        }
    }

    pub fn wire_mut(&mut self) -> Option<&mut ElectrifiedWire> {
        match self {
            RopeController::Plain(_) => None,
            RopeController::Electrified(wire) => Some(wire),
        }
    }

    /// Swap in a restored rope.
    pub fn replace_rope(&mut self, rope: Rope) {
        match self {
            RopeController::Plain(current) => *current = rope,
            RopeController::Electrified(wire) => wire.replace_rope(rope),
        }
    }

    pub fn think(&mut self, now: f32, world: &CollisionWorld) -> (ThinkReport, Vec<WireEffect>) {
        match self {
            RopeController::Plain(rope) => (rope.think(now, world), Vec::new()),
            RopeController::Electrified(wire) => {
                let report = wire.think(now, world);
                (report.rope, report.effects)
            }
        }
    }
}

/// One visual/collision proxy of a rope segment.
#[derive(Component, Debug, Clone, Copy)]
pub struct SegmentProxy {
    pub rope: Entity,
    pub id: SegmentId,
    pub state: ProxyState,
}

/// Proxy entities spawned for a rope, `2 * segment_count` of them.
#[derive(Component, Debug, Default)]
pub struct RopeProxies {
    pub segment_count: usize,
    pub entities: Vec<Entity>,
}

/// Mesh and material for segment proxies. Without it proxies are spawned
/// with transforms only.
#[derive(Resource, Clone)]
pub struct RopeSegmentVisuals {
    /// Unit-height mesh along Y, scaled to each segment's length
    pub mesh: Handle<Mesh>,
    pub material: Handle<StandardMaterial>,
}

/// Segment model lengths used for spawning and restoring ropes.
#[derive(Resource, Default, Deref, DerefMut)]
pub struct RopeModels(pub SegmentModels);

/// Simulation settings for the plugin.
#[derive(Resource, Debug, Clone, Copy)]
pub struct RopeSimSettings {
    /// Think rate in Hz
    pub tick_hz: f64,
    pub paused: bool,
}

impl Default for RopeSimSettings {
    fn default() -> Self {
        Self {
            tick_hz: 100.0,
            paused: false,
        }
    }
}

#[derive(Message, Debug, Clone, Copy)]
pub struct RopeSoundMessage {
    pub rope: Entity,
    pub sound: RopeSound,
}

#[derive(Message, Debug, Clone, Copy)]
pub struct WireEffectMessage {
    pub rope: Entity,
    pub effect: WireEffect,
}

pub(crate) fn apply_sim_settings(settings: Res<RopeSimSettings>, mut time: ResMut<Time<Fixed>>) {
    if settings.is_changed() {
        time.set_timestep_hz(settings.tick_hz);
    }
}

pub(crate) fn sim_running(settings: Res<RopeSimSettings>) -> bool {
    !settings.paused
}

pub(crate) fn refresh_collision_world(mut world: ResMut<CollisionWorld>) {
    if world.needs_refresh() {
        world.refresh();
        debug!("Rope collision world refreshed ({} colliders)", world.collider_count());
    }
}

/// Spawn proxies for new ropes, and respawn them when a rope's segment
/// count changes.
pub fn spawn_segment_proxies(
    mut commands: Commands,
    visuals: Option<Res<RopeSegmentVisuals>>,
    mut ropes: Query<(Entity, &RopeController, Option<&mut RopeProxies>)>,
) {
    for (rope_entity, controller, proxies) in ropes.iter_mut() {
        let rope = controller.rope();
        let count = rope.segment_count();
        let stale = match &proxies {
            Some(p) if p.segment_count == count => continue,
            Some(p) => p.entities.clone(),
            None => Vec::new(),
        };
        for entity in stale {
            commands.entity(entity).despawn();
        }

        let mut entities = Vec::with_capacity(count * 2);
        for set in [SegmentSet::Visible, SegmentSet::Hidden] {
            for segment in rope.segments(set) {
                let proxy = SegmentProxy {
                    rope: rope_entity,
                    id: SegmentId::new(set, segment.sample_index),
                    state: segment.state,
                };
                let mut entity = commands.spawn((
                    proxy,
                    Transform::from_translation(render_from_rope() * segment.origin)
                        .with_rotation(render_from_rope() * segment.rotation()),
                    Visibility::Hidden,
                ));
                if let Some(visuals) = &visuals {
                    entity.with_children(|parent| {
                        parent.spawn((
                            Mesh3d(visuals.mesh.clone()),
                            MeshMaterial3d(visuals.material.clone()),
                            Transform::from_xyz(0.0, segment.length * 0.5, 0.0)
                                .with_scale(Vec3::new(1.0, segment.length, 1.0)),
                        ));
                    });
                }
                entities.push(entity.id());
            }
        }

        debug!("Spawned {} segment proxies for rope {:?}", entities.len(), rope_entity);
        let component = RopeProxies {
            segment_count: count,
            entities,
        };
        match proxies {
            Some(mut p) => *p = component,
            None => {
                commands.entity(rope_entity).insert(component);
            }
        }
    }
}

/// Advance every rope to the fixed clock.
pub fn rope_think_system(
    time: Res<Time>,
    world: Res<CollisionWorld>,
    mut ropes: Query<(Entity, &mut RopeController)>,
    mut sounds: MessageWriter<RopeSoundMessage>,
    mut effects: MessageWriter<WireEffectMessage>,
) {
    let now = time.elapsed_secs();
    for (entity, mut controller) in ropes.iter_mut() {
        let (report, wire_effects) = controller.think(now, &world);
        if report.sub_steps > 1 {
            debug!("Rope {:?} ran {} sub-steps", entity, report.sub_steps);
        }
        if let Some(sound) = report.sound {
            sounds.write(RopeSoundMessage { rope: entity, sound });
        }
        for effect in wire_effects {
            effects.write(WireEffectMessage { rope: entity, effect });
        }
    }
}

/// Write segment positions, orientations and visibility onto proxies.
pub fn sync_segment_proxies(
    ropes: Query<&RopeController>,
    mut proxies: Query<(&mut SegmentProxy, &mut Transform, &mut Visibility)>,
) {
    let to_render = render_from_rope();
    for (mut proxy, mut transform, mut visibility) in proxies.iter_mut() {
        let Ok(controller) = ropes.get(proxy.rope) else {
            continue;
        };
        let rope = controller.rope();
        let segments = rope.segments(proxy.id.set);
        let Some(segment) = segments.get(proxy.id.index) else {
            continue;
        };
        transform.translation = to_render * segment.origin;
        transform.rotation = to_render * segment.rotation();
        proxy.state = segment.state;
        *visibility = if segment.state.is_drawn() {
            Visibility::Inherited
        } else {
            Visibility::Hidden
        };
    }
}

/// Remove proxies whose rope is gone.
pub fn despawn_orphan_proxies(
    mut commands: Commands,
    ropes: Query<(), With<RopeController>>,
    proxies: Query<(Entity, &SegmentProxy)>,
) {
    for (entity, proxy) in proxies.iter() {
        if ropes.get(proxy.rope).is_err() {
            commands.entity(entity).despawn();
        }
    }
}
