//! Rider controls for ropes.
//!
//! Keyboard input and the debug panel both produce [`RopeCommand`] messages,
//! which [`apply_rope_commands`] carries out against the rope entities.
//!
//! | Key | Action |
//! |-----|--------|
//! | E | Grab the nearest rope / let go |
//! | W / S | Climb up / slide down |
//! | Arrows | Swing the ridden rope |
//! | T | Toggle power on electrified wires |

use std::path::PathBuf;

use bevy::prelude::*;
use rope_core::{load_rope, save_rope, Rope, RopeIoResult, SegmentId, SegmentSet};
use rope_physics::{render_from_rope, RopeController, RopeModels};

pub mod panel;

pub use panel::RopeDebugPanelPlugin;

pub struct RopeControlsPlugin;

impl Plugin for RopeControlsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<RopeRider>()
            .init_resource::<RopeSavePath>()
            .add_message::<RopeCommand>()
            .add_systems(
                Update,
                (rope_keyboard_input, apply_rope_commands, follow_rope).chain(),
            );
    }
}

/// The player as far as ropes are concerned.
#[derive(Resource, Debug, Clone)]
pub struct RopeRider {
    /// Rope entity being ridden
    pub rope: Option<Entity>,
    /// Rope-space position
    pub position: Vec3,
    /// How close a shown segment must be to grab it
    pub grab_distance: f32,
    /// Shock damage taken from live wires
    pub shock_damage: f32,
}

impl Default for RopeRider {
    fn default() -> Self {
        Self {
            rope: None,
            position: Vec3::ZERO,
            grab_distance: 48.0,
            shock_damage: 0.0,
        }
    }
}

/// Marks the entity drawn at the rider's position.
#[derive(Component)]
pub struct RopeRiderMarker;

/// Where Save/Load read and write.
#[derive(Resource, Debug, Clone, Deref, DerefMut)]
pub struct RopeSavePath(pub PathBuf);

impl Default for RopeSavePath {
    fn default() -> Self {
        Self(PathBuf::from("saves/rope.ropesave"))
    }
}

#[derive(Message, Debug, Clone, Copy, PartialEq)]
pub enum RopeCommand {
    Grab,
    Release,
    Climb { up: bool, dt: f32 },
    /// Rope-space push direction
    Push(Vec3),
    TogglePower,
    Save,
    Load,
}

fn rope_keyboard_input(
    time: Res<Time>,
    keyboard: Res<ButtonInput<KeyCode>>,
    rider: Res<RopeRider>,
    mut commands: MessageWriter<RopeCommand>,
) {
    let dt = time.delta_secs();

    if keyboard.just_pressed(KeyCode::KeyE) {
        commands.write(if rider.rope.is_some() {
            RopeCommand::Release
        } else {
            RopeCommand::Grab
        });
    }
    if keyboard.just_pressed(KeyCode::KeyT) {
        commands.write(RopeCommand::TogglePower);
    }

    if rider.rope.is_none() {
        return;
    }

    if keyboard.pressed(KeyCode::KeyW) {
        commands.write(RopeCommand::Climb { up: true, dt });
    }
    if keyboard.pressed(KeyCode::KeyS) {
        commands.write(RopeCommand::Climb { up: false, dt });
    }

    let mut push = Vec3::ZERO;
    if keyboard.pressed(KeyCode::ArrowUp) {
        push.x += 1.0;
    }
    if keyboard.pressed(KeyCode::ArrowDown) {
        push.x -= 1.0;
    }
    if keyboard.pressed(KeyCode::ArrowLeft) {
        push.y += 1.0;
    }
    if keyboard.pressed(KeyCode::ArrowRight) {
        push.y -= 1.0;
    }
    if push != Vec3::ZERO {
        commands.write(RopeCommand::Push(push.normalize()));
    }
}

/// Carry out rope commands for this frame.
pub fn apply_rope_commands(
    time: Res<Time>,
    mut commands: MessageReader<RopeCommand>,
    mut rider: ResMut<RopeRider>,
    mut ropes: Query<(Entity, &mut RopeController)>,
    models: Res<RopeModels>,
    save_path: Res<RopeSavePath>,
) {
    let now = time.elapsed_secs();
    for command in commands.read() {
        match *command {
            RopeCommand::Grab => grab_nearest(&mut rider, &mut ropes, now),
            RopeCommand::Release => {
                if let Some(entity) = rider.rope.take() {
                    if let Ok((_, mut controller)) = ropes.get_mut(entity) {
                        controller.rope_mut().detach_object(now);
                    }
                }
            }
            RopeCommand::Climb { up, dt } => {
                let Some(entity) = rider.rope else {
                    continue;
                };
                let Ok((_, mut controller)) = ropes.get_mut(entity) else {
                    continue;
                };
                let rope = controller.rope_mut();
                if up {
                    rope.move_up(dt);
                } else if !rope.move_down(dt) {
                    rope.detach_object(now);
                    rider.rope = None;
                    info!("Rider slid off the end of rope {:?}", entity);
                }
            }
            RopeCommand::Push(direction) => {
                if let Some(Ok((_, mut controller))) = rider.rope.map(|e| ropes.get_mut(e)) {
                    controller.rope_mut().apply_force_from_player(direction);
                }
            }
            RopeCommand::TogglePower => {
                for (_, mut controller) in ropes.iter_mut() {
                    if let Some(wire) = controller.wire_mut() {
                        wire.toggle_active();
                    }
                }
            }
            RopeCommand::Save => {
                let Some(entity) = target_rope(&rider, &ropes) else {
                    warn!("No rope to save");
                    continue;
                };
                let Ok((_, controller)) = ropes.get(entity) else {
                    continue;
                };
                match save_snapshot(controller.rope(), &save_path) {
                    Ok(()) => info!("Saved rope {:?} to {}", entity, save_path.display()),
                    Err(e) => error!("Failed to save rope: {}", e),
                }
            }
            RopeCommand::Load => {
                let Some(entity) = target_rope(&rider, &ropes) else {
                    warn!("No rope to load into");
                    continue;
                };
                let rope = match load_snapshot(&save_path, &models) {
                    Ok(rope) => rope,
                    Err(e) => {
                        error!("Failed to load rope: {}", e);
                        continue;
                    }
                };
                if let Ok((_, mut controller)) = ropes.get_mut(entity) {
                    let attached = rope.is_object_attached();
                    controller.replace_rope(rope);
                    if attached {
                        rider.rope = Some(entity);
                    } else if rider.rope == Some(entity) {
                        rider.rope = None;
                    }
                    info!("Loaded rope {:?} from {}", entity, save_path.display());
                }
            }
        }
    }
}

/// Touch the closest shown segment in reach, grabbing it if the rope allows.
fn grab_nearest(rider: &mut RopeRider, ropes: &mut Query<(Entity, &mut RopeController)>, now: f32) {
    if rider.rope.is_some() {
        return;
    }

    let mut nearest: Option<(Entity, SegmentId, f32)> = None;
    for (entity, controller) in ropes.iter() {
        let rope = controller.rope();
        for set in [SegmentSet::Visible, SegmentSet::Hidden] {
            for segment in rope.segments(set) {
                if !segment.state.is_solid() {
                    continue;
                }
                let distance = segment.origin.distance(rider.position);
                if distance <= rider.grab_distance && nearest.is_none_or(|(_, _, d)| distance < d) {
                    nearest = Some((entity, SegmentId::new(set, segment.sample_index), distance));
                }
            }
        }
    }

    let Some((entity, id, _)) = nearest else {
        debug!("No rope segment within {} of the rider", rider.grab_distance);
        return;
    };
    let Ok((_, mut controller)) = ropes.get_mut(entity) else {
        return;
    };
    match controller.rope_mut().touch_segment(id, true, now) {
        Ok(outcome) => {
            if let Some(damage) = outcome.damage {
                rider.shock_damage += damage;
                warn!("Rider shocked by rope {:?} for {}", entity, damage);
            }
            if outcome.grabbed {
                rider.rope = Some(entity);
            }
        }
        Err(e) => error!("Grab failed: {}", e),
    }
}

/// The ridden rope, else the oldest rope.
fn target_rope(rider: &RopeRider, ropes: &Query<(Entity, &mut RopeController)>) -> Option<Entity> {
    rider.rope.or_else(|| ropes.iter().map(|(e, _)| e).min())
}

fn save_snapshot(rope: &Rope, path: &RopeSavePath) -> RopeIoResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    save_rope(&rope.snapshot(), path.as_path())
}

fn load_snapshot(path: &RopeSavePath, models: &RopeModels) -> RopeIoResult<Rope> {
    Ok(Rope::restore(load_rope(path.as_path())?, models)?)
}

/// Keep the rider on its rope, and drop it if the rope let go.
fn follow_rope(
    mut rider: ResMut<RopeRider>,
    ropes: Query<&RopeController>,
    mut markers: Query<&mut Transform, With<RopeRiderMarker>>,
) {
    if let Some(entity) = rider.rope {
        let position = ropes
            .get(entity)
            .ok()
            .and_then(|c| c.rope().attached_object_position());
        match position {
            Some(position) => rider.position = position,
            None => rider.rope = None,
        }
    }

    for mut transform in markers.iter_mut() {
        transform.translation = render_from_rope() * rider.position;
    }
}
