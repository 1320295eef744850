use bevy::prelude::*;
use rope_controls::{RopeControlsPlugin, RopeDebugPanelPlugin, RopeRider, RopeRiderMarker};
use rope_core::{load_rope_config, ElectrifiedWire, ElectrifiedWireConfig, Rope, RopeConfig};
use rope_physics::{
    render_from_rope, CollisionWorld, RopeController, RopeModels, RopePhysicsPlugin,
    RopeSegmentVisuals,
};

/// Rope-space floor: a slab whose top face is at z=0.
const FLOOR_CENTER: Vec3 = Vec3::new(0.0, 0.0, -10.0);
const FLOOR_HALF_EXTENTS: Vec3 = Vec3::new(300.0, 300.0, 10.0);

fn main() {
    // Optional rope config JSON as the first argument
    let config = match std::env::args().nth(1) {
        Some(path) => match load_rope_config(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load rope config {}: {}", path, e);
                RopeConfig::default()
            }
        },
        None => RopeConfig::with_segments(12),
    };

    App::new()
        .add_plugins(DefaultPlugins)
        .add_plugins(RopePhysicsPlugin)
        .add_plugins(RopeControlsPlugin)
        .add_plugins(RopeDebugPanelPlugin)
        .insert_resource(ClearColor(Color::srgb(0.05, 0.05, 0.08)))
        .insert_resource(DemoRopeConfig(config))
        .add_systems(Startup, setup)
        .run();
}

#[derive(Resource)]
struct DemoRopeConfig(RopeConfig);

fn setup(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut collision: ResMut<CollisionWorld>,
    mut rider: ResMut<RopeRider>,
    models: Res<RopeModels>,
    config: Res<DemoRopeConfig>,
) {
    let to_render = render_from_rope();

    collision.add_fixed_cuboid(FLOOR_CENTER, FLOOR_HALF_EXTENTS);
    commands.spawn((
        Mesh3d(meshes.add(Cuboid::new(
            FLOOR_HALF_EXTENTS.x * 2.0,
            FLOOR_HALF_EXTENTS.z * 2.0,
            FLOOR_HALF_EXTENTS.y * 2.0,
        ))),
        MeshMaterial3d(materials.add(Color::srgb(0.3, 0.5, 0.3))),
        Transform::from_translation(to_render * FLOOR_CENTER),
    ));

    commands.insert_resource(RopeSegmentVisuals {
        mesh: meshes.add(Cylinder::new(1.0, 1.0)),
        material: materials.add(Color::srgb(0.6, 0.45, 0.25)),
    });

    match Rope::setup(Vec3::new(0.0, 0.0, 200.0), &config.0, &models) {
        Ok(rope) => {
            commands.spawn(RopeController::Plain(rope));
        }
        Err(e) => error!("Failed to spawn rope: {}", e),
    }

    let wire_config = RopeConfig {
        segments: 8,
        ..config.0.clone()
    };
    match Rope::setup(Vec3::new(80.0, 0.0, 160.0), &wire_config, &models) {
        Ok(rope) => {
            let wire = ElectrifiedWire::new(rope, ElectrifiedWireConfig::default());
            commands.spawn(RopeController::Electrified(wire));
        }
        Err(e) => error!("Failed to spawn electrified wire: {}", e),
    }

    rider.position = Vec3::new(0.0, 20.0, 150.0);
    commands.spawn((
        RopeRiderMarker,
        Mesh3d(meshes.add(Sphere::new(4.0))),
        MeshMaterial3d(materials.add(Color::srgb(0.8, 0.2, 0.2))),
        Transform::from_translation(to_render * rider.position),
    ));

    commands.spawn((
        Camera3d::default(),
        Transform::from_xyz(0.0, 140.0, 380.0).looking_at(Vec3::new(40.0, 100.0, 0.0), Vec3::Y),
    ));
    commands.spawn((
        DirectionalLight {
            illuminance: 10000.0,
            shadows_enabled: true,
            ..default()
        },
        Transform::from_rotation(Quat::from_euler(EulerRot::XYZ, -0.5, 0.5, 0.0)),
    ));
}
