//! Imgui debug panel for ropes.

use bevy::prelude::*;
use bevy_mod_imgui::prelude::*;
use rope_physics::{RopeController, RopeSimSettings};

use crate::{RopeCommand, RopeRider, RopeSavePath};

/// Climb step per button click, in seconds of climbing.
const CLIMB_CLICK: f32 = 0.1;

pub struct RopeDebugPanelPlugin;

impl Plugin for RopeDebugPanelPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(bevy_mod_imgui::ImguiPlugin::default())
            .add_systems(Update, rope_panel.before(crate::apply_rope_commands));
    }
}

fn rope_panel(
    mut context: NonSendMut<ImguiContext>,
    rider: Res<RopeRider>,
    save_path: Res<RopeSavePath>,
    mut settings: ResMut<RopeSimSettings>,
    ropes: Query<(Entity, &RopeController)>,
    mut commands: MessageWriter<RopeCommand>,
) {
    let ui = context.ui();

    ui.window("Rope")
        .size([340.0, 360.0], Condition::FirstUseEver)
        .build(|| {
            for (entity, controller) in ropes.iter() {
                let rope = controller.rope();
                ui.text(format!("Rope {:?}", entity));
                ui.text(format!(
                    "  {} segments, {} samples",
                    rope.segment_count(),
                    rope.sample_count()
                ));
                ui.text(format!("  {:?} / {:?}", rope.phase(), rope.toggle()));
                match rope.attached_segment() {
                    Some(segment) => ui.text(format!(
                        "  Rider on segment {} at {:.1}",
                        segment,
                        rope.attachment().offset
                    )),
                    None => ui.text("  No rider"),
                }
                if let Some(wire) = controller.wire() {
                    ui.text(format!(
                        "  Wire {}",
                        if wire.is_active() { "powered" } else { "unpowered" }
                    ));
                }
            }
            ui.separator();

            ui.text(format!(
                "Rider at ({:.0}, {:.0}, {:.0})",
                rider.position.x, rider.position.y, rider.position.z
            ));
            ui.text(format!("Shock damage: {:.0}", rider.shock_damage));

            let grab_label = if rider.rope.is_some() { "Release" } else { "Grab" };
            if ui.button(grab_label) {
                commands.write(if rider.rope.is_some() {
                    RopeCommand::Release
                } else {
                    RopeCommand::Grab
                });
            }
            ui.same_line();
            if ui.button("Up") {
                commands.write(RopeCommand::Climb {
                    up: true,
                    dt: CLIMB_CLICK,
                });
            }
            ui.same_line();
            if ui.button("Down") {
                commands.write(RopeCommand::Climb {
                    up: false,
                    dt: CLIMB_CLICK,
                });
            }

            if ui.button("Push +X") {
                commands.write(RopeCommand::Push(Vec3::X));
            }
            ui.same_line();
            if ui.button("Push -X") {
                commands.write(RopeCommand::Push(Vec3::NEG_X));
            }
            ui.same_line();
            if ui.button("Toggle Power") {
                commands.write(RopeCommand::TogglePower);
            }
            ui.separator();

            let mut paused = settings.paused;
            if ui.checkbox("Paused", &mut paused) {
                settings.paused = paused;
            }
            ui.text(format!("File: {}", save_path.display()));
            if ui.button("Save") {
                commands.write(RopeCommand::Save);
            }
            ui.same_line();
            if ui.button("Load") {
                commands.write(RopeCommand::Load);
            }
        });
}
