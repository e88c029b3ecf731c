use bevy::prelude::*;

use prop_instancer::props::{InstancingPlugin, InstancingSettings};

mod demo;
mod setup;

use demo::DemoPlugin;

fn main() {
    // Read before the app exists so the plugin's resources see it.
    let settings = InstancingSettings::load_or_default("assets/instancing.ron");

    App::new()
        // core engine plugins
        .add_plugins(DefaultPlugins)
        .insert_resource(settings)
        // instancer + demo content
        .add_plugins(InstancingPlugin)
        .add_plugins(DemoPlugin)
        // camera, lights, ground
        .add_systems(Startup, setup::setup)
        .run();
}
