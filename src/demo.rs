//! Demo content: procedural source meshes, a scatter of every template,
//! and hotkeys that drive the instancer.

use bevy::prelude::*;

use prop_instancer::props::instancing::{GeometryRef, StaticMesh};
use prop_instancer::props::library::AssetLibrary;
use prop_instancer::props::placement::{GridScatter, Region};
use prop_instancer::props::plugin::{
    registry_ready, DestroyInstances, PlaceMeshInstance, PlaceTemplateInstance, PropInstancer, ResetInstances,
    TemplateRegistryHandle,
};
use prop_instancer::props::registry::TemplateRegistry;

const SCATTER_SEED: u64 = 1337;
const CELL: f32 = 3.0;
const JITTER: f32 = 0.35;

#[derive(Resource, Default)]
pub struct DemoScatter {
    pub done: bool,
    pub round: u64,
    /// Placed on its own, without a template.
    pub loose_rock: Option<GeometryRef>,
}

pub struct DemoPlugin;
impl Plugin for DemoPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<DemoScatter>()
            .add_systems(Startup, register_demo_assets)
            .add_systems(Update, (scatter_templates.run_if(registry_ready), demo_hotkeys));
    }
}

fn library_mesh(name: &str, mesh: Mesh) -> Option<StaticMesh> {
    match StaticMesh::from_bevy_mesh(name, &mesh) {
        Ok(m) => Some(m),
        Err(e) => {
            warn!("Demo: skipping mesh '{}': {}", name, e);
            None
        }
    }
}

/// Startup: build the source meshes and materials the templates name.
fn register_demo_assets(
    mut library: ResMut<AssetLibrary>,
    mut materials: ResMut<Assets<StandardMaterial>>,
    mut scatter: ResMut<DemoScatter>,
) {
    for (name, color) in [
        ("bark", Color::srgb(0.35, 0.22, 0.12)),
        ("leaves", Color::srgb(0.18, 0.45, 0.16)),
        ("stone", Color::srgb(0.5, 0.5, 0.52)),
        ("moss", Color::srgb(0.3, 0.42, 0.2)),
        ("iron", Color::srgb(0.15, 0.15, 0.17)),
        ("glow", Color::srgb(1.0, 0.85, 0.5)),
    ] {
        let handle = materials.add(StandardMaterial { base_color: color, perceptual_roughness: 0.9, ..default() });
        library.add_material(name, handle);
    }

    let stone = library.material("stone").cloned();
    let meshes = [
        library_mesh("trunk", Mesh::from(Cylinder::new(0.15, 1.6))),
        library_mesh("canopy", Mesh::from(Sphere::new(0.7))),
        library_mesh("rock", Mesh::from(Cuboid::new(0.8, 0.5, 0.6))).map(|m| m.with_materials(vec![stone])),
        library_mesh("pole", Mesh::from(Cylinder::new(0.05, 2.5))),
        library_mesh("lamp", Mesh::from(Sphere::new(0.2))),
    ];
    for mesh in meshes.into_iter().flatten() {
        let geometry = library.add_mesh(mesh);
        if geometry.name == "rock" {
            scatter.loose_rock = Some(geometry);
        }
    }
    info!("Demo: source meshes and materials registered");
}

/// Update: once per round, lay every template out on its own patch.
fn scatter_templates(
    mut scatter: ResMut<DemoScatter>,
    handle_res: Res<TemplateRegistryHandle>,
    registries: Res<Assets<TemplateRegistry>>,
    mut place: EventWriter<PlaceTemplateInstance>,
    mut place_mesh: EventWriter<PlaceMeshInstance>,
) {
    if scatter.done { return; }
    let Some(registry) = registries.get(&handle_res.0) else { return };
    scatter.done = true;

    let grid = GridScatter::new(CELL, JITTER, usize::MAX, SCATTER_SEED ^ scatter.round);
    let mut total = 0;
    for id in registry.ids() {
        let region = Region::square(Vec2::new(-60.0 + id.0 as f32 * 22.0, -10.0), 18.0);
        for transform in grid.scatter(&region, id.0) {
            place.write(PlaceTemplateInstance { template: id, transform });
            total += 1;
        }
    }

    if let Some(rock) = &scatter.loose_rock {
        let loose = GridScatter::new(6.0, 0.5, 10, SCATTER_SEED ^ scatter.round);
        let region = Region { min_xz: Vec2::new(-60.0, 12.0), max_xz: Vec2::new(60.0, 20.0), height: 0.25 };
        for transform in loose.scatter(&region, u32::MAX) {
            place_mesh.write(PlaceMeshInstance { geometry: rock.clone(), transform });
            total += 1;
        }
    }
    info!("Demo: requested {} placements (round {})", total, scatter.round);
}

/// R: reset, X: destroy, Space: reset and scatter again with a new seed.
fn demo_hotkeys(
    keys: Res<ButtonInput<KeyCode>>,
    instancer: Res<PropInstancer>,
    mut scatter: ResMut<DemoScatter>,
    mut reset: EventWriter<ResetInstances>,
    mut destroy: EventWriter<DestroyInstances>,
) {
    if keys.just_pressed(KeyCode::KeyR) {
        reset.write(ResetInstances);
        info!("Demo: reset ({} instances, {} entries kept)", instancer.0.instance_count(), instancer.0.entry_count());
    }
    if keys.just_pressed(KeyCode::KeyX) {
        destroy.write(DestroyInstances);
        info!("Demo: destroy ({:?})", instancer.0.stats());
    }
    if keys.just_pressed(KeyCode::Space) {
        reset.write(ResetInstances);
        scatter.round += 1;
        scatter.done = false;
    }
}
