//! Instancing plugin wiring (glue).
//! - Registry asset/loader + asset library
//! - Placement/reset/destroy events
//! - Anchor entity, one exclusive system that applies requests, teardown observer

use bevy::prelude::*;

use super::core::TemplateId;
use super::instancing::buffers::GeometryRef;
use super::instancing::ecs::{EcsMeshAsset, InstancingAnchor, StaticMeshParts, WorldHost};
use super::instancing::facade::InstancingFacade;
use super::library::AssetLibrary;
use super::registry::{TemplateRegistry, TemplateRegistryAssetPlugin};
use super::settings::InstancingSettings;

/// Handle to the loaded TemplateRegistry asset.
#[derive(Resource, Default)]
pub struct TemplateRegistryHandle(pub Handle<TemplateRegistry>);

/// The anchor every instance set hangs under.
#[derive(Resource, Clone, Copy, Debug)]
pub struct InstancingAnchorEntity(pub Entity);

/// The instancer as a resource, bound to the ECS host's set and mesh types.
#[derive(Resource)]
pub struct PropInstancer(pub InstancingFacade<Entity, EcsMeshAsset>);

impl FromWorld for PropInstancer {
    fn from_world(world: &mut World) -> Self {
        let settings = world.get_resource::<InstancingSettings>().cloned().unwrap_or_default();
        Self(InstancingFacade::new(settings))
    }
}

/// Place every visible mesh piece of a template.
#[derive(Event, Clone, Copy, Debug)]
pub struct PlaceTemplateInstance {
    pub template: TemplateId,
    pub transform: Transform,
}

/// Place a single mesh on its own.
#[derive(Event, Clone, Debug)]
pub struct PlaceMeshInstance {
    pub geometry: GeometryRef,
    pub transform: Transform,
}

/// Clear every placed instance; built geometry stays cached.
#[derive(Event, Clone, Copy, Debug, Default)]
pub struct ResetInstances;

/// Clear and destroy every instance set; the next placement rebuilds.
#[derive(Event, Clone, Copy, Debug, Default)]
pub struct DestroyInstances;

pub struct InstancingPlugin;
impl Plugin for InstancingPlugin {
    fn build(&self, app: &mut App) {
        app.add_plugins(TemplateRegistryAssetPlugin)
            .init_resource::<InstancingSettings>()
            .init_resource::<TemplateRegistryHandle>()
            .init_resource::<AssetLibrary>()
            .init_resource::<StaticMeshParts>()
            .init_resource::<PropInstancer>()
            .add_event::<PlaceTemplateInstance>()
            .add_event::<PlaceMeshInstance>()
            .add_event::<ResetInstances>()
            .add_event::<DestroyInstances>()
            .add_systems(Startup, (spawn_anchor, load_registry))
            .add_systems(Update, (monitor_registry_ready, apply_instancing_requests))
            .add_observer(teardown_on_anchor_removed);
    }
}

/// Run condition: the registry asset is loaded.
pub fn registry_ready(handle_res: Res<TemplateRegistryHandle>, registries: Res<Assets<TemplateRegistry>>) -> bool {
    registries.get(&handle_res.0).is_some()
}

/// Startup: spawn the anchor at the origin.
fn spawn_anchor(mut commands: Commands) {
    let anchor = commands
        .spawn((Name::new("Instancing Anchor"), InstancingAnchor, Transform::default(), Visibility::default()))
        .id();
    commands.insert_resource(InstancingAnchorEntity(anchor));
}

/// Startup: request loading the registry manifest, store handle.
fn load_registry(
    mut handle_res: ResMut<TemplateRegistryHandle>,
    settings: Res<InstancingSettings>,
    assets: Res<AssetServer>,
) {
    if handle_res.0.is_strong() { return; }
    let h: Handle<TemplateRegistry> = assets.load(settings.registry_path.as_str());
    handle_res.0 = h;
    info!(
        "Instancing: loading registry from '{}', strategy={:?}",
        settings.registry_path, settings.strategy
    );
}

/// Update: log once when the registry becomes available.
fn monitor_registry_ready(
    handle_res: Res<TemplateRegistryHandle>,
    registries: Res<Assets<TemplateRegistry>>,
    mut logged: Local<bool>,
) {
    if *logged { return; }
    if let Some(reg) = registries.get(&handle_res.0) {
        *logged = true;
        info!("Instancing: registry loaded and ready ({} templates)", reg.templates.len());
    }
}

/// Update: drain this frame's requests and apply them in one go.
/// Destroy runs before reset, both before placements.
pub fn apply_instancing_requests(world: &mut World) {
    let Some(anchor) = world.get_resource::<InstancingAnchorEntity>().map(|a| a.0) else { return };

    let destroy = !drain::<DestroyInstances>(world).is_empty();
    let reset = !drain::<ResetInstances>(world).is_empty();
    let templates = drain::<PlaceTemplateInstance>(world);
    let meshes = drain::<PlaceMeshInstance>(world);
    if !destroy && !reset && templates.is_empty() && meshes.is_empty() {
        return;
    }

    world.resource_scope(|world, mut instancer: Mut<PropInstancer>| {
        let lod = instancer.0.cache().settings().lod_index;
        let mut host = WorldHost::new(world, anchor, lod);
        if destroy {
            instancer.0.destroy_all_instances(&mut host);
        }
        if reset {
            instancer.0.reset_all_instances(&mut host);
        }
        let mut failed = 0;
        for req in &templates {
            failed += instancer.0.place_instance(&mut host, req.template, req.transform).is_err() as usize;
        }
        for req in &meshes {
            failed += instancer.0.place_mesh_instance(&mut host, &req.geometry, req.transform).is_err() as usize;
        }
        if !templates.is_empty() || !meshes.is_empty() {
            debug!(
                "Instancing: applied {} placement request(s), {} failed, {} instance(s) live",
                templates.len() + meshes.len(), failed, instancer.0.instance_count()
            );
        }
    });
}

fn drain<E: Event>(world: &mut World) -> Vec<E> {
    world.get_resource_mut::<Events<E>>().map(|mut ev| ev.drain().collect()).unwrap_or_default()
}

/// Removing the anchor destroys everything the instancer owns.
fn teardown_on_anchor_removed(trigger: Trigger<OnRemove, InstancingAnchor>, mut commands: Commands) {
    let anchor = trigger.target();
    commands.queue(move |world: &mut World| teardown(world, anchor));
}

fn teardown(world: &mut World, anchor: Entity) {
    if world.get_resource::<InstancingAnchorEntity>().is_some_and(|a| a.0 == anchor) {
        world.remove_resource::<InstancingAnchorEntity>();
    }
    if !world.contains_resource::<PropInstancer>() { return; }
    world.resource_scope(|world, mut instancer: Mut<PropInstancer>| {
        let lod = instancer.0.cache().settings().lod_index;
        instancer.0.teardown(&mut WorldHost::new(world, anchor, lod));
    });
    info!("Instancing: anchor {:?} removed, instancer torn down", anchor);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::instancing::ecs::{InstanceSet, PlacedInstance};
    use crate::props::registry::{PieceDef, TemplateDef};

    fn app() -> App {
        let mut app = App::new();
        app.add_plugins(MinimalPlugins)
            .add_plugins(AssetPlugin::default())
            .init_asset::<Mesh>()
            .init_asset::<StandardMaterial>()
            .add_plugins(InstancingPlugin);
        app
    }

    fn cube_template(app: &mut App) -> TemplateId {
        let mesh = Mesh::from(Cuboid::new(1.0, 1.0, 1.0));
        let static_mesh = crate::props::instancing::buffers::StaticMesh::from_bevy_mesh("cube", &mesh).unwrap();
        app.world_mut().resource_mut::<AssetLibrary>().add_mesh(static_mesh);

        let piece = PieceDef {
            mesh: Some("cube".into()),
            translation: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
            visible: true,
            hidden_in_game: false,
            attach_to: None,
            materials: vec![],
        };
        let registry = TemplateRegistry::from_defs(vec![TemplateDef { name: "cube".into(), category: None, pieces: vec![piece] }]).unwrap();
        let handle = app.world_mut().resource_mut::<Assets<TemplateRegistry>>().add(registry);
        app.world_mut().resource_mut::<TemplateRegistryHandle>().0 = handle;
        TemplateId(0)
    }

    fn count<C: Component>(app: &mut App) -> usize {
        let world = app.world_mut();
        world.query::<&C>().iter(world).count()
    }

    #[test]
    fn events_drive_place_reset_and_destroy() {
        let mut app = app();
        let id = cube_template(&mut app);
        app.update();

        app.world_mut().send_event(PlaceTemplateInstance { template: id, transform: Transform::IDENTITY });
        app.world_mut().send_event(PlaceTemplateInstance { template: id, transform: Transform::from_xyz(2.0, 0.0, 0.0) });
        app.update();
        assert_eq!(count::<PlacedInstance>(&mut app), 2);
        assert_eq!(app.world().resource::<PropInstancer>().0.stats().builds, 1);

        app.world_mut().send_event(ResetInstances);
        app.update();
        assert_eq!(count::<PlacedInstance>(&mut app), 0);
        assert_eq!(count::<InstanceSet>(&mut app), 1);

        app.world_mut().send_event(DestroyInstances);
        app.update();
        assert_eq!(count::<InstanceSet>(&mut app), 0);
        assert_eq!(app.world().resource::<PropInstancer>().0.entry_count(), 0);
    }

    #[test]
    fn despawning_the_anchor_tears_down() {
        let mut app = app();
        let id = cube_template(&mut app);
        app.update();

        app.world_mut().send_event(PlaceTemplateInstance { template: id, transform: Transform::IDENTITY });
        app.update();
        assert_eq!(app.world().resource::<PropInstancer>().0.entry_count(), 1);

        let anchor = app.world().resource::<InstancingAnchorEntity>().0;
        app.world_mut().despawn(anchor);
        app.update();

        assert_eq!(app.world().resource::<PropInstancer>().0.entry_count(), 0);
        assert_eq!(count::<InstanceSet>(&mut app), 0);
        assert!(!app.world().contains_resource::<InstancingAnchorEntity>());
    }
}
