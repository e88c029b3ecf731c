// src/props/instancing/ecs.rs
//! Bevy `World` as the instancing host.
//!
//! Templates are realized as a short-lived entity hierarchy built from the
//! registry; instance sets are entities under the anchor whose children are
//! the placed instances, one `Mesh3d` + `MeshMaterial3d` per section. Bevy's
//! automatic batching draws identical mesh/material pairs together.

use std::collections::HashMap;

use bevy::prelude::*;

use crate::props::core::{PieceDesc, TemplateId};
use crate::props::library::AssetLibrary;
use crate::props::plugin::TemplateRegistryHandle;
use crate::props::registry::TemplateRegistry;
use super::buffers::{GeometryId, GeometryRef};
use super::combined::{self, CombinedMesh, TangentPolicy};
use super::extract::extract;
use super::host::{InstanceGeometry, InstanceSetHost, MeshAssetHost, TemplateHost};
use super::material::MaterialRef;
use super::merge::merge;

// ---------- Components ----------

/// Root of every instance set. Removing it tears the instancer down.
#[derive(Component, Default)]
pub struct InstancingAnchor;

/// Root of a transient template hierarchy.
#[derive(Component, Clone, Copy, Debug)]
pub struct TemplateRoot(pub TemplateId);

/// A template element that may carry geometry.
#[derive(Component, Clone, Debug, Default)]
pub struct MeshPiece {
    pub geometry: Option<GeometryRef>,
    pub materials: Vec<Option<MaterialRef>>,
}

/// Editor-only element; never instanced.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct HiddenInGame;

/// One drawable part: a Bevy mesh bound to a material slot.
#[derive(Clone, Debug)]
pub struct MeshPart {
    pub slot: usize,
    pub mesh: Handle<Mesh>,
}

/// Mesh asset produced by `finalize_mesh`: one Bevy mesh per section.
#[derive(Clone, Debug, Default)]
pub struct EcsMeshAsset {
    pub parts: Vec<MeshPart>,
}

#[derive(Component, Debug, Default)]
pub struct InstanceSet {
    pub parts: Vec<MeshPart>,
    pub materials: Vec<Option<Handle<StandardMaterial>>>,
    pub instances: usize,
}

/// A placement under an `InstanceSet`.
#[derive(Component, Clone, Copy, Debug, Default)]
pub struct PlacedInstance;

/// Static meshes already converted to Bevy meshes, by source identity.
#[derive(Resource, Default)]
pub struct StaticMeshParts {
    // Keeps the source alive so its id cannot be reused.
    by_geometry: HashMap<GeometryId, (GeometryRef, EcsMeshAsset)>,
}

impl StaticMeshParts {
    pub fn len(&self) -> usize { self.by_geometry.len() }
    pub fn is_empty(&self) -> bool { self.by_geometry.is_empty() }
}

// ---------- Host ----------

pub struct WorldHost<'w> {
    world: &'w mut World,
    anchor: Entity,
    lod: usize,
}

impl<'w> WorldHost<'w> {
    pub fn new(world: &'w mut World, anchor: Entity, lod: usize) -> Self {
        Self { world, anchor, lod }
    }

    fn add_mesh(&mut self, mesh: Mesh) -> Option<Handle<Mesh>> {
        let mut meshes = self.world.get_resource_mut::<Assets<Mesh>>()?;
        Some(meshes.add(mesh))
    }

    fn upload(&mut self, mesh: &CombinedMesh, slot_of: impl Fn(usize) -> usize) -> EcsMeshAsset {
        let mut parts = Vec::with_capacity(mesh.sections.len());
        for i in 0..mesh.sections.len() {
            let Some(bevy_mesh) = mesh.section_mesh(i) else { continue };
            let Some(handle) = self.add_mesh(bevy_mesh) else {
                warn!("Instancing: no Assets<Mesh> in world; '{}' not uploaded", mesh.name);
                return EcsMeshAsset::default();
            };
            parts.push(MeshPart { slot: slot_of(i), mesh: handle });
        }
        EcsMeshAsset { parts }
    }

    /// Bevy meshes for a static source, converted once per geometry.
    fn static_parts(&mut self, geometry: &GeometryRef) -> EcsMeshAsset {
        let id = geometry.id();
        if let Some((_, asset)) = self.world.get_resource::<StaticMeshParts>().and_then(|c| c.by_geometry.get(&id)) {
            return asset.clone();
        }

        let Some(buffers) = geometry.lod(self.lod) else {
            warn!("Instancing: mesh '{}' has no LOD {}", geometry.name, self.lod);
            return EcsMeshAsset::default();
        };
        let slots = buffers.sections.iter().map(|s| s.material_index as usize + 1).max().unwrap_or(0);
        let materials = vec![None; slots];
        let merged = match merge(&[(extract(buffers, None), &materials[..])], 0) {
            Ok(m) => m,
            Err(e) => {
                warn!("Instancing: mesh '{}' has nothing to draw: {}", geometry.name, e);
                return EcsMeshAsset::default();
            }
        };
        let mesh = combined::build(geometry.name.clone(), merged, TangentPolicy::Preserve);
        let asset = self.upload(&mesh, |i| mesh.sections[i].slot as usize);

        if let Some(mut cache) = self.world.get_resource_mut::<StaticMeshParts>() {
            cache.by_geometry.insert(id, (geometry.clone(), asset.clone()));
        }
        asset
    }

    /// Anchor-to-world matrix, composed up the `ChildOf` chain so it holds
    /// before transform propagation has run.
    fn anchor_matrix(&self) -> Mat4 {
        let mut matrix = Mat4::IDENTITY;
        let mut next = Some(self.anchor);
        while let Some(e) = next {
            if let Some(t) = self.world.get::<Transform>(e) {
                matrix = t.compute_matrix() * matrix;
            }
            next = self.world.get::<ChildOf>(e).map(|c| c.parent());
        }
        matrix
    }

    fn anchor_local(&self, world: Transform) -> Transform {
        let anchor = self.anchor_matrix();
        if anchor == Mat4::IDENTITY {
            return world;
        }
        Transform::from_matrix(anchor.inverse() * world.compute_matrix())
    }
}

/// Walk the hierarchy under `entity` depth-first, children in order.
fn walk_pieces(world: &World, entity: Entity, parent: Transform, parent_visible: bool, out: &mut Vec<PieceDesc>) {
    let Some(children) = world.get::<Children>(entity) else { return };
    for child in children.to_vec() {
        let local = world.get::<Transform>(child).copied().unwrap_or_default();
        let relative = parent.mul_transform(local);
        let visible = match world.get::<Visibility>(child) {
            Some(Visibility::Visible) => true,
            Some(Visibility::Hidden) => false,
            _ => parent_visible,
        };
        if let Some(piece) = world.get::<MeshPiece>(child) {
            out.push(PieceDesc {
                geometry: piece.geometry.clone(),
                relative_transform: relative,
                visible,
                hidden_in_game: world.get::<HiddenInGame>(child).is_some(),
                materials: piece.materials.clone(),
            });
        }
        walk_pieces(world, child, relative, visible, out);
    }
}

impl TemplateHost for WorldHost<'_> {
    type Instance = Entity;

    fn spawn_template(&mut self, template: TemplateId) -> Option<Entity> {
        let def = {
            let handle = self.world.get_resource::<TemplateRegistryHandle>()?;
            let registries = self.world.get_resource::<Assets<TemplateRegistry>>()?;
            registries.get(&handle.0)?.get(template)?.clone()
        };

        let resolved: Vec<_> = {
            let library = self.world.get_resource::<AssetLibrary>();
            def.pieces
                .iter()
                .map(|p| {
                    let (geometry, materials) = library.map(|l| l.resolve(p)).unwrap_or_default();
                    (p.local_transform(), MeshPiece { geometry, materials }, p.visible, p.hidden_in_game, p.attach_to)
                })
                .collect()
        };

        let root = self
            .world
            .spawn((Name::new(format!("Template: {}", def.name)), TemplateRoot(template), Transform::IDENTITY, Visibility::Visible))
            .id();

        let mut spawned: Vec<Entity> = Vec::with_capacity(resolved.len());
        for (transform, piece, visible, hidden_in_game, attach_to) in resolved {
            let parent = attach_to.and_then(|i| spawned.get(i).copied()).unwrap_or(root);
            let visibility = if visible { Visibility::Inherited } else { Visibility::Hidden };
            let mut e = self.world.spawn((transform, visibility, piece, ChildOf(parent)));
            if hidden_in_game {
                e.insert(HiddenInGame);
            }
            spawned.push(e.id());
        }
        Some(root)
    }

    fn mesh_pieces(&mut self, root: &Entity) -> Vec<PieceDesc> {
        let mut out = Vec::new();
        walk_pieces(self.world, *root, Transform::IDENTITY, true, &mut out);
        out
    }

    fn destroy_template(&mut self, root: Entity) {
        self.world.despawn(root);
    }
}

impl MeshAssetHost for WorldHost<'_> {
    type MeshAsset = EcsMeshAsset;

    fn finalize_mesh(&mut self, owner: &str, mesh: CombinedMesh) -> EcsMeshAsset {
        let asset = self.upload(&mesh, |i| i);
        debug!("Instancing: '{}' uploaded as {} mesh part(s)", owner, asset.parts.len());
        asset
    }
}

impl InstanceSetHost for WorldHost<'_> {
    type Set = Entity;

    fn create_set(&mut self, label: &str) -> Entity {
        self.world
            .spawn((Name::new(label.to_string()), InstanceSet::default(), Transform::IDENTITY, Visibility::Inherited, ChildOf(self.anchor)))
            .id()
    }

    fn set_geometry(&mut self, set: Entity, geometry: InstanceGeometry<'_, EcsMeshAsset>) {
        let parts = match geometry {
            InstanceGeometry::Static(g) => self.static_parts(g).parts,
            InstanceGeometry::Combined(m) => m.parts.clone(),
        };
        if let Some(mut s) = self.world.get_mut::<InstanceSet>(set) {
            s.parts = parts;
        }
    }

    fn set_material(&mut self, set: Entity, slot: usize, material: &MaterialRef) {
        let Some(mut s) = self.world.get_mut::<InstanceSet>(set) else { return };
        if s.materials.len() <= slot {
            s.materials.resize(slot + 1, None);
        }
        s.materials[slot] = Some(material.handle.clone());
    }

    fn add_instance(&mut self, set: Entity, transform: Transform) {
        let local = self.anchor_local(transform);
        let draws: Vec<(Handle<Mesh>, Handle<StandardMaterial>)> = {
            let Some(mut s) = self.world.get_mut::<InstanceSet>(set) else { return };
            s.instances += 1;
            s.parts
                .iter()
                .map(|p| (p.mesh.clone(), s.materials.get(p.slot).cloned().flatten().unwrap_or_default()))
                .collect()
        };

        let instance = self.world.spawn((PlacedInstance, local, Visibility::Inherited, ChildOf(set))).id();
        if let [(mesh, material)] = draws.as_slice() {
            self.world.entity_mut(instance).insert((Mesh3d(mesh.clone()), MeshMaterial3d(material.clone())));
            return;
        }
        for (mesh, material) in draws {
            self.world.spawn((Mesh3d(mesh), MeshMaterial3d(material), Transform::IDENTITY, ChildOf(instance)));
        }
    }

    fn clear_instances(&mut self, set: Entity) {
        let Some(children) = self.world.get::<Children>(set).map(|c| c.to_vec()) else { return };
        for child in children {
            if self.world.get::<PlacedInstance>(child).is_some() {
                self.world.despawn(child);
            }
        }
        if let Some(mut s) = self.world.get_mut::<InstanceSet>(set) {
            s.instances = 0;
        }
    }

    fn destroy_set(&mut self, set: Entity) {
        if self.world.get::<InstanceSet>(set).is_some() {
            self.world.despawn(set);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props::instancing::buffers::{RenderBuffers, SectionRange, StaticMesh};
    use crate::props::instancing::facade::InstancingFacade;
    use crate::props::registry::{PieceDef, TemplateDef};
    use crate::props::settings::{BuildStrategy, InstancingSettings};

    fn quad_pair() -> StaticMesh {
        let positions = vec![
            Vec3::new(0.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0), Vec3::new(1.0, 1.0, 0.0), Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(2.0, 0.0, 0.0), Vec3::new(3.0, 0.0, 0.0), Vec3::new(3.0, 1.0, 0.0), Vec3::new(2.0, 1.0, 0.0),
        ];
        let buffers = RenderBuffers::new(positions, vec![0, 1, 2, 0, 2, 3, 4, 5, 6, 4, 6, 7]).with_sections(vec![
            SectionRange { material_index: 0, first_index: 0, num_triangles: 2 },
            SectionRange { material_index: 1, first_index: 6, num_triangles: 2 },
        ]);
        StaticMesh::new("quads", buffers)
    }

    fn piece_def(mesh: &str) -> PieceDef {
        PieceDef {
            mesh: Some(mesh.to_string()),
            translation: [0.0; 3],
            rotation: [0.0; 3],
            scale: [1.0; 3],
            visible: true,
            hidden_in_game: false,
            attach_to: None,
            materials: vec![Some("red".into()), Some("blue".into())],
        }
    }

    /// World with a one-template registry, a library and an anchor.
    fn setup(pieces: Vec<PieceDef>) -> (World, Entity) {
        let mut world = World::new();
        world.init_resource::<Assets<Mesh>>();
        world.init_resource::<Assets<TemplateRegistry>>();
        world.init_resource::<StaticMeshParts>();

        let mut library = AssetLibrary::default();
        library.add_mesh(quad_pair());
        library.add_material("red", Handle::default());
        library.add_material("blue", Handle::default());
        world.insert_resource(library);

        let registry = TemplateRegistry::from_defs(vec![TemplateDef { name: "pair".into(), category: None, pieces }]).unwrap();
        let handle = world.resource_mut::<Assets<TemplateRegistry>>().add(registry);
        world.insert_resource(TemplateRegistryHandle(handle));

        let anchor = world.spawn((InstancingAnchor, Transform::IDENTITY, Visibility::Visible)).id();
        (world, anchor)
    }

    fn count<C: Component>(world: &mut World) -> usize {
        world.query::<&C>().iter(world).count()
    }

    #[test]
    fn nested_pieces_report_root_relative_transforms() {
        let mut child = piece_def("quads");
        child.translation = [0.0, 2.0, 0.0];
        child.attach_to = Some(0);
        let mut parent = piece_def("quads");
        parent.translation = [1.0, 0.0, 0.0];
        parent.visible = false;
        let (mut world, anchor) = setup(vec![parent, child]);

        let mut host = WorldHost::new(&mut world, anchor, 0);
        let root = host.spawn_template(TemplateId(0)).unwrap();
        let pieces = host.mesh_pieces(&root);
        host.destroy_template(root);

        assert_eq!(pieces.len(), 2);
        assert!(!pieces[0].visible);
        // Inherits the parent's hidden state and offset.
        assert!(!pieces[1].visible);
        assert!(pieces[1].relative_transform.translation.abs_diff_eq(Vec3::new(1.0, 2.0, 0.0), 1e-5));
        assert_eq!(count::<TemplateRoot>(&mut world), 0);
        assert_eq!(count::<MeshPiece>(&mut world), 0);
    }

    #[test]
    fn unknown_template_spawns_nothing() {
        let (mut world, anchor) = setup(vec![]);
        let mut host = WorldHost::new(&mut world, anchor, 0);
        assert!(host.spawn_template(TemplateId(9)).is_none());
    }

    #[test]
    fn per_piece_placement_spawns_one_draw_per_slot() {
        let (mut world, anchor) = setup(vec![piece_def("quads")]);
        let mut facade: InstancingFacade<Entity, EcsMeshAsset> = InstancingFacade::new(InstancingSettings::default());

        {
            let mut host = WorldHost::new(&mut world, anchor, 0);
            facade.place_instance(&mut host, TemplateId(0), Transform::from_xyz(3.0, 0.0, 0.0)).unwrap();
            facade.place_instance(&mut host, TemplateId(0), Transform::from_xyz(6.0, 0.0, 0.0)).unwrap();
        }

        assert_eq!(count::<InstanceSet>(&mut world), 1);
        assert_eq!(count::<PlacedInstance>(&mut world), 2);
        // Two sections per instance, each on its own child.
        assert_eq!(count::<Mesh3d>(&mut world), 4);
        assert_eq!(world.resource::<StaticMeshParts>().len(), 1);
        assert_eq!(world.resource::<Assets<Mesh>>().len(), 2);
        assert_eq!(count::<TemplateRoot>(&mut world), 0);
    }

    #[test]
    fn merged_placement_uploads_once_and_places_one_instance() {
        let (mut world, anchor) = setup(vec![piece_def("quads"), piece_def("quads")]);
        let settings = InstancingSettings { strategy: BuildStrategy::Merged, ..Default::default() };
        let mut facade: InstancingFacade<Entity, EcsMeshAsset> = InstancingFacade::new(settings);

        {
            let mut host = WorldHost::new(&mut world, anchor, 0);
            assert_eq!(facade.place_instance(&mut host, TemplateId(0), Transform::IDENTITY).unwrap(), 1);
            assert_eq!(facade.place_instance(&mut host, TemplateId(0), Transform::IDENTITY).unwrap(), 1);
        }

        assert_eq!(facade.stats().builds, 1);
        assert_eq!(count::<InstanceSet>(&mut world), 1);
        assert_eq!(count::<PlacedInstance>(&mut world), 2);
        // Two pieces times two slots.
        assert_eq!(world.resource::<Assets<Mesh>>().len(), 4);
    }

    #[test]
    fn reset_and_destroy_despawn_what_they_should() {
        let (mut world, anchor) = setup(vec![piece_def("quads")]);
        let mut facade: InstancingFacade<Entity, EcsMeshAsset> = InstancingFacade::new(InstancingSettings::default());

        let mut host = WorldHost::new(&mut world, anchor, 0);
        for i in 0..3 {
            facade.place_instance(&mut host, TemplateId(0), Transform::from_xyz(i as f32, 0.0, 0.0)).unwrap();
        }
        facade.reset_all_instances(&mut host);
        drop(host);
        assert_eq!(count::<PlacedInstance>(&mut world), 0);
        assert_eq!(count::<InstanceSet>(&mut world), 1);

        let mut host = WorldHost::new(&mut world, anchor, 0);
        facade.destroy_all_instances(&mut host);
        drop(host);
        assert_eq!(count::<InstanceSet>(&mut world), 0);
        assert_eq!(facade.entry_count(), 0);
    }

    #[test]
    fn instances_are_stored_relative_to_the_anchor() {
        let (mut world, anchor) = setup(vec![piece_def("quads")]);
        world.entity_mut(anchor).insert(Transform::from_xyz(10.0, 0.0, 0.0));
        let mut facade: InstancingFacade<Entity, EcsMeshAsset> = InstancingFacade::new(InstancingSettings::default());

        let mut host = WorldHost::new(&mut world, anchor, 0);
        facade.place_instance(&mut host, TemplateId(0), Transform::from_xyz(12.0, 0.0, 0.0)).unwrap();
        drop(host);

        let mut q = world.query_filtered::<&Transform, With<PlacedInstance>>();
        let local = q.single(&world).unwrap();
        assert!(local.translation.abs_diff_eq(Vec3::new(2.0, 0.0, 0.0), 1e-4));
    }

    #[test]
    fn reparented_anchor_uses_its_world_placement() {
        let (mut world, anchor) = setup(vec![piece_def("quads")]);
        let parent = world.spawn(Transform::from_xyz(0.0, 0.0, 4.0).with_rotation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2))).id();
        world.entity_mut(anchor).insert((Transform::from_xyz(1.0, 0.0, 0.0), ChildOf(parent)));
        let mut facade: InstancingFacade<Entity, EcsMeshAsset> = InstancingFacade::new(InstancingSettings::default());

        let target = Transform::from_xyz(3.0, 2.0, -1.0);
        let mut host = WorldHost::new(&mut world, anchor, 0);
        facade.place_instance(&mut host, TemplateId(0), target).unwrap();
        drop(host);

        let mut q = world.query_filtered::<&Transform, With<PlacedInstance>>();
        let local = *q.single(&world).unwrap();
        let anchor_world = Transform::from_xyz(0.0, 0.0, 4.0)
            .with_rotation(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2))
            .mul_transform(Transform::from_xyz(1.0, 0.0, 0.0));
        let placed = anchor_world.mul_transform(local);
        assert!(placed.translation.abs_diff_eq(target.translation, 1e-4));
        assert!(placed.rotation.angle_between(Quat::IDENTITY) < 1e-3);
    }
}
