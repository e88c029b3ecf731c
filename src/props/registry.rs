// src/props/registry.rs
//! Data-driven templates + loader.

use bevy::asset::{io::Reader, AssetLoader, LoadContext};
use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::core::TemplateId;

// ---------- Public plugin to register asset+loader ----------

pub struct TemplateRegistryAssetPlugin;

impl Plugin for TemplateRegistryAssetPlugin {
    fn build(&self, app: &mut App) {
        app.init_asset::<TemplateRegistry>()
            .register_asset_loader(TemplateRegistryLoader);
    }
}

// ---------- Piece definition (data form) ----------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PieceDef {
    /// Name in the `AssetLibrary`. `None` is a pure transform node.
    #[serde(default)]
    pub mesh: Option<String>,

    #[serde(default)]
    pub translation: [f32; 3],

    /// Euler XYZ, degrees.
    #[serde(default)]
    pub rotation: [f32; 3],

    #[serde(default = "default_scale")]
    pub scale: [f32; 3],

    #[serde(default = "default_true")]
    pub visible: bool,

    #[serde(default)]
    pub hidden_in_game: bool,

    /// Index of an earlier piece to parent under; `None` is the template root.
    #[serde(default)]
    pub attach_to: Option<usize>,

    /// Per-slot material overrides by library name. Empty means the mesh's own.
    #[serde(default)]
    pub materials: Vec<Option<String>>,
}

fn default_scale() -> [f32; 3] {
    [1.0; 3]
}
fn default_true() -> bool {
    true
}

impl PieceDef {
    /// Transform relative to the parent (`attach_to` or the root).
    pub fn local_transform(&self) -> Transform {
        let [rx, ry, rz] = self.rotation.map(f32::to_radians);
        Transform {
            translation: Vec3::from_array(self.translation),
            rotation: Quat::from_euler(EulerRot::XYZ, rx, ry, rz),
            scale: Vec3::from_array(self.scale),
        }
    }
}

// ---------- Template definition (data form) ----------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TemplateDef {
    /// Unique human-readable name (used for lookup).
    pub name: String,

    /// Optional category hint (e.g., "vegetation", "debris").
    #[serde(default)]
    pub category: Option<String>,

    pub pieces: Vec<PieceDef>,
}

// ---------- Runtime registry asset ----------

#[derive(Asset, TypePath, Clone, Debug)]
pub struct TemplateRegistry {
    /// Ordered list; index in this vector is the `TemplateId.0`.
    pub templates: Vec<TemplateDef>,
    /// Name → index for quick lookups.
    pub name_to_index: HashMap<String, u32>,
}

impl TemplateRegistry {
    pub fn index_of(&self, name: &str) -> Option<TemplateId> {
        self.name_to_index.get(name).map(|&i| TemplateId(i))
    }

    pub fn get(&self, id: TemplateId) -> Option<&TemplateDef> {
        self.templates.get(id.0 as usize)
    }

    pub fn ids(&self) -> impl Iterator<Item = TemplateId> + '_ {
        (0..self.templates.len() as u32).map(TemplateId)
    }

    /// Index and validate definitions: unique names, `attach_to` pointing at
    /// an earlier piece of the same template.
    pub fn from_defs(defs: Vec<TemplateDef>) -> Result<Self, TemplateRegistryLoadError> {
        let mut name_to_index = HashMap::with_capacity(defs.len());
        for (i, def) in defs.iter().enumerate() {
            if let Some(prev) = name_to_index.insert(def.name.clone(), i as u32) {
                return Err(TemplateRegistryLoadError::DuplicateName {
                    name: def.name.clone(),
                    first: prev,
                    second: i as u32,
                });
            }
            for (p, piece) in def.pieces.iter().enumerate() {
                if let Some(parent) = piece.attach_to {
                    if parent >= p {
                        return Err(TemplateRegistryLoadError::BadAttach {
                            template: def.name.clone(),
                            piece: p,
                            attach_to: parent,
                        });
                    }
                }
            }
        }
        Ok(TemplateRegistry { templates: defs, name_to_index })
    }

    pub fn from_ron_bytes(bytes: &[u8]) -> Result<Self, TemplateRegistryLoadError> {
        let defs: Vec<TemplateDef> =
            ron::de::from_bytes(bytes).map_err(|e| TemplateRegistryLoadError::Ron(e.to_string()))?;
        Self::from_defs(defs)
    }
}

// ---------- Asset loader for `.templates.ron` ----------

#[derive(Default)]
pub struct TemplateRegistryLoader;

impl AssetLoader for TemplateRegistryLoader {
    type Asset = TemplateRegistry;
    type Settings = ();
    type Error = TemplateRegistryLoadError;

    fn extensions(&self) -> &[&str] {
        &["templates.ron"]
    }

    async fn load(
        &self,
        reader: &mut dyn Reader,
        _settings: &Self::Settings,
        _load_context: &mut LoadContext<'_>,
    ) -> Result<Self::Asset, Self::Error> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes).await?;
        TemplateRegistry::from_ron_bytes(&bytes)
    }
}

// ---------- Loader errors ----------

#[derive(thiserror::Error, Debug)]
pub enum TemplateRegistryLoadError {
    #[error("I/O while reading registry: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(String),
    #[error("Duplicate template name '{name}' (first idx {first}, second idx {second})")]
    DuplicateName { name: String, first: u32, second: u32 },
    #[error("Template '{template}': piece {piece} attaches to {attach_to}, which is not an earlier piece")]
    BadAttach { template: String, piece: usize, attach_to: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO: &str = r#"[
        (
            name: "crate_stack",
            pieces: [
                (mesh: Some("crate"), materials: [Some("wood")]),
                (mesh: Some("crate"), translation: (0.0, 1.0, 0.0), rotation: (0.0, 90.0, 0.0), attach_to: Some(0)),
                (mesh: Some("marker"), hidden_in_game: true),
            ],
        ),
        (name: "empty", category: Some("debug"), pieces: []),
    ]"#;

    #[test]
    fn parses_and_indexes_by_name() {
        let reg = TemplateRegistry::from_ron_bytes(TWO.as_bytes()).unwrap();
        let id = reg.index_of("crate_stack").unwrap();
        assert_eq!(id, TemplateId(0));
        assert_eq!(reg.index_of("empty"), Some(TemplateId(1)));
        assert!(reg.index_of("missing").is_none());

        let def = reg.get(id).unwrap();
        assert_eq!(def.pieces.len(), 3);
        assert!(def.pieces[0].visible);
        assert_eq!(def.pieces[0].scale, [1.0; 3]);
        assert!(def.pieces[2].hidden_in_game);
        assert_eq!(reg.ids().count(), 2);
    }

    #[test]
    fn local_transform_uses_degrees() {
        let reg = TemplateRegistry::from_ron_bytes(TWO.as_bytes()).unwrap();
        let t = reg.templates[0].pieces[1].local_transform();
        assert_eq!(t.translation, Vec3::Y);
        assert!(t.rotation.abs_diff_eq(Quat::from_rotation_y(std::f32::consts::FRAC_PI_2), 1e-5));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let src = r#"[(name: "a", pieces: []), (name: "a", pieces: [])]"#;
        match TemplateRegistry::from_ron_bytes(src.as_bytes()) {
            Err(TemplateRegistryLoadError::DuplicateName { first: 0, second: 1, .. }) => {}
            other => panic!("expected duplicate error, got {other:?}"),
        }
    }

    #[test]
    fn forward_attach_is_rejected() {
        let src = r#"[(name: "a", pieces: [(attach_to: Some(1)), (visible: true)])]"#;
        assert!(matches!(
            TemplateRegistry::from_ron_bytes(src.as_bytes()),
            Err(TemplateRegistryLoadError::BadAttach { piece: 0, attach_to: 1, .. })
        ));
    }
}
