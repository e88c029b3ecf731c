// src/props/settings.rs
//! Instancing configuration, loadable from RON.

use std::path::Path;

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

use crate::props::instancing::combined::TangentPolicy;

/// How a template is turned into instancing handles.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildStrategy {
    /// One instance set per distinct piece geometry; every placement adds one
    /// instance per piece.
    #[default]
    PerPiece,
    /// All pieces welded into one combined mesh with a single instance set.
    Merged,
}

#[derive(Resource, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstancingSettings {
    /// Template registry manifest, relative to the asset folder.
    pub registry_path: String,
    pub strategy: BuildStrategy,
    /// Detail level read from source meshes (0 = full detail).
    pub lod_index: usize,
    /// Merges with this many vertices or indices (or fewer) are rejected.
    pub degenerate_threshold: usize,
    pub tangents: TangentPolicy,
}

impl Default for InstancingSettings {
    fn default() -> Self {
        Self {
            registry_path: "templates/demo.templates.ron".to_string(),
            strategy: BuildStrategy::PerPiece,
            lod_index: 0,
            degenerate_threshold: 3,
            tangents: TangentPolicy::Preserve,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum SettingsError {
    #[error("I/O while reading settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

impl InstancingSettings {
    pub fn from_ron_str(s: &str) -> Result<Self, SettingsError> {
        Ok(ron::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_ron_str(&text)
    }

    /// Missing or broken files fall back to defaults (with a warning).
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(s) => {
                info!("Instancing: settings loaded from '{}'", path.display());
                s
            }
            Err(e) => {
                warn!("Instancing: using default settings ({}: {})", path.display(), e);
                Self::default()
            }
        }
    }
}
