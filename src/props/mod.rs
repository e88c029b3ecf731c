pub mod core;
pub mod error;
pub mod settings;
pub mod registry;
pub mod library;
pub mod plugin;
pub mod placement;
pub mod instancing;

pub use error::InstancingError;
pub use plugin::InstancingPlugin;
pub use settings::{BuildStrategy, InstancingSettings};
