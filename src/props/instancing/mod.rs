//! Template instancing: turns a template's mesh pieces into reusable
//! instancing handles, either one set per piece geometry or a single merged
//! mesh per template, and caches the result per template or mesh.
//! The core is host-agnostic; `ecs` binds it to a Bevy `World` and `memory`
//! to plain vectors.

pub mod buffers;
pub mod material;
pub mod extract;
pub mod merge;
pub mod combined;
pub mod host;
pub mod cache;
pub mod facade;
pub mod memory;
pub mod ecs;

pub use buffers::{GeometryRef, RenderBuffers, SectionRange, StaticMesh};
pub use cache::{CacheStats, CachedTypeEntry, Identity, InstanceCache};
pub use facade::InstancingFacade;
pub use host::{InstanceGeometry, InstanceSetHost, InstancingHost, MeshAssetHost, SpawnGuard, TemplateHost};
pub use material::{Material, MaterialRef};
