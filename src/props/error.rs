// src/props/error.rs
use crate::props::core::CacheKey;
use crate::props::instancing::merge::DegenerateMerge;

/// Why a placement request could not be served. Failures never leave a
/// partial cache entry behind.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum InstancingError {
    #[error("Nothing to instance for {0:?}: unknown template or mesh")]
    InvalidIdentity(CacheKey),
    #[error("Could not build a combined mesh for {key:?}: {source}")]
    DegenerateMerge {
        key: CacheKey,
        #[source]
        source: DegenerateMerge,
    },
}
