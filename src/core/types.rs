//! Core type aliases and re-exports

pub use glam::{IVec3, Vec3};

/// Numeric block id as stored in chunk grids and sent on the wire.
/// Id 0 is always air.
pub type BlockId = u16;

/// Standard Result type for the engine
pub type Result<T> = std::result::Result<T, crate::core::error::Error>;
