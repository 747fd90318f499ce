//! Error types for the blockport engine

use thiserror::Error;

/// Main error type for the engine
#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("voxel coordinate out of range: ({0}, {1}, {2})")]
    CoordOutOfRange(i32, i32, i32),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("unknown generator: {0}")]
    UnknownGenerator(String),

    #[error("block table error: {0}")]
    BlockTable(String),

    #[error("worker error: {0}")]
    Worker(String),
}
