//! World data model: chunks, regions, generators, persistence

pub mod block;
pub mod chunk;
pub mod coords;
pub mod generator;
pub mod region;
pub mod storage;
pub mod world;

pub use block::{BlockTable, BlockTableExport, AIR_NAME};
pub use chunk::{voxel_index, Chunk, CHUNK_PAYLOAD_BYTES, CHUNK_VOLUME};
pub use coords::{ChunkCoord, RegionCoord, CHUNK_SIZE, REGION_SIZE};
pub use generator::{
    FlatGenerator, FlatOptions, Generator, GeneratorInfo, GeneratorRegistry, NoiseGenerator,
    NoiseOptions,
};
pub use region::Region;
pub use storage::{WorldMeta, WorldStorage};
pub use world::{create_or_load_world, EntityId, ServerWorld};
