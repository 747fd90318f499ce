//! Chunk and region coordinates and the world-space mapping between them
//!
//! The floor-division / positive-modulo convention here is the single
//! source of truth: storage, protocol decoding, meshing, and physics all
//! map world coordinates through these functions.

use serde::{Deserialize, Serialize};

/// Voxels per chunk side
pub const CHUNK_SIZE: i32 = 16;

/// Chunks per region side
pub const REGION_SIZE: i32 = 32;

const PACK_BITS: u32 = 21;
const PACK_MASK: u64 = (1 << PACK_BITS) - 1;

/// Integer coordinate identifying a chunk in the world grid
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl ChunkCoord {
    /// Create a new chunk coordinate
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chunk containing the given absolute world voxel coordinate
    pub fn containing(wx: i32, wy: i32, wz: i32) -> Self {
        Self {
            x: wx.div_euclid(CHUNK_SIZE),
            y: wy.div_euclid(CHUNK_SIZE),
            z: wz.div_euclid(CHUNK_SIZE),
        }
    }

    /// Local offset of a world voxel within its chunk, each in 0..16
    pub fn local_offset(wx: i32, wy: i32, wz: i32) -> (i32, i32, i32) {
        (
            wx.rem_euclid(CHUNK_SIZE),
            wy.rem_euclid(CHUNK_SIZE),
            wz.rem_euclid(CHUNK_SIZE),
        )
    }

    /// World voxel coordinate of this chunk's minimum corner
    pub fn world_origin(&self) -> (i32, i32, i32) {
        (
            self.x * CHUNK_SIZE,
            self.y * CHUNK_SIZE,
            self.z * CHUNK_SIZE,
        )
    }

    /// Region containing this chunk
    pub fn region(&self) -> RegionCoord {
        RegionCoord {
            x: self.x.div_euclid(REGION_SIZE),
            y: self.y.div_euclid(REGION_SIZE),
            z: self.z.div_euclid(REGION_SIZE),
        }
    }

    /// Local position of this chunk within its region, each in 0..32
    pub fn local_in_region(&self) -> (u8, u8, u8) {
        (
            self.x.rem_euclid(REGION_SIZE) as u8,
            self.y.rem_euclid(REGION_SIZE) as u8,
            self.z.rem_euclid(REGION_SIZE) as u8,
        )
    }

    /// Pack into a 64-bit cache key, 21 signed bits per axis.
    ///
    /// Used by the client caches instead of formatted string keys so a
    /// lookup never allocates. Coordinates beyond +-2^20 chunks alias,
    /// which is far outside any reachable world size.
    pub fn packed(&self) -> u64 {
        ((self.x as u64 & PACK_MASK) << (2 * PACK_BITS))
            | ((self.y as u64 & PACK_MASK) << PACK_BITS)
            | (self.z as u64 & PACK_MASK)
    }

    /// The 26 face/edge/corner-adjacent chunk coordinates
    pub fn neighbors(&self) -> impl Iterator<Item = ChunkCoord> + '_ {
        let center = *self;
        (-1..=1).flat_map(move |dx| {
            (-1..=1).flat_map(move |dy| {
                (-1..=1).filter_map(move |dz| {
                    if dx == 0 && dy == 0 && dz == 0 {
                        None
                    } else {
                        Some(ChunkCoord::new(center.x + dx, center.y + dy, center.z + dz))
                    }
                })
            })
        })
    }
}

/// Integer coordinate identifying a region of 32x32x32 chunks
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl RegionCoord {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Chunk coordinate of the region's minimum corner
    pub fn chunk_origin(&self) -> ChunkCoord {
        ChunkCoord::new(
            self.x * REGION_SIZE,
            self.y * REGION_SIZE,
            self.z * REGION_SIZE,
        )
    }

    /// Absolute chunk coordinate for a local (0..32) position in this region
    pub fn chunk_at(&self, lx: u8, ly: u8, lz: u8) -> ChunkCoord {
        let origin = self.chunk_origin();
        ChunkCoord::new(
            origin.x + lx as i32,
            origin.y + ly as i32,
            origin.z + lz as i32,
        )
    }
}
