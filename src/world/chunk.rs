//! Fixed-size voxel chunk and its on-disk/wire serialization
//!
//! A chunk is a dense 16x16x16 grid of u16 block ids. The serialized
//! layout is fixed-size and shared byte-for-byte between region files
//! and the wire protocol:
//!
//! `[version:u32le][non_empty:u32le][4096 x u16le block ids]`

use crate::core::error::Error;
use crate::core::types::{BlockId, Result};
use crate::world::coords::{ChunkCoord, CHUNK_SIZE};

/// Total voxels in a chunk (16^3)
pub const CHUNK_VOLUME: usize = (CHUNK_SIZE * CHUNK_SIZE * CHUNK_SIZE) as usize;

/// Serialized chunk payload size in bytes: version + non-empty count + grid
pub const CHUNK_PAYLOAD_BYTES: usize = 4 + 4 + CHUNK_VOLUME * 2;

/// Grid index for local voxel coordinates, each in 0..16.
///
/// The `y*256 + z*16 + x` formula is relied on by storage, protocol and
/// physics alike; it must never diverge between them.
#[inline]
pub fn voxel_index(x: i32, y: i32, z: i32) -> usize {
    (y * CHUNK_SIZE * CHUNK_SIZE + z * CHUNK_SIZE + x) as usize
}

/// A single 16x16x16 chunk of block ids
#[derive(Clone)]
pub struct Chunk {
    pub coord: ChunkCoord,
    voxels: Box<[BlockId; CHUNK_VOLUME]>,
    version: u32,
    dirty: bool,
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("coord", &self.coord)
            .field("version", &self.version)
            .field("dirty", &self.dirty)
            .field("non_empty", &self.non_empty_count())
            .finish()
    }
}

impl Chunk {
    /// Create an all-air chunk at the given coordinate
    pub fn new(coord: ChunkCoord) -> Self {
        Self {
            coord,
            voxels: Box::new([0; CHUNK_VOLUME]),
            version: 0,
            dirty: false,
        }
    }

    /// Version counter, bumped on every mutation
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Whether the chunk has unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Clear the dirty flag after a successful save
    pub fn mark_clean(&mut self) {
        self.dirty = false;
    }

    /// Raw voxel grid in `y*256 + z*16 + x` order
    pub fn voxels(&self) -> &[BlockId; CHUNK_VOLUME] {
        &self.voxels
    }

    fn check_local(x: i32, y: i32, z: i32) -> Result<()> {
        if x < 0 || x >= CHUNK_SIZE || y < 0 || y >= CHUNK_SIZE || z < 0 || z >= CHUNK_SIZE {
            return Err(Error::CoordOutOfRange(x, y, z));
        }
        Ok(())
    }

    /// Read a voxel at local coordinates.
    ///
    /// Out-of-range coordinates are rejected rather than wrapped; a
    /// silent wrap would corrupt the shared index layout.
    pub fn get_block(&self, x: i32, y: i32, z: i32) -> Result<BlockId> {
        Self::check_local(x, y, z)?;
        Ok(self.voxels[voxel_index(x, y, z)])
    }

    /// Write a voxel at local coordinates, bumping the version and
    /// marking the chunk dirty.
    pub fn set_block(&mut self, x: i32, y: i32, z: i32, id: BlockId) -> Result<()> {
        Self::check_local(x, y, z)?;
        self.voxels[voxel_index(x, y, z)] = id;
        self.version = self.version.wrapping_add(1);
        self.dirty = true;
        Ok(())
    }

    /// Number of non-air voxels
    pub fn non_empty_count(&self) -> u32 {
        self.voxels.iter().filter(|&&v| v != 0).count() as u32
    }

    /// True if every voxel is air
    pub fn is_empty(&self) -> bool {
        self.voxels.iter().all(|&v| v == 0)
    }

    /// Serialize to the fixed 8200-byte payload
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(CHUNK_PAYLOAD_BYTES);
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.non_empty_count().to_le_bytes());
        for &v in self.voxels.iter() {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }

    /// Deserialize a fixed payload produced by [`Chunk::serialize`].
    ///
    /// The chunk coordinate is not part of the payload; the caller
    /// supplies it from the surrounding container (region entry header
    /// or wire message).
    pub fn deserialize(buf: &[u8], coord: ChunkCoord) -> Result<Self> {
        if buf.len() != CHUNK_PAYLOAD_BYTES {
            return Err(Error::Serialize(format!(
                "chunk payload is {} bytes, expected {}",
                buf.len(),
                CHUNK_PAYLOAD_BYTES
            )));
        }
        let version = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let mut voxels = Box::new([0u16; CHUNK_VOLUME]);
        for (i, v) in voxels.iter_mut().enumerate() {
            let off = 8 + i * 2;
            *v = u16::from_le_bytes([buf[off], buf[off + 1]]);
        }
        Ok(Self {
            coord,
            voxels,
            version,
            dirty: false,
        })
    }

    /// Reassemble a chunk from decoded wire parts
    pub fn from_parts(coord: ChunkCoord, version: u32, voxels: Box<[BlockId; CHUNK_VOLUME]>) -> Self {
        Self {
            coord,
            voxels,
            version,
            dirty: false,
        }
    }

    /// Replace the grid wholesale, bumping the version once.
    ///
    /// Used by generators that fill a chunk in one pass.
    pub fn fill_from(&mut self, voxels: [BlockId; CHUNK_VOLUME]) {
        self.voxels = Box::new(voxels);
        self.version = self.version.wrapping_add(1);
        self.dirty = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense_random_chunk(seed: u64) -> Chunk {
        // Small xorshift so the test needs no rng dependency
        let mut state = seed | 1;
        let mut chunk = Chunk::new(ChunkCoord::new(3, -2, 7));
        let mut grid = [0u16; CHUNK_VOLUME];
        for v in grid.iter_mut() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            *v = (state & 0xffff) as u16;
        }
        chunk.fill_from(grid);
        chunk
    }

    #[test]
    fn test_set_get_block() {
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0, 0));
        chunk.set_block(1, 5, 0, 42).unwrap();
        assert_eq!(chunk.get_block(1, 5, 0).unwrap(), 42);
        assert_eq!(chunk.get_block(0, 0, 0).unwrap(), 0);
    }

    #[test]
    fn test_set_block_bumps_version_and_dirty() {
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0, 0));
        assert_eq!(chunk.version(), 0);
        assert!(!chunk.is_dirty());
        chunk.set_block(0, 0, 0, 1).unwrap();
        assert_eq!(chunk.version(), 1);
        assert!(chunk.is_dirty());
        chunk.set_block(0, 0, 0, 0).unwrap();
        assert_eq!(chunk.version(), 2);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0, 0));
        assert!(chunk.set_block(16, 0, 0, 1).is_err());
        assert!(chunk.set_block(0, -1, 0, 1).is_err());
        assert!(chunk.get_block(0, 0, 16).is_err());
        // A rejected write must not bump the version
        assert_eq!(chunk.version(), 0);
    }

    #[test]
    fn test_voxel_index_layout() {
        assert_eq!(voxel_index(0, 0, 0), 0);
        assert_eq!(voxel_index(1, 0, 0), 1);
        assert_eq!(voxel_index(0, 0, 1), 16);
        assert_eq!(voxel_index(0, 1, 0), 256);
        assert_eq!(voxel_index(15, 15, 15), CHUNK_VOLUME - 1);
    }

    #[test]
    fn test_roundtrip_empty() {
        let chunk = Chunk::new(ChunkCoord::new(0, 0, 0));
        let bytes = chunk.serialize();
        assert_eq!(bytes.len(), CHUNK_PAYLOAD_BYTES);
        let back = Chunk::deserialize(&bytes, chunk.coord).unwrap();
        assert_eq!(back.version(), chunk.version());
        assert_eq!(back.voxels()[..], chunk.voxels()[..]);
    }

    #[test]
    fn test_roundtrip_single_voxel() {
        let mut chunk = Chunk::new(ChunkCoord::new(1, 2, 3));
        chunk.set_block(4, 5, 6, 99).unwrap();
        let back = Chunk::deserialize(&chunk.serialize(), chunk.coord).unwrap();
        assert_eq!(back.version(), chunk.version());
        assert_eq!(back.get_block(4, 5, 6).unwrap(), 99);
        assert_eq!(back.non_empty_count(), 1);
    }

    #[test]
    fn test_roundtrip_dense_random() {
        let chunk = dense_random_chunk(0xdeadbeef);
        let bytes = chunk.serialize();
        let back = Chunk::deserialize(&bytes, chunk.coord).unwrap();
        assert_eq!(back.voxels()[..], chunk.voxels()[..]);
        assert_eq!(back.version(), chunk.version());
        // Byte stability: serializing again reproduces the same bytes
        assert_eq!(back.serialize(), bytes);
    }

    #[test]
    fn test_deserialize_wrong_size() {
        let err = Chunk::deserialize(&[0u8; 10], ChunkCoord::new(0, 0, 0));
        assert!(err.is_err());
    }
}
