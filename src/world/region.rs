//! Sparse region container, the unit of file persistence
//!
//! A region spans 32x32x32 chunks and stores only the chunks that
//! exist. Serialized layout:
//!
//! `[chunk_count:u32le]` then per chunk `[lx:u8][ly:u8][lz:u8]`
//! followed by the chunk's fixed-size payload. The constant payload
//! size is what lets deserialization walk fixed strides.

use std::collections::HashMap;

use crate::core::error::Error;
use crate::core::types::Result;
use crate::world::chunk::{Chunk, CHUNK_PAYLOAD_BYTES};
use crate::world::coords::{ChunkCoord, RegionCoord};

/// Bytes per serialized region entry: 3-byte local header + chunk payload
const ENTRY_BYTES: usize = 3 + CHUNK_PAYLOAD_BYTES;

/// A sparse 32x32x32 container of chunks
pub struct Region {
    pub coord: RegionCoord,
    chunks: HashMap<(u8, u8, u8), Chunk>,
    dirty: bool,
}

impl Region {
    /// Create an empty region
    pub fn new(coord: RegionCoord) -> Self {
        Self {
            coord,
            chunks: HashMap::new(),
            dirty: false,
        }
    }

    /// Number of chunks present
    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// True if no chunks are present.
    ///
    /// Empty regions are never persisted; an existing file is deleted
    /// instead.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Whether this region (or any chunk in it) has unsaved changes
    pub fn is_dirty(&self) -> bool {
        self.dirty || self.chunks.values().any(|c| c.is_dirty())
    }

    /// Clear dirty flags after a successful save
    pub fn mark_clean(&mut self) {
        self.dirty = false;
        for chunk in self.chunks.values_mut() {
            chunk.mark_clean();
        }
    }

    fn local_of(&self, coord: ChunkCoord) -> Result<(u8, u8, u8)> {
        if coord.region() != self.coord {
            return Err(Error::CoordOutOfRange(coord.x, coord.y, coord.z));
        }
        Ok(coord.local_in_region())
    }

    /// Get a chunk if present
    pub fn get_chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        let local = self.local_of(coord).ok()?;
        self.chunks.get(&local)
    }

    /// Get a mutable chunk if present
    pub fn get_chunk_mut(&mut self, coord: ChunkCoord) -> Option<&mut Chunk> {
        let local = self.local_of(coord).ok()?;
        self.chunks.get_mut(&local)
    }

    /// Get a chunk, lazily allocating an all-air one if absent.
    ///
    /// Fails if the coordinate does not fall inside this region.
    pub fn get_or_create_chunk(&mut self, coord: ChunkCoord) -> Result<&mut Chunk> {
        let local = self.local_of(coord)?;
        self.dirty = true;
        Ok(self
            .chunks
            .entry(local)
            .or_insert_with(|| Chunk::new(coord)))
    }

    /// Insert a fully built chunk (generator or deserialization output)
    pub fn insert_chunk(&mut self, chunk: Chunk) -> Result<()> {
        let local = self.local_of(chunk.coord)?;
        self.chunks.insert(local, chunk);
        self.dirty = true;
        Ok(())
    }

    /// Drop the chunk at `coord` if it has become fully air.
    ///
    /// Returns true if a chunk was removed. Keeps sparse storage sparse
    /// after block-break edits hollow a chunk out.
    pub fn remove_chunk_if_empty(&mut self, coord: ChunkCoord) -> bool {
        let Ok(local) = self.local_of(coord) else {
            return false;
        };
        if self.chunks.get(&local).is_some_and(|c| c.is_empty()) {
            self.chunks.remove(&local);
            self.dirty = true;
            true
        } else {
            false
        }
    }

    /// Iterate over all chunks present
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    /// Iterate mutably over all chunks present
    pub fn chunks_mut(&mut self) -> impl Iterator<Item = &mut Chunk> {
        self.chunks.values_mut()
    }

    /// Serialize every present chunk with its 3-byte local header.
    ///
    /// Entries are emitted in sorted local order so the output is
    /// deterministic for a given chunk set.
    pub fn serialize(&self) -> Vec<u8> {
        let mut locals: Vec<_> = self.chunks.keys().copied().collect();
        locals.sort_unstable();

        let mut buf = Vec::with_capacity(4 + locals.len() * ENTRY_BYTES);
        buf.extend_from_slice(&(locals.len() as u32).to_le_bytes());
        for local in locals {
            let chunk = &self.chunks[&local];
            buf.push(local.0);
            buf.push(local.1);
            buf.push(local.2);
            buf.extend_from_slice(&chunk.serialize());
        }
        buf
    }

    /// Inverse of [`Region::serialize`]
    pub fn deserialize(buf: &[u8], coord: RegionCoord) -> Result<Self> {
        if buf.len() < 4 {
            return Err(Error::Serialize("region payload truncated".into()));
        }
        let count = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        let expected = 4 + count * ENTRY_BYTES;
        if buf.len() != expected {
            return Err(Error::Serialize(format!(
                "region payload is {} bytes, expected {} for {} chunks",
                buf.len(),
                expected,
                count
            )));
        }

        let mut region = Region::new(coord);
        for i in 0..count {
            let off = 4 + i * ENTRY_BYTES;
            let (lx, ly, lz) = (buf[off], buf[off + 1], buf[off + 2]);
            if lx as i32 >= crate::world::coords::REGION_SIZE
                || ly as i32 >= crate::world::coords::REGION_SIZE
                || lz as i32 >= crate::world::coords::REGION_SIZE
            {
                return Err(Error::Serialize(format!(
                    "region entry has local coordinate ({}, {}, {}) out of range",
                    lx, ly, lz
                )));
            }
            let chunk_coord = coord.chunk_at(lx, ly, lz);
            let payload = &buf[off + 3..off + ENTRY_BYTES];
            let chunk = Chunk::deserialize(payload, chunk_coord)?;
            if region.chunks.insert((lx, ly, lz), chunk).is_some() {
                return Err(Error::Serialize(format!(
                    "region payload repeats local coordinate ({}, {}, {})",
                    lx, ly, lz
                )));
            }
        }
        region.dirty = false;
        Ok(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_lazy_alloc() {
        let mut region = Region::new(RegionCoord::new(0, 0, 0));
        assert!(region.is_empty());

        let coord = ChunkCoord::new(5, 10, 31);
        let chunk = region.get_or_create_chunk(coord).unwrap();
        assert_eq!(chunk.coord, coord);
        assert_eq!(region.chunk_count(), 1);

        // Second call returns the same chunk, no new allocation
        region
            .get_or_create_chunk(coord)
            .unwrap()
            .set_block(0, 0, 0, 7)
            .unwrap();
        assert_eq!(region.chunk_count(), 1);
    }

    #[test]
    fn test_rejects_foreign_chunk() {
        let mut region = Region::new(RegionCoord::new(0, 0, 0));
        assert!(region.get_or_create_chunk(ChunkCoord::new(32, 0, 0)).is_err());
        assert!(region.get_or_create_chunk(ChunkCoord::new(-1, 0, 0)).is_err());
    }

    #[test]
    fn test_remove_chunk_if_empty() {
        let mut region = Region::new(RegionCoord::new(0, 0, 0));
        let coord = ChunkCoord::new(1, 2, 3);
        region
            .get_or_create_chunk(coord)
            .unwrap()
            .set_block(0, 0, 0, 5)
            .unwrap();

        // Not empty yet
        assert!(!region.remove_chunk_if_empty(coord));
        assert_eq!(region.chunk_count(), 1);

        // Break the block, now it prunes
        region
            .get_chunk_mut(coord)
            .unwrap()
            .set_block(0, 0, 0, 0)
            .unwrap();
        assert!(region.remove_chunk_if_empty(coord));
        assert!(region.is_empty());
    }

    #[test]
    fn test_region_roundtrip() {
        let mut region = Region::new(RegionCoord::new(-1, 0, 2));
        let locals = [(0u8, 0u8, 0u8), (31, 31, 31), (4, 17, 9), (0, 31, 12)];
        for (i, &(lx, ly, lz)) in locals.iter().enumerate() {
            let coord = region.coord.chunk_at(lx, ly, lz);
            let chunk = region.get_or_create_chunk(coord).unwrap();
            chunk
                .set_block(lx as i32 % 16, ly as i32 % 16, lz as i32 % 16, (i + 1) as u16)
                .unwrap();
        }

        let bytes = region.serialize();
        let back = Region::deserialize(&bytes, region.coord).unwrap();

        assert_eq!(back.chunk_count(), region.chunk_count());
        for &(lx, ly, lz) in &locals {
            let coord = region.coord.chunk_at(lx, ly, lz);
            let original = region.get_chunk(coord).unwrap();
            let restored = back.get_chunk(coord).unwrap();
            assert_eq!(restored.coord, coord);
            assert_eq!(restored.voxels()[..], original.voxels()[..]);
            assert_eq!(restored.version(), original.version());
        }

        // Deterministic: serializing the restored region reproduces the bytes
        assert_eq!(back.serialize(), bytes);
    }

    #[test]
    fn test_deserialize_rejects_duplicate_entry() {
        let mut region = Region::new(RegionCoord::new(0, 0, 0));
        let coord = ChunkCoord::new(1, 2, 3);
        region
            .get_or_create_chunk(coord)
            .unwrap()
            .set_block(0, 0, 0, 5)
            .unwrap();

        // Duplicate the single entry and bump the count to match
        let mut bytes = region.serialize();
        let entry = bytes[4..].to_vec();
        bytes.extend_from_slice(&entry);
        bytes[0..4].copy_from_slice(&2u32.to_le_bytes());
        assert!(Region::deserialize(&bytes, region.coord).is_err());
    }

    #[test]
    fn test_deserialize_truncated() {
        let region = Region::new(RegionCoord::new(0, 0, 0));
        let mut bytes = region.serialize();
        bytes.extend_from_slice(&[1, 2, 3]);
        assert!(Region::deserialize(&bytes, region.coord).is_err());
    }
}
