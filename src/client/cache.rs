//! Client chunk and mesh cache with version-based invalidation
//!
//! Owns the rendering-authoritative chunk map and a parallel mesh cache
//! keyed by packed chunk coordinate. A cached mesh is valid iff the
//! version it was built from equals the chunk's current version; on any
//! mismatch it is evicted and regenerated.
//!
//! Mesh generation requests are strictly FIFO with one in flight at a
//! time. Repeated requests for the same coordinate are not deduplicated
//! while one is queued; the duplicate build is wasted work, accepted to
//! keep the queue trivial.

use std::collections::{HashMap, VecDeque};

use crate::core::types::BlockId;
use crate::mesher::{ChunkSnapshot, MeshData, MeshInput};
use crate::physics::BlockSource;
use crate::world::chunk::Chunk;
use crate::world::coords::ChunkCoord;

/// Default bound on cached meshes
pub const DEFAULT_MESH_CAPACITY: usize = 1024;

/// A cached mesh stamped with the chunk version it was built from
struct MeshEntry {
    mesh: MeshData,
    version: u32,
    last_access: u64,
}

/// Outcome of a mesh request
#[derive(Debug, PartialEq)]
pub enum MeshRequest<'a> {
    /// Cache hit: the mesh is current for the chunk's version
    Cached(&'a MeshData),
    /// Queued for generation
    Queued,
    /// No such chunk is resident
    NoChunk,
}

/// In-memory chunk + mesh store for one client session
pub struct ClientChunkCache {
    chunks: HashMap<u64, Chunk>,
    meshes: HashMap<u64, MeshEntry>,
    mesh_capacity: usize,
    /// FIFO queue of pending mesh generations
    queue: VecDeque<ChunkCoord>,
    /// Coordinate currently being meshed, if any
    in_flight: Option<ChunkCoord>,
    /// Monotonic access clock for LRU eviction
    access_clock: u64,
}

impl ClientChunkCache {
    pub fn new(mesh_capacity: usize) -> Self {
        Self {
            chunks: HashMap::new(),
            meshes: HashMap::new(),
            mesh_capacity,
            queue: VecDeque::new(),
            in_flight: None,
            access_clock: 0,
        }
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Get a resident chunk
    pub fn get_chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get(&coord.packed())
    }

    /// Replace the stored chunk with a server-authoritative copy.
    ///
    /// If a cached mesh was built from a different version it is
    /// evicted here; a matching version keeps the mesh.
    pub fn set_chunk(&mut self, chunk: Chunk) {
        let key = chunk.coord.packed();
        let stale = self
            .meshes
            .get(&key)
            .is_some_and(|entry| entry.version != chunk.version());
        if stale {
            self.meshes.remove(&key);
        }
        self.chunks.insert(key, chunk);
    }

    /// Drop a chunk and its mesh
    pub fn remove_chunk(&mut self, coord: ChunkCoord) -> Option<Chunk> {
        let key = coord.packed();
        self.meshes.remove(&key);
        self.chunks.remove(&key)
    }

    /// Apply a single-voxel update at absolute world coordinates.
    ///
    /// Invalidates the owning chunk's mesh and the meshes of all 26
    /// adjacent chunks, since boundary face culling depends on neighbor
    /// content. Updates for non-resident chunks are dropped with a
    /// warning; they are not buffered for replay.
    pub fn apply_block_update(&mut self, wx: i32, wy: i32, wz: i32, id: BlockId) -> bool {
        let coord = ChunkCoord::containing(wx, wy, wz);
        let (lx, ly, lz) = ChunkCoord::local_offset(wx, wy, wz);

        let Some(chunk) = self.chunks.get_mut(&coord.packed()) else {
            log::warn!(
                "dropping block update at ({}, {}, {}): chunk ({}, {}, {}) not resident",
                wx,
                wy,
                wz,
                coord.x,
                coord.y,
                coord.z
            );
            return false;
        };
        if let Err(e) = chunk.set_block(lx, ly, lz, id) {
            log::warn!("rejected block update at ({}, {}, {}): {}", wx, wy, wz, e);
            return false;
        }

        self.meshes.remove(&coord.packed());
        for neighbor in coord.neighbors() {
            self.meshes.remove(&neighbor.packed());
        }
        true
    }

    /// Return the cached mesh if its version stamp matches the chunk's
    /// current version, otherwise enqueue a generation request.
    pub fn request_mesh(&mut self, coord: ChunkCoord) -> MeshRequest<'_> {
        let key = coord.packed();
        let Some(chunk) = self.chunks.get(&key) else {
            return MeshRequest::NoChunk;
        };
        let current = chunk.version();

        let valid = self
            .meshes
            .get(&key)
            .is_some_and(|entry| entry.version == current);
        if valid {
            self.access_clock += 1;
            let clock = self.access_clock;
            let entry = self.meshes.get_mut(&key).expect("checked above");
            entry.last_access = clock;
            return MeshRequest::Cached(&self.meshes[&key].mesh);
        }

        self.meshes.remove(&key);
        self.queue.push_back(coord);
        MeshRequest::Queued
    }

    /// Take the next mesh job if none is in flight (strict FIFO, one at
    /// a time). The returned input snapshots the chunk and whatever
    /// neighbors are resident.
    pub fn next_mesh_job(&mut self) -> Option<(ChunkCoord, MeshInput)> {
        if self.in_flight.is_some() {
            return None;
        }
        loop {
            let coord = self.queue.pop_front()?;
            // The chunk may have been removed while queued
            if let Some(input) = self.mesh_input(coord) {
                self.in_flight = Some(coord);
                return Some((coord, input));
            }
        }
    }

    /// Snapshot a chunk plus its resident neighbors for the mesher
    pub fn mesh_input(&self, coord: ChunkCoord) -> Option<MeshInput> {
        let chunk = self.get_chunk(coord)?;
        let mut input = MeshInput::new(ChunkSnapshot::from_chunk(chunk));
        for neighbor in coord.neighbors() {
            if let Some(neighbor_chunk) = self.get_chunk(neighbor) {
                input.set_neighbor(
                    neighbor.x - coord.x,
                    neighbor.y - coord.y,
                    neighbor.z - coord.z,
                    Box::new(*neighbor_chunk.voxels()),
                );
            }
        }
        Some(input)
    }

    /// Store a finished mesh, clearing the in-flight slot.
    ///
    /// The mesh is stamped with the version it was built from; if the
    /// chunk has moved on since the snapshot was taken, the stale mesh
    /// is discarded and the next request will queue a rebuild.
    pub fn store_mesh(&mut self, coord: ChunkCoord, built_version: u32, mesh: MeshData) {
        if self.in_flight == Some(coord) {
            self.in_flight = None;
        }
        let key = coord.packed();
        let Some(chunk) = self.chunks.get(&key) else {
            return;
        };
        if chunk.version() != built_version {
            log::debug!(
                "discarding stale mesh for ({}, {}, {}): built v{}, chunk at v{}",
                coord.x,
                coord.y,
                coord.z,
                built_version,
                chunk.version()
            );
            return;
        }
        self.access_clock += 1;
        self.meshes.insert(
            key,
            MeshEntry {
                mesh,
                version: built_version,
                last_access: self.access_clock,
            },
        );
        self.enforce_mesh_capacity();
    }

    /// Abort the in-flight job without storing (worker failure/timeout)
    pub fn abort_mesh_job(&mut self, coord: ChunkCoord) {
        if self.in_flight == Some(coord) {
            self.in_flight = None;
        }
    }

    fn enforce_mesh_capacity(&mut self) {
        while self.meshes.len() > self.mesh_capacity {
            let Some((&key, _)) = self
                .meshes
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
            else {
                return;
            };
            self.meshes.remove(&key);
            log::debug!("evicted least-recently-used mesh (capacity {})", self.mesh_capacity);
        }
    }
}

impl Default for ClientChunkCache {
    fn default() -> Self {
        Self::new(DEFAULT_MESH_CAPACITY)
    }
}

impl BlockSource for ClientChunkCache {
    fn block_at(&self, wx: i32, wy: i32, wz: i32) -> Option<BlockId> {
        let chunk = self.get_chunk(ChunkCoord::containing(wx, wy, wz))?;
        let (lx, ly, lz) = ChunkCoord::local_offset(wx, wy, wz);
        chunk.get_block(lx, ly, lz).ok()
    }
}
