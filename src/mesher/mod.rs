//! Face-culling chunk mesher
//!
//! Consumes one chunk's grid plus snapshots of up to 26 neighboring
//! chunks and emits a quad for every solid-voxel face whose adjacent
//! voxel is not solid. A missing neighbor snapshot means "unknown", not
//! "air": faces against unknown terrain are emitted rather than culled,
//! trading a possible double-rendered seam for never opening a hole
//! into unloaded chunks.
//!
//! Deliberately naive per-voxel meshing, O(volume x 6); no greedy
//! merging. Output is deterministic: identical input always produces
//! byte-identical buffers.

use bytemuck::{Pod, Zeroable};

use crate::core::types::BlockId;
use crate::world::chunk::{voxel_index, CHUNK_VOLUME};
use crate::world::coords::{ChunkCoord, CHUNK_SIZE};

/// One mesh vertex: position (chunk-local), flat normal, atlas UV
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

/// Flat vertex/index buffers for one chunk
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of quads in the mesh
    pub fn quad_count(&self) -> usize {
        self.indices.len() / 6
    }

    /// Vertex buffer as raw bytes (GPU upload / determinism checks)
    pub fn vertex_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }
}

/// Shared texture-atlas layout; UVs are resolved by (block id, face)
#[derive(Clone, Copy, Debug)]
pub struct AtlasLayout {
    /// Square atlas, this many tiles per side
    pub tiles_per_side: u32,
}

impl Default for AtlasLayout {
    fn default() -> Self {
        Self { tiles_per_side: 16 }
    }
}

impl AtlasLayout {
    /// UV rectangle (origin, tile extent) for a block face.
    ///
    /// Tiles are laid out row-major as `block_id * 6 + face`, wrapping
    /// within the atlas.
    pub fn uv_rect(&self, block: BlockId, face: usize) -> ([f32; 2], f32) {
        let tile_count = self.tiles_per_side * self.tiles_per_side;
        let tile = (block as u32 * 6 + face as u32) % tile_count;
        let extent = 1.0 / self.tiles_per_side as f32;
        let u = (tile % self.tiles_per_side) as f32 * extent;
        let v = (tile / self.tiles_per_side) as f32 * extent;
        ([u, v], extent)
    }
}

/// Owned copy of a chunk's grid, as handed to the mesh worker
#[derive(Clone)]
pub struct ChunkSnapshot {
    pub coord: ChunkCoord,
    pub version: u32,
    pub voxels: Box<[BlockId; CHUNK_VOLUME]>,
}

impl ChunkSnapshot {
    pub fn from_chunk(chunk: &crate::world::chunk::Chunk) -> Self {
        Self {
            coord: chunk.coord,
            version: chunk.version(),
            voxels: Box::new(*chunk.voxels()),
        }
    }
}

/// What an adjacency probe found
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Sample {
    Solid,
    Empty,
    /// Probe landed in a chunk we have no snapshot for
    Unknown,
}

/// Mesh input: the chunk plus up to 26 neighbor snapshots indexed by
/// offset
pub struct MeshInput {
    pub chunk: ChunkSnapshot,
    neighbors: [Option<Box<[BlockId; CHUNK_VOLUME]>>; 27],
}

/// Slot for a neighbor offset, each component in -1..=1
fn neighbor_slot(dx: i32, dy: i32, dz: i32) -> usize {
    ((dx + 1) * 9 + (dy + 1) * 3 + (dz + 1)) as usize
}

impl MeshInput {
    pub fn new(chunk: ChunkSnapshot) -> Self {
        Self {
            chunk,
            neighbors: std::array::from_fn(|_| None),
        }
    }

    /// Attach a neighbor snapshot at the given chunk offset
    pub fn set_neighbor(&mut self, dx: i32, dy: i32, dz: i32, voxels: Box<[BlockId; CHUNK_VOLUME]>) {
        debug_assert!((-1..=1).contains(&dx) && (-1..=1).contains(&dy) && (-1..=1).contains(&dz));
        debug_assert!(dx != 0 || dy != 0 || dz != 0);
        self.neighbors[neighbor_slot(dx, dy, dz)] = Some(voxels);
    }

    /// Probe the voxel at extended local coordinates, each in -16..32,
    /// resolving into the correct neighbor snapshot when outside 0..16
    fn sample(&self, x: i32, y: i32, z: i32) -> Sample {
        let dx = x.div_euclid(CHUNK_SIZE);
        let dy = y.div_euclid(CHUNK_SIZE);
        let dz = z.div_euclid(CHUNK_SIZE);
        let (lx, ly, lz) = (
            x.rem_euclid(CHUNK_SIZE),
            y.rem_euclid(CHUNK_SIZE),
            z.rem_euclid(CHUNK_SIZE),
        );

        let grid = if dx == 0 && dy == 0 && dz == 0 {
            &*self.chunk.voxels
        } else {
            match &self.neighbors[neighbor_slot(dx, dy, dz)] {
                Some(voxels) => &**voxels,
                None => return Sample::Unknown,
            }
        };
        if grid[voxel_index(lx, ly, lz)] != 0 {
            Sample::Solid
        } else {
            Sample::Empty
        }
    }
}

struct FaceDef {
    normal: [f32; 3],
    offset: [i32; 3],
    corners: [[f32; 3]; 4],
}

/// The 6 face directions in fixed emission order: +X, -X, +Y, -Y, +Z, -Z
const FACES: [FaceDef; 6] = [
    FaceDef {
        normal: [1.0, 0.0, 0.0],
        offset: [1, 0, 0],
        corners: [
            [1.0, 0.0, 1.0],
            [1.0, 1.0, 1.0],
            [1.0, 1.0, 0.0],
            [1.0, 0.0, 0.0],
        ],
    },
    FaceDef {
        normal: [-1.0, 0.0, 0.0],
        offset: [-1, 0, 0],
        corners: [
            [0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 1.0, 1.0],
            [0.0, 0.0, 1.0],
        ],
    },
    FaceDef {
        normal: [0.0, 1.0, 0.0],
        offset: [0, 1, 0],
        corners: [
            [0.0, 1.0, 1.0],
            [0.0, 1.0, 0.0],
            [1.0, 1.0, 0.0],
            [1.0, 1.0, 1.0],
        ],
    },
    FaceDef {
        normal: [0.0, -1.0, 0.0],
        offset: [0, -1, 0],
        corners: [
            [0.0, 0.0, 0.0],
            [0.0, 0.0, 1.0],
            [1.0, 0.0, 1.0],
            [1.0, 0.0, 0.0],
        ],
    },
    FaceDef {
        normal: [0.0, 0.0, 1.0],
        offset: [0, 0, 1],
        corners: [
            [0.0, 0.0, 1.0],
            [0.0, 1.0, 1.0],
            [1.0, 1.0, 1.0],
            [1.0, 0.0, 1.0],
        ],
    },
    FaceDef {
        normal: [0.0, 0.0, -1.0],
        offset: [0, 0, -1],
        corners: [
            [1.0, 0.0, 0.0],
            [1.0, 1.0, 0.0],
            [0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0],
        ],
    },
];

/// Per-corner UV within a face's tile rectangle
const CORNER_UV: [[f32; 2]; 4] = [[0.0, 1.0], [0.0, 0.0], [1.0, 0.0], [1.0, 1.0]];

/// Build the mesh for one chunk.
///
/// Iterates voxels in `y, z, x` ascending order and faces in the fixed
/// table order so output depends only on the input grids.
pub fn build_mesh(input: &MeshInput, atlas: &AtlasLayout) -> MeshData {
    let mut mesh = MeshData::default();

    for y in 0..CHUNK_SIZE {
        for z in 0..CHUNK_SIZE {
            for x in 0..CHUNK_SIZE {
                let block = input.chunk.voxels[voxel_index(x, y, z)];
                if block == 0 {
                    continue;
                }
                for (face_index, face) in FACES.iter().enumerate() {
                    let sample = input.sample(
                        x + face.offset[0],
                        y + face.offset[1],
                        z + face.offset[2],
                    );
                    // Solid neighbor hides the face; unknown neighbors
                    // are rendered conservatively
                    if sample == Sample::Solid {
                        continue;
                    }
                    emit_quad(&mut mesh, x, y, z, block, face_index, face, atlas);
                }
            }
        }
    }
    mesh
}

fn emit_quad(
    mesh: &mut MeshData,
    x: i32,
    y: i32,
    z: i32,
    block: BlockId,
    face_index: usize,
    face: &FaceDef,
    atlas: &AtlasLayout,
) {
    let base = mesh.vertices.len() as u32;
    let (uv_origin, uv_extent) = atlas.uv_rect(block, face_index);

    for (corner, corner_uv) in face.corners.iter().zip(CORNER_UV.iter()) {
        mesh.vertices.push(Vertex {
            position: [
                x as f32 + corner[0],
                y as f32 + corner[1],
                z as f32 + corner[2],
            ],
            normal: face.normal,
            uv: [
                uv_origin[0] + corner_uv[0] * uv_extent,
                uv_origin[1] + corner_uv[1] * uv_extent,
            ],
        });
    }
    mesh.indices
        .extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::chunk::Chunk;

    fn snapshot_with(voxels: &[((i32, i32, i32), BlockId)]) -> ChunkSnapshot {
        let mut chunk = Chunk::new(ChunkCoord::new(0, 0, 0));
        for &((x, y, z), id) in voxels {
            chunk.set_block(x, y, z, id).unwrap();
        }
        ChunkSnapshot::from_chunk(&chunk)
    }

    fn solid_grid() -> Box<[BlockId; CHUNK_VOLUME]> {
        Box::new([1; CHUNK_VOLUME])
    }

    fn empty_grid() -> Box<[BlockId; CHUNK_VOLUME]> {
        Box::new([0; CHUNK_VOLUME])
    }

    #[test]
    fn test_single_voxel_all_faces() {
        let input = MeshInput::new(snapshot_with(&[((8, 8, 8), 1)]));
        let mesh = build_mesh(&input, &AtlasLayout::default());
        assert_eq!(mesh.quad_count(), 6);
        assert_eq!(mesh.vertices.len(), 24);
        assert_eq!(mesh.indices.len(), 36);
    }

    #[test]
    fn test_adjacent_voxels_cull_shared_faces() {
        let input = MeshInput::new(snapshot_with(&[((8, 8, 8), 1), ((9, 8, 8), 1)]));
        let mesh = build_mesh(&input, &AtlasLayout::default());
        // 12 faces total, minus the two touching ones
        assert_eq!(mesh.quad_count(), 10);
    }

    #[test]
    fn test_air_chunk_empty_mesh() {
        let input = MeshInput::new(snapshot_with(&[]));
        let mesh = build_mesh(&input, &AtlasLayout::default());
        assert!(mesh.is_empty());
    }

    #[test]
    fn test_missing_neighbor_renders_boundary_face() {
        // Voxel on the +X border, no neighbor snapshot: the boundary
        // face must be emitted
        let input = MeshInput::new(snapshot_with(&[((15, 8, 8), 1)]));
        let mesh = build_mesh(&input, &AtlasLayout::default());
        assert_eq!(mesh.quad_count(), 6);
    }

    #[test]
    fn test_solid_neighbor_culls_boundary_face() {
        let mut input = MeshInput::new(snapshot_with(&[((15, 8, 8), 1)]));
        input.set_neighbor(1, 0, 0, solid_grid());
        let mesh = build_mesh(&input, &AtlasLayout::default());
        assert_eq!(mesh.quad_count(), 5);
    }

    #[test]
    fn test_empty_neighbor_keeps_boundary_face() {
        let mut input = MeshInput::new(snapshot_with(&[((15, 8, 8), 1)]));
        input.set_neighbor(1, 0, 0, empty_grid());
        let mesh = build_mesh(&input, &AtlasLayout::default());
        assert_eq!(mesh.quad_count(), 6);
    }

    #[test]
    fn test_deterministic_output() {
        let mut input = MeshInput::new(snapshot_with(&[
            ((0, 0, 0), 1),
            ((15, 15, 15), 2),
            ((7, 3, 9), 3),
        ]));
        input.set_neighbor(-1, 0, 0, solid_grid());
        let atlas = AtlasLayout::default();

        let a = build_mesh(&input, &atlas);
        let b = build_mesh(&input, &atlas);
        assert_eq!(a.vertex_bytes(), b.vertex_bytes());
        assert_eq!(a.indices, b.indices);
    }

    #[test]
    fn test_uv_resolved_per_block_and_face() {
        let atlas = AtlasLayout::default();
        let (stone_top, _) = atlas.uv_rect(1, 2);
        let (stone_bottom, _) = atlas.uv_rect(1, 3);
        let (dirt_top, _) = atlas.uv_rect(2, 2);
        assert_ne!(stone_top, stone_bottom);
        assert_ne!(stone_top, dirt_top);
    }
}
