//! Voxel AABB collision and edge-proximity queries
//!
//! The moving body is an axis-aligned box of fixed width and height
//! anchored at a feet position. Displacement is resolved axis by axis
//! (X, then Y, then Z) against the loaded chunk map; everything here is
//! pure, so velocity-integration policy stays with the caller.
//!
//! Axis-sequential resolution is not a true continuous 3D sweep: thin
//! or diagonal geometry can be tunneled through at high velocity.

use crate::core::types::{BlockId, Vec3};
use crate::math::Aabb;
use crate::world::chunk::Chunk;
use crate::world::coords::ChunkCoord;

/// Thin slab under the feet used for support queries
const SUPPORT_DEPTH: f32 = 0.05;

/// Read access to the loaded chunk map.
///
/// `None` means the chunk is not resident; unloaded space has no
/// collision boxes and bodies fall through it.
pub trait BlockSource {
    fn block_at(&self, wx: i32, wy: i32, wz: i32) -> Option<BlockId>;

    /// Solid iff the block is loaded and not air
    fn is_block_solid(&self, wx: i32, wy: i32, wz: i32) -> bool {
        matches!(self.block_at(wx, wy, wz), Some(id) if id != 0)
    }
}

impl BlockSource for std::collections::HashMap<ChunkCoord, Chunk> {
    fn block_at(&self, wx: i32, wy: i32, wz: i32) -> Option<BlockId> {
        let chunk = self.get(&ChunkCoord::containing(wx, wy, wz))?;
        let (lx, ly, lz) = ChunkCoord::local_offset(wx, wy, wz);
        chunk.get_block(lx, ly, lz).ok()
    }
}

/// Result of one collision sweep
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SweepResult {
    /// Final feet position
    pub position: Vec3,
    /// Displacement actually applied, per axis
    pub velocity: Vec3,
    /// True if the Y axis was cancelled while moving downward
    pub on_ground: bool,
    /// Block directly beneath the feet after a landing
    pub ground_block: Option<BlockId>,
}

/// Visit every integer cell whose unit box touches `aabb`
fn solid_cells<S: BlockSource>(chunks: &S, aabb: &Aabb) -> Vec<(i32, i32, i32)> {
    let mut cells = Vec::new();
    let min_x = aabb.min.x.floor() as i32;
    let max_x = aabb.max.x.floor() as i32;
    let min_y = aabb.min.y.floor() as i32;
    let max_y = aabb.max.y.floor() as i32;
    let min_z = aabb.min.z.floor() as i32;
    let max_z = aabb.max.z.floor() as i32;
    for y in min_y..=max_y {
        for z in min_z..=max_z {
            for x in min_x..=max_x {
                if chunks.is_block_solid(x, y, z)
                    && aabb.intersects(&Aabb::block_cell(x, y, z))
                {
                    cells.push((x, y, z));
                }
            }
        }
    }
    cells
}

/// Sweep a body AABB through the world, resolving each axis in turn.
///
/// X and Z collisions cancel that axis's displacement and keep the
/// prior coordinate. Y collisions resolve to exact contact with the
/// colliding block face, so a landing stops precisely on the block top;
/// a downward Y collision also reports `on_ground` and samples the
/// block beneath the feet for the caller's friction handling.
pub fn sweep_aabb<S: BlockSource>(
    chunks: &S,
    position: Vec3,
    delta: Vec3,
    width: f32,
    height: f32,
) -> SweepResult {
    let mut pos = position;
    let mut applied = Vec3::ZERO;
    let mut on_ground = false;
    let mut ground_block = None;

    // X axis
    if delta.x != 0.0 {
        let tentative = Vec3::new(pos.x + delta.x, pos.y, pos.z);
        let body = Aabb::from_feet(tentative, width, height);
        if solid_cells(chunks, &body).is_empty() {
            pos = tentative;
            applied.x = delta.x;
        }
    }

    // Y axis
    if delta.y != 0.0 {
        let tentative = Vec3::new(pos.x, pos.y + delta.y, pos.z);
        let body = Aabb::from_feet(tentative, width, height);
        let hits = solid_cells(chunks, &body);
        if hits.is_empty() {
            pos = tentative;
            applied.y = delta.y;
        } else if delta.y < 0.0 {
            // Landing: snap the feet to the highest colliding block top
            let top = hits
                .iter()
                .map(|&(_, y, _)| (y + 1) as f32)
                .fold(f32::NEG_INFINITY, f32::max);
            let landed = top.min(pos.y);
            applied.y = landed - pos.y;
            pos.y = landed;
            on_ground = true;
            ground_block = chunks.block_at(
                pos.x.floor() as i32,
                (pos.y - 0.5).floor() as i32,
                pos.z.floor() as i32,
            );
        } else {
            // Head bump: clamp to the lowest colliding block bottom
            let bottom = hits
                .iter()
                .map(|&(_, y, _)| y as f32)
                .fold(f32::INFINITY, f32::min);
            let clamped = (bottom - height).max(pos.y);
            applied.y = clamped - pos.y;
            pos.y = clamped;
        }
    }

    // Z axis
    if delta.z != 0.0 {
        let tentative = Vec3::new(pos.x, pos.y, pos.z + delta.z);
        let body = Aabb::from_feet(tentative, width, height);
        if solid_cells(chunks, &body).is_empty() {
            pos = tentative;
            applied.z = delta.z;
        }
    }

    SweepResult {
        position: pos,
        velocity: applied,
        on_ground,
        ground_block,
    }
}

/// Support slab directly beneath the feet at `pos`
fn support_slab(pos: Vec3, width: f32) -> Aabb {
    let half = width * 0.5;
    Aabb::new(
        Vec3::new(pos.x - half, pos.y - SUPPORT_DEPTH, pos.z - half),
        Vec3::new(pos.x + half, pos.y, pos.z + half),
    )
}

fn has_support<S: BlockSource>(chunks: &S, pos: Vec3, width: f32) -> bool {
    !solid_cells(chunks, &support_slab(pos, width)).is_empty()
}

/// Would a hypothetical X-axis move leave the footprint with zero solid
/// support? Used to block sneak-walking off ledges while permitting
/// perpendicular movement.
pub fn would_fall_off_edge_x<S: BlockSource>(
    chunks: &S,
    pos: Vec3,
    dx: f32,
    width: f32,
    _height: f32,
) -> bool {
    let moved = Vec3::new(pos.x + dx, pos.y, pos.z);
    !has_support(chunks, moved, width)
}

/// Z-axis counterpart of [`would_fall_off_edge_x`]
pub fn would_fall_off_edge_z<S: BlockSource>(
    chunks: &S,
    pos: Vec3,
    dz: f32,
    width: f32,
    _height: f32,
) -> bool {
    let moved = Vec3::new(pos.x, pos.y, pos.z + dz);
    !has_support(chunks, moved, width)
}

/// Fraction of the footprint hanging over air, in [0, 1].
///
/// 0 means fully supported, 1 means no support at all; the continuous
/// signal lets callers slow movement smoothly near ledges instead of
/// stopping hard.
pub fn edge_proximity<S: BlockSource>(chunks: &S, pos: Vec3, width: f32) -> f32 {
    let slab = support_slab(pos, width);
    let footprint = width * width;
    if footprint <= 0.0 {
        return 1.0;
    }
    let mut supported = 0.0;
    for (x, y, z) in solid_cells(chunks, &slab) {
        supported += slab.overlap_area_xz(&Aabb::block_cell(x, y, z));
    }
    (1.0 - supported / footprint).clamp(0.0, 1.0)
}
