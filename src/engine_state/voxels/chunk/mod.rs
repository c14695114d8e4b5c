//! # Chunk Module
//!
//! This module provides the `Chunk` struct: a fixed 16x16x16 block of voxels plus
//! the metadata the world keeps per chunk (neighbour handles, light sources and
//! the dirty/populated/modified flags).
//!
//! ## Addressing
//!
//! Voxels are stored in a flat array with Y outermost:
//! `index = y * N * N + z * N + x`. Stepping by `1`, `N` and `N * N` moves along
//! X, Z and Y respectively, which keeps neighbour lookups to additions.
//!
//! ## Coordinates
//!
//! A chunk is identified by its chunk coordinate (`ChunkCoord`). The world-space
//! anchor (minimum corner) is `coord * N`, so world positions map to chunks by an
//! arithmetic shift, which floors correctly for negative positions.

use cgmath::{Point3, Vector3};

use super::voxel::voxel_side::VoxelSide;
use super::voxel::{Voxel, MAX_LIGHT};

pub mod chunk_creation;
pub mod chunk_iteration;

/// The dimension (width, height, depth) of a chunk in voxels.
pub const CHUNK_DIMENSION: i32 = 16;
/// Log2 of [`CHUNK_DIMENSION`].
pub const CHUNK_SHIFT: i32 = 4;
/// Mask extracting the local coordinate from a world coordinate.
pub const CHUNK_MASK: i32 = CHUNK_DIMENSION - 1;
/// The number of voxels in a single horizontal plane of a chunk.
pub const CHUNK_PLANE_SIZE: i32 = CHUNK_DIMENSION * CHUNK_DIMENSION;
/// The total number of voxels in a chunk.
pub const CHUNK_SIZE: i32 = CHUNK_PLANE_SIZE * CHUNK_DIMENSION;

/// Chunk coordinates: world position divided by the chunk dimension.
pub type ChunkCoord = Point3<i32>;

/// Non-owning reference to a chunk slot of the chunk pool.
///
/// Handles stay valid while the chunk is resident. Eviction clears every handle
/// that other chunks hold to the evicted slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkHandle(pub(crate) usize);

impl ChunkHandle {
    /// Slot index inside the pool.
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A voxel that emits torch light.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LightSource {
    /// Local voxel index inside the chunk.
    pub voxel_index: usize,
    /// Emitted torch light, 1..=15.
    pub intensity: u8,
}

/// Linear index of a local voxel position.
#[inline]
pub fn local_index_of(x: i32, y: i32, z: i32) -> usize {
    (y * CHUNK_PLANE_SIZE + z * CHUNK_DIMENSION + x) as usize
}

/// Local position of a linear voxel index.
#[inline]
pub fn local_position_of(index: usize) -> Point3<i32> {
    let index = index as i32;
    Point3::new(
        index & CHUNK_MASK,
        index >> (2 * CHUNK_SHIFT),
        (index >> CHUNK_SHIFT) & CHUNK_MASK,
    )
}

/// Chunk coordinate owning a world position.
#[inline]
pub fn chunk_coord_of(world_pos: Point3<i32>) -> ChunkCoord {
    Point3::new(
        world_pos.x >> CHUNK_SHIFT,
        world_pos.y >> CHUNK_SHIFT,
        world_pos.z >> CHUNK_SHIFT,
    )
}

/// Local position of a world position inside its owning chunk.
#[inline]
pub fn local_position_in_chunk(world_pos: Point3<i32>) -> Point3<i32> {
    Point3::new(
        world_pos.x & CHUNK_MASK,
        world_pos.y & CHUNK_MASK,
        world_pos.z & CHUNK_MASK,
    )
}

/// Faces of the chunk that a local voxel touches.
pub fn border_sides_of(index: usize) -> impl Iterator<Item = VoxelSide> {
    let p = local_position_of(index);
    let max = CHUNK_DIMENSION - 1;
    [
        (p.x == 0, VoxelSide::LEFT),
        (p.x == max, VoxelSide::RIGHT),
        (p.y == 0, VoxelSide::BOTTOM),
        (p.y == max, VoxelSide::TOP),
        (p.z == 0, VoxelSide::BACK),
        (p.z == max, VoxelSide::FORWARD),
    ]
    .into_iter()
    .filter_map(|(touches, side)| touches.then_some(side))
}

/// Represents a 16x16x16 collection of voxels in the world.
#[derive(Clone, Debug)]
pub struct Chunk {
    /// The position of this chunk in chunk coordinates.
    pub coord: ChunkCoord,
    /// The voxel array, `CHUNK_SIZE` long, see [`local_index_of`].
    pub voxels: Vec<Voxel>,
    /// Face-adjacent resident chunks, indexed by `VoxelSide as usize`.
    pub neighbours: [Option<ChunkHandle>; 6],
    /// Sunlight falls through this chunk without attenuation.
    pub is_above_surface: bool,
    /// Terrain generation (or a load) has filled this chunk.
    pub is_populated: bool,
    /// Content or light changed since the renderer last took the chunk.
    pub is_dirty: bool,
    /// Chunk is waiting in the render queue.
    pub in_queue: bool,
    /// Chunk holds edits that are not saved yet. Modified chunks are never evicted.
    pub modified: bool,
    /// Torch emitters inside this chunk.
    pub light_sources: Vec<LightSource>,
}

impl Chunk {
    /// Creates a new, completely empty chunk.
    ///
    /// # Arguments
    /// * `coord` - The chunk coordinates of the new chunk
    ///
    /// # Returns
    /// A new `Chunk` filled with empty voxels.
    pub fn new(coord: ChunkCoord) -> Self {
        Chunk {
            coord,
            voxels: vec![Voxel::EMPTY; CHUNK_SIZE as usize],
            neighbours: [None; 6],
            is_above_surface: false,
            is_populated: false,
            is_dirty: false,
            in_queue: false,
            modified: false,
            light_sources: Vec::new(),
        }
    }

    /// Creates a chunk filled with a single voxel (for tests and flat worlds).
    pub fn filled(coord: ChunkCoord, voxel: Voxel) -> Self {
        let mut chunk = Chunk::new(coord);
        chunk.voxels.fill(voxel);
        chunk
    }

    /// Clears the chunk for reuse at another coordinate.
    ///
    /// Voxels are emptied, flags reset and light sources removed. Neighbour handles
    /// must already have been unlinked by the pool.
    pub fn reset(&mut self, coord: ChunkCoord) {
        self.coord = coord;
        self.voxels.fill(Voxel::EMPTY);
        self.neighbours = [None; 6];
        self.is_above_surface = false;
        self.is_populated = false;
        self.is_dirty = false;
        self.in_queue = false;
        self.modified = false;
        self.light_sources.clear();
    }

    /// World-space minimum corner of the chunk.
    pub fn anchor(&self) -> Point3<i32> {
        Point3::new(
            self.coord.x * CHUNK_DIMENSION,
            self.coord.y * CHUNK_DIMENSION,
            self.coord.z * CHUNK_DIMENSION,
        )
    }

    /// World position of a local voxel index.
    pub fn world_position_of(&self, index: usize) -> Point3<i32> {
        let local = local_position_of(index);
        let anchor = self.anchor();
        Point3::new(anchor.x + local.x, anchor.y + local.y, anchor.z + local.z)
    }

    /// Returns `true` when the world position lies inside this chunk.
    pub fn contains(&self, world_pos: Point3<i32>) -> bool {
        chunk_coord_of(world_pos) == self.coord
    }

    /// Neighbour handle on the given face.
    #[inline]
    pub fn neighbour(&self, side: VoxelSide) -> Option<ChunkHandle> {
        self.neighbours[side as usize]
    }

    /// Coordinate of the chunk adjacent on the given face.
    pub fn neighbour_coord(&self, side: VoxelSide) -> ChunkCoord {
        self.coord + side.offset()
    }

    /// Returns `true` when any voxel has content.
    pub fn has_content(&self) -> bool {
        self.voxels.iter().any(|v| v.has_content() || v.water_level > 0)
    }

    /// Registers (or updates) a torch emitter.
    pub fn add_light_source(&mut self, voxel_index: usize, intensity: u8) {
        let intensity = intensity.min(MAX_LIGHT);
        match self
            .light_sources
            .iter_mut()
            .find(|s| s.voxel_index == voxel_index)
        {
            Some(source) => source.intensity = intensity,
            None => self.light_sources.push(LightSource {
                voxel_index,
                intensity,
            }),
        }
    }

    /// Removes a torch emitter. Returns `true` if one was registered.
    pub fn remove_light_source(&mut self, voxel_index: usize) -> bool {
        let before = self.light_sources.len();
        self.light_sources.retain(|s| s.voxel_index != voxel_index);
        self.light_sources.len() != before
    }

    /// Local index of the voxel at `offset` from `index`, if it stays inside the chunk.
    pub fn offset_index(index: usize, offset: Vector3<i32>) -> Option<usize> {
        let p = local_position_of(index) + offset;
        let range = 0..CHUNK_DIMENSION;
        (range.contains(&p.x) && range.contains(&p.y) && range.contains(&p.z))
            .then(|| local_index_of(p.x, p.y, p.z))
    }
}
