//! # Terrain Generation
//!
//! Deterministic procedural population of chunks:
//!
//! * `height_map` samples ground level, moisture and biome per column,
//! * `biome` holds the per-biome voxel palettes and expanded probability tables,
//! * `terrain_generator` paints a chunk column by column,
//! * `ore` walks ore veins through the painted chunk.
//!
//! Painting never reaches outside the chunk. Anything that must land elsewhere
//! (vegetation above the chunk's top, trees) is handed to a [`PlacementSink`].

use cgmath::Point3;

use super::voxel::VoxelTypeIndex;

pub mod biome;
pub mod height_map;
pub mod ore;
pub mod terrain_generator;

/// Receiver of placements that the painter cannot make itself.
pub trait PlacementSink {
    /// Requests a single vegetation voxel at a world position.
    fn request_vegetation(&mut self, position: Point3<i32>, voxel: VoxelTypeIndex);

    /// Requests a tree rooted at a world position.
    fn request_tree(&mut self, chunk_anchor: Point3<i32>, position: Point3<i32>, tree: &str);
}

/// A vegetation voxel waiting for its chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VegetationRequest {
    /// World position of the voxel.
    pub position: Point3<i32>,
    /// Voxel type to place.
    pub voxel: VoxelTypeIndex,
}

/// A tree waiting for the tree builder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeRequest {
    /// Anchor of the chunk that asked for the tree.
    pub chunk_anchor: Point3<i32>,
    /// World position of the tree root.
    pub position: Point3<i32>,
    /// Tree model name.
    pub tree: String,
}

/// Collects placement requests during a paint pass.
#[derive(Clone, Debug, Default)]
pub struct PlacementRequests {
    /// Vegetation requests in paint order.
    pub vegetation: Vec<VegetationRequest>,
    /// Tree requests in paint order.
    pub trees: Vec<TreeRequest>,
}

impl PlacementRequests {
    /// Returns `true` when nothing was requested.
    pub fn is_empty(&self) -> bool {
        self.vegetation.is_empty() && self.trees.is_empty()
    }
}

impl PlacementSink for PlacementRequests {
    fn request_vegetation(&mut self, position: Point3<i32>, voxel: VoxelTypeIndex) {
        self.vegetation.push(VegetationRequest { position, voxel });
    }

    fn request_tree(&mut self, chunk_anchor: Point3<i32>, position: Point3<i32>, tree: &str) {
        self.trees.push(TreeRequest {
            chunk_anchor,
            position,
            tree: tree.to_string(),
        });
    }
}
