//! # Voxel Side Module
//!
//! This module defines the six faces of a voxel and of a chunk. Chunks use the
//! same enumeration to index their neighbour handles.

use cgmath::Vector3;
use num_derive::FromPrimitive;

/// Represents the six possible faces of a voxel or chunk.
///
/// The discriminant is the index of the face in a chunk's neighbour array.
/// Axis convention: +X is right, +Y is up, +Z is forward.
#[derive(PartialEq, Eq, Hash, Copy, Clone, Debug, FromPrimitive)]
pub enum VoxelSide {
    /// Facing negative X
    LEFT = 0,

    /// Facing positive X
    RIGHT = 1,

    /// Facing negative Y
    BOTTOM = 2,

    /// Facing positive Y
    TOP = 3,

    /// Facing negative Z
    BACK = 4,

    /// Facing positive Z
    FORWARD = 5,
}

impl VoxelSide {
    /// Returns an array containing all six faces in discriminant order.
    pub fn all() -> [VoxelSide; 6] {
        [
            VoxelSide::LEFT,
            VoxelSide::RIGHT,
            VoxelSide::BOTTOM,
            VoxelSide::TOP,
            VoxelSide::BACK,
            VoxelSide::FORWARD,
        ]
    }

    /// Converts a neighbour array index back into a face.
    pub fn from_index(index: usize) -> Option<VoxelSide> {
        num_traits::FromPrimitive::from_usize(index)
    }

    /// Unit offset pointing out of this face.
    pub fn offset(&self) -> Vector3<i32> {
        match self {
            VoxelSide::LEFT => Vector3::new(-1, 0, 0),
            VoxelSide::RIGHT => Vector3::new(1, 0, 0),
            VoxelSide::BOTTOM => Vector3::new(0, -1, 0),
            VoxelSide::TOP => Vector3::new(0, 1, 0),
            VoxelSide::BACK => Vector3::new(0, 0, -1),
            VoxelSide::FORWARD => Vector3::new(0, 0, 1),
        }
    }

    /// The face on the other side of the shared boundary.
    pub fn opposite(&self) -> VoxelSide {
        match self {
            VoxelSide::LEFT => VoxelSide::RIGHT,
            VoxelSide::RIGHT => VoxelSide::LEFT,
            VoxelSide::BOTTOM => VoxelSide::TOP,
            VoxelSide::TOP => VoxelSide::BOTTOM,
            VoxelSide::BACK => VoxelSide::FORWARD,
            VoxelSide::FORWARD => VoxelSide::BACK,
        }
    }

    /// Lowercase face name, used in log and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            VoxelSide::LEFT => "left",
            VoxelSide::RIGHT => "right",
            VoxelSide::BOTTOM => "bottom",
            VoxelSide::TOP => "top",
            VoxelSide::BACK => "back",
            VoxelSide::FORWARD => "forward",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opposites_cancel_offsets() {
        for side in VoxelSide::all() {
            assert_eq!(side.opposite().opposite(), side);
            assert_eq!(side.offset() + side.opposite().offset(), Vector3::new(0, 0, 0));
        }
    }

    #[test]
    fn test_index_round_trip() {
        for side in VoxelSide::all() {
            assert_eq!(VoxelSide::from_index(side as usize), Some(side));
        }
        assert_eq!(VoxelSide::from_index(6), None);
    }
}
