//! # Voxel Module
//!
//! This module provides the packed voxel cell stored in every chunk, together with
//! the voxel definition registry, the six voxel faces and the optional placement
//! resolvers ("connected voxels").

pub mod connected;
pub mod voxel_definition;
pub mod voxel_side;

/// The underlying integer type used to reference a voxel definition.
///
/// `0` is the empty voxel, `1` is a hole left by cave carving or unfinished
/// generation, and every registered definition starts at `2`.
pub type VoxelTypeIndex = u16;

/// Type index of an empty (air) voxel.
pub const EMPTY_TYPE: VoxelTypeIndex = 0;
/// Type index of a hole: carved space that has no content yet.
pub const HOLE_TYPE: VoxelTypeIndex = 1;
/// First type index handed out by the registry.
pub const FIRST_DEFINITION_TYPE: VoxelTypeIndex = 2;

/// Maximum light level (both sun and torch).
pub const MAX_LIGHT: u8 = 15;
/// Opacity of a voxel that fully blocks light.
pub const FULL_OPACITY: u8 = 15;
/// Water level of a full water voxel.
pub const MAX_WATER_LEVEL: u8 = 15;

/// Bits of `flags` holding the texture rotation (0..=3).
pub const ROTATION_MASK: u8 = 0b0000_0011;

/// Represents a single voxel cell in the world.
///
/// The layout is fixed (`#[repr(C)]`, 12 bytes, no padding) so whole chunk arrays
/// can be reinterpreted as bytes by a mesh builder through `bytemuck`.
///
/// # Invariants
/// * `type_index <= HOLE_TYPE` implies `opacity == 0`.
/// * `light >= torch_light` once the propagator has drained.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable, Debug, PartialEq, Eq, Default)]
pub struct Voxel {
    /// Definition index, see [`VoxelTypeIndex`].
    pub type_index: VoxelTypeIndex,
    /// Combined sun and torch light, 0..=15.
    pub light: u8,
    /// Torch contribution to `light`, 0..=15.
    pub torch_light: u8,
    /// Light obstruction, 0..=15. 15 blocks light entirely.
    pub opacity: u8,
    /// Fluid fill amount, 0..=15.
    pub water_level: u8,
    /// Texture rotation in the low two bits, orientation bits above.
    pub flags: u8,
    _padding: u8,
    /// RGBA tint.
    pub color: [u8; 4],
}

impl Voxel {
    /// An empty voxel with no light.
    pub const EMPTY: Voxel = Voxel {
        type_index: EMPTY_TYPE,
        light: 0,
        torch_light: 0,
        opacity: 0,
        water_level: 0,
        flags: 0,
        _padding: 0,
        color: [0; 4],
    };

    /// A hole voxel with no light.
    pub const HOLE: Voxel = Voxel {
        type_index: HOLE_TYPE,
        ..Voxel::EMPTY
    };

    /// Creates a voxel of the given type.
    ///
    /// # Arguments
    /// * `type_index` - The definition index of the voxel
    /// * `opacity` - Light obstruction, clamped to 0..=15
    /// * `color` - RGBA tint
    ///
    /// # Returns
    /// A new unlit `Voxel`.
    pub fn new(type_index: VoxelTypeIndex, opacity: u8, color: [u8; 4]) -> Self {
        let opacity = if type_index <= HOLE_TYPE {
            0
        } else {
            opacity.min(FULL_OPACITY)
        };
        Voxel {
            type_index,
            opacity,
            color,
            ..Voxel::EMPTY
        }
    }

    /// Returns `true` for the empty voxel (type 0).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.type_index == EMPTY_TYPE
    }

    /// Returns `true` for a hole (type 1).
    #[inline]
    pub fn is_hole(&self) -> bool {
        self.type_index == HOLE_TYPE
    }

    /// Returns `true` when the voxel references a registered definition.
    #[inline]
    pub fn has_content(&self) -> bool {
        self.type_index >= FIRST_DEFINITION_TYPE
    }

    /// Returns `true` when the voxel blocks light entirely.
    #[inline]
    pub fn is_opaque(&self) -> bool {
        self.opacity >= FULL_OPACITY
    }

    /// Texture rotation, 0..=3.
    #[inline]
    pub fn rotation(&self) -> u8 {
        self.flags & ROTATION_MASK
    }

    /// Sets the texture rotation, keeping the other flag bits.
    pub fn set_rotation(&mut self, rotation: u8) {
        self.flags = (self.flags & !ROTATION_MASK) | (rotation & ROTATION_MASK);
    }

    /// Removes the content of the voxel while keeping its light values.
    pub fn clear_content(&mut self) {
        *self = Voxel {
            light: self.light,
            torch_light: self.torch_light,
            ..Voxel::EMPTY
        };
    }

    /// Compares everything but the light bytes.
    ///
    /// Light is derived state and never part of run-length encoding.
    pub fn same_content(&self, other: &Voxel) -> bool {
        self.type_index == other.type_index
            && self.opacity == other.opacity
            && self.water_level == other.water_level
            && self.flags == other.flags
            && self.color == other.color
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_voxel_layout_is_packed() {
        assert_eq!(std::mem::size_of::<Voxel>(), 12);
        let voxels = [Voxel::EMPTY; 4];
        let bytes: &[u8] = bytemuck::cast_slice(&voxels);
        assert_eq!(bytes.len(), 48);
    }

    #[test]
    fn test_empty_and_hole_are_transparent() {
        assert_eq!(Voxel::new(EMPTY_TYPE, 15, [0; 4]).opacity, 0);
        assert_eq!(Voxel::new(HOLE_TYPE, 15, [0; 4]).opacity, 0);
        assert!(Voxel::HOLE.is_hole());
        assert!(!Voxel::HOLE.has_content());
        assert!(Voxel::new(2, 20, [255; 4]).is_opaque());
    }

    #[test]
    fn test_rotation_bits() {
        let mut voxel = Voxel::new(5, 15, [1, 2, 3, 4]);
        voxel.flags = 0b1000_0000;
        voxel.set_rotation(7);
        assert_eq!(voxel.rotation(), 3);
        assert_eq!(voxel.flags, 0b1000_0011);
    }

    #[test]
    fn test_clear_content_keeps_light() {
        let mut voxel = Voxel::new(5, 15, [1, 2, 3, 4]);
        voxel.light = 9;
        voxel.torch_light = 4;
        voxel.clear_content();
        assert!(voxel.is_empty());
        assert_eq!((voxel.light, voxel.torch_light, voxel.opacity), (9, 4, 0));
    }
}
