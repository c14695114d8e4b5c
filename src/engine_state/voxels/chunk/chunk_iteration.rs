//! # Chunk Iteration Module
//!
//! Iterators over the voxels of a chunk:
//! * `ChunkVoxelIterator` walks only the voxels with content, yielding their local
//!   position and index.
//! * `ChunkRunIterator` walks the whole array as runs of voxels with identical
//!   content (light is ignored), which is the unit of snapshot encoding.

use cgmath::Point3;

use crate::engine_state::voxels::voxel::Voxel;

use super::{local_position_of, Chunk};

/// An iterator over all voxels with content in a chunk.
pub struct ChunkVoxelIterator<'a> {
    /// Reference to the chunk being iterated over
    chunk_ref: &'a Chunk,
    /// Next index to inspect
    current_offset: usize,
}

impl<'a> ChunkVoxelIterator<'a> {
    /// Creates a new `ChunkVoxelIterator` for the given chunk.
    pub fn new(chunk_ref: &'a Chunk) -> Self {
        ChunkVoxelIterator {
            chunk_ref,
            current_offset: 0,
        }
    }
}

impl<'a> Iterator for ChunkVoxelIterator<'a> {
    type Item = (Point3<i32>, usize, &'a Voxel);

    fn next(&mut self) -> Option<Self::Item> {
        let voxels = &self.chunk_ref.voxels;
        while self.current_offset < voxels.len() {
            let index = self.current_offset;
            self.current_offset += 1;
            let voxel = &voxels[index];
            if voxel.has_content() {
                return Some((local_position_of(index), index, voxel));
            }
        }
        None
    }
}

/// A run of voxels with identical content.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VoxelRunSpan {
    /// First voxel of the run.
    pub voxel: Voxel,
    /// Index of the first voxel.
    pub start: usize,
    /// Number of voxels in the run.
    pub repetitions: usize,
}

/// An iterator over the runs of identical voxels of a chunk, in storage order.
pub struct ChunkRunIterator<'a> {
    voxels: &'a [Voxel],
    current_offset: usize,
    max_run: usize,
}

impl<'a> ChunkRunIterator<'a> {
    /// Creates a run iterator. Runs longer than `max_run` are split.
    pub fn new(chunk_ref: &'a Chunk, max_run: usize) -> Self {
        ChunkRunIterator {
            voxels: &chunk_ref.voxels,
            current_offset: 0,
            max_run: max_run.max(1),
        }
    }
}

impl<'a> Iterator for ChunkRunIterator<'a> {
    type Item = VoxelRunSpan;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.current_offset;
        let first = *self.voxels.get(start)?;
        let mut end = start + 1;
        while end < self.voxels.len()
            && end - start < self.max_run
            && self.voxels[end].same_content(&first)
        {
            end += 1;
        }
        self.current_offset = end;
        Some(VoxelRunSpan {
            voxel: first,
            start,
            repetitions: end - start,
        })
    }
}
