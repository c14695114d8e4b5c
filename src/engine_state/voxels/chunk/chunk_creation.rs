//! # Chunk Creation Module
//!
//! This module provides a builder that fills a chunk sequentially, one voxel or one
//! run of identical voxels at a time, in storage order. It is how run-length
//! encoded snapshots are turned back into chunks.

use cgmath::Point3;

use crate::core::{Result, VoxelError};
use crate::engine_state::voxels::voxel::Voxel;

use super::{Chunk, CHUNK_SIZE};

/// A builder for sequentially populating a chunk.
///
/// The builder tracks how many voxels have been written so far and refuses runs
/// that would overflow the chunk, so a corrupted snapshot can never write out of
/// bounds.
pub struct ChunkCreationIterator {
    /// The chunk being filled
    chunk: Chunk,
    /// Number of voxels written so far
    voxel_offset: usize,
}

impl ChunkCreationIterator {
    /// Creates a new `ChunkCreationIterator` for building a chunk at the given coordinate.
    ///
    /// # Arguments
    /// * `coord` - The chunk coordinate of the chunk to create
    ///
    /// # Returns
    /// A new `ChunkCreationIterator` positioned at voxel index 0
    pub fn new(coord: Point3<i32>) -> Self {
        ChunkCreationIterator {
            chunk: Chunk::new(coord),
            voxel_offset: 0,
        }
    }

    /// Number of voxels still to be written.
    pub fn remaining(&self) -> usize {
        CHUNK_SIZE as usize - self.voxel_offset
    }

    /// Writes a single voxel at the current position and advances.
    pub fn push_voxel(&mut self, voxel: Voxel) -> Result<()> {
        self.push_run(voxel, 1)
    }

    /// Writes `repetitions` copies of a voxel and advances past them.
    ///
    /// # Errors
    /// `VoxelError::Snapshot` if the run is empty or does not fit in the chunk.
    pub fn push_run(&mut self, voxel: Voxel, repetitions: usize) -> Result<()> {
        if repetitions == 0 {
            return Err(VoxelError::Snapshot(format!(
                "empty run at voxel {} of chunk {:?}",
                self.voxel_offset, self.chunk.coord
            )));
        }
        if repetitions > self.remaining() {
            return Err(VoxelError::Snapshot(format!(
                "run of {} voxels at {} overflows chunk {:?}",
                repetitions, self.voxel_offset, self.chunk.coord
            )));
        }

        let end = self.voxel_offset + repetitions;
        self.chunk.voxels[self.voxel_offset..end].fill(voxel);
        self.voxel_offset = end;
        Ok(())
    }

    /// Finalizes the chunk creation and returns the constructed `Chunk`.
    ///
    /// # Errors
    /// `VoxelError::Snapshot` if fewer than `CHUNK_SIZE` voxels were written.
    pub fn return_chunk(self) -> Result<Chunk> {
        if self.remaining() != 0 {
            return Err(VoxelError::Snapshot(format!(
                "chunk {:?} ends after {} of {} voxels",
                self.chunk.coord, self.voxel_offset, CHUNK_SIZE
            )));
        }
        Ok(self.chunk)
    }
}
