//! # Error Module
//!
//! Error types shared by the voxel world. Most "failures" in the world loop are
//! not errors at all: a neighbour chunk that is not resident yet is reported as
//! `None` and retried later. The variants here cover the cases that must be
//! surfaced to the operator or to the caller of a fallible operation.

use cgmath::Point3;
use thiserror::Error;

/// Main error type for the voxel world.
#[derive(Debug, Error)]
pub enum VoxelError {
    /// Every pool slot holds a chunk that may not be overwritten.
    #[error("chunk pool exhausted: all {capacity} slots hold chunks that cannot be evicted")]
    PoolExhausted {
        /// Number of slots in the pool.
        capacity: usize,
    },

    /// A voxel definition name could not be resolved.
    #[error("unknown voxel definition '{0}'")]
    UnknownVoxelDefinition(String),

    /// Two chunks disagree about their shared face.
    #[error("broken neighbour link between chunk {from:?} and {to:?} ({side:?})")]
    BrokenNeighbourLink {
        /// Chunk holding the link.
        from: Point3<i32>,
        /// Chunk the link points to, if it is resident.
        to: Option<Point3<i32>>,
        /// Face name of the link.
        side: &'static str,
    },

    /// Terrain generation failed for a chunk.
    #[error("generation of chunk {coord:?} failed: {reason}")]
    Generation {
        /// Chunk coordinate that failed.
        coord: Point3<i32>,
        /// Panic payload or error message.
        reason: String,
    },

    /// A persisted chunk snapshot is inconsistent.
    #[error("invalid chunk snapshot: {0}")]
    Snapshot(String),

    /// Configuration could not be parsed.
    #[error("configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// IO error while reading or writing configuration or snapshots.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result alias used across the crate.
pub type Result<T> = std::result::Result<T, VoxelError>;
