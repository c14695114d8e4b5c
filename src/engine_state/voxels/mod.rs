//! # Voxel Engine Core
//!
//! This module contains the core voxel engine functionality: representing,
//! generating, lighting and editing a voxel world.
//!
//! ## Architecture
//!
//! The voxel system is organized into several key components:
//!
//! * **Voxel**: Packed cell state, voxel definitions and placement resolvers
//! * **Chunk**: Fixed-size 3D arrays of voxels plus per-chunk metadata
//! * **Chunk pool**: Coordinate lookup, neighbour links and LRU recycling
//! * **Lighting**: Sun and torch flood fill across chunk borders
//! * **Generation**: Height map, biomes, terrain painting and ore veins
//! * **World**: Edits, renderer hand-off and placement requests
//! * **Persistence**: Run-length encoded chunk snapshots
//! * **Tasks**: Background chunk generation
//!
//! ## Data Flow
//!
//! 1. The engine requests chunks around a point of interest
//! 2. Generation tasks paint detached chunks on the worker thread
//! 3. The world installs painted chunks and rebuilds their light
//! 4. Edits relight the affected voxels and queue chunks for the renderer
//!
//! ## Thread Safety
//!
//! Only the generator tables are shared with the worker, behind an `Arc`. The world
//! and its chunks belong to the controlling thread.

pub mod chunk;
pub mod chunk_pool;
pub mod generation;
pub mod lighting;
pub mod persistence;
pub mod tasks;
pub mod voxel;
pub mod world;
