//! # Core Module
//!
//! Fundamental types used throughout the voxel engine:
//! - `VoxelError` and the crate-wide `Result` alias,
//! - `WorldRand`, the seeded position-hashed random source shared by the terrain
//!   generator and placement resolvers.

pub mod error;
pub mod world_rand;

pub use error::{Result, VoxelError};
pub use world_rand::WorldRand;
