//! # Voxel Task System
//!
//! Tasks related to voxel world generation. They run on the task worker so that
//! painting terrain never stalls the tick.

pub mod chunk_generation_task;
