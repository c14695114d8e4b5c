//! # Chunk Generation Task
//!
//! This module defines the `ChunkGenerationTask`, which paints a detached chunk
//! on the worker thread. The painted chunk travels back in the task result and is
//! installed into the world on the controlling thread.
//!
//! A panic inside the painter is caught and reported as a failed attempt. Failed
//! chunks are retried on later ticks until the attempt budget runs out.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, error, warn};

use crate::core::VoxelError;
use crate::engine_state::task_management::task::{Task, TaskResult};
use crate::engine_state::voxels::chunk::{Chunk, ChunkCoord};
use crate::engine_state::voxels::generation::terrain_generator::TerrainGenerator;
use crate::engine_state::voxels::generation::PlacementRequests;
use crate::engine_state::voxels::world::World;

/// A task that paints one chunk.
pub struct ChunkGenerationTask {
    /// The chunk to generate (in chunk coordinates)
    coord: ChunkCoord,
    /// Shared, immutable generator tables
    generator: Arc<TerrainGenerator>,
    /// Attempt number, starting at 1
    attempt: u32,
    /// Attempts allowed before giving up
    max_attempts: u32,
}

impl ChunkGenerationTask {
    /// Creates a new chunk generation task.
    ///
    /// # Arguments
    /// * `coord` - The chunk coordinates of the chunk to generate
    /// * `generator` - The terrain generator
    /// * `max_attempts` - How many times a failing chunk is tried
    pub fn new(coord: ChunkCoord, generator: Arc<TerrainGenerator>, max_attempts: u32) -> Self {
        ChunkGenerationTask {
            coord,
            generator,
            attempt: 1,
            max_attempts: max_attempts.max(1),
        }
    }

    fn retry(&self) -> Self {
        ChunkGenerationTask {
            coord: self.coord,
            generator: Arc::clone(&self.generator),
            attempt: self.attempt + 1,
            max_attempts: self.max_attempts,
        }
    }
}

/// What happened to a generation attempt.
pub enum GenerationOutcome {
    /// The chunk was painted.
    Painted {
        /// The painted chunk.
        chunk: Box<Chunk>,
        /// Placements that fall outside the chunk.
        requests: PlacementRequests,
    },
    /// The painter panicked.
    Failed(String),
    /// The abort flag was raised.
    Aborted,
}

fn panic_reason(payload: Box<dyn Any + Send>) -> String {
    if let Some(reason) = payload.downcast_ref::<&str>() {
        reason.to_string()
    } else if let Some(reason) = payload.downcast_ref::<String>() {
        reason.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Task for ChunkGenerationTask {
    fn process(&self, abort: &AtomicBool) -> Box<dyn TaskResult + Send> {
        let outcome = if abort.load(Ordering::Relaxed) {
            GenerationOutcome::Aborted
        } else {
            let painted = catch_unwind(AssertUnwindSafe(|| {
                let mut chunk = Chunk::new(self.coord);
                let mut requests = PlacementRequests::default();
                self.generator
                    .paint_chunk_until(&mut chunk, &mut requests, abort)
                    .map(|_| (chunk, requests))
            }));
            match painted {
                Ok(Some((chunk, requests))) => GenerationOutcome::Painted {
                    chunk: Box::new(chunk),
                    requests,
                },
                Ok(None) => GenerationOutcome::Aborted,
                Err(payload) => GenerationOutcome::Failed(panic_reason(payload)),
            }
        };

        Box::new(ChunkGenerationTaskResult {
            task: self.retry(),
            outcome,
        })
    }
}

/// The result of a chunk generation task.
pub struct ChunkGenerationTaskResult {
    /// The follow-up attempt, used if this one failed
    task: ChunkGenerationTask,
    /// What the painter produced
    outcome: GenerationOutcome,
}

impl ChunkGenerationTaskResult {
    /// What the painter produced.
    pub fn outcome(&self) -> &GenerationOutcome {
        &self.outcome
    }
}

impl TaskResult for ChunkGenerationTaskResult {
    /// Installs the painted chunk, or schedules a retry after a failure.
    fn handle_result(self: Box<Self>, world: &mut World) -> Vec<Box<dyn Task + Send>> {
        let ChunkGenerationTaskResult { task, outcome } = *self;
        let coord = task.coord;

        match outcome {
            GenerationOutcome::Painted { chunk, requests } => {
                if let Err(err) = world.install_generated(*chunk, requests) {
                    error!("Cannot install chunk {:?}: {}", coord, err);
                    world.clear_generation_pending(coord);
                }
                Vec::new()
            }
            GenerationOutcome::Failed(reason) => {
                let failed_attempt = task.attempt - 1;
                let err = VoxelError::Generation { coord, reason };
                if task.attempt <= task.max_attempts {
                    warn!("{} (attempt {}), retrying", err, failed_attempt);
                    vec![Box::new(task) as Box<dyn Task + Send>]
                } else {
                    error!("{} (attempt {}), giving up", err, failed_attempt);
                    world.clear_generation_pending(coord);
                    Vec::new()
                }
            }
            GenerationOutcome::Aborted => {
                debug!("Generation of chunk {:?} aborted", coord);
                world.clear_generation_pending(coord);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::task_management::TaskManager;
    use crate::engine_state::voxels::generation::height_map::{HeightMapInfo, HeightMapSource};
    use crate::engine_state::voxels::generation::terrain_generator::tests::flat_generator;
    use cgmath::Point3;
    use std::time::Duration;

    struct PanickingHeightMap;

    impl HeightMapSource for PanickingHeightMap {
        fn column(&self, _x: i32, _z: i32) -> HeightMapInfo {
            panic!("height map unavailable");
        }

        fn max_height(&self) -> f32 {
            64.0
        }

        fn min_height(&self) -> f32 {
            0.0
        }
    }

    fn world_with_generator_registry(generator: &TerrainGenerator) -> World {
        World::new(
            Arc::clone(generator.registry()),
            generator.world_rand(),
            32,
            2,
            1,
        )
    }

    #[test]
    fn test_painted_chunk_is_installed() {
        let generator = Arc::new(flat_generator(20.0, None, 9));
        let mut world = world_with_generator_registry(&generator);
        let coord = Point3::new(0, 1, 0);
        world.mark_generation_pending(coord);

        let abort = AtomicBool::new(false);
        let result = ChunkGenerationTask::new(coord, Arc::clone(&generator), 3).process(&abort);
        assert!(result.handle_result(&mut world).is_empty());

        let handle = world.try_get_chunk(Point3::new(0, 16, 0)).unwrap();
        assert!(world.chunk(handle).is_populated);
        assert!(world.voxel_get(Point3::new(3, 20, 3)).has_content());
        assert_eq!(world.pending_generation_count(), 0);
    }

    #[test]
    fn test_panics_are_retried_then_dropped() {
        let generator = Arc::new(
            flat_generator(20.0, None, 9).with_height_map(Box::new(PanickingHeightMap)),
        );
        let mut world = world_with_generator_registry(&generator);
        let coord = Point3::new(0, 1, 0);
        world.mark_generation_pending(coord);

        let mut manager = TaskManager::new(false, 1).unwrap();
        manager.publish_task(Box::new(ChunkGenerationTask::new(coord, generator, 3)));

        for attempt in 1..=3 {
            manager.process_queued_tasks();
            manager.process_completed_tasks(&mut world);
            if attempt < 3 {
                assert_eq!(manager.queued_len(), 1, "attempt {}", attempt);
                assert_eq!(world.pending_generation_count(), 1);
            }
        }
        assert!(manager.is_idle());
        assert_eq!(world.pending_generation_count(), 0);
        assert!(world.try_get_chunk(Point3::new(0, 16, 0)).is_none());
    }

    #[test]
    fn test_aborted_generation_clears_pending() {
        let generator = Arc::new(flat_generator(20.0, None, 9));
        let mut world = world_with_generator_registry(&generator);
        let coord = Point3::new(2, 1, 2);
        world.mark_generation_pending(coord);

        let abort = AtomicBool::new(true);
        let result = ChunkGenerationTask::new(coord, generator, 3).process(&abort);
        result.handle_result(&mut world);
        assert_eq!(world.pending_generation_count(), 0);
        assert!(world.needs_generation(coord));
    }

    #[test]
    fn test_worker_generates_area() {
        let generator = Arc::new(flat_generator(20.0, None, 4));
        let mut world = world_with_generator_registry(&generator);
        let mut manager = TaskManager::new(true, 2).unwrap();

        for x in -1..=1 {
            for z in -1..=1 {
                let coord = Point3::new(x, 1, z);
                world.mark_generation_pending(coord);
                manager.publish_task(Box::new(ChunkGenerationTask::new(
                    coord,
                    Arc::clone(&generator),
                    3,
                )));
            }
        }
        assert!(manager.process_until_idle(&mut world, Duration::from_secs(30)));
        assert_eq!(world.pool().len(), 9);
        assert!(world.validate_links().is_ok());
        assert!(world.voxel_get(Point3::new(-10, 20, 30)).has_content());
        assert!(world.voxel_get(Point3::new(-10, 22, 30)).is_empty());
    }
}
