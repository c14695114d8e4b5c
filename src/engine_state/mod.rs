//! # Engine State Module
//!
//! The world update driver. `EngineState` owns the world, the shared terrain
//! generator and the task manager, and advances all of them once per tick.
//!
//! ## Key Components
//!
//! * `EngineState` - The main state container for the engine
//! * `config` - Engine tuning and world content read at startup
//! * `task_management` - Runs chunk generation on a worker thread
//! * `voxels` - Voxel data, chunks, lighting and world generation
//!
//! ## Tick
//!
//! Each call of [`EngineState::tick`] does, in order:
//! 1. Start generation of up to `max_chunks_per_tick` requested chunks, nearest
//!    first, while the time budget allows
//! 2. Hand queued tasks to the worker (or run them inline)
//! 3. Install painted chunks and retry failed ones
//! 4. Place vegetation whose target chunk became resident
//!
//! Requests that do not fit the budget wait for a later tick.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use cgmath::Point3;
use log::{debug, info};
use web_time::Instant;

use crate::core::Result;
use config::{EngineConfig, WorldDefinition};
use task_management::TaskManager;
use voxels::chunk::{ChunkCoord, ChunkHandle};
use voxels::generation::terrain_generator::TerrainGenerator;
use voxels::generation::TreeRequest;
use voxels::persistence::WorldSnapshot;
use voxels::tasks::chunk_generation_task::ChunkGenerationTask;
use voxels::voxel::voxel_definition::VoxelRegistry;
use voxels::world::World;

pub mod config;
pub mod task_management;
pub mod voxels;

/// Share of the tick budget that may be spent starting new chunks.
const REQUEST_BUDGET_SHARE: f32 = 0.8;

/// What a tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Generation tasks started this tick.
    pub chunks_requested: usize,
    /// Task results applied this tick.
    pub results_handled: usize,
    /// Vegetation voxels placed this tick.
    pub vegetation_placed: usize,
    /// Requests left for later ticks.
    pub deferred: usize,
    /// Generation tasks started but not installed yet.
    pub in_flight: usize,
}

/// The main state container for the voxel engine
///
/// # Examples
///
/// ```no_run
/// use voxel_world::engine_state::config::{EngineConfig, WorldDefinition};
/// use voxel_world::engine_state::EngineState;
///
/// let mut engine_state = EngineState::new(EngineConfig::default(), WorldDefinition::default())?;
/// engine_state.request_area(cgmath::Point3::new(0, 1, 0), 2);
/// loop {
///     let report = engine_state.tick();
///     for handle in engine_state.take_render_queue() {
///         // mesh engine_state.world().voxels(handle)
///         engine_state.world_mut().mark_clean(handle);
///     }
///     if report.deferred == 0 && report.in_flight == 0 {
///         break;
///     }
/// }
/// # Ok::<(), voxel_world::core::VoxelError>(())
/// ```
pub struct EngineState {
    /// Engine tuning
    config: EngineConfig,
    /// The voxel world containing all chunk data
    world: World,
    /// Shared, immutable generator tables
    generator: Arc<TerrainGenerator>,
    /// Task manager for chunk generation
    task_manager: TaskManager,
    /// Chunks waiting to be generated, nearest first
    chunk_requests: VecDeque<ChunkCoord>,
    /// Members of `chunk_requests`
    requested: HashSet<ChunkCoord>,
    /// Center and radius of the last requested area
    area: Option<(ChunkCoord, i32)>,
}

impl EngineState {
    /// Creates a new engine state with all subsystems initialized
    ///
    /// # Arguments
    /// * `config` - Engine tuning
    /// * `definition` - Voxel types, biomes, seed and generator settings
    ///
    /// # Errors
    /// `VoxelError::Io` if the worker thread cannot be spawned.
    pub fn new(config: EngineConfig, definition: WorldDefinition) -> Result<Self> {
        let world_rand = definition.seed.world_rand();
        let registry = Arc::new(VoxelRegistry::new(definition.voxels));
        let generator = Arc::new(TerrainGenerator::new(
            Arc::clone(&registry),
            &definition.biomes,
            definition.default_biome.as_deref(),
            &definition.generator,
            world_rand,
        ));
        let world = World::new(
            registry,
            world_rand,
            config.pool_capacity,
            config.sun_attenuation,
            config.torch_attenuation,
        );
        let task_manager = TaskManager::new(config.multithread_generation, config.channel_capacity)?;

        info!(
            "Engine ready: seed {}, {} voxel types, {} biomes, pool of {} chunks",
            world_rand.seed(),
            generator.registry().len(),
            generator.biomes().len(),
            config.pool_capacity
        );

        Ok(EngineState {
            config,
            world,
            generator,
            task_manager,
            chunk_requests: VecDeque::new(),
            requested: HashSet::new(),
            area: None,
        })
    }

    /// Engine tuning in use.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The world.
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The world, for edits.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The terrain generator shared with the worker.
    pub fn generator(&self) -> &Arc<TerrainGenerator> {
        &self.generator
    }

    /// Number of chunk requests not started yet.
    pub fn pending_requests(&self) -> usize {
        self.chunk_requests.len()
    }

    /// Returns `true` when nothing is requested, queued or in flight.
    pub fn is_idle(&self) -> bool {
        self.chunk_requests.is_empty() && self.task_manager.is_idle()
    }

    /// Requests generation of one chunk.
    ///
    /// # Returns
    /// `false` if the chunk is already generated, requested or in flight.
    pub fn request_chunk(&mut self, coord: ChunkCoord) -> bool {
        if self.requested.contains(&coord) || !self.world.needs_generation(coord) {
            return false;
        }
        self.requested.insert(coord);
        self.chunk_requests.push_back(coord);
        true
    }

    /// Requests every chunk within `radius` chunks of `center`.
    ///
    /// The request queue is reordered so the chunks nearest to `center` start first.
    /// Vegetation waiting for chunks outside the area is dropped, now and once the
    /// area is generated.
    ///
    /// # Returns
    /// The number of chunks newly requested.
    pub fn request_area(&mut self, center: ChunkCoord, radius: i32) -> usize {
        let radius = radius.max(0);
        let mut added = 0;
        for x in -radius..=radius {
            for y in -radius..=radius {
                for z in -radius..=radius {
                    if self.request_chunk(Point3::new(center.x + x, center.y + y, center.z + z)) {
                        added += 1;
                    }
                }
            }
        }

        self.chunk_requests.make_contiguous().sort_by_key(|coord| {
            let d = *coord - center;
            d.x * d.x + d.y * d.y + d.z * d.z
        });
        debug!("Requested {} chunks around {:?}", added, center);
        self.area = Some((center, radius));
        self.world.discard_vegetation_outside(center, radius);
        added
    }

    /// Advances the engine by one tick.
    pub fn tick(&mut self) -> TickReport {
        let start = Instant::now();
        let request_budget =
            Duration::from_millis(self.config.max_tick_millis).mul_f32(REQUEST_BUDGET_SHARE);

        let mut chunks_requested = 0;
        while chunks_requested < self.config.max_chunks_per_tick && start.elapsed() < request_budget {
            let Some(coord) = self.chunk_requests.pop_front() else {
                break;
            };
            self.requested.remove(&coord);
            if !self.world.needs_generation(coord) {
                continue;
            }
            self.world.mark_generation_pending(coord);
            self.task_manager.publish_task(Box::new(ChunkGenerationTask::new(
                coord,
                Arc::clone(&self.generator),
                self.config.max_generation_attempts,
            )));
            chunks_requested += 1;
        }

        self.task_manager.process_queued_tasks();
        let results_handled = self.task_manager.process_completed_tasks(&mut self.world);
        let vegetation_placed = self.world.process_vegetation_requests();
        if let Some((center, radius)) = self.area {
            if self.is_idle() {
                self.world.discard_vegetation_outside(center, radius);
            }
        }

        let report = TickReport {
            chunks_requested,
            results_handled,
            vegetation_placed,
            deferred: self.chunk_requests.len(),
            in_flight: self.world.pending_generation_count(),
        };
        if report != TickReport::default() {
            debug!("Tick: {:?} in {:?}", report, start.elapsed());
        }
        report
    }

    /// Ticks until every request is generated or `timeout` runs out.
    ///
    /// # Returns
    /// `true` if the engine became idle in time.
    pub fn run_until_idle(&mut self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            self.tick();
            if self.is_idle() {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            if self.task_manager.is_multithreaded() {
                std::thread::sleep(Duration::from_millis(1));
            }
        }
    }

    /// Takes the chunks whose mesh must be rebuilt.
    pub fn take_render_queue(&mut self) -> Vec<ChunkHandle> {
        self.world.take_render_queue()
    }

    /// Takes the tree requests collected so far.
    pub fn drain_tree_requests(&mut self) -> Vec<TreeRequest> {
        self.world.drain_tree_requests()
    }

    /// Writes the modified chunks to a snapshot file.
    ///
    /// Chunks already stored in the file and not modified since are kept.
    ///
    /// # Returns
    /// The number of chunks in the file.
    pub fn save_world<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let path = path.as_ref();
        let snapshot = if path.exists() {
            let mut stored = WorldSnapshot::load(path)?;
            stored.merge(self.world.snapshot());
            stored
        } else {
            self.world.snapshot()
        };
        snapshot.save(path)?;
        self.world.mark_saved();
        Ok(snapshot.chunks.len())
    }

    /// Loads the chunks of a snapshot file into the world.
    ///
    /// # Returns
    /// The number of chunks loaded.
    pub fn load_world<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
        let snapshot = WorldSnapshot::load(path)?;
        self.world.load_snapshot(&snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::generation::biome::{BiomeDefinition, BiomeVoxelEntry};
    use crate::engine_state::voxels::chunk::CHUNK_DIMENSION;
    use crate::engine_state::voxels::voxel::voxel_definition::VoxelDefinition;

    fn flat_definition() -> WorldDefinition {
        let mut definition = WorldDefinition::default();
        definition.voxels = vec![
            VoxelDefinition::solid("Stone", [125, 125, 125, 255]),
            VoxelDefinition::solid("Grass", [86, 152, 58, 255]),
            VoxelDefinition::solid("Dirt", [121, 85, 58, 255]),
            VoxelDefinition::solid("Bedrock", [40, 40, 40, 255]),
        ];
        definition.biomes = vec![BiomeDefinition {
            name: "Plain".to_string(),
            voxel_top: "Grass".to_string(),
            voxel_dirt: "Dirt".to_string(),
            ..Default::default()
        }];
        definition.default_biome = None;
        definition.generator.flat_ground_level = Some(20.0);
        definition.generator.water_level = None;
        definition.generator.caves.enabled = false;
        definition
    }

    fn config(multithreaded: bool) -> EngineConfig {
        EngineConfig {
            pool_capacity: 128,
            multithread_generation: multithreaded,
            max_chunks_per_tick: 4,
            max_tick_millis: 1000,
            ..Default::default()
        }
    }

    #[test]
    fn test_request_area_orders_nearest_first() {
        let mut engine = EngineState::new(config(false), flat_definition()).unwrap();
        let center = Point3::new(0, 1, 0);
        assert_eq!(engine.request_area(center, 1), 27);
        assert_eq!(engine.chunk_requests.front(), Some(&center));
        assert_eq!(engine.request_area(center, 1), 0);
        assert!(!engine.request_chunk(center));
    }

    #[test]
    fn test_vegetation_beyond_the_area_is_not_kept() {
        let mut definition = flat_definition();
        definition
            .voxels
            .push(VoxelDefinition::translucent("Clover", 0, [80, 160, 60, 255]));
        definition.biomes[0].vegetation_density = 0.5;
        definition.biomes[0].vegetation = vec![BiomeVoxelEntry {
            voxel: "Clover".to_string(),
            probability: 1.0,
        }];
        // Ground on the top layer of chunk y=1 puts the clover into chunk y=2.
        definition.generator.flat_ground_level = Some(31.0);
        let mut engine = EngineState::new(config(false), definition).unwrap();

        engine.request_area(Point3::new(0, 1, 0), 0);
        assert!(engine.run_until_idle(Duration::from_secs(5)));
        assert_eq!(engine.world().pending_vegetation(), 0);

        engine.request_area(Point3::new(0, 1, 0), 1);
        assert!(engine.run_until_idle(Duration::from_secs(5)));
        assert_eq!(engine.world().pending_vegetation(), 0);
        let clover = engine.world().registry().index_of("Clover").unwrap();
        // Chunk (0, 1, 0) was generated first, so only its neighbours still request.
        let placed = (CHUNK_DIMENSION..2 * CHUNK_DIMENSION)
            .flat_map(|x| (0..CHUNK_DIMENSION).map(move |z| Point3::new(x, 32, z)))
            .filter(|p| engine.world().voxel_get(*p).type_index == clover)
            .count();
        assert!(placed > 0);
    }

    #[test]
    fn test_tick_respects_chunk_budget() {
        let mut engine = EngineState::new(config(false), flat_definition()).unwrap();
        engine.request_area(Point3::new(0, 1, 0), 1);

        let report = engine.tick();
        assert_eq!(report.chunks_requested, 4);
        assert_eq!(report.results_handled, 4);
        assert_eq!(report.deferred, 23);
        assert_eq!(report.in_flight, 0);
        assert_eq!(engine.world().pool().len(), 4);
    }

    #[test]
    fn test_synchronous_generation_fills_area() {
        let mut engine = EngineState::new(config(false), flat_definition()).unwrap();
        engine.request_area(Point3::new(0, 1, 0), 1);
        assert!(engine.run_until_idle(Duration::from_secs(30)));

        assert_eq!(engine.world().pool().len(), 27);
        assert!(engine.world().validate_links().is_ok());
        assert!(engine.world().voxel_get(Point3::new(5, 20, 5)).has_content());
        assert!(engine.world().voxel_get(Point3::new(5, 21, 5)).is_empty());
        assert!(!engine.take_render_queue().is_empty());
    }

    #[test]
    fn test_flat_ground_is_fully_sunlit() {
        let mut engine = EngineState::new(config(false), flat_definition()).unwrap();
        engine.request_area(Point3::new(0, 1, 0), 1);
        assert!(engine.run_until_idle(Duration::from_secs(30)));

        for y in 21..=40 {
            assert_eq!(engine.world().voxel_get(Point3::new(5, y, 5)).light, 15, "y {}", y);
        }
        assert_eq!(engine.world().voxel_get(Point3::new(-9, 21, 12)).light, 15);
        assert_eq!(engine.world().voxel_get(Point3::new(5, 19, 5)).light, 0);
    }

    #[test]
    fn test_generated_chunks_are_not_requested_again() {
        let mut engine = EngineState::new(config(false), flat_definition()).unwrap();
        let coord = Point3::new(0, 1, 0);
        engine.request_chunk(coord);
        assert!(engine.run_until_idle(Duration::from_secs(30)));
        assert!(!engine.request_chunk(coord));
    }

    #[test]
    fn test_worker_generation_matches_inline() {
        let mut inline = EngineState::new(config(false), flat_definition()).unwrap();
        let mut threaded = EngineState::new(config(true), flat_definition()).unwrap();
        for engine in [&mut inline, &mut threaded] {
            engine.request_area(Point3::new(0, 0, 0), 1);
            assert!(engine.run_until_idle(Duration::from_secs(30)));
        }

        for position in [Point3::new(0, 0, 0), Point3::new(-7, 12, 9), Point3::new(15, 20, -16)] {
            let a = inline.world().voxel_get(position);
            let b = threaded.world().voxel_get(position);
            assert_eq!(a.type_index, b.type_index, "{:?}", position);
        }
    }

    #[test]
    fn test_second_save_keeps_first_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");
        let first = Point3::new(3, 25, 3);
        let second = Point3::new(20, 25, 3);

        let mut engine = EngineState::new(config(false), flat_definition()).unwrap();
        engine.request_area(Point3::new(0, 1, 0), 1);
        assert!(engine.run_until_idle(Duration::from_secs(30)));
        let stone = engine.world().registry().resolve_name("Stone");

        assert!(engine.world_mut().voxel_place(first, stone, None, 0).unwrap());
        assert_eq!(engine.save_world(&path).unwrap(), 1);
        assert!(engine.world_mut().voxel_place(second, stone, None, 0).unwrap());
        assert_eq!(engine.save_world(&path).unwrap(), 2);
        assert_eq!(engine.save_world(&path).unwrap(), 2);

        let mut restored = EngineState::new(config(false), flat_definition()).unwrap();
        assert_eq!(restored.load_world(&path).unwrap(), 2);
        assert!(restored.world().voxel_get(first).has_content());
        assert!(restored.world().voxel_get(second).has_content());
    }

    #[test]
    fn test_save_and_load_edits() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world.json");
        let position = Point3::new(3, 21, 3);

        let mut engine = EngineState::new(config(false), flat_definition()).unwrap();
        engine.request_chunk(Point3::new(0, 1, 0));
        assert!(engine.run_until_idle(Duration::from_secs(30)));
        let stone = engine.world().registry().resolve_name("Stone");
        assert!(engine.world_mut().voxel_place(position, stone, None, 0).unwrap());
        assert_eq!(engine.save_world(&path).unwrap(), 1);

        let mut restored = EngineState::new(config(false), flat_definition()).unwrap();
        assert_eq!(restored.load_world(&path).unwrap(), 1);
        assert!(restored.world().voxel_get(position).has_content());
        assert!(!restored.request_chunk(Point3::new(0, 1, 0)));
    }
}
