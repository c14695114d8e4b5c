#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel World
//!
//! The world core of a voxel engine: chunk storage, lighting and procedural terrain
//! generation, with a hand-off queue for an external mesh renderer.
//!
//! ## Key Modules
//!
//! * `core` - Errors and the seeded world random source
//! * `engine_state` - The tick driver, configuration, task management and voxels
//!
//! ## Architecture
//!
//! * Chunks of 16³ voxels live in a bounded pool and link to their six neighbours
//! * Edits enqueue voxels into a light propagator, which marks chunks dirty
//! * Terrain is painted on a worker thread from immutable, shared generator tables
//! * Dirty chunks are handed to the renderer through a queue that never blocks
//!
//! ## Usage
//!
//! ```no_run
//! fn main() {
//!     voxel_world::init_logging();
//!     if let Err(err) = voxel_world::run(None, None) {
//!         log::error!("{}", err);
//!     }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use cgmath::Point3;
use log::{info, warn};

use crate::core::Result;
use crate::engine_state::config::Settings;
use crate::engine_state::voxels::chunk::CHUNK_DIMENSION;
use crate::engine_state::EngineState;

pub mod core;
pub mod engine_state;

/// Number of ticks between two progress reports of [`run`].
const REPORT_INTERVAL: u64 = 60;

/// Initializes `env_logger` on stdout, filtered by `RUST_LOG`.
///
/// Calling it more than once is harmless.
pub fn init_logging() {
    let mut log_builder = env_logger::Builder::new();
    let _ = log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .try_init();
}

/// Generates the area around the origin headlessly.
///
/// # Arguments
/// * `settings_path` - JSON settings file, the built-in world if `None`
/// * `snapshot_path` - Snapshot loaded before and saved after generation
///
/// # Errors
/// Configuration, snapshot and thread spawning errors.
pub fn run(settings_path: Option<&Path>, snapshot_path: Option<&Path>) -> Result<()> {
    let settings = match settings_path {
        Some(path) => {
            info!("Loading settings from {}", path.display());
            Settings::load(path)?
        }
        None => Settings::default(),
    };
    let visible_distance = settings.engine.visible_distance;
    let mut engine_state = EngineState::new(settings.engine, settings.world)?;

    if let Some(path) = snapshot_path.filter(|path| path.exists()) {
        let loaded = engine_state.load_world(path)?;
        info!("Loaded {} chunks from {}", loaded, path.display());
    }

    let mid_surface = (engine_state.generator().max_surface() / 2.0) as i32;
    let center = Point3::new(0, mid_surface.div_euclid(CHUNK_DIMENSION), 0);
    let requested = engine_state.request_area(center, visible_distance);
    info!("Generating {} chunks around chunk {:?}", requested, center);

    let start = web_time::Instant::now();
    let mut ticks: u64 = 0;
    let mut rendered = 0;
    while !engine_state.is_idle() {
        let report = engine_state.tick();
        ticks += 1;

        let handles = engine_state.take_render_queue();
        rendered += handles.len();
        for handle in handles {
            engine_state.world_mut().mark_clean(handle);
        }

        if ticks % REPORT_INTERVAL == 0 {
            info!("Tick {}: {:?}", ticks, report);
        }
        if report.chunks_requested == 0 && report.results_handled == 0 {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    let trees = engine_state.drain_tree_requests();
    info!(
        "Generated in {:?} over {} ticks: {} resident chunks, {} renderer refreshes, {} tree requests",
        start.elapsed(),
        ticks,
        engine_state.world().pool().len(),
        rendered,
        trees.len()
    );
    if engine_state.world().pending_vegetation() > 0 {
        warn!(
            "{} vegetation requests target chunks that were not generated",
            engine_state.world().pending_vegetation()
        );
    }

    if let Some(path) = snapshot_path {
        let saved = engine_state.save_world(path)?;
        info!("Saved snapshot of {} chunks to {}", saved, path.display());
    }
    Ok(())
}
