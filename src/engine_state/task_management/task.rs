//! # Task System Core Traits
//!
//! This module defines the fundamental building blocks of the task system, which
//! moves work off the controlling thread.
//!
//! ## Core Components
//! - `Task`: A self-contained unit of work that runs on the worker thread
//! - `TaskResult`: The outcome of a task, applied to the world on the controlling thread
//!
//! ## Task Lifecycle
//! 1. A `Task` is created and scheduled via `TaskManager::publish_task()`
//! 2. The task's `process()` method is called on the worker (or inline)
//! 3. The task returns a boxed `TaskResult`
//! 4. The result's `handle_result()` is called on the controlling thread
//! 5. The result can mutate the world and spawn follow-up tasks
//!
//! ## Thread Safety
//! - `Task` must be `Send` to be transferred to the worker
//! - `TaskResult` must be `Send` to be transferred back
//! - Tasks never see the world: everything they need is owned or behind an `Arc`

use std::sync::atomic::AtomicBool;

use crate::engine_state::voxels::world::World;

/// A unit of work that can be executed on the worker thread.
///
/// # Implementation Guidelines
/// - Should own all the data it needs, shared tables go behind an `Arc`
/// - Should check the abort flag between coarse steps
pub trait Task: Send {
    /// Processes the task and returns a result.
    ///
    /// # Arguments
    /// * `abort` - Raised when the manager shuts down; long tasks should give up
    ///
    /// # Returns
    /// A boxed `TaskResult` that will be handled on the controlling thread.
    fn process(&self, abort: &AtomicBool) -> Box<dyn TaskResult + Send>;
}

/// The result of processing a `Task`.
pub trait TaskResult: Send {
    /// Applies the result on the controlling thread.
    ///
    /// # Arguments
    /// * `world` - The world owned by the controlling thread
    ///
    /// # Returns
    /// Follow-up tasks to schedule (can be empty).
    fn handle_result(self: Box<Self>, world: &mut World) -> Vec<Box<dyn Task + Send>>;
}
