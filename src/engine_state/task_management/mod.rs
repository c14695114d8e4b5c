//! # Task Management System
//!
//! This module runs tasks on one dedicated worker thread, or inline on the
//! controlling thread when multithreading is disabled.
//!
//! ## Architecture Overview
//!
//! - `TaskManager`: Queues tasks, feeds the worker and drains its results
//! - `Task`: A unit of work that runs on the worker
//! - `TaskResult`: The result of a task, applied to the world on the controlling thread
//! - `TaskChannel`: The bounded channels between the controlling thread and the worker
//!
//! ## Task Lifecycle
//! 1. Tasks are published via `TaskManager::publish_task()`
//! 2. The manager hands them to the worker while fewer than the channel capacity
//!    are in flight, the rest wait in a FIFO queue
//! 3. The worker processes tasks and sends their results back
//! 4. Results are applied in `process_completed_tasks()`, once per tick
//! 5. Results can spawn new tasks, which are published again
//!
//! ## Shutdown
//! Dropping the manager raises the abort flag, closes the task channel and joins
//! the worker. Tasks check the flag and return early.

pub mod task;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TryRecvError, TrySendError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use web_time::Instant;

use crate::core::Result;
use crate::engine_state::voxels::world::World;
use task::{Task, TaskResult};

/// The channels between the controlling thread and the worker thread.
///
/// # Implementation Notes
/// - Both channels are bounded; the controlling thread only ever uses `try_send`
///   and `try_recv`, so it never blocks
/// - `num_tasks_in_flight` never exceeds the capacity, so the worker never blocks
///   on sending a result either
pub struct TaskChannel {
    task_sender: Option<SyncSender<Box<dyn Task + Send>>>,
    result_receiver: Receiver<Box<dyn TaskResult + Send>>,
    num_tasks_in_flight: usize,
    worker: Option<JoinHandle<()>>,
}

/// Coordinates task execution.
///
/// The `TaskManager` is responsible for:
/// - Creating the worker thread
/// - Queuing tasks while the worker is busy
/// - Collecting and applying task results
/// - Stopping the worker on drop
pub struct TaskManager {
    channel: Option<TaskChannel>,
    queued_tasks: VecDeque<Box<dyn Task + Send>>,
    completed: VecDeque<Box<dyn TaskResult + Send>>,
    max_tasks_in_flight: usize,
    abort: Arc<AtomicBool>,
}

impl TaskManager {
    /// Creates a new `TaskManager`.
    ///
    /// # Arguments
    /// * `multithreaded` - Spawn a worker thread, otherwise tasks run inline in
    ///   `process_queued_tasks()`
    /// * `channel_capacity` - Maximum number of tasks handed to the worker at once
    ///
    /// # Errors
    /// `VoxelError::Io` if the worker thread cannot be spawned.
    pub fn new(multithreaded: bool, channel_capacity: usize) -> Result<Self> {
        let capacity = channel_capacity.max(1);
        let abort = Arc::new(AtomicBool::new(false));

        let channel = if multithreaded {
            let (task_tx, task_rx) = sync_channel::<Box<dyn Task + Send>>(capacity);
            let (result_tx, result_rx) = sync_channel::<Box<dyn TaskResult + Send>>(capacity);
            let worker_abort = Arc::clone(&abort);

            let task_closure = move || {
                while let Ok(task) = task_rx.recv() {
                    let result = task.process(&worker_abort);
                    if result_tx.send(result).is_err() {
                        break;
                    }
                }
                debug!("Task worker exiting");
            };

            let worker = thread::Builder::new()
                .name("chunk-generation".to_string())
                .spawn(task_closure)?;
            info!("Started task worker, channel capacity {}", capacity);

            Some(TaskChannel {
                task_sender: Some(task_tx),
                result_receiver: result_rx,
                num_tasks_in_flight: 0,
                worker: Some(worker),
            })
        } else {
            info!("Running tasks on the controlling thread");
            None
        };

        Ok(TaskManager {
            channel,
            queued_tasks: VecDeque::new(),
            completed: VecDeque::new(),
            max_tasks_in_flight: capacity,
            abort,
        })
    }

    /// Returns `true` when tasks run on the worker thread.
    pub fn is_multithreaded(&self) -> bool {
        self.channel.is_some()
    }

    /// Number of tasks handed to the worker and not yet collected.
    pub fn tasks_in_flight(&self) -> usize {
        self.channel
            .as_ref()
            .map(|c| c.num_tasks_in_flight)
            .unwrap_or(0)
    }

    /// Number of tasks waiting to be handed out.
    pub fn queued_len(&self) -> usize {
        self.queued_tasks.len()
    }

    /// Returns `true` when no task is queued, running or waiting to be applied.
    pub fn is_idle(&self) -> bool {
        self.queued_tasks.is_empty() && self.completed.is_empty() && self.tasks_in_flight() == 0
    }

    /// The shared abort flag.
    pub fn abort_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    /// Asks running tasks to stop early.
    pub fn abort(&self) {
        self.abort.store(true, Ordering::Relaxed);
    }

    /// Attempts to hand a task to the worker.
    ///
    /// # Returns
    /// - `Ok(())` if the worker accepted the task
    /// - `Err(task)` if the channel is full or gone
    fn try_send_task(&mut self, task: Box<dyn Task + Send>) -> std::result::Result<(), Box<dyn Task + Send>> {
        let Some(channel) = self.channel.as_mut() else {
            return Err(task);
        };
        if channel.num_tasks_in_flight >= self.max_tasks_in_flight {
            return Err(task);
        }
        let Some(sender) = channel.task_sender.as_ref() else {
            return Err(task);
        };

        match sender.try_send(task) {
            Ok(()) => {
                channel.num_tasks_in_flight += 1;
                Ok(())
            }
            Err(TrySendError::Full(task)) => Err(task),
            Err(TrySendError::Disconnected(task)) => {
                error!("Task worker disconnected, running tasks inline from now on");
                self.shutdown_worker();
                Err(task)
            }
        }
    }

    /// Publishes a new task for execution.
    ///
    /// # Returns
    /// - `true` if the task was handed to the worker immediately
    /// - `false` if it was queued
    pub fn publish_task(&mut self, task: Box<dyn Task + Send>) -> bool {
        if !self.queued_tasks.is_empty() {
            self.queued_tasks.push_back(task);
            return false;
        }
        match self.try_send_task(task) {
            Ok(()) => true,
            Err(task) => {
                self.queued_tasks.push_back(task);
                false
            }
        }
    }

    /// Hands queued tasks to the worker while it has room.
    ///
    /// Without a worker, every task queued at the time of the call runs inline and
    /// its result waits for `process_completed_tasks()`.
    pub fn process_queued_tasks(&mut self) {
        if self.channel.is_none() {
            let count = self.queued_tasks.len();
            for _ in 0..count {
                let Some(task) = self.queued_tasks.pop_front() else {
                    break;
                };
                self.completed.push_back(task.process(&self.abort));
            }
            return;
        }

        while let Some(task) = self.queued_tasks.pop_front() {
            if let Err(task) = self.try_send_task(task) {
                self.queued_tasks.push_front(task);
                break;
            }
        }
    }

    /// Applies every available task result to the world.
    ///
    /// Follow-up tasks are published, so they run on a later call of
    /// `process_queued_tasks()` at the earliest when running inline.
    ///
    /// # Returns
    /// The number of results applied.
    pub fn process_completed_tasks(&mut self, world: &mut World) -> usize {
        let mut results = Vec::new();
        results.extend(self.completed.drain(..));

        let mut disconnected = false;
        if let Some(channel) = self.channel.as_mut() {
            loop {
                match channel.result_receiver.try_recv() {
                    Ok(result) => {
                        channel.num_tasks_in_flight = channel.num_tasks_in_flight.saturating_sub(1);
                        results.push(result);
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        disconnected = channel.num_tasks_in_flight > 0;
                        break;
                    }
                }
            }
        }
        if disconnected {
            warn!("Task worker stopped with tasks in flight");
            self.shutdown_worker();
        }

        let handled = results.len();
        let mut tasks_to_queue = Vec::new();
        for result in results {
            tasks_to_queue.extend(result.handle_result(world));
        }
        for task in tasks_to_queue {
            self.publish_task(task);
        }
        handled
    }

    /// Runs queued tasks and applies results until idle or out of time.
    ///
    /// # Returns
    /// `true` if the manager became idle before the timeout.
    pub fn process_until_idle(&mut self, world: &mut World, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            self.process_queued_tasks();
            self.process_completed_tasks(world);
            if self.is_idle() {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            if self.is_multithreaded() {
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    fn shutdown_worker(&mut self) {
        let Some(mut channel) = self.channel.take() else {
            return;
        };
        drop(channel.task_sender.take());
        if let Some(worker) = channel.worker.take() {
            if worker.join().is_err() {
                error!("Task worker panicked");
            }
        }
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.abort.store(true, Ordering::Relaxed);
        self.shutdown_worker();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine_state::voxels::world::tests::test_world;
    use cgmath::Point3;
    use std::sync::atomic::AtomicUsize;

    /// Places a stone at its position, then optionally asks for a follow-up.
    struct PlaceTask {
        position: Point3<i32>,
        follow_up: bool,
        processed: Arc<AtomicUsize>,
    }

    struct PlaceResult {
        position: Point3<i32>,
        follow_up: bool,
        aborted: bool,
        processed: Arc<AtomicUsize>,
    }

    impl Task for PlaceTask {
        fn process(&self, abort: &AtomicBool) -> Box<dyn TaskResult + Send> {
            self.processed.fetch_add(1, Ordering::SeqCst);
            Box::new(PlaceResult {
                position: self.position,
                follow_up: self.follow_up,
                aborted: abort.load(Ordering::Relaxed),
                processed: Arc::clone(&self.processed),
            })
        }
    }

    impl TaskResult for PlaceResult {
        fn handle_result(self: Box<Self>, world: &mut World) -> Vec<Box<dyn Task + Send>> {
            if self.aborted {
                return Vec::new();
            }
            let stone = world.registry().index_of("Stone").unwrap();
            world.voxel_place(self.position, stone, None, 0).unwrap();
            if self.follow_up {
                vec![Box::new(PlaceTask {
                    position: self.position + cgmath::Vector3::new(0, 1, 0),
                    follow_up: false,
                    processed: self.processed,
                })]
            } else {
                Vec::new()
            }
        }
    }

    fn place(x: i32, follow_up: bool, processed: &Arc<AtomicUsize>) -> Box<dyn Task + Send> {
        Box::new(PlaceTask {
            position: Point3::new(x, 0, 0),
            follow_up,
            processed: Arc::clone(processed),
        })
    }

    #[test]
    fn test_inline_tasks_run_on_process_calls() {
        let mut world = test_world();
        let mut manager = TaskManager::new(false, 2).unwrap();
        let processed = Arc::new(AtomicUsize::new(0));
        assert!(!manager.is_multithreaded());

        assert!(!manager.publish_task(place(1, true, &processed)));
        assert_eq!(processed.load(Ordering::SeqCst), 0);

        manager.process_queued_tasks();
        assert_eq!(manager.process_completed_tasks(&mut world), 1);
        assert!(world.voxel_get(Point3::new(1, 0, 0)).has_content());
        // The follow-up waits for the next tick.
        assert_eq!(manager.queued_len(), 1);
        assert!(world.voxel_get(Point3::new(1, 1, 0)).is_empty());

        manager.process_queued_tasks();
        manager.process_completed_tasks(&mut world);
        assert!(world.voxel_get(Point3::new(1, 1, 0)).has_content());
        assert!(manager.is_idle());
    }

    #[test]
    fn test_worker_delivers_results() {
        let mut world = test_world();
        let mut manager = TaskManager::new(true, 2).unwrap();
        let processed = Arc::new(AtomicUsize::new(0));

        for x in 0..6 {
            manager.publish_task(place(x, x % 2 == 0, &processed));
        }
        assert!(manager.tasks_in_flight() <= 2);
        assert!(manager.process_until_idle(&mut world, Duration::from_secs(10)));

        assert_eq!(processed.load(Ordering::SeqCst), 9);
        for x in 0..6 {
            assert!(world.voxel_get(Point3::new(x, 0, 0)).has_content());
        }
        assert!(world.voxel_get(Point3::new(4, 1, 0)).has_content());
        assert!(world.voxel_get(Point3::new(3, 1, 0)).is_empty());
    }

    #[test]
    fn test_abort_flag_reaches_tasks() {
        let mut world = test_world();
        let mut manager = TaskManager::new(true, 1).unwrap();
        let processed = Arc::new(AtomicUsize::new(0));
        manager.abort();
        assert!(manager.abort_flag().load(Ordering::Relaxed));

        manager.publish_task(place(3, true, &processed));
        assert!(manager.process_until_idle(&mut world, Duration::from_secs(10)));
        assert_eq!(processed.load(Ordering::SeqCst), 1);
        assert!(world.voxel_get(Point3::new(3, 0, 0)).is_empty());
    }

    #[test]
    fn test_drop_joins_worker() {
        let processed = Arc::new(AtomicUsize::new(0));
        let mut manager = TaskManager::new(true, 4).unwrap();
        for x in 0..4 {
            manager.publish_task(place(x, false, &processed));
        }
        drop(manager);
        // Joined: the worker processed whatever it had received before exiting.
        assert!(processed.load(Ordering::SeqCst) <= 4);
    }
}
