//! Queue worker loops and the concurrency gate.
//!
//! Each worker is a spawned task that pops downloads off the shared deque
//! and runs them to completion, asking the gate for permission before each
//! new task and exiting when the queue drains or the gate refuses. The
//! gate is deliberately soft: force-started tasks spawn a worker past the
//! configured limit, so a burst of force-starts can transiently exceed
//! `max_concurrent_downloads`.

use std::sync::atomic::Ordering;

use crate::types::Status;

use super::PodcastDownloader;

impl PodcastDownloader {
    /// Spawn a new worker if the queue has work and the gate allows it.
    ///
    /// A worker is spawned when any of these hold:
    /// - `force_start` is set (bypasses the limit; the worker is
    ///   guaranteed one task before the gate applies)
    /// - no workers are running
    /// - the concurrency limit is disabled
    /// - the worker count is below `max_concurrent_downloads`
    pub(crate) async fn spawn_workers(&self, force_start: bool) {
        let mut workers = self.queue_state.workers.lock().await;

        if self.queue_state.queue.lock().await.is_empty() {
            return;
        }

        let limit_enabled = self.config.download.limit_downloads_enabled;
        let max_workers = self.config.download.max_concurrent_downloads;

        let spawn = force_start
            || workers.is_empty()
            || !limit_enabled
            || workers.len() < max_workers;

        if !spawn {
            return;
        }

        let worker_id = self.queue_state.next_worker_id.fetch_add(1, Ordering::SeqCst);
        workers.push(worker_id);
        drop(workers);

        // The forced task must run even if the gate would refuse right away
        let minimum_tasks = if force_start { 1 } else { 0 };

        let downloader = self.clone();
        tokio::spawn(async move {
            downloader.worker_loop(worker_id, minimum_tasks).await;
        });

        tracing::debug!(worker_id, minimum_tasks, "Spawned queue worker");
    }

    /// One worker's life: pop from the queue tail, run, repeat.
    ///
    /// The `minimum_tasks` guarantee lets a force-started worker process
    /// at least its task before the gate can turn it away. An empty queue
    /// ends the loop.
    async fn worker_loop(self, worker_id: u64, minimum_tasks: usize) {
        let mut tasks_run = 0usize;

        loop {
            if tasks_run >= minimum_tasks && !self.continue_check(worker_id).await {
                // The gate already deregistered this worker
                tracing::debug!(worker_id, "Worker over the limit, exiting");
                return;
            }

            let task = { self.queue_state.queue.lock().await.pop_back() };
            let Some(task) = task else {
                break;
            };

            // A task cancelled or paused while still queued is skipped;
            // control flow already updated its state
            if task.status() != Status::Queued {
                continue;
            }

            self.run_task(task).await;
            tasks_run += 1;
        }

        self.deregister_worker(worker_id).await;
        tracing::debug!(worker_id, tasks_run, "Queue worker finished");
    }

    /// The gate a worker consults before accepting another task.
    ///
    /// When the limit is enabled and more workers are alive than the limit
    /// allows (force-starts can cause this), the surplus worker is removed
    /// from the active list and told to stop.
    async fn continue_check(&self, worker_id: u64) -> bool {
        let limit_enabled = self.config.download.limit_downloads_enabled;
        if !limit_enabled {
            return true;
        }

        let max_workers = self.config.download.max_concurrent_downloads;
        let mut workers = self.queue_state.workers.lock().await;
        if workers.len() > max_workers {
            workers.retain(|id| *id != worker_id);
            return false;
        }
        true
    }

    /// Bookkeeping when a worker's loop ends
    async fn deregister_worker(&self, worker_id: u64) {
        let mut workers = self.queue_state.workers.lock().await;
        workers.retain(|id| *id != worker_id);
    }
}
