//! Worker pool - bounded concurrency with per-channel ordering.
//!
//! A [`WorkerManager`] owns a fixed set of [`Worker`]s, each a dedicated thread
//! draining its own FIFO. Every channel is assigned exactly one worker at
//! creation by the configured [`LoadBalance`] strategy and keeps it for its
//! whole life, so one channel's tasks never run concurrently or out of order,
//! while different channels run in parallel up to the pool size.
//!
//! # Example
//!
//! ```
//! use smartnet::worker::{LoadBalance, WorkerManager};
//!
//! let manager = WorkerManager::new(4, LoadBalance::Hash).unwrap();
//! let worker = manager.assign(10);
//! assert_eq!(worker.index(), 2);
//! worker.submit(|| println!("runs on worker 2")).unwrap();
//! ```

mod balance;
mod queue;

pub use balance::LoadBalance;
pub use queue::{Task, Worker};
pub(crate) use queue::panic_message;

use std::sync::Arc;

use balance::Balancer;

use crate::error::Result;

/// Thread name prefix for server workers.
pub const WORKER_THREAD_NAME: &str = "smart-worker";

/// Number of workers used when the configured count is zero.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Fixed-size set of workers plus an assignment strategy.
pub struct WorkerManager {
    workers: Vec<Arc<Worker>>,
    balancer: Balancer,
}

impl WorkerManager {
    /// Spawn `size` workers (hardware parallelism when `size == 0`).
    pub fn new(size: usize, strategy: LoadBalance) -> Result<Self> {
        Self::with_name(WORKER_THREAD_NAME, size, strategy)
    }

    /// Like [`WorkerManager::new`] with a custom thread name prefix.
    pub fn with_name(name: &str, size: usize, strategy: LoadBalance) -> Result<Self> {
        let size = if size == 0 {
            default_worker_count()
        } else {
            size
        };
        let workers = (0..size)
            .map(|index| Worker::spawn(name, index))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(workers = size, load_balance = %strategy, "worker pool started");
        Ok(Self {
            workers,
            balancer: Balancer::new(strategy),
        })
    }

    /// Choose the worker for connection `id`.
    ///
    /// The caller keeps the returned handle for the channel's lifetime; the
    /// strategy is consulted once per channel.
    pub fn assign(&self, id: u64) -> Arc<Worker> {
        let index = self.balancer.pick(id, self.workers.len());
        self.workers[index].clone()
    }

    /// Number of workers with queued or executing work.
    pub fn running_worker_count(&self) -> usize {
        self.workers.iter().filter(|w| w.is_busy()).count()
    }

    /// The configured strategy.
    pub fn load_balance(&self) -> LoadBalance {
        self.balancer.strategy()
    }

    /// Pool size.
    pub fn len(&self) -> usize {
        self.workers.len()
    }

    /// `true` when the pool holds no worker.
    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    /// Worker at `index`.
    pub fn get(&self, index: usize) -> Option<&Arc<Worker>> {
        self.workers.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_zero_uses_parallelism() {
        let manager = WorkerManager::new(0, LoadBalance::RoundRobin).unwrap();
        assert_eq!(manager.len(), default_worker_count());
        assert!(!manager.is_empty());
    }

    #[test]
    fn test_assign_hash() {
        let manager = WorkerManager::new(3, LoadBalance::Hash).unwrap();
        assert_eq!(manager.assign(4).index(), 1);
        assert_eq!(manager.assign(4).index(), 1);
        assert_eq!(manager.load_balance(), LoadBalance::Hash);
    }

    #[test]
    fn test_assign_round_robin_spreads() {
        let manager = WorkerManager::new(4, LoadBalance::RoundRobin).unwrap();
        let indexes: Vec<_> = (0..4).map(|id| manager.assign(id).index()).collect();
        assert_eq!(indexes, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_running_worker_count() {
        let manager = WorkerManager::new(2, LoadBalance::RoundRobin).unwrap();
        assert_eq!(manager.running_worker_count(), 0);

        let (release_tx, release_rx) = mpsc::channel::<()>();
        manager
            .get(0)
            .unwrap()
            .submit(move || {
                let _ = release_rx.recv();
            })
            .unwrap();
        assert_eq!(manager.running_worker_count(), 1);

        release_tx.send(()).unwrap();
        for _ in 0..500 {
            if manager.running_worker_count() == 0 {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("worker never drained");
    }
}
