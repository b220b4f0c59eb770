//! Single-concurrency task queue backed by a dedicated OS thread.

use std::any::Any;
use std::cell::Cell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::error::{Result, SmartError};

/// A unit of work submitted to a [`Worker`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

thread_local! {
    static CURRENT_WORKER: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Single-threaded FIFO executor.
///
/// Tasks submitted to the same worker run one at a time in submission order.
/// A task that panics is logged and the worker moves on to the next one.
/// The thread exits once every handle to the worker has been dropped and the
/// queue is drained.
pub struct Worker {
    index: usize,
    tx: mpsc::UnboundedSender<Task>,
    /// Queued plus executing tasks.
    pending: Arc<AtomicUsize>,
}

impl std::fmt::Debug for Worker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("index", &self.index)
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Worker {
    /// Spawn a worker thread named `{name}-{index}`.
    pub fn spawn(name: &str, index: usize) -> Result<Arc<Worker>> {
        let (tx, rx) = mpsc::unbounded_channel::<Task>();
        let pending = Arc::new(AtomicUsize::new(0));

        let thread_pending = pending.clone();
        std::thread::Builder::new()
            .name(format!("{}-{}", name, index))
            .spawn(move || run(index, rx, thread_pending))?;

        Ok(Arc::new(Worker { index, tx, pending }))
    }

    /// Position of this worker in its manager.
    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Queue `task` behind everything already submitted.
    ///
    /// Never runs the task on the calling thread.
    pub fn submit<F>(&self, task: F) -> Result<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.tx.send(Box::new(task)).map_err(|_| {
            self.pending.fetch_sub(1, Ordering::AcqRel);
            SmartError::ChannelClosed
        })
    }

    /// Number of tasks queued or executing.
    #[inline]
    pub fn pending_count(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Whether the worker has queued or executing work.
    #[inline]
    pub fn is_busy(&self) -> bool {
        self.pending_count() > 0
    }

    /// Index of the worker executing the current thread, if any.
    pub fn current_index() -> Option<usize> {
        CURRENT_WORKER.with(|c| c.get())
    }
}

fn run(index: usize, mut rx: mpsc::UnboundedReceiver<Task>, pending: Arc<AtomicUsize>) {
    CURRENT_WORKER.with(|c| c.set(Some(index)));
    tracing::debug!(worker = index, "worker started");

    while let Some(task) = rx.blocking_recv() {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
            let message = panic_message(panic.as_ref());
            tracing::error!(worker = index, panic = %message, "task panicked");
        }
        pending.fetch_sub(1, Ordering::AcqRel);
    }

    tracing::debug!(worker = index, "worker stopped");
}

/// Text of a caught panic payload.
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::time::{Duration, Instant};

    fn wait_idle(worker: &Worker) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while worker.is_busy() {
            assert!(Instant::now() < deadline, "worker did not drain");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_tasks_run_in_submission_order() {
        let worker = Worker::spawn("test-worker", 0).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for i in 0..100 {
            let seen = seen.clone();
            worker.submit(move || seen.lock().push(i)).unwrap();
        }
        wait_idle(&worker);

        assert_eq!(*seen.lock(), (0..100).collect::<Vec<_>>());
    }

    #[test]
    fn test_panic_does_not_kill_worker() {
        let worker = Worker::spawn("test-worker", 1).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        worker.submit(|| panic!("boom")).unwrap();
        let r = ran.clone();
        worker
            .submit(move || {
                r.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        wait_idle(&worker);

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_current_index_inside_task() {
        let worker = Worker::spawn("test-worker", 3).unwrap();
        let observed = Arc::new(Mutex::new(None));
        let o = observed.clone();
        worker.submit(move || *o.lock() = Worker::current_index()).unwrap();
        wait_idle(&worker);

        assert_eq!(*observed.lock(), Some(3));
        assert_eq!(Worker::current_index(), None);
    }

    #[test]
    fn test_pending_count_tracks_blocked_task() {
        let worker = Worker::spawn("test-worker", 2).unwrap();
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();

        worker
            .submit(move || {
                let _ = release_rx.recv();
            })
            .unwrap();
        worker.submit(|| {}).unwrap();
        assert!(worker.is_busy());
        assert_eq!(worker.pending_count(), 2);

        release_tx.send(()).unwrap();
        wait_idle(&worker);
        assert_eq!(worker.pending_count(), 0);
    }
}
