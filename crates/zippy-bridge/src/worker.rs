//! [`RequestWorker`] – the dedicated request thread.
//!
//! Long-running exchanges with the model server (prompt submission) are
//! executed here so the caller's thread is never held up.  The worker owns
//! one OS thread and a bounded FIFO queue of jobs:
//!
//! * the thread is started by [`RequestWorker::start`] and lives until
//!   [`RequestWorker::shutdown`] (or `Drop`);
//! * jobs run one at a time in submission order;
//! * shutdown closes the queue, lets jobs that were already queued finish,
//!   and joins the thread before returning.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, SyncSender, TrySendError};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tracing::{debug, error, warn};
use zippy_types::ZippyError;

/// A unit of work executed on the worker thread.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Name given to the worker's OS thread.
const THREAD_NAME: &str = "zippy-request-worker";

/// Single-thread, bounded job queue.
pub struct RequestWorker {
    sender: Mutex<Option<SyncSender<Job>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    capacity: usize,
}

impl RequestWorker {
    /// Spawn the worker thread with room for `capacity` pending jobs.
    ///
    /// A `capacity` of zero is raised to one so that a job can always be
    /// handed over while the worker is idle.
    ///
    /// # Errors
    ///
    /// Returns [`ZippyError::Runtime`] if the OS refuses to spawn the thread.
    pub fn start(capacity: usize) -> Result<Self, ZippyError> {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::sync_channel::<Job>(capacity);

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                debug!("request worker started");
                // `recv` keeps yielding queued jobs after the sender is
                // dropped and only fails once the queue is empty.
                while let Ok(job) = receiver.recv() {
                    if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!("request job panicked; worker continues with the next job");
                    }
                }
                debug!("request worker stopped");
            })
            .map_err(|e| ZippyError::Runtime(format!("Failed to spawn request worker: {e}")))?;

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
            capacity,
        })
    }

    /// Maximum number of jobs that may wait in the queue.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `true` until [`shutdown`][Self::shutdown] has been called.
    pub fn is_running(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Enqueue `job` without blocking.
    ///
    /// # Errors
    ///
    /// * [`ZippyError::QueueFull`] – `capacity` jobs are already waiting.
    /// * [`ZippyError::WorkerStopped`] – the worker has been shut down.
    pub fn submit(&self, job: Job) -> Result<(), ZippyError> {
        let guard = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let sender = guard.as_ref().ok_or(ZippyError::WorkerStopped)?;
        sender.try_send(job).map_err(|e| match e {
            TrySendError::Full(_) => ZippyError::QueueFull,
            TrySendError::Disconnected(_) => ZippyError::WorkerStopped,
        })
    }

    /// Close the queue, drain pending jobs and join the thread.
    ///
    /// Idempotent: later calls return immediately.
    pub fn shutdown(&self) {
        // Dropping the sender is what ends the worker's receive loop.
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                warn!("request worker asked to join itself; leaving the thread detached");
                return;
            }
            if handle.join().is_err() {
                error!("request worker thread terminated with a panic");
            }
        }
    }
}

impl Drop for RequestWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    #[test]
    fn idle_worker_shuts_down_cleanly() {
        let worker = RequestWorker::start(4).expect("start");
        assert!(worker.is_running());
        worker.shutdown();
        assert!(!worker.is_running());
    }

    #[test]
    fn drop_without_jobs_does_not_hang() {
        let worker = RequestWorker::start(1).expect("start");
        drop(worker);
    }

    #[test]
    fn jobs_run_in_submission_order() {
        let worker = RequestWorker::start(8).expect("start");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let seen = seen.clone();
            worker
                .submit(Box::new(move || seen.lock().unwrap().push(i)))
                .expect("submit");
        }
        worker.shutdown();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn shutdown_drains_queued_jobs() {
        let worker = RequestWorker::start(8).expect("start");
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let done = done.clone();
            worker
                .submit(Box::new(move || {
                    thread::sleep(Duration::from_millis(20));
                    done.fetch_add(1, Ordering::SeqCst);
                }))
                .expect("submit");
        }
        worker.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn submit_after_shutdown_is_rejected() {
        let worker = RequestWorker::start(2).expect("start");
        worker.shutdown();
        let result = worker.submit(Box::new(|| {}));
        assert_eq!(result, Err(ZippyError::WorkerStopped));
    }

    #[test]
    fn full_queue_rejects_new_jobs() {
        let worker = RequestWorker::start(1).expect("start");
        let gate = Arc::new(Barrier::new(2));

        // Occupy the thread until the test releases the barrier.
        let blocker = gate.clone();
        worker
            .submit(Box::new(move || {
                blocker.wait();
            }))
            .expect("submit blocker");

        // Wait for the worker to pick the blocker up, leaving the queue empty.
        let mut queued = false;
        for _ in 0..100 {
            match worker.submit(Box::new(|| {})) {
                Ok(()) => {
                    queued = true;
                    break;
                }
                Err(ZippyError::QueueFull) => thread::sleep(Duration::from_millis(5)),
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert!(queued, "worker never dequeued the blocking job");

        // Queue holds one job and the thread is blocked: the next one is refused.
        assert_eq!(worker.submit(Box::new(|| {})), Err(ZippyError::QueueFull));

        gate.wait();
        worker.shutdown();
    }

    #[test]
    fn panicking_job_does_not_kill_the_worker() {
        let worker = RequestWorker::start(4).expect("start");
        let done = Arc::new(AtomicUsize::new(0));
        let fail = true;
        worker
            .submit(Box::new(move || {
                if fail {
                    panic!("job failure");
                }
            }))
            .expect("submit");
        let d = done.clone();
        worker
            .submit(Box::new(move || {
                d.fetch_add(1, Ordering::SeqCst);
            }))
            .expect("submit");
        worker.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        let worker = RequestWorker::start(0).expect("start");
        assert_eq!(worker.capacity(), 1);
    }
}
