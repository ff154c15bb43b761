use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread;

use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::error::SqlPoolError;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

enum Command {
    Run(Job),
    Shutdown,
}

/// A fixed set of OS threads that run blocking driver calls for async callers.
///
/// The number of workers is independent of the number of pooled connections.
/// A call that is already running is never interrupted: if the caller stops
/// waiting, the call finishes and its result is dropped on the worker.
pub struct WorkerPool {
    sender: Sender<Command>,
    workers: usize,
}

impl WorkerPool {
    /// Spawn `workers` threads.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::WorkerError`] if `workers` is zero or a thread cannot be spawned.
    pub fn new(workers: usize) -> Result<Self, SqlPoolError> {
        if workers == 0 {
            return Err(SqlPoolError::WorkerError(
                "worker pool needs at least one thread".into(),
            ));
        }
        let (sender, receiver) = mpsc::channel::<Command>();
        let receiver = Arc::new(Mutex::new(receiver));
        for id in 0..workers {
            let receiver = receiver.clone();
            thread::Builder::new()
                .name(format!("sql-worker-{id}"))
                .spawn(move || run_worker(id, &receiver))
                .map_err(|err| {
                    SqlPoolError::WorkerError(format!("failed to spawn worker thread: {err}"))
                })?;
        }
        debug!(workers, "worker pool started");
        Ok(Self { sender, workers })
    }

    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Queue `call` without waiting for it.
    ///
    /// # Errors
    /// Hands `call` back when the pool has shut down.
    pub(crate) fn submit(&self, call: Job) -> Result<(), Job> {
        match self.sender.send(Command::Run(call)) {
            Ok(()) => Ok(()),
            Err(mpsc::SendError(Command::Run(call))) => Err(call),
            Err(mpsc::SendError(Command::Shutdown)) => Ok(()),
        }
    }

    /// Run `call` on a worker thread and wait for its result without blocking
    /// the caller's thread.
    ///
    /// # Errors
    /// Returns [`SqlPoolError::WorkerError`] if the pool has shut down or the
    /// call panicked.
    pub async fn run<F, R>(&self, call: F) -> Result<R, SqlPoolError>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            // A caller that gave up has dropped `rx`; the result is discarded here.
            let _ = tx.send(call());
        });
        self.sender
            .send(Command::Run(job))
            .map_err(|_| SqlPoolError::WorkerError("worker pool is shut down".into()))?;
        rx.await.map_err(|_| {
            SqlPoolError::WorkerError("worker dropped the call before it finished".into())
        })
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Jobs queued ahead of the shutdown commands still run.
        for _ in 0..self.workers {
            let _ = self.sender.send(Command::Shutdown);
        }
    }
}

fn run_worker(id: usize, receiver: &Mutex<Receiver<Command>>) {
    loop {
        let command = {
            let guard = match receiver.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.recv()
        };
        match command {
            Ok(Command::Run(job)) => {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!(worker = id, "blocking call panicked");
                }
            }
            Ok(Command::Shutdown) | Err(_) => break,
        }
    }
    debug!(worker = id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use super::*;

    #[tokio::test]
    async fn runs_call_off_the_caller_thread() {
        let pool = WorkerPool::new(2).unwrap();
        let caller = thread::current().id();
        let (worker, value) = pool.run(move || (thread::current().id(), 21 * 2)).await.unwrap();
        assert_ne!(worker, caller);
        assert_eq!(value, 42);
    }

    #[tokio::test]
    async fn concurrency_is_bounded_by_worker_count() {
        let pool = Arc::new(WorkerPool::new(3).unwrap());
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let mut set = tokio::task::JoinSet::new();
        for _ in 0..9 {
            let pool = pool.clone();
            let running = running.clone();
            let peak = peak.clone();
            set.spawn(async move {
                pool.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(20));
                    running.fetch_sub(1, Ordering::SeqCst);
                })
                .await
            });
        }
        while let Some(res) = set.join_next().await {
            res.unwrap().unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn abandoned_call_still_runs_to_completion() {
        let pool = WorkerPool::new(1).unwrap();
        let finished = Arc::new(AtomicUsize::new(0));
        let flag = finished.clone();
        let call = pool.run(move || {
            thread::sleep(Duration::from_millis(50));
            flag.fetch_add(1, Ordering::SeqCst);
        });
        // Give up long before the call is done.
        let _ = tokio::time::timeout(Duration::from_millis(5), call).await;
        let deadline = Instant::now() + Duration::from_secs(2);
        while finished.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_call_reports_error_and_worker_survives() {
        let pool = WorkerPool::new(1).unwrap();
        let err = pool.run(|| -> u8 { panic!("boom") }).await.unwrap_err();
        assert!(matches!(err, SqlPoolError::WorkerError(_)));
        assert_eq!(pool.run(|| 7).await.unwrap(), 7);
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(WorkerPool::new(0).is_err());
    }
}
