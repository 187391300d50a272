//! Bounded-concurrency work queue for variant generation jobs.
//!
//! The external transcoder is memory- and CPU-hungry: decoding a large
//! source and re-encoding it at several sizes holds multiple full-resolution
//! buffers at once. [`WorkQueue`] caps how many of those jobs run at the
//! same time.
//!
//! Jobs run on a dedicated [rayon](https://docs.rs/rayon) thread pool sized
//! to the configured concurrency. Submissions are injected with
//! `spawn_fifo`, so when every worker is busy the excess waits in
//! submission order.
//!
//! Each submission returns a [`JobHandle`] that yields the job's own
//! outcome. A panicking job is caught and reported only through its handle;
//! siblings keep running and [`WorkQueue::drain`] is unaffected.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use thiserror::Error;

/// Default number of jobs allowed to run at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("failed to start worker pool: {0}")]
    Build(String),
    #[error("job panicked: {0}")]
    Panicked(String),
    #[error("job was dropped before producing a result")]
    Abandoned,
}

/// Count of submitted-but-unfinished jobs, with a condvar to wait for zero.
#[derive(Default)]
struct Outstanding {
    count: Mutex<usize>,
    idle: Condvar,
}

impl Outstanding {
    fn begin(&self) {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn current(&self) -> usize {
        *self.count.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock().unwrap_or_else(PoisonError::into_inner);
        while *count > 0 {
            count = self
                .idle
                .wait(count)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Fixed-parallelism FIFO job runner.
pub struct WorkQueue {
    pool: rayon::ThreadPool,
    concurrency: usize,
    outstanding: Arc<Outstanding>,
}

impl WorkQueue {
    pub fn new(concurrency: usize) -> Result<Self, QueueError> {
        if concurrency == 0 {
            return Err(QueueError::Build("concurrency must be at least 1".into()));
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(concurrency)
            .thread_name(|i| format!("respix-worker-{i}"))
            .build()
            .map_err(|e| QueueError::Build(e.to_string()))?;
        Ok(Self {
            pool,
            concurrency,
            outstanding: Arc::new(Outstanding::default()),
        })
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Queue `job` and return a handle to its result.
    pub fn submit<T, F>(&self, job: F) -> JobHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let outstanding = Arc::clone(&self.outstanding);
        outstanding.begin();
        self.pool.spawn_fifo(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(job))
                .map_err(|payload| QueueError::Panicked(panic_message(payload.as_ref())));
            // The caller may have dropped the handle; nobody to tell then.
            let _ = tx.send(outcome);
            outstanding.finish();
        });
        JobHandle { rx }
    }

    /// Number of jobs submitted but not yet finished.
    pub fn in_flight(&self) -> usize {
        self.outstanding.current()
    }

    /// Block until every submitted job has finished.
    ///
    /// Jobs submitted while draining are waited for too. Job failures are
    /// not reported here; they belong to each job's handle.
    pub fn drain(&self) {
        self.outstanding.wait_idle();
    }
}

/// Receiving end for one job's outcome.
#[must_use = "a job's result is only observable through its handle"]
pub struct JobHandle<T> {
    rx: mpsc::Receiver<Result<T, QueueError>>,
}

impl<T> JobHandle<T> {
    /// Block until the job finishes.
    pub fn wait(self) -> Result<T, QueueError> {
        self.rx.recv().unwrap_or(Err(QueueError::Abandoned))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
