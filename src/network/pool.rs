//! Worker Pool
//!
//! Fixed request-handling threads behind a bounded stack of pending jobs.
//! Workers take the most recently queued job first. A full stack rejects
//! new work instead of blocking the connection that submitted it.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

use crate::error::{Result, ShardError};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Outcome of offering work to the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submit {
    Accepted,
    /// Queue full or pool shut down; the job was dropped
    Rejected,
}

struct Pending {
    jobs: VecDeque<Job>,
    closed: bool,
}

/// State shared between submitters and workers
struct JobStack {
    pending: Mutex<Pending>,
    available: Condvar,
}

impl JobStack {
    /// Next job to run, newest first. `None` once closed and drained.
    fn take(&self) -> Option<Job> {
        let mut pending = self.pending.lock();
        loop {
            if let Some(job) = pending.jobs.pop_back() {
                return Some(job);
            }
            if pending.closed {
                return None;
            }
            self.available.wait(&mut pending);
        }
    }
}

/// Bounded LIFO thread pool
pub struct WorkerPool {
    stack: Arc<JobStack>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    capacity: usize,
}

impl WorkerPool {
    /// Start `threads` workers sharing a stack of `capacity` pending jobs
    pub fn new(threads: usize, capacity: usize) -> Result<Self> {
        if threads == 0 || capacity == 0 {
            return Err(ShardError::Config(
                "worker pool needs at least one thread and one queue slot".to_string(),
            ));
        }

        let stack = Arc::new(JobStack {
            pending: Mutex::new(Pending {
                jobs: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            available: Condvar::new(),
        });
        let mut handles = Vec::with_capacity(threads);

        for i in 0..threads {
            let stack = Arc::clone(&stack);
            let handle = thread::Builder::new()
                .name(format!("shardkv-worker-{}", i))
                .spawn(move || {
                    while let Some(job) = stack.take() {
                        if panic::catch_unwind(AssertUnwindSafe(job)).is_err() {
                            tracing::error!("request handler panicked");
                        }
                    }
                })?;
            handles.push(handle);
        }

        tracing::debug!(threads, capacity, "worker pool started");

        Ok(Self {
            stack,
            handles: Mutex::new(handles),
            capacity,
        })
    }

    /// Queue `job` if there is room
    pub fn try_execute<F>(&self, job: F) -> Submit
    where
        F: FnOnce() + Send + 'static,
    {
        let mut pending = self.stack.pending.lock();
        if pending.closed {
            return Submit::Rejected;
        }
        if pending.jobs.len() >= self.capacity {
            drop(pending);
            tracing::warn!(capacity = self.capacity, "request queue full; rejecting");
            return Submit::Rejected;
        }

        pending.jobs.push_back(Box::new(job));
        drop(pending);
        self.stack.available.notify_one();
        Submit::Accepted
    }

    /// Jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.stack.pending.lock().jobs.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Stop accepting work, run what is queued, and join the workers
    pub fn shutdown(&self) {
        self.stack.pending.lock().closed = true;
        self.stack.available.notify_all();

        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
