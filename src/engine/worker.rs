//! Background Worker
//!
//! The single lane that runs flushes and compactions, strictly one at a time.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::{self, Receiver, Sender};

use crate::error::{Result, ShardError};

use super::Shared;

/// Work the lane knows how to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Job {
    /// Persist the installed flushing buffer
    Flush,
    /// Merge all segments into one
    Compact,
    /// No-op; completes once everything queued before it has finished
    Barrier,
}

struct Task {
    job: Job,
    done: Sender<Result<()>>,
}

/// Completion handle for a job on the background lane
#[must_use = "dropping a ticket does not cancel the job, but its outcome is lost"]
pub struct FlushTicket {
    receiver: Option<Receiver<Result<()>>>,
}

impl FlushTicket {
    /// A ticket for work that needed nothing done
    pub(crate) fn completed() -> Self {
        Self { receiver: None }
    }

    /// Block until the job finishes and return its outcome
    pub fn wait(self) -> Result<()> {
        match self.receiver {
            Some(receiver) => receiver.recv().map_err(|_| ShardError::WorkerStopped)?,
            None => Ok(()),
        }
    }
}

pub(crate) struct Worker {
    sender: Option<Sender<Task>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub(crate) fn spawn(shared: Arc<Shared>) -> Result<Self> {
        let (sender, receiver) = channel::unbounded::<Task>();

        let handle = thread::Builder::new()
            .name("shardkv-bg".to_string())
            .spawn(move || {
                for task in receiver.iter() {
                    let result = match task.job {
                        Job::Flush => shared.flush_job(),
                        Job::Compact => shared.compact_job(),
                        Job::Barrier => Ok(()),
                    };
                    // The submitter may not be waiting
                    let _ = task.done.send(result);
                }
                tracing::debug!("background worker stopped");
            })?;

        Ok(Self {
            sender: Some(sender),
            handle: Some(handle),
        })
    }

    pub(crate) fn submit(&self, job: Job) -> Result<FlushTicket> {
        let sender = self.sender.as_ref().ok_or(ShardError::WorkerStopped)?;
        let (done, receiver) = channel::bounded(1);
        sender
            .send(Task { job, done })
            .map_err(|_| ShardError::WorkerStopped)?;
        Ok(FlushTicket {
            receiver: Some(receiver),
        })
    }

    /// Finish queued jobs, then stop the thread
    pub(crate) fn shutdown(&mut self) {
        self.sender.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("background worker panicked");
            }
        }
    }
}
