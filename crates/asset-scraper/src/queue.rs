//! Concurrency-bounded job queue.
//!
//! Admits at most `concurrency` jobs at a time in FIFO order, bounds each
//! job with an optional timeout and lets shutdown wait until nothing is
//! queued or running.

use serde::Serialize;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tracing::warn;

const DEFAULT_CONCURRENCY: usize = 7;
const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(60);

/// What a timed-out job turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// The job yields no result, like any other failed extraction.
    Fail,
    /// The submitter receives [`QueueError::Timeout`].
    Error,
}

impl FromStr for TimeoutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "error" => Ok(Self::Error),
            other => Err(format!("unknown timeout policy: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub concurrency: usize,
    /// `None` lets jobs run as long as they need.
    pub job_timeout: Option<Duration>,
    pub timeout_policy: TimeoutPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            job_timeout: Some(DEFAULT_JOB_TIMEOUT),
            timeout_policy: TimeoutPolicy::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("job timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("job queue is closed")]
    Closed,
}

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
    pub completed: u64,
    pub timed_out: u64,
    pub concurrency: usize,
}

pub struct JobQueue {
    config: QueueConfig,
    permits: Semaphore,
    /// Jobs submitted and not yet finished, queued or running.
    outstanding: watch::Sender<usize>,
    running: AtomicUsize,
    completed: AtomicU64,
    timed_out: AtomicU64,
    accepting: AtomicBool,
}

impl JobQueue {
    pub fn new(config: QueueConfig) -> Self {
        let concurrency = config.concurrency.max(1);
        let (outstanding, _) = watch::channel(0);
        Self {
            config: QueueConfig {
                concurrency,
                ..config
            },
            permits: Semaphore::new(concurrency),
            outstanding,
            running: AtomicUsize::new(0),
            completed: AtomicU64::new(0),
            timed_out: AtomicU64::new(0),
            accepting: AtomicBool::new(true),
        }
    }

    /// Run `job` once a slot is free.
    ///
    /// The tokio semaphore is fair, so waiting jobs are admitted in the
    /// order they were submitted. A job that exceeds the timeout is dropped
    /// and resolved according to the [`TimeoutPolicy`].
    pub async fn submit<T, F>(&self, job: F) -> Result<Option<T>, QueueError>
    where
        F: Future<Output = Option<T>>,
    {
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        let _outstanding = Tracked::enter(&self.outstanding);
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| QueueError::Closed)?;

        let _running = Running::enter(&self.running);
        let result = match self.config.job_timeout {
            Some(limit) => match tokio::time::timeout(limit, job).await {
                Ok(output) => Ok(output),
                Err(_) => {
                    self.timed_out.fetch_add(1, Ordering::Relaxed);
                    warn!(timeout_ms = limit.as_millis() as u64, "job timed out");
                    match self.config.timeout_policy {
                        TimeoutPolicy::Fail => Ok(None),
                        TimeoutPolicy::Error => Err(QueueError::Timeout(limit)),
                    }
                }
            },
            None => Ok(job.await),
        };
        self.completed.fetch_add(1, Ordering::Relaxed);
        result
    }

    /// Wait until no job is queued or running.
    pub async fn drain(&self) {
        let mut rx = self.outstanding.subscribe();
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    /// Refuse new submissions. Jobs already submitted still run.
    pub fn close(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        !self.accepting.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> QueueStats {
        let outstanding = *self.outstanding.borrow();
        let running = self.running.load(Ordering::SeqCst);
        QueueStats {
            queued: outstanding.saturating_sub(running),
            running,
            completed: self.completed.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            concurrency: self.config.concurrency,
        }
    }
}

/// Counts a job as outstanding for as long as it lives, including when the
/// submitting future is dropped mid-wait.
struct Tracked<'a>(&'a watch::Sender<usize>);

impl<'a> Tracked<'a> {
    fn enter(counter: &'a watch::Sender<usize>) -> Self {
        counter.send_modify(|n| *n += 1);
        Self(counter)
    }
}

impl Drop for Tracked<'_> {
    fn drop(&mut self) {
        self.0.send_modify(|n| *n -= 1);
    }
}

struct Running<'a>(&'a AtomicUsize);

impl<'a> Running<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}
