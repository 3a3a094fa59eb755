use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

const RECENT_FAILURES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Publish,
    Synthesize,
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskKind::Publish => f.write_str("publish"),
            TaskKind::Synthesize => f.write_str("synthesize"),
        }
    }
}

struct Task {
    kind: TaskKind,
    essay_id: String,
    future: BoxFuture<'static, Result<()>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskFailure {
    pub kind: TaskKind,
    pub essay_id: String,
    pub error: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskStatsSnapshot {
    pub submitted: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub rejected: u64,
    pub pending: u64,
    pub recent_failures: Vec<TaskFailure>,
}

#[derive(Default)]
struct TaskStats {
    submitted: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
    failures: Mutex<VecDeque<TaskFailure>>,
    settled: Notify,
}

impl TaskStats {
    fn pending(&self) -> u64 {
        let done = self.succeeded.load(Ordering::SeqCst) + self.failed.load(Ordering::SeqCst);
        self.submitted.load(Ordering::SeqCst).saturating_sub(done)
    }

    fn record_failure(&self, failure: TaskFailure) {
        if let Ok(mut failures) = self.failures.lock() {
            if failures.len() == RECENT_FAILURES {
                failures.pop_front();
            }
            failures.push_back(failure);
        }
        self.failed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Runs background essay tasks with bounded concurrency and records the
/// outcome of every task.
#[derive(Clone)]
pub struct TaskPool {
    tx: mpsc::UnboundedSender<Task>,
    stats: Arc<TaskStats>,
    cancel: CancellationToken,
    dispatcher: Arc<tokio::sync::Mutex<Option<JoinHandle<()>>>>,
}

impl TaskPool {
    pub fn spawn(concurrency: usize) -> Self {
        let concurrency = concurrency.max(1);
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(TaskStats::default());
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(dispatch(
            rx,
            Arc::new(Semaphore::new(concurrency)),
            concurrency as u32,
            Arc::clone(&stats),
            cancel.clone(),
        ));

        Self {
            tx,
            stats,
            cancel,
            dispatcher: Arc::new(tokio::sync::Mutex::new(Some(handle))),
        }
    }

    /// Queues `future` without waiting for it. Returns `false` once the pool
    /// has shut down.
    pub fn submit<F>(&self, kind: TaskKind, essay_id: &str, future: F) -> bool
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let task = Task {
            kind,
            essay_id: essay_id.to_string(),
            future: future.boxed(),
        };

        // Count before sending so `pending` never undercounts a running task.
        self.stats.submitted.fetch_add(1, Ordering::SeqCst);
        if self.cancel.is_cancelled() || self.tx.send(task).is_err() {
            self.stats.submitted.fetch_sub(1, Ordering::SeqCst);
            self.stats.rejected.fetch_add(1, Ordering::SeqCst);
            tracing::error!(%kind, essay_id = %essay_id, "Task pool is closed, dropping task");
            return false;
        }
        true
    }

    pub fn stats(&self) -> TaskStatsSnapshot {
        let recent_failures = self
            .stats
            .failures
            .lock()
            .map(|f| f.iter().cloned().collect())
            .unwrap_or_default();
        TaskStatsSnapshot {
            submitted: self.stats.submitted.load(Ordering::SeqCst),
            succeeded: self.stats.succeeded.load(Ordering::SeqCst),
            failed: self.stats.failed.load(Ordering::SeqCst),
            rejected: self.stats.rejected.load(Ordering::SeqCst),
            pending: self.stats.pending(),
            recent_failures,
        }
    }

    /// Resolves once every submitted task has finished.
    #[cfg(test)]
    pub async fn wait_idle(&self) {
        loop {
            let settled = self.stats.settled.notified();
            tokio::pin!(settled);
            settled.as_mut().enable();
            if self.stats.pending() == 0 {
                return;
            }
            settled.await;
        }
    }

    /// Stops accepting tasks and waits for queued and running ones.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.dispatcher.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!("Task dispatcher ended abnormally: {}", e);
            }
        }
    }
}

async fn dispatch(
    mut rx: mpsc::UnboundedReceiver<Task>,
    semaphore: Arc<Semaphore>,
    concurrency: u32,
    stats: Arc<TaskStats>,
    cancel: CancellationToken,
) {
    let mut closing = false;
    loop {
        let next = if closing {
            rx.recv().await
        } else {
            tokio::select! {
                task = rx.recv() => task,
                _ = cancel.cancelled() => {
                    rx.close();
                    closing = true;
                    continue;
                }
            }
        };
        let Some(task) = next else {
            break;
        };

        let Ok(permit) = Arc::clone(&semaphore).acquire_owned().await else {
            break;
        };
        let stats = Arc::clone(&stats);
        tokio::spawn(async move {
            run(task, &stats).await;
            drop(permit);
            stats.settled.notify_waiters();
        });
    }

    // Every permit back means every spawned task has finished.
    if let Ok(permits) = semaphore.acquire_many(concurrency).await {
        permits.forget();
    }
    tracing::info!("Task pool drained");
}

async fn run(task: Task, stats: &TaskStats) {
    let Task {
        kind,
        essay_id,
        future,
    } = task;
    let started = Instant::now();

    let outcome = AssertUnwindSafe(future).catch_unwind().await;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    let error = match outcome {
        Ok(Ok(())) => {
            stats.succeeded.fetch_add(1, Ordering::SeqCst);
            tracing::info!(%kind, essay_id = %essay_id, elapsed_ms, "Background task succeeded");
            return;
        }
        Ok(Err(e)) => e.to_string(),
        Err(_) => "task panicked".to_string(),
    };

    tracing::error!(%kind, essay_id = %essay_id, elapsed_ms, error = %error, "Background task failed");
    stats.record_failure(TaskFailure {
        kind,
        essay_id,
        error,
        at: Utc::now(),
    });
}
