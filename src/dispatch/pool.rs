//! Fixed worker pool over one bounded queue, with shard-ordered execution.

use super::shard::ShardSet;
use crate::metrics::DispatchMetrics;
use crate::telemetry::TelemetryKind;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, RwLock};
use std::time::Instant;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

type Task = Box<dyn FnOnce() + Send + 'static>;

struct Job {
    kind: TelemetryKind,
    shard: usize,
    ticket: u64,
    task: Task,
    submitted: Instant,
}

/// Where a submitted job ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Queued,
    /// The queue was full (or closed); the job runs on its own task.
    Overflow,
}

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub workers: usize,
    pub queue_size: usize,
    pub shards: usize,
}

pub struct Dispatcher {
    sender: RwLock<Option<mpsc::Sender<Job>>>,
    shards: Arc<ShardSet>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    /// Spawn the worker pool. Must be called inside a tokio runtime.
    pub fn start(settings: DispatchSettings) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<Job>(settings.queue_size);
        let rx = Arc::new(Mutex::new(rx));
        let shards = Arc::new(ShardSet::new(settings.shards));

        let workers = (0..settings.workers)
            .map(|id| tokio::spawn(worker_loop(id, rx.clone(), shards.clone())))
            .collect();

        info!(
            workers = settings.workers,
            queue_size = settings.queue_size,
            shards = settings.shards,
            "Dispatch pool started"
        );

        Arc::new(Self {
            sender: RwLock::new(Some(tx)),
            shards,
            workers: Mutex::new(workers),
        })
    }

    /// Hand `task` to the pool without blocking.
    ///
    /// Tasks for the same `(kind, project)` run one at a time in the order
    /// they were submitted. Nothing is ever dropped: a full queue moves the
    /// job onto a fresh task that still waits for its turn on the shard.
    pub fn submit<F>(&self, kind: TelemetryKind, project: &str, task: F) -> Submission
    where
        F: FnOnce() + Send + 'static,
    {
        let shard = self.shards.index(kind.wire_name(), project);
        let lock = self.shards.get(shard);

        let submission = lock.submission();
        let job = Job {
            kind,
            shard,
            ticket: lock.draw(&submission),
            task: Box::new(task),
            submitted: Instant::now(),
        };

        let sender = match self.sender.read() {
            Ok(s) => s.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        let rejected = match sender {
            Some(tx) => match tx.try_send(job) {
                Ok(()) => {
                    DispatchMetrics::record_job_queued(kind);
                    DispatchMetrics::set_queue_depth(tx.max_capacity() - tx.capacity());
                    return Submission::Queued;
                }
                Err(mpsc::error::TrySendError::Full(job)) => job,
                Err(mpsc::error::TrySendError::Closed(job)) => job,
            },
            None => job,
        };

        // The ticket is already drawn, so the job must run or the shard stalls
        DispatchMetrics::record_job_overflow(kind);
        debug!(%kind, project, "dispatch queue full, running job off-pool");
        let shards = self.shards.clone();
        tokio::spawn(async move { execute(&shards, rejected).await });
        drop(submission);
        Submission::Overflow
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Stop accepting queued work and wait for workers to drain the queue.
    pub async fn shutdown(&self) {
        let closed = match self.sender.write() {
            Ok(mut s) => s.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(closed);

        let workers: Vec<_> = self.workers.lock().await.drain(..).collect();
        let count = workers.len();
        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "dispatch worker ended abnormally");
            }
        }
        info!(workers = count, "Dispatch pool drained");
    }
}

async fn worker_loop(id: usize, rx: Arc<Mutex<mpsc::Receiver<Job>>>, shards: Arc<ShardSet>) {
    loop {
        let job = { rx.lock().await.recv().await };
        match job {
            Some(job) => execute(&shards, job).await,
            None => break,
        }
    }
    debug!(worker = id, "dispatch worker exiting");
}

async fn execute(shards: &ShardSet, job: Job) {
    let Job {
        kind,
        shard,
        ticket,
        task,
        submitted,
    } = job;

    let _turn = shards.get(shard).acquire(ticket).await;
    if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
        error!(%kind, shard, panic = panic_message(&*panic), "projection task panicked");
        DispatchMetrics::record_job_panicked(kind);
    }
    DispatchMetrics::record_job_completed(kind, submitted.elapsed().as_secs_f64());
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn settings(workers: usize, queue_size: usize) -> DispatchSettings {
        DispatchSettings {
            workers,
            queue_size,
            shards: 16,
        }
    }

    async fn wait_for(counter: &AtomicUsize, target: usize) {
        for _ in 0..500 {
            if counter.load(Ordering::SeqCst) >= target {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("timed out waiting for {target} jobs");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_same_project_runs_in_submission_order() {
        let pool = Dispatcher::start(settings(8, 1024));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let done = Arc::new(AtomicUsize::new(0));

        for i in 0..200usize {
            let seen = seen.clone();
            let done = done.clone();
            pool.submit(TelemetryKind::Hardware, "svc-a", move || {
                // Uneven work so a free worker would overtake without the lock
                if i % 7 == 0 {
                    std::thread::sleep(Duration::from_micros(200));
                }
                seen.lock().unwrap().push(i);
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        wait_for(&done, 200).await;
        assert_eq!(*seen.lock().unwrap(), (0..200).collect::<Vec<_>>());
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_panic_releases_shard() {
        let pool = Dispatcher::start(settings(2, 16));
        let done = Arc::new(AtomicUsize::new(0));

        pool.submit(TelemetryKind::Nginx, "svc-a", || panic!("boom"));
        let d = done.clone();
        pool.submit(TelemetryKind::Nginx, "svc-a", move || {
            d.fetch_add(1, Ordering::SeqCst);
        });

        wait_for(&done, 1).await;
        pool.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_full_queue_overflows_without_dropping() {
        let pool = Dispatcher::start(settings(1, 1));
        let (release_tx, release_rx) = std::sync::mpsc::channel::<()>();
        let done = Arc::new(AtomicUsize::new(0));

        // Park the only worker
        let d = done.clone();
        pool.submit(TelemetryKind::Ssl, "blocker", move || {
            let _ = release_rx.recv_timeout(Duration::from_secs(5));
            d.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut outcomes = Vec::new();
        for i in 0..5 {
            let d = done.clone();
            let project = format!("p{i}");
            outcomes.push(pool.submit(TelemetryKind::Container, &project, move || {
                d.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert!(outcomes.contains(&Submission::Overflow));

        release_tx.send(()).unwrap();
        wait_for(&done, 6).await;
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_submit_after_shutdown_still_runs() {
        let pool = Dispatcher::start(settings(2, 8));
        pool.shutdown().await;

        let done = Arc::new(AtomicUsize::new(0));
        let d = done.clone();
        let outcome = pool.submit(TelemetryKind::Heartbeat, "svc-a", move || {
            d.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(outcome, Submission::Overflow);
        wait_for(&done, 1).await;
    }
}
