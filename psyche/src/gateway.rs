//! Bounded-time access to the dialogue backend.
//!
//! Backend calls run on a fixed pool of worker tasks fed through a bounded
//! channel; extra submissions wait in the channel. The caller waits at most
//! the configured timeout and always gets exactly one [`Outcome`].

use crate::error::Error;
use crate::traits::{DialogueBackend, QueryRequest, QueryResponse};
use crate::worker::WorkerGroup;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Terminal result of one submitted query.
pub enum Outcome {
    /// The backend answered in time. `None` is an empty answer.
    Success(Option<QueryResponse>),
    TimedOut,
    Failed(anyhow::Error),
}

impl Outcome {
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Success(Some(_)) => "success",
            Outcome::Success(None) => "empty",
            Outcome::TimedOut => "timed_out",
            Outcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Failed(e) => write!(f, "Failed({e:#})"),
            other => f.write_str(other.label()),
        }
    }
}

type Reply = anyhow::Result<Option<QueryResponse>>;

struct Job {
    epoch: u64,
    request: QueryRequest,
    reply: oneshot::Sender<Reply>,
}

/// A submitted call the caller is still waiting on.
pub struct PendingQuery {
    epoch: u64,
    deadline: Instant,
    /// `None` when the pool stayed saturated until the deadline.
    reply: Option<oneshot::Receiver<Reply>>,
}

impl PendingQuery {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// Fixed-size worker pool in front of a [`DialogueBackend`].
pub struct QueryGateway {
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Option<WorkerGroup>>,
    timeout: Duration,
    next_epoch: AtomicU64,
    /// Epoch of the query a caller is currently waiting on; 0 when none.
    awaited: Arc<AtomicU64>,
    late_discards: Arc<AtomicU64>,
}

impl QueryGateway {
    /// Spawn `workers` tasks serving `backend`. Must be called inside a
    /// tokio runtime.
    pub fn new(backend: Arc<dyn DialogueBackend>, workers: usize, timeout: Duration) -> Self {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<Job>(workers);
        let rx = Arc::new(Mutex::new(rx));
        let awaited = Arc::new(AtomicU64::new(0));
        let late_discards = Arc::new(AtomicU64::new(0));

        let mut group = WorkerGroup::new("query_gateway");
        for worker in 0..workers {
            let token = group.token();
            let rx = rx.clone();
            let backend = backend.clone();
            let awaited = awaited.clone();
            let late = late_discards.clone();
            group.spawn(async move {
                loop {
                    let job = tokio::select! {
                        _ = token.cancelled() => break,
                        job = async { rx.lock().await.recv().await } => match job {
                            Some(job) => job,
                            None => break,
                        },
                    };
                    debug!(worker, epoch = job.epoch, "query picked up");
                    let result = tokio::select! {
                        _ = token.cancelled() => break,
                        r = backend.query(job.request) => r,
                    };
                    if awaited.load(Ordering::SeqCst) != job.epoch || job.reply.send(result).is_err() {
                        late.fetch_add(1, Ordering::SeqCst);
                        info!(worker, epoch = job.epoch, "late query result discarded");
                    }
                }
            });
        }
        info!(workers, ?timeout, "query gateway ready");

        Self {
            jobs: Mutex::new(Some(tx)),
            workers: Mutex::new(Some(group)),
            timeout,
            next_epoch: AtomicU64::new(1),
            awaited,
            late_discards,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Hand `request` to the pool without waiting for the answer.
    pub async fn dispatch(&self, request: QueryRequest) -> Result<PendingQuery, Error> {
        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + self.timeout;
        let (reply, rx) = oneshot::channel();
        let tx = self.jobs.lock().await.clone().ok_or(Error::GatewayClosed)?;
        self.awaited.store(epoch, Ordering::SeqCst);
        let job = Job { epoch, request, reply };
        let reply = match tokio::time::timeout_at(deadline, tx.send(job)).await {
            Ok(Ok(())) => Some(rx),
            Ok(Err(_)) => return Err(Error::GatewayClosed),
            Err(_) => {
                warn!(epoch, "query pool saturated");
                None
            }
        };
        Ok(PendingQuery { epoch, deadline, reply })
    }

    /// Wait for `pending` until its deadline.
    pub async fn resolve(&self, pending: PendingQuery) -> Outcome {
        let PendingQuery { epoch, deadline, reply } = pending;
        let outcome = match reply {
            None => Outcome::TimedOut,
            Some(reply) => match tokio::time::timeout_at(deadline, reply).await {
                Ok(Ok(Ok(answer))) => Outcome::Success(answer),
                Ok(Ok(Err(e))) => Outcome::Failed(e),
                Ok(Err(_)) => Outcome::Failed(Error::GatewayClosed.into()),
                Err(_) => Outcome::TimedOut,
            },
        };
        let _ = self
            .awaited
            .compare_exchange(epoch, 0, Ordering::SeqCst, Ordering::SeqCst);
        debug!(epoch, outcome = outcome.label(), "query resolved");
        outcome
    }

    /// Submit `request` and wait for its outcome, bounded by the timeout.
    pub async fn submit(&self, request: QueryRequest) -> Outcome {
        match self.dispatch(request).await {
            Ok(pending) => self.resolve(pending).await,
            Err(e) => Outcome::Failed(e.into()),
        }
    }

    /// Number of backend answers that arrived after their caller gave up.
    pub fn late_discards(&self) -> u64 {
        self.late_discards.load(Ordering::SeqCst)
    }

    /// Stop accepting work and join the pool. In-flight calls are abandoned.
    pub async fn shutdown(&self) {
        self.jobs.lock().await.take();
        let group = self.workers.lock().await.take();
        if let Some(group) = group {
            group.shutdown().await;
            info!("query gateway stopped");
        }
    }
}
