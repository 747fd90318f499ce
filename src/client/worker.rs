//! Generic async request/response worker channel
//!
//! Models the client's two worker units (chunk decode, mesh
//! generation) as message-passing channels with request correlation
//! built in: each request carries a oneshot for its response and a
//! cancellation token. Callers get a 5 second timeout; on timeout the
//! token is cancelled so a job that has not started yet is skipped.
//! A job that is already running cannot be interrupted; its result is
//! simply discarded when the response receiver is gone.
//!
//! All payloads are owned values, copied at the boundary; workers never
//! share memory with the caller.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};

use crate::core::error::Error;
use crate::core::types::Result;

/// Fixed timeout for worker requests
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Cooperative cancellation flag shared between caller and worker
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

struct Job<Req, Resp> {
    payload: Req,
    respond: oneshot::Sender<Resp>,
    token: CancellationToken,
}

/// Handle to a worker task processing requests of one kind
pub struct Worker<Req, Resp> {
    tx: mpsc::UnboundedSender<Job<Req, Resp>>,
    name: &'static str,
}

impl<Req, Resp> Clone for Worker<Req, Resp> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            name: self.name,
        }
    }
}

impl<Req, Resp> Worker<Req, Resp>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    /// Spawn a serial worker: jobs run one at a time in submission
    /// order (the mesh-generation discipline).
    pub fn spawn_serial<F>(name: &'static str, work: F) -> Self
    where
        F: Fn(Req) -> Resp + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job<Req, Resp>>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if job.token.is_cancelled() {
                    continue;
                }
                let resp = work(job.payload);
                // Receiver may have timed out; the result is discarded
                let _ = job.respond.send(resp);
            }
        });
        Self { tx, name }
    }

    /// Spawn a concurrent worker: each job runs in its own task with no
    /// concurrency cap (the chunk-decode discipline).
    pub fn spawn_concurrent<F>(name: &'static str, work: F) -> Self
    where
        F: Fn(Req) -> Resp + Send + Sync + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job<Req, Resp>>();
        let work = Arc::new(work);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let work = Arc::clone(&work);
                tokio::spawn(async move {
                    if job.token.is_cancelled() {
                        return;
                    }
                    let resp = work(job.payload);
                    let _ = job.respond.send(resp);
                });
            }
        });
        Self { tx, name }
    }

    /// Submit a request and wait for the response, bounded by
    /// [`REQUEST_TIMEOUT`]. On timeout the request's token is cancelled
    /// and the pending response dropped.
    pub async fn request(&self, payload: Req) -> Result<Resp> {
        let (respond, rx) = oneshot::channel();
        let token = CancellationToken::new();
        let job = Job {
            payload,
            respond,
            token: token.clone(),
        };
        self.tx
            .send(job)
            .map_err(|_| Error::Worker(format!("{} worker is gone", self.name)))?;

        match tokio::time::timeout(REQUEST_TIMEOUT, rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(Error::Worker(format!(
                "{} worker dropped the request",
                self.name
            ))),
            Err(_) => {
                token.cancel();
                Err(Error::Worker(format!(
                    "{} request timed out after {:?}",
                    self.name, REQUEST_TIMEOUT
                )))
            }
        }
    }
}
