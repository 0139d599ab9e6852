//! Brokerage connection context.
//!
//! A [`BrokerConnection`] owns one dedicated worker thread running a
//! single-threaded tokio runtime. Every request against the broker is queued
//! to that thread and executed one at a time, so responses on the underlying
//! session can never interleave. Each job runs under a fixed wall-clock timeout.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::errors::CoreError;
use crate::models::snapshot::PortfolioSnapshot;
use crate::models::transaction::RawTransaction;

/// Login secrets for the brokerage account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub phone_number: String,
    pub pin: String,
}

impl Credentials {
    pub fn new(phone_number: impl Into<String>, pin: impl Into<String>) -> Self {
        Self {
            phone_number: phone_number.into(),
            pin: pin.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("phone_number", &self.phone_number)
            .field("pin", &"***")
            .finish()
    }
}

/// One page of the broker's timeline, newest items first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimelinePage {
    pub items: Vec<RawTransaction>,
    /// Cursor for the next (older) page; `None` on the last page
    pub after: Option<String>,
}

/// The brokerage API as seen by the core.
///
/// Implementations talk to the real broker; tests substitute mocks.
#[async_trait]
pub trait BrokerApi: Send + Sync {
    fn name(&self) -> &str;

    async fn login(&self, credentials: &Credentials) -> Result<(), CoreError>;

    /// Fetch one timeline page. `after = None` requests the newest page.
    async fn timeline_page(&self, after: Option<String>) -> Result<TimelinePage, CoreError>;

    async fn portfolio_snapshot(&self) -> Result<PortfolioSnapshot, CoreError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Closed,
    Open,
    Authenticated,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Closed => write!(f, "closed"),
            ConnectionState::Open => write!(f, "open"),
            ConnectionState::Authenticated => write!(f, "authenticated"),
        }
    }
}

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

struct Worker {
    jobs: mpsc::Sender<Job>,
    handle: JoinHandle<()>,
}

/// Explicit per-user connection: `Closed → Open → Authenticated → Closed`.
pub struct BrokerConnection {
    api: Arc<dyn BrokerApi>,
    timeout: Duration,
    state: ConnectionState,
    worker: Option<Worker>,
}

impl fmt::Debug for BrokerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConnection")
            .field("api", &self.api.name())
            .field("timeout", &self.timeout)
            .field("state", &self.state)
            .finish()
    }
}

impl BrokerConnection {
    pub fn new(api: Arc<dyn BrokerApi>, timeout: Duration) -> Self {
        Self {
            api,
            timeout,
            state: ConnectionState::Closed,
            worker: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_authenticated(&self) -> bool {
        self.state == ConnectionState::Authenticated
    }

    /// Start the worker thread. Opening an open connection is a no-op.
    pub fn open(&mut self) -> Result<(), CoreError> {
        if self.worker.is_some() {
            return Ok(());
        }

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| CoreError::Connection(format!("cannot build worker runtime: {e}")))?;
        let (jobs, queue) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name(format!("broker-{}", self.api.name()))
            .spawn(move || {
                while let Ok(job) = queue.recv() {
                    runtime.block_on(job);
                }
                debug!("broker worker stopped");
            })
            .map_err(|e| CoreError::Connection(format!("cannot spawn worker thread: {e}")))?;

        self.worker = Some(Worker { jobs, handle });
        self.state = ConnectionState::Open;
        info!(broker = self.api.name(), "broker connection opened");
        Ok(())
    }

    /// Log in on the worker thread. Requires an open connection.
    pub async fn authenticate(&mut self, credentials: &Credentials) -> Result<(), CoreError> {
        if self.state == ConnectionState::Closed {
            return Err(CoreError::NotConnected);
        }
        let credentials = credentials.clone();
        self.run(move |api| async move { api.login(&credentials).await })
            .await?;
        self.state = ConnectionState::Authenticated;
        info!(broker = self.api.name(), "broker session authenticated");
        Ok(())
    }

    /// Stop the worker after the job in flight finishes. Closing twice is a no-op.
    pub fn close(&mut self) {
        if let Some(worker) = self.worker.take() {
            drop(worker.jobs);
            if worker.handle.join().is_err() {
                warn!(broker = self.api.name(), "broker worker panicked");
            }
            info!(broker = self.api.name(), "broker connection closed");
        }
        self.state = ConnectionState::Closed;
    }

    /// Queue `job` on the worker and wait for its result.
    ///
    /// Jobs run strictly one after another. A job that exceeds the timeout
    /// yields [`CoreError::Timeout`] and the next queued job starts.
    pub async fn run<F, Fut, T>(&self, job: F) -> Result<T, CoreError>
    where
        F: FnOnce(Arc<dyn BrokerApi>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, CoreError>> + Send + 'static,
        T: Send + 'static,
    {
        let worker = self.worker.as_ref().ok_or(CoreError::NotConnected)?;
        let api = Arc::clone(&self.api);
        let timeout = self.timeout;
        let (reply, result) = oneshot::channel();

        let task: Job = Box::pin(async move {
            let outcome = match tokio::time::timeout(timeout, job(api)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(CoreError::Timeout(timeout.as_secs())),
            };
            // The caller may have gone away; nothing to report to then.
            let _ = reply.send(outcome);
        });

        worker
            .jobs
            .send(task)
            .map_err(|_| CoreError::Connection("broker worker is not running".into()))?;
        result
            .await
            .map_err(|_| CoreError::Connection("broker worker dropped the request".into()))?
    }

    /// One timeline page. Requires an authenticated session.
    pub async fn timeline_page(&self, after: Option<String>) -> Result<TimelinePage, CoreError> {
        self.ensure_authenticated()?;
        self.run(move |api| async move { api.timeline_page(after).await })
            .await
    }

    /// Current positions as reported by the broker. Requires an authenticated session.
    pub async fn fetch_snapshot(&self) -> Result<PortfolioSnapshot, CoreError> {
        self.ensure_authenticated()?;
        self.run(|api| async move { api.portfolio_snapshot().await })
            .await
    }

    fn ensure_authenticated(&self) -> Result<(), CoreError> {
        if self.is_authenticated() {
            Ok(())
        } else {
            Err(CoreError::NotConnected)
        }
    }
}

impl Drop for BrokerConnection {
    fn drop(&mut self) {
        self.close();
    }
}
