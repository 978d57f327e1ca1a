//! Background rebalance dispatcher.
//!
//! A single tokio task owns the retry state and drains the shared
//! [`RebalanceQueue`]. Writers only touch the queue and nudge the task with a
//! `Wake`, so a triggering write never waits on a rebalance. Store work runs
//! on the blocking pool because every store call is synchronous.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{info_span, Instrument};

use crate::config::RebalanceConfig;
use crate::error::{Error, Result};
use crate::item::Scope;
use crate::rebalance::{RebalanceDispatcher, RebalanceQueue, RebalanceReport, RebalanceWorker};
use crate::store::OrderedListStore;

/// Commands understood by the background task
pub enum RebalanceCommand {
    /// New scopes are waiting in the queue
    Wake,
    /// Process the queue and every pending retry, then report
    Flush {
        response: oneshot::Sender<Result<()>>,
    },
    Shutdown,
}

impl std::fmt::Debug for RebalanceCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Wake => write!(f, "Wake"),
            Self::Flush { .. } => write!(f, "Flush"),
            Self::Shutdown => write!(f, "Shutdown"),
        }
    }
}

#[derive(Debug, Clone)]
struct RetryEntry {
    scope: Scope,
    attempts: u32,
    last_error: String,
}

pub struct BackgroundRebalancer<S: ?Sized> {
    store: Arc<S>,
    worker: RebalanceWorker,
    queue: Arc<RebalanceQueue>,
    retry_queue: Vec<RetryEntry>,
    max_attempts: u32,
    retry_interval: Duration,
    command_rx: mpsc::Receiver<RebalanceCommand>,
}

impl<S> BackgroundRebalancer<S>
where
    S: OrderedListStore + ?Sized + 'static,
{
    /// Spawn the background task on the current tokio runtime.
    pub fn start(store: Arc<S>, config: &RebalanceConfig) -> RebalancerHandle {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let queue = Arc::new(RebalanceQueue::new());

        let background = Self {
            store,
            worker: RebalanceWorker::from_config(config),
            queue: Arc::clone(&queue),
            retry_queue: Vec::new(),
            max_attempts: config.max_attempts.max(1),
            retry_interval: Duration::from_millis(config.retry_interval_ms.max(1)),
            command_rx: rx,
        };

        tokio::spawn(background.run());
        RebalancerHandle { queue, tx }
    }

    async fn run(mut self) {
        async move {
            tracing::info!("starting background rebalancer");

            let mut retry_check = interval(self.retry_interval);
            // first tick completes immediately
            retry_check.tick().await;

            loop {
                tokio::select! {
                    command = self.command_rx.recv() => match command {
                        Some(RebalanceCommand::Wake) => {
                            self.process_queue().await;
                        }
                        Some(RebalanceCommand::Flush { response }) => {
                            let result = self.flush().await;
                            let _ = response.send(result);
                        }
                        Some(RebalanceCommand::Shutdown) | None => {
                            self.process_queue().await;
                            tracing::info!(
                                abandoned = self.retry_queue.len(),
                                "background rebalancer shutting down"
                            );
                            break;
                        }
                    },

                    // catches scopes whose Wake was dropped on a full channel
                    _ = retry_check.tick() => {
                        self.process_queue().await;
                        self.process_retry_queue().await;
                    }
                }
            }
        }
        .instrument(info_span!("rebalancer"))
        .await
    }

    async fn rebalance_scope(&self, scope: Scope) -> Result<RebalanceReport> {
        let store = Arc::clone(&self.store);
        let worker = self.worker;
        tokio::task::spawn_blocking(move || worker.rebalance(&*store, &scope))
            .await
            .map_err(|err| Error::OperationFailed(format!("rebalance task failed: {err}")))?
    }

    /// Returns the scopes that failed, with their errors
    async fn process_queue(&mut self) -> Vec<(Scope, String)> {
        let mut failures = Vec::new();
        for scope in self.queue.drain() {
            match self.rebalance_scope(scope.clone()).await {
                Ok(_) => {
                    self.retry_queue.retain(|entry| entry.scope != scope);
                }
                Err(err) => {
                    failures.push((scope.clone(), err.to_string()));
                    self.add_to_retry_queue(scope, err);
                }
            }
        }
        failures
    }

    fn add_to_retry_queue(&mut self, scope: Scope, err: Error) {
        tracing::warn!(%scope, error = %err, "rebalance failed, will retry");
        if let Some(entry) = self.retry_queue.iter_mut().find(|e| e.scope == scope) {
            entry.last_error = err.to_string();
            return;
        }
        self.retry_queue.push(RetryEntry {
            scope,
            attempts: 1,
            last_error: err.to_string(),
        });
    }

    /// One attempt per pending retry; returns the entries that failed again
    async fn retry_pass(&mut self) -> Vec<RetryEntry> {
        let mut failed = Vec::new();
        let retry_queue = std::mem::take(&mut self.retry_queue);

        for mut entry in retry_queue {
            if let Err(err) = self.rebalance_scope(entry.scope.clone()).await {
                entry.attempts += 1;
                entry.last_error = err.to_string();
                failed.push(entry);
            }
        }

        failed
    }

    async fn process_retry_queue(&mut self) {
        if self.retry_queue.is_empty() {
            return;
        }
        let failed = self.retry_pass().await;
        self.keep_retryable(failed);
    }

    /// Retries old failures first, then new scopes, so a scope that fails in
    /// this flush is not tried twice.
    async fn flush(&mut self) -> Result<()> {
        let retried = self.retry_pass().await;
        let mut failures: Vec<(Scope, String)> = retried
            .iter()
            .map(|entry| (entry.scope.clone(), entry.last_error.clone()))
            .collect();
        self.keep_retryable(retried);
        failures.extend(self.process_queue().await);

        let Some((_, reason)) = failures.first().cloned() else {
            return Ok(());
        };
        let scopes: Vec<String> = failures
            .iter()
            .map(|(scope, _)| scope.to_string())
            .collect();
        Err(Error::RebalanceFailed {
            scope: scopes.join(", "),
            reason,
        })
    }

    fn keep_retryable(&mut self, failed: Vec<RetryEntry>) {
        for entry in failed {
            if entry.attempts < self.max_attempts {
                self.retry_queue.push(entry);
            } else {
                tracing::error!(
                    scope = %entry.scope,
                    attempts = entry.attempts,
                    error = %entry.last_error,
                    "giving up on rebalance"
                );
            }
        }
    }
}

/// Front end to a running [`BackgroundRebalancer`]
#[derive(Debug, Clone)]
pub struct RebalancerHandle {
    queue: Arc<RebalanceQueue>,
    tx: mpsc::Sender<RebalanceCommand>,
}

impl RebalancerHandle {
    /// Scopes queued but not yet picked up
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Wait until every queued scope and pending retry has been attempted.
    pub async fn flush(&self) -> Result<()> {
        let (response, rx) = oneshot::channel();
        self.tx
            .send(RebalanceCommand::Flush { response })
            .await
            .map_err(|_| stopped())?;
        rx.await.map_err(|_| stopped())?
    }

    /// Process what is queued, then stop the task.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx
            .send(RebalanceCommand::Shutdown)
            .await
            .map_err(|_| stopped())
    }
}

fn stopped() -> Error {
    Error::OperationFailed("background rebalancer is not running".to_string())
}

impl RebalanceDispatcher for RebalancerHandle {
    fn enqueue(&self, scope: Scope) {
        if !self.queue.push(scope.clone()) {
            tracing::trace!(%scope, "rebalance already queued");
            return;
        }
        match self.tx.try_send(RebalanceCommand::Wake) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!(%scope, "background rebalancer stopped; scope left queued");
            }
        }
    }
}
