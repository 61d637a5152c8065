//! Request-coalescing front end for `GetPlayerSummaries`.
//!
//! Individual lookups are queued on a bounded channel and a single worker
//! task groups them into batches of at most `max_batch_size` ids. A batch is
//! sent when it fills up or when the flush interval ticks with anything
//! pending. Each batch runs as its own task, so a slow Steam call never holds
//! up the next batch from forming.

use crate::client::SummaryFetcher;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use steamid_core::config::BatcherConfig;
use steamid_core::{LookupError, LookupResult, PlayerSummary};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A queued lookup and the slot its caller is waiting on.
struct SummaryRequest {
    steam_id: String,
    result: oneshot::Sender<LookupResult<PlayerSummary>>,
}

/// Coalesces single-profile lookups into batched upstream calls.
pub struct SummaryBatcher {
    sender: mpsc::Sender<SummaryRequest>,
    shutdown: CancellationToken,
    worker: Option<JoinHandle<()>>,
}

impl SummaryBatcher {
    /// Spawn the batching worker on the current Tokio runtime.
    pub fn new(fetcher: Arc<dyn SummaryFetcher>, config: &BatcherConfig) -> LookupResult<Self> {
        config.validate()?;

        let (sender, receiver) = mpsc::channel::<SummaryRequest>(config.channel_capacity());
        let shutdown = CancellationToken::new();

        let worker = BatchWorker {
            fetcher,
            max_batch_size: config.max_batch_size,
            flush_interval: config.flush_interval(),
        };
        let token = shutdown.clone();
        let handle = tokio::spawn(async move {
            worker.run(receiver, token).await;
        });

        info!(
            max_batch_size = config.max_batch_size,
            flush_interval_ms = config.flush_interval_ms,
            "Summary batcher started"
        );

        Ok(Self {
            sender,
            shutdown,
            worker: Some(handle),
        })
    }

    /// Look up one profile, giving up when `cancel` fires.
    ///
    /// Cancelling does not pull the id back out of a batch that already
    /// formed; it only stops this caller from waiting for the answer.
    pub async fn fetch_one(
        &self,
        steam_id: impl Into<String>,
        cancel: &CancellationToken,
    ) -> LookupResult<PlayerSummary> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(LookupError::Cancelled),
            outcome = self.submit(steam_id.into()) => outcome,
        }
    }

    /// Look up one profile, giving up after `timeout`.
    pub async fn fetch_one_within(
        &self,
        steam_id: impl Into<String>,
        timeout: Duration,
    ) -> LookupResult<PlayerSummary> {
        match tokio::time::timeout(timeout, self.submit(steam_id.into())).await {
            Ok(outcome) => outcome,
            Err(_) => Err(LookupError::DeadlineExceeded),
        }
    }

    async fn submit(&self, steam_id: String) -> LookupResult<PlayerSummary> {
        let (tx, rx) = oneshot::channel();
        let request = SummaryRequest {
            steam_id,
            result: tx,
        };

        // Waits here while the queue is full.
        self.sender
            .send(request)
            .await
            .map_err(|_| LookupError::Shutdown)?;
        metrics::counter!("steam.batcher.enqueued").increment(1);

        // A dropped sender means the worker discarded the request on shutdown.
        rx.await.map_err(|_| LookupError::Shutdown)?
    }

    /// Signal the worker to stop. Requests still queued are dropped and their
    /// callers see [`LookupError::Shutdown`]; batches already sent still complete.
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop the worker and wait for its loop to exit.
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(handle) = self.worker.take() {
            if let Err(e) = handle.await {
                error!(error = %e, "Summary batcher worker panicked");
            }
        }
    }
}

impl Drop for SummaryBatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// The single task that owns the pending batch.
struct BatchWorker {
    fetcher: Arc<dyn SummaryFetcher>,
    max_batch_size: usize,
    flush_interval: Duration,
}

impl BatchWorker {
    async fn run(self, mut receiver: mpsc::Receiver<SummaryRequest>, shutdown: CancellationToken) {
        let mut pending: Vec<SummaryRequest> = Vec::with_capacity(self.max_batch_size);
        let mut interval =
            tokio::time::interval_at(Instant::now() + self.flush_interval, self.flush_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                received = receiver.recv() => {
                    let Some(request) = received else { break };
                    pending.push(request);
                    if pending.len() >= self.max_batch_size {
                        self.dispatch(&mut pending);
                    }
                }
                _ = interval.tick() => {
                    if !pending.is_empty() {
                        self.dispatch(&mut pending);
                    }
                }
            }
        }

        // Anything still queued is never fetched; dropping the reply slots
        // wakes those callers with a shutdown error.
        receiver.close();
        while let Ok(request) = receiver.try_recv() {
            pending.push(request);
        }
        if !pending.is_empty() {
            metrics::counter!("steam.batcher.dropped_on_shutdown").increment(pending.len() as u64);
            warn!(dropped = pending.len(), "Summary batcher stopped with requests still queued");
        }
        info!("Summary batcher stopped");
    }

    fn dispatch(&self, pending: &mut Vec<SummaryRequest>) {
        let batch = std::mem::replace(pending, Vec::with_capacity(self.max_batch_size));
        tokio::spawn(send_batch(self.fetcher.clone(), batch));
    }
}

/// Run one upstream call and resolve every request in the batch.
async fn send_batch(fetcher: Arc<dyn SummaryFetcher>, batch: Vec<SummaryRequest>) {
    let batch_id = Uuid::new_v4();
    let steam_ids = unique_ids(&batch);
    let started = Instant::now();

    metrics::counter!("steam.batcher.dispatched").increment(1);
    metrics::histogram!("steam.batcher.batch_size").record(batch.len() as f64);
    debug!(
        batch_id = %batch_id,
        requests = batch.len(),
        unique_ids = steam_ids.len(),
        "Dispatching summary batch"
    );

    // The upstream call runs in its own task so a panic inside the fetcher
    // still resolves the batch as a failed call.
    let call = tokio::spawn(async move { fetcher.fetch_summaries(&steam_ids).await });
    let outcome = match call.await {
        Ok(fetched) => fetched.map_err(|e| e.to_string()),
        Err(e) => Err(format!("player summary call aborted: {e}")),
    };
    metrics::histogram!("steam.batcher.upstream_latency_ms")
        .record(started.elapsed().as_secs_f64() * 1000.0);

    let mut abandoned = 0u64;
    match outcome {
        Ok(players) => {
            for request in batch {
                let result = match players.get(&request.steam_id) {
                    Some(player) => Ok(player.clone()),
                    None => {
                        metrics::counter!("steam.batcher.not_found").increment(1);
                        Err(LookupError::NotFound(request.steam_id.clone()))
                    }
                };
                if request.result.send(result).is_err() {
                    abandoned += 1;
                }
            }
        }
        Err(e) => {
            metrics::counter!("steam.batcher.upstream_errors").increment(1);
            error!(
                batch_id = %batch_id,
                error = %e,
                requests = batch.len(),
                "Failed to get player summaries"
            );
            let failure = LookupError::Upstream(e);
            for request in batch {
                if request.result.send(Err(failure.clone())).is_err() {
                    abandoned += 1;
                }
            }
        }
    }

    if abandoned > 0 {
        metrics::counter!("steam.batcher.abandoned").increment(abandoned);
        debug!(batch_id = %batch_id, abandoned, "Callers stopped waiting before delivery");
    }
}

/// Ids in arrival order with repeats removed.
fn unique_ids(batch: &[SummaryRequest]) -> Vec<String> {
    let mut seen = HashSet::with_capacity(batch.len());
    batch
        .iter()
        .filter(|request| seen.insert(request.steam_id.as_str()))
        .map(|request| request.steam_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(steam_id: &str) -> SummaryRequest {
        let (tx, _rx) = oneshot::channel();
        SummaryRequest {
            steam_id: steam_id.to_string(),
            result: tx,
        }
    }

    #[test]
    fn test_unique_ids_keeps_first_arrival_order() {
        let batch = vec![request("c"), request("a"), request("c"), request("b"), request("a")];
        assert_eq!(unique_ids(&batch), vec!["c", "a", "b"]);
    }
}
