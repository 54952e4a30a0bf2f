//! Concurrent fan-out of endpoint queries into a single poll snapshot.

use crate::protocol::{Driver, QueryError};
use log::{debug, error, info, warn};
use shared::{
    current_timestamp, Endpoint, EndpointPoll, PlayerName, PollOutcome, PollSnapshot,
    DEFAULT_POLL_CONCURRENCY, DEFAULT_QUERY_TIMEOUT,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Upper bound for one endpoint's whole exchange.
    pub timeout: Duration,
    /// Queries allowed in flight at once.
    pub concurrency: usize,
    /// How long in-flight queries may run on after shutdown is requested.
    pub shutdown_grace: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_QUERY_TIMEOUT,
            concurrency: DEFAULT_POLL_CONCURRENCY,
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

pub struct Poller {
    config: PollerConfig,
}

impl Poller {
    pub fn new(config: PollerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PollerConfig {
        &self.config
    }

    /// Queries every endpoint and waits for all of them to answer or time out.
    pub async fn poll_all(&self, endpoints: &[Endpoint]) -> PollSnapshot {
        let never = CancellationToken::new();
        match self.poll_until_cancelled(endpoints, &never).await {
            Some(snapshot) => snapshot,
            None => PollSnapshot::empty(current_timestamp()),
        }
    }

    /// Like [`Poller::poll_all`], but gives up when `shutdown` fires.
    ///
    /// In-flight queries get the configured grace period, then are aborted.
    /// A cancelled poll yields `None`; partial results are discarded.
    pub async fn poll_until_cancelled(
        &self,
        endpoints: &[Endpoint],
        shutdown: &CancellationToken,
    ) -> Option<PollSnapshot> {
        let timestamp = current_timestamp();
        let permits = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        for (index, endpoint) in endpoints.iter().cloned().enumerate() {
            let permits = Arc::clone(&permits);
            let timeout = self.config.timeout;
            tasks.spawn(async move {
                // The semaphore is never closed, so acquiring cannot fail.
                let _permit = permits.acquire_owned().await.ok();
                (index, poll_endpoint(endpoint, timeout).await)
            });
        }

        let mut slots: Vec<Option<EndpointPoll>> = vec![None; endpoints.len()];

        loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    Some(Ok((index, poll))) => slots[index] = Some(poll),
                    Some(Err(e)) => error!("Poll task failed: {}", e),
                    None => break,
                },
                _ = shutdown.cancelled() => {
                    self.abandon(tasks).await;
                    return None;
                }
            }
        }

        let snapshot = PollSnapshot::new(timestamp, fill_slots(endpoints, slots));
        info!(
            "Polled {} endpoints: {} responded, {} silent, {} malformed, {} unreachable, {} failed tasks, {} players",
            endpoints.len(),
            snapshot.count_outcome(PollOutcome::Responded),
            snapshot.count_outcome(PollOutcome::NoResponse),
            snapshot.count_outcome(PollOutcome::ParseFailure),
            snapshot.count_outcome(PollOutcome::Unreachable),
            snapshot.count_outcome(PollOutcome::TaskFailed),
            snapshot.players().count()
        );
        Some(snapshot)
    }

    async fn abandon(&self, mut tasks: JoinSet<(usize, EndpointPoll)>) {
        let grace = self.config.shutdown_grace;
        let drained = tokio::time::timeout(grace, async {
            while tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            warn!(
                "Shutdown: abandoning {} in-flight queries after {:?}",
                tasks.len(),
                grace
            );
            tasks.abort_all();
        }
        info!("Shutdown: discarding partial poll results");
    }
}

// Endpoints whose task never reported are marked as failed tasks.
fn fill_slots(endpoints: &[Endpoint], slots: Vec<Option<EndpointPoll>>) -> Vec<EndpointPoll> {
    endpoints
        .iter()
        .zip(slots)
        .map(|(endpoint, slot)| {
            slot.unwrap_or_else(|| EndpointPoll::empty(endpoint.clone(), PollOutcome::TaskFailed))
        })
        .collect()
}

/// Queries one endpoint with its protocol's driver and sanitizes the names.
///
/// Never fails: timeouts, unreachable hosts and malformed replies all come
/// back as an empty player list tagged with the outcome.
pub async fn poll_endpoint(endpoint: Endpoint, timeout: Duration) -> EndpointPoll {
    let driver = Driver::for_kind(endpoint.protocol);
    let raw = driver.query(&endpoint, timeout).await;

    if let Some(error) = &raw.error {
        log_failure(&endpoint, error);
        return EndpointPoll::empty(endpoint, error.outcome());
    }

    let latency_ms = raw.latency.map(|latency| latency.as_millis() as u64);
    match driver.parse(&raw) {
        Ok(raw_names) => {
            let players: Vec<PlayerName> = raw_names
                .iter()
                .filter_map(|name| PlayerName::sanitized(name))
                .collect();

            if players.is_empty() {
                debug!("No players found on {}", endpoint);
            } else {
                let listed: Vec<&str> = players.iter().map(PlayerName::as_str).collect();
                info!(
                    "Found {} players on {} in {}ms: {}",
                    players.len(),
                    endpoint,
                    latency_ms.unwrap_or(0),
                    listed.join(", ")
                );
            }

            EndpointPoll {
                endpoint,
                outcome: PollOutcome::Responded,
                latency_ms,
                players,
            }
        }
        Err(error) => {
            log_failure(&endpoint, &error);
            EndpointPoll {
                latency_ms,
                ..EndpointPoll::empty(endpoint, error.outcome())
            }
        }
    }
}

fn log_failure(endpoint: &Endpoint, error: &QueryError) {
    match error {
        QueryError::NoResponse(_) => debug!("No response from {}", endpoint),
        QueryError::Unreachable(e) => warn!("{} unreachable: {}", endpoint, e),
        QueryError::ParseFailure(reason) => warn!("Bad reply from {}: {}", endpoint, reason),
    }
}
