use crate::{Endpoint, PlayerName};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// How a single endpoint query ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollOutcome {
    Responded,
    NoResponse,
    ParseFailure,
    Unreachable,
    /// The query task panicked or was aborted before reporting.
    TaskFailed,
}

/// Players found on one endpoint during a cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointPoll {
    pub endpoint: Endpoint,
    pub outcome: PollOutcome,
    pub latency_ms: Option<u64>,
    pub players: Vec<PlayerName>,
}

impl EndpointPoll {
    pub fn empty(endpoint: Endpoint, outcome: PollOutcome) -> Self {
        Self {
            endpoint,
            outcome,
            latency_ms: None,
            players: Vec::new(),
        }
    }
}

/// Immutable output of one poll cycle, one entry per endpoint in registry order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub timestamp: u64,
    pub entries: Vec<EndpointPoll>,
}

impl PollSnapshot {
    pub fn new(timestamp: u64, entries: Vec<EndpointPoll>) -> Self {
        Self { timestamp, entries }
    }

    pub fn empty(timestamp: u64) -> Self {
        Self::new(timestamp, Vec::new())
    }

    pub fn players_for(&self, endpoint: &Endpoint) -> Option<&[PlayerName]> {
        self.entries
            .iter()
            .find(|entry| entry.endpoint.key() == endpoint.key())
            .map(|entry| entry.players.as_slice())
    }

    pub fn players(&self) -> impl Iterator<Item = &PlayerName> {
        self.entries.iter().flat_map(|entry| entry.players.iter())
    }

    /// Distinct players across all endpoints.
    pub fn unique_players(&self) -> BTreeSet<PlayerName> {
        self.players().cloned().collect()
    }

    pub fn count_outcome(&self, outcome: PollOutcome) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.outcome == outcome)
            .count()
    }
}
