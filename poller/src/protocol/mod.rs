//! Protocol drivers: one per query protocol family.
//!
//! A driver sends its request over a connected UDP socket, waits for the
//! reply within a bounded timeout and parses the payload into raw player
//! names. Failures never escape as panics; they are classified as
//! [`QueryError`] variants and turned into empty results by the caller.

pub mod a2s;
pub mod legacy;
mod transport;

use log::debug;
use shared::{Endpoint, PollOutcome, ProtocolKind};
use std::time::{Duration, Instant};
use thiserror::Error;

pub use a2s::PlayerRecord;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("no response within {0:?}")]
    NoResponse(Duration),
    #[error("unreachable: {0}")]
    Unreachable(#[from] std::io::Error),
    #[error("malformed response: {0}")]
    ParseFailure(String),
}

impl QueryError {
    pub fn outcome(&self) -> PollOutcome {
        match self {
            QueryError::NoResponse(_) => PollOutcome::NoResponse,
            QueryError::Unreachable(_) => PollOutcome::Unreachable,
            QueryError::ParseFailure(_) => PollOutcome::ParseFailure,
        }
    }
}

/// Outcome of a single request/response exchange, before parsing.
#[derive(Debug)]
pub struct RawQueryResult {
    pub endpoint: Endpoint,
    pub payload: Option<Vec<u8>>,
    pub latency: Option<Duration>,
    pub error: Option<QueryError>,
}

impl RawQueryResult {
    pub fn received(endpoint: &Endpoint, payload: Vec<u8>, latency: Duration) -> Self {
        Self {
            endpoint: endpoint.clone(),
            payload: Some(payload),
            latency: Some(latency),
            error: None,
        }
    }

    pub fn failed(endpoint: &Endpoint, error: QueryError) -> Self {
        Self {
            endpoint: endpoint.clone(),
            payload: None,
            latency: None,
            error: Some(error),
        }
    }
}

/// Closed set of drivers, selected by the endpoint's protocol kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    /// `status` request; `numeric_fields` precede each quoted name.
    LegacyStatus { numeric_fields: usize },
    /// `getstatus` request; every quoted token is a name.
    StructuredStatus,
    /// A2S_PLAYER challenge/response.
    BinaryQuery,
}

impl Driver {
    pub fn for_kind(kind: ProtocolKind) -> Self {
        match kind {
            ProtocolKind::LegacyStatusA | ProtocolKind::LegacyStatusB => Driver::LegacyStatus {
                numeric_fields: kind.leading_numeric_fields().unwrap_or(2),
            },
            ProtocolKind::StructuredStatus => Driver::StructuredStatus,
            ProtocolKind::BinaryQuery => Driver::BinaryQuery,
        }
    }

    /// Sends the request and waits for a reply, bounded by `timeout`.
    pub async fn query(&self, endpoint: &Endpoint, timeout: Duration) -> RawQueryResult {
        let started = Instant::now();

        match tokio::time::timeout(timeout, self.exchange(endpoint)).await {
            Ok(Ok(payload)) => RawQueryResult::received(endpoint, payload, started.elapsed()),
            Ok(Err(error)) => RawQueryResult::failed(endpoint, error),
            Err(_) => {
                debug!("Request to {} timed out", endpoint.address());
                RawQueryResult::failed(endpoint, QueryError::NoResponse(timeout))
            }
        }
    }

    async fn exchange(&self, endpoint: &Endpoint) -> Result<Vec<u8>, QueryError> {
        let socket = transport::connect(endpoint).await?;
        match self {
            Driver::LegacyStatus { .. } => {
                legacy::exchange(&socket, shared::LEGACY_STATUS_COMMAND).await
            }
            Driver::StructuredStatus => {
                legacy::exchange(&socket, shared::STRUCTURED_STATUS_COMMAND).await
            }
            Driver::BinaryQuery => a2s::exchange(&socket).await,
        }
    }

    /// Extracts raw (unsanitized) player names from a received payload.
    ///
    /// A result without a payload parses to an empty list.
    pub fn parse(&self, raw: &RawQueryResult) -> Result<Vec<String>, QueryError> {
        let Some(payload) = raw.payload.as_deref() else {
            return Ok(Vec::new());
        };

        match self {
            Driver::LegacyStatus { numeric_fields } => {
                legacy::parse_status(payload, *numeric_fields)
            }
            Driver::StructuredStatus => legacy::parse_structured(payload),
            Driver::BinaryQuery => Ok(a2s::decode_players(payload)?
                .into_iter()
                .map(|record| record.name)
                .collect()),
        }
    }
}
