//! The external registry of known players and its batch action.

use async_trait::async_trait;
use log::info;
use shared::PlayerName;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("known-player source {path} unavailable: {source}")]
    KnownSetUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("batch submission rejected: {0}")]
    BatchSubmitFailure(String),
}

/// One per-player record emitted by a successful batch.
#[derive(Debug, Clone, PartialEq)]
pub struct MintEvent {
    pub player: PlayerName,
    pub gating_address: String,
    pub player_amount: f64,
    pub validator_amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchReceipt {
    pub tx_id: String,
    pub events: Vec<MintEvent>,
}

/// Collaborator that owns the set of registered names and performs the
/// batch action on them.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Every name currently registered.
    async fn known_names(&self) -> Result<HashSet<String>, LedgerError>;

    /// Performs the batch action for `players`, returning once it has
    /// completed.
    async fn submit_batch(&self, players: &[PlayerName]) -> Result<BatchReceipt, LedgerError>;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

/// Ledger stand-in backed by a newline-delimited file of registered names.
///
/// Submissions are logged and acknowledged without side effects.
pub struct DryRunLedger {
    known_players: PathBuf,
    submitted: AtomicU64,
}

impl DryRunLedger {
    pub fn new(known_players: impl Into<PathBuf>) -> Self {
        Self {
            known_players: known_players.into(),
            submitted: AtomicU64::new(0),
        }
    }

    pub fn submitted_batches(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl LedgerClient for DryRunLedger {
    async fn known_names(&self) -> Result<HashSet<String>, LedgerError> {
        let text = tokio::fs::read_to_string(&self.known_players)
            .await
            .map_err(|source| LedgerError::KnownSetUnavailable {
                path: self.known_players.clone(),
                source,
            })?;

        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    async fn submit_batch(&self, players: &[PlayerName]) -> Result<BatchReceipt, LedgerError> {
        if players.is_empty() {
            return Err(LedgerError::BatchSubmitFailure("empty batch".to_string()));
        }

        let sequence = self.submitted.fetch_add(1, Ordering::Relaxed) + 1;
        let listed: Vec<&str> = players.iter().map(PlayerName::as_str).collect();
        info!("[dry-run] batch #{} => {}", sequence, listed.join(", "));

        Ok(BatchReceipt {
            tx_id: format!("dry-run-{}", sequence),
            events: players
                .iter()
                .map(|player| MintEvent {
                    player: player.clone(),
                    gating_address: String::new(),
                    player_amount: 0.0,
                    validator_amount: 0.0,
                })
                .collect(),
        })
    }

    fn name(&self) -> &str {
        "dry-run"
    }
}
