//! The polling and minting loop.
//!
//! Each cycle walks `Polling -> Merging -> (Minting | Skipping) -> Sleeping`.
//! Polling runs the fan-out over the endpoint list, Merging folds the
//! snapshot into the accumulation store, and on every `mint_period`-th cycle
//! the accumulated names that the ledger knows are submitted in chunks and
//! the store is purged.

use crate::ledger::LedgerClient;
use crate::report::write_report;
use crate::store::{chunk, AccumulationStore};
use async_trait::async_trait;
use log::{debug, error, info, warn};
use poller::{load_endpoints, Poller, RegistryError};
use serde::Serialize;
use shared::{current_timestamp, PlayerName, PollSnapshot};
use std::collections::{BTreeSet, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_MINT_PERIOD: u64 = 4;
pub const DEFAULT_MINT_TRIGGER: u64 = 1;
pub const DEFAULT_CHUNK_SIZE: usize = 24;
pub const DEFAULT_CYCLE_SLEEP: Duration = Duration::from_secs(300);

/// What happens to the accumulated set after a mint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum PurgePolicy {
    /// Clear everything once all chunks were attempted.
    #[default]
    Always,
    /// Keep names whose chunk failed so the next mint retries them.
    RetainFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("mint period must be at least 1")]
    ZeroMintPeriod,
    #[error("mint trigger {trigger} must be below the mint period {period}")]
    TriggerOutOfRange { trigger: u64, period: u64 },
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub mint_period: u64,
    pub mint_trigger: u64,
    pub chunk_size: usize,
    pub sleep: Duration,
    pub purge_policy: PurgePolicy,
    /// Optional per-cycle JSON report, rewritten every cycle.
    pub report_path: Option<PathBuf>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            mint_period: DEFAULT_MINT_PERIOD,
            mint_trigger: DEFAULT_MINT_TRIGGER,
            chunk_size: DEFAULT_CHUNK_SIZE,
            sleep: DEFAULT_CYCLE_SLEEP,
            purge_policy: PurgePolicy::default(),
            report_path: None,
        }
    }
}

impl SchedulerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mint_period == 0 {
            return Err(ConfigError::ZeroMintPeriod);
        }
        if self.mint_trigger >= self.mint_period {
            return Err(ConfigError::TriggerOutOfRange {
                trigger: self.mint_trigger,
                period: self.mint_period,
            });
        }
        Ok(())
    }
}

/// `counter mod period == trigger`.
pub fn should_mint(counter: u64, period: u64, trigger: u64) -> bool {
    period > 0 && counter % period == trigger
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CyclePhase {
    Polling,
    Merging,
    Minting,
    Skipping,
    Sleeping,
}

/// Summary of one completed cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub cycle: u64,
    /// `Minting` or `Skipping`.
    pub phase: CyclePhase,
    pub players_seen: usize,
    pub new_players: usize,
    pub minted_chunks: usize,
    pub failed_chunks: usize,
    pub purged: bool,
}

/// Wall time and sleeping, injectable for tests.
#[async_trait]
pub trait Clock: Send + Sync {
    async fn sleep(&self, duration: Duration);
    fn now_millis(&self) -> u64;
}

pub struct TokioClock;

#[async_trait]
impl Clock for TokioClock {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn now_millis(&self) -> u64 {
        current_timestamp()
    }
}

/// Produces one poll snapshot per cycle.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// `Ok(None)` when `shutdown` fired before the poll completed.
    async fn poll(&self, shutdown: &CancellationToken)
        -> Result<Option<PollSnapshot>, RegistryError>;
}

/// Reloads the endpoint list from disk and polls it every cycle.
pub struct RegistryPoller {
    servers: PathBuf,
    poller: Poller,
}

impl RegistryPoller {
    pub fn new(servers: impl Into<PathBuf>, poller: Poller) -> Self {
        Self {
            servers: servers.into(),
            poller,
        }
    }
}

#[async_trait]
impl SnapshotSource for RegistryPoller {
    async fn poll(
        &self,
        shutdown: &CancellationToken,
    ) -> Result<Option<PollSnapshot>, RegistryError> {
        let endpoints = load_endpoints(&self.servers).await?;
        Ok(self.poller.poll_until_cancelled(&endpoints, shutdown).await)
    }
}

struct MintTally {
    minted: usize,
    failed: usize,
    failed_names: Vec<PlayerName>,
    // Chunks skipped because shutdown fired mid-mint.
    unattempted: Vec<PlayerName>,
}

pub struct Scheduler {
    config: SchedulerConfig,
    source: Arc<dyn SnapshotSource>,
    ledger: Arc<dyn LedgerClient>,
    clock: Arc<dyn Clock>,
    store: AccumulationStore,
    counter: u64,
    known: Option<HashSet<String>>,
    phase: CyclePhase,
}

impl Scheduler {
    pub fn new(
        config: SchedulerConfig,
        source: Arc<dyn SnapshotSource>,
        ledger: Arc<dyn LedgerClient>,
        clock: Arc<dyn Clock>,
        store: AccumulationStore,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            source,
            ledger,
            clock,
            store,
            counter: 1,
            known: None,
            phase: CyclePhase::Sleeping,
        })
    }

    pub fn store(&self) -> &AccumulationStore {
        &self.store
    }

    /// Number of the cycle the next `step` will run.
    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn phase(&self) -> CyclePhase {
        self.phase
    }

    /// Size of the cached known set, if one was ever fetched.
    pub fn known_count(&self) -> Option<usize> {
        self.known.as_ref().map(HashSet::len)
    }

    /// Runs cycles until `shutdown` fires, sleeping between them.
    pub async fn run(&mut self, shutdown: &CancellationToken) {
        info!(
            "=== Starting scanner loop: mint every {} cycles on {}, ledger {} ===",
            self.config.mint_period,
            self.config.mint_trigger,
            self.ledger.name()
        );

        while !shutdown.is_cancelled() {
            if self.step(shutdown).await.is_none() || shutdown.is_cancelled() {
                break;
            }

            self.phase = CyclePhase::Sleeping;
            info!("Sleeping for {:?}...", self.config.sleep);
            tokio::select! {
                _ = self.clock.sleep(self.config.sleep) => {}
                _ = shutdown.cancelled() => break,
            }
        }
        info!("Scanner loop stopped after {} cycles", self.counter - 1);
    }

    /// Runs exactly one cycle.
    ///
    /// Returns `None` if `shutdown` fired while polling; the partial snapshot
    /// is discarded and the counter does not advance.
    pub async fn step(&mut self, shutdown: &CancellationToken) -> Option<CycleReport> {
        let cycle = self.counter;
        info!("Scan #{}", cycle);

        self.phase = CyclePhase::Polling;
        let started = self.clock.now_millis();
        let mut snapshot = match self.source.poll(shutdown).await {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => {
                info!("Scan #{} cancelled while polling", cycle);
                return None;
            }
            Err(e) => {
                error!("{}; treating scan #{} as empty", e, cycle);
                PollSnapshot::empty(started)
            }
        };
        snapshot.timestamp = started;
        self.counter += 1;

        self.phase = CyclePhase::Merging;
        let players_seen = snapshot.unique_players().len();
        let new_players = self.merge(&snapshot);

        let mut report = CycleReport {
            cycle,
            phase: CyclePhase::Skipping,
            players_seen,
            new_players,
            minted_chunks: 0,
            failed_chunks: 0,
            purged: false,
        };

        if should_mint(cycle, self.config.mint_period, self.config.mint_trigger) {
            self.mint(shutdown, &mut report).await;
        } else {
            self.phase = CyclePhase::Skipping;
            info!("Not a mint cycle, tracking {} players", self.store.len());
        }

        if let Some(path) = &self.config.report_path {
            if let Err(e) = write_report(path, &report, &snapshot).await {
                error!("Failed to write report {}: {}", path.display(), e);
            }
        }
        Some(report)
    }

    fn merge(&mut self, snapshot: &PollSnapshot) -> usize {
        let before = self.store.len();
        if let Err(e) = self.store.merge(snapshot) {
            error!("Keeping accumulated players in memory only: {}", e);
        }
        let added = self.store.len() - before;

        if added > 0 {
            info!("Found {} new players, tracking {}", added, self.store.len());
        } else {
            info!("No new players found this round");
        }
        added
    }

    // Falls back to the last good known set when the ledger is unavailable.
    async fn refresh_known(&mut self) {
        match self.ledger.known_names().await {
            Ok(fetched) => {
                let total = fetched.len();
                let known: HashSet<String> = fetched
                    .into_iter()
                    .filter(|name| match PlayerName::new(name.as_str()) {
                        Ok(_) => true,
                        Err(e) => {
                            debug!("Ignoring ledger name: {}", e);
                            false
                        }
                    })
                    .collect();
                info!(
                    "Ledger knows {} registered player names ({} non-canonical ignored)",
                    known.len(),
                    total - known.len()
                );
                self.known = Some(known);
            }
            Err(e) => match &self.known {
                Some(cached) => warn!("{}; reusing {} cached names", e, cached.len()),
                None => warn!("{}; no known names cached", e),
            },
        }
    }

    async fn mint(&mut self, shutdown: &CancellationToken, report: &mut CycleReport) {
        self.refresh_known().await;
        let Some(known) = self.known.as_ref() else {
            warn!("Skipping mint: known players unavailable, keeping accumulated set");
            self.phase = CyclePhase::Skipping;
            return;
        };

        self.phase = CyclePhase::Minting;
        report.phase = CyclePhase::Minting;

        let eligible = self.store.reconcile(known);
        let tally = if eligible.is_empty() {
            info!("No known players to mint this cycle");
            MintTally {
                minted: 0,
                failed: 0,
                failed_names: Vec::new(),
                unattempted: Vec::new(),
            }
        } else {
            info!("Attempting to mint {} known players", eligible.len());
            self.submit_chunks(&eligible, shutdown).await
        };

        report.minted_chunks = tally.minted;
        report.failed_chunks = tally.failed;

        let mut retained: BTreeSet<PlayerName> = tally.unattempted.into_iter().collect();
        if self.config.purge_policy == PurgePolicy::RetainFailed {
            retained.extend(tally.failed_names);
        }

        let result = if retained.is_empty() {
            info!("Purging accumulated players after mint");
            self.store.purge()
        } else {
            info!("Keeping {} players for the next mint", retained.len());
            self.store.retain_only(retained)
        };
        match result {
            Ok(()) => report.purged = true,
            Err(e) => error!("Post-mint purge failed: {}", e),
        }
    }

    async fn submit_chunks(
        &self,
        eligible: &[PlayerName],
        shutdown: &CancellationToken,
    ) -> MintTally {
        let chunks = chunk(eligible, self.config.chunk_size);
        let mut tally = MintTally {
            minted: 0,
            failed: 0,
            failed_names: Vec::new(),
            unattempted: Vec::new(),
        };

        for (i, batch) in chunks.iter().enumerate() {
            if shutdown.is_cancelled() {
                warn!("Shutdown: leaving {} chunks unminted", chunks.len() - i);
                tally.unattempted = chunks[i..].concat();
                break;
            }

            let listed: Vec<&str> = batch.iter().map(PlayerName::as_str).collect();
            debug!("Mint chunk {}/{} => {}", i + 1, chunks.len(), listed.join(", "));

            match self.ledger.submit_batch(batch).await {
                Ok(receipt) => {
                    for event in &receipt.events {
                        info!(
                            "  minted {} => gating={}, player cut={}, validator cut={}",
                            event.player,
                            event.gating_address,
                            event.player_amount,
                            event.validator_amount
                        );
                    }
                    info!("Mint tx => {}", receipt.tx_id);
                    tally.minted += 1;
                }
                Err(e) => {
                    error!("Mint chunk {}/{} failed: {}", i + 1, chunks.len(), e);
                    tally.failed += 1;
                    tally.failed_names.extend(batch.iter().cloned());
                }
            }
        }
        tally
    }
}
