//! Per-cycle JSON report of who is online.

use crate::scheduler::CycleReport;
use serde::Serialize;
use shared::{PlayerName, PollSnapshot};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to render report: {0}")]
    Render(#[from] serde_json::Error),
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Serialize)]
struct ServerPlayers<'a> {
    server: String,
    game: &'a str,
    title: &'a str,
    players: &'a [PlayerName],
}

#[derive(Debug, Serialize)]
struct LiveReport<'a> {
    cycle: &'a CycleReport,
    timestamp: u64,
    servers: Vec<ServerPlayers<'a>>,
}

/// Renders the cycle summary plus every server that had players.
pub fn render(cycle: &CycleReport, snapshot: &PollSnapshot) -> serde_json::Result<String> {
    let servers = snapshot
        .entries
        .iter()
        .filter(|entry| !entry.players.is_empty())
        .map(|entry| ServerPlayers {
            server: entry.endpoint.address(),
            game: &entry.endpoint.game,
            title: &entry.endpoint.title,
            players: &entry.players,
        })
        .collect();

    serde_json::to_string_pretty(&LiveReport {
        cycle,
        timestamp: snapshot.timestamp,
        servers,
    })
}

/// Replaces the report file with this cycle's report.
pub async fn write_report(
    path: &Path,
    cycle: &CycleReport,
    snapshot: &PollSnapshot,
) -> Result<(), ReportError> {
    let json = render(cycle, snapshot)?;
    tokio::fs::write(path, json)
        .await
        .map_err(|source| ReportError::Write {
            path: path.to_path_buf(),
            source,
        })
}
