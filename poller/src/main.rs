use clap::Parser;
use log::{info, warn};
use poller::{load_endpoints, write_endpoints, Poller, PollerConfig};
use shared::PlayerName;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "Polls game servers once and lists their players", long_about = None)]
struct Args {
    /// Endpoint list, one `GAME,COUNTRY,TITLE,host:port` per line
    #[arg(short = 's', long, default_value = "sanitized_servers.txt")]
    servers: PathBuf,

    /// Per-endpoint query timeout in milliseconds
    #[arg(short = 't', long, default_value = "5000")]
    timeout_ms: u64,

    /// Maximum queries in flight
    #[arg(short = 'c', long, default_value = "32")]
    concurrency: usize,

    /// Write the deduplicated endpoint list here and exit without polling
    #[arg(long)]
    write_sanitized: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=debug for per-endpoint logging");
    }

    let args = Args::parse();
    let endpoints = load_endpoints(&args.servers).await?;

    if let Some(output) = &args.write_sanitized {
        write_endpoints(output, &endpoints).await?;
        return Ok(());
    }

    let poller = Poller::new(PollerConfig {
        timeout: Duration::from_millis(args.timeout_ms),
        concurrency: args.concurrency,
        ..PollerConfig::default()
    });
    info!(
        "Polling {} endpoints (timeout {:?}, concurrency {})",
        endpoints.len(),
        poller.config().timeout,
        poller.config().concurrency
    );

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, abandoning poll...");
            trigger.cancel();
        }
    });

    let Some(snapshot) = poller.poll_until_cancelled(&endpoints, &shutdown).await else {
        warn!("Poll cancelled before completion");
        return Ok(());
    };

    for entry in snapshot.entries.iter().filter(|e| !e.players.is_empty()) {
        let names: Vec<&str> = entry.players.iter().map(PlayerName::as_str).collect();
        println!("{}: {}", entry.endpoint, names.join(", "));
    }
    println!(
        "{} unique players across {} endpoints",
        snapshot.unique_players().len(),
        snapshot.entries.len()
    );

    Ok(())
}
