use clap::Parser;
use log::info;
use minter::{
    AccumulationStore, DryRunLedger, PurgePolicy, RegistryPoller, Scheduler, SchedulerConfig,
    TokioClock,
};
use poller::{Poller, PollerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about = "Tracks players across game servers and mints for known ones", long_about = None)]
struct Args {
    /// Endpoint list, reloaded every cycle
    #[arg(short = 's', long, default_value = "sanitized_servers.txt")]
    servers: PathBuf,

    /// Newline-delimited registered player names
    #[arg(short = 'k', long)]
    known_players: PathBuf,

    /// Accumulated player file
    #[arg(long, default_value = "accumulated_players.txt")]
    store: PathBuf,

    /// Write a JSON report of online players after every cycle
    #[arg(long)]
    report: Option<PathBuf>,

    /// Per-endpoint query timeout in milliseconds
    #[arg(short = 't', long, default_value = "5000")]
    timeout_ms: u64,

    /// Maximum queries in flight
    #[arg(short = 'c', long, default_value = "32")]
    concurrency: usize,

    /// Pause between cycles in seconds
    #[arg(long, default_value = "300")]
    sleep_secs: u64,

    /// Mint on cycles where `cycle % mint_period == mint_trigger`
    #[arg(long, default_value = "4")]
    mint_period: u64,

    #[arg(long, default_value = "1")]
    mint_trigger: u64,

    /// Players per batch submission
    #[arg(long, default_value = "24")]
    chunk_size: usize,

    #[arg(long, value_enum, default_value_t = PurgePolicy::Always)]
    purge_policy: PurgePolicy,

    /// How long in-flight queries may finish after Ctrl+C
    #[arg(long, default_value = "2000")]
    shutdown_grace_ms: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=debug for per-endpoint logging");
    }

    let args = Args::parse();

    let config = SchedulerConfig {
        mint_period: args.mint_period,
        mint_trigger: args.mint_trigger,
        chunk_size: args.chunk_size,
        sleep: Duration::from_secs(args.sleep_secs),
        purge_policy: args.purge_policy,
        report_path: args.report,
    };
    config.validate()?;

    let poller = Poller::new(PollerConfig {
        timeout: Duration::from_millis(args.timeout_ms),
        concurrency: args.concurrency,
        shutdown_grace: Duration::from_millis(args.shutdown_grace_ms),
    });
    let store = AccumulationStore::load(&args.store)?;

    let mut scheduler = Scheduler::new(
        config,
        Arc::new(RegistryPoller::new(args.servers, poller)),
        Arc::new(DryRunLedger::new(args.known_players)),
        Arc::new(TokioClock),
        store,
    )?;

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, shutting down gracefully...");
            trigger.cancel();
        }
    });

    scheduler.run(&shutdown).await;
    Ok(())
}
