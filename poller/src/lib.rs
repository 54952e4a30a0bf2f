//! # Player Poller
//!
//! Queries game servers for their connected players.
//!
//! ## Module Organization
//!
//! ### Registry (`registry`)
//! Reads the comma-separated endpoint list from disk, logging and skipping
//! malformed lines, and writes deduplicated lists back out.
//!
//! ### Protocol (`protocol`)
//! One driver per query protocol family:
//! - `status` text replies with leading numeric fields (QuakeWorld, Quake 2)
//! - `getstatus` text replies (Quake 3)
//! - A2S_PLAYER binary challenge/response (Source and GoldSrc titles)
//!
//! Every driver bounds its exchange with a timeout and classifies failures
//! instead of propagating them.
//!
//! ### Orchestrator (`orchestrator`)
//! Fans queries out across a bounded pool of tasks and joins them into one
//! [`shared::PollSnapshot`]. A slow or dead server costs at most one timeout
//! and never delays the others beyond that.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use poller::{load_endpoints, Poller, PollerConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let endpoints = load_endpoints(Path::new("sanitized_servers.txt")).await?;
//!     let poller = Poller::new(PollerConfig::default());
//!
//!     let snapshot = poller.poll_all(&endpoints).await;
//!     for entry in &snapshot.entries {
//!         println!("{}: {} players", entry.endpoint, entry.players.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod orchestrator;
pub mod protocol;
pub mod registry;

pub use orchestrator::{poll_endpoint, Poller, PollerConfig};
pub use protocol::{Driver, QueryError, RawQueryResult};
pub use registry::{load_endpoints, write_endpoints, RegistryError};
