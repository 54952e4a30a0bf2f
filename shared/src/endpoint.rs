//! Poll targets and the comma-separated endpoint list grammar.
//!
//! Each line of an endpoint list reads `game,country,title,host:port`. The
//! game code selects the query protocol; the address accepts IPv4, host
//! names and bracketed IPv6 literals.

use crate::DEFAULT_QUERY_PORT;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, Ipv6Addr};
use thiserror::Error;

/// Wire protocol family used to ask a server for its player list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolKind {
    /// `status` reply with four numeric fields before each quoted name.
    LegacyStatusA,
    /// `status` reply with two numeric fields before each quoted name.
    LegacyStatusB,
    /// `getstatus` reply where every quoted token is a player.
    StructuredStatus,
    /// A2S_PLAYER challenge/response binary query.
    BinaryQuery,
}

impl ProtocolKind {
    pub fn from_game_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "QW" => Some(Self::LegacyStatusA),
            "Q2" => Some(Self::LegacyStatusB),
            "Q3" => Some(Self::StructuredStatus),
            "QL" | "TFC" | "CS" | "HL" | "L4D" | "RUST" => Some(Self::BinaryQuery),
            _ => None,
        }
    }

    /// Numeric fields preceding the quoted name on a legacy status line.
    pub fn leading_numeric_fields(self) -> Option<usize> {
        match self {
            Self::LegacyStatusA => Some(4),
            Self::LegacyStatusB => Some(2),
            Self::StructuredStatus | Self::BinaryQuery => None,
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::LegacyStatusA => "legacy-status-a",
            Self::LegacyStatusB => "legacy-status-b",
            Self::StructuredStatus => "structured-status",
            Self::BinaryQuery => "a2s",
        };
        f.write_str(label)
    }
}

/// A single game server to poll. Identity is `(host, port)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
    pub protocol: ProtocolKind,
    pub title: String,
    pub game: String,
    pub country: String,
}

impl Endpoint {
    pub fn key(&self) -> (&str, u16) {
        (&self.host, self.port)
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Renders the endpoint back into the list grammar.
    pub fn to_line(&self) -> String {
        format!(
            "{},{},{},{}",
            self.game,
            self.country,
            self.title,
            self.address()
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.address(), self.game, self.title)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedEntry {
    #[error("expected 4 comma-separated fields, found {0}")]
    FieldCount(usize),
    #[error("invalid address {0:?}")]
    BadAddress(String),
    #[error("unsupported game code {0:?}")]
    UnsupportedGame(String),
}

/// Parses one endpoint list line.
pub fn parse_endpoint_line(line: &str) -> Result<Endpoint, MalformedEntry> {
    let parts: Vec<&str> = line.trim().split(',').collect();
    if parts.len() != 4 {
        return Err(MalformedEntry::FieldCount(parts.len()));
    }

    let game = parts[0].trim().to_ascii_uppercase();
    let country = parts[1].trim().to_ascii_uppercase();
    let title = parts[2].trim().to_string();
    let protocol = ProtocolKind::from_game_code(&game)
        .ok_or_else(|| MalformedEntry::UnsupportedGame(game.clone()))?;
    let (host, port) = parse_host_port(parts[3].trim())?;

    Ok(Endpoint {
        host,
        port,
        protocol,
        title,
        game,
        country,
    })
}

fn parse_host_port(address: &str) -> Result<(String, u16), MalformedEntry> {
    let bad = || MalformedEntry::BadAddress(address.to_string());

    let (host, port) = if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(bad)?;
        host.parse::<Ipv6Addr>().map_err(|_| bad())?;
        let port = match tail {
            "" => None,
            _ => Some(tail.strip_prefix(':').ok_or_else(bad)?),
        };
        (host, port)
    } else {
        match address.matches(':').count() {
            0 => (address, None),
            1 => {
                let (host, port) = address.split_once(':').ok_or_else(bad)?;
                (host, Some(port))
            }
            // A bare IPv6 literal carries no port.
            _ => {
                address.parse::<Ipv6Addr>().map_err(|_| bad())?;
                (address, None)
            }
        }
    };

    if host.is_empty() {
        return Err(bad());
    }

    let port = match port {
        None => DEFAULT_QUERY_PORT,
        Some(port) => match port.parse::<u16>() {
            Ok(0) | Err(_) => return Err(bad()),
            Ok(port) => port,
        },
    };

    Ok((canonical_host(host), port))
}

fn canonical_host(host: &str) -> String {
    match host.parse::<IpAddr>() {
        Ok(ip) => ip.to_string(),
        Err(_) => host.to_ascii_lowercase(),
    }
}

/// Keeps the first endpoint for every `(host, port)` pair, preserving order.
pub fn dedupe_endpoints(endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    let mut seen = HashSet::new();
    endpoints
        .into_iter()
        .filter(|endpoint| seen.insert((endpoint.host.clone(), endpoint.port)))
        .collect()
}

/// Result of parsing a whole endpoint list.
#[derive(Debug, Default)]
pub struct ParsedEndpoints {
    pub endpoints: Vec<Endpoint>,
    /// 1-based line number and the reason the line was skipped.
    pub malformed: Vec<(usize, MalformedEntry)>,
    pub duplicates: usize,
}

/// Parses an endpoint list, skipping blank and `#` comment lines.
pub fn parse_endpoints(text: &str) -> ParsedEndpoints {
    let mut parsed = ParsedEndpoints::default();
    let mut all = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        match parse_endpoint_line(trimmed) {
            Ok(endpoint) => all.push(endpoint),
            Err(reason) => parsed.malformed.push((index + 1, reason)),
        }
    }

    let total = all.len();
    parsed.endpoints = dedupe_endpoints(all);
    parsed.duplicates = total - parsed.endpoints.len();
    parsed
}
