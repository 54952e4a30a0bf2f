//! Data model shared by the poller and the minter: endpoints, canonical
//! player names and per-cycle poll snapshots.

pub mod endpoint;
pub mod name;
pub mod snapshot;

pub use endpoint::{
    dedupe_endpoints, parse_endpoint_line, parse_endpoints, Endpoint, MalformedEntry,
    ParsedEndpoints, ProtocolKind,
};
pub use name::{sanitize, InvalidName, PlayerName};
pub use snapshot::{EndpointPoll, PollOutcome, PollSnapshot};

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Every connectionless query packet and reply starts with this header.
pub const QUERY_PREFIX: [u8; 4] = [0xFF, 0xFF, 0xFF, 0xFF];
pub const LEGACY_STATUS_COMMAND: &[u8] = b"status\0";
pub const STRUCTURED_STATUS_COMMAND: &[u8] = b"getstatus\0";

pub const DEFAULT_QUERY_PORT: u16 = 27015;
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_CONCURRENCY: usize = 32;
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// Milliseconds since the unix epoch, saturating to zero on a skewed clock.
pub fn current_timestamp() -> u64 {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_millis();
    (millis.min(u64::MAX as u128)) as u64
}

/// Builds a full legacy request datagram: the header followed by the command.
pub fn connectionless_packet(command: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(QUERY_PREFIX.len() + command.len());
    packet.extend_from_slice(&QUERY_PREFIX);
    packet.extend_from_slice(command);
    packet
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectionless_status_packet() {
        let packet = connectionless_packet(LEGACY_STATUS_COMMAND);
        assert_eq!(&packet[..4], &[0xFF, 0xFF, 0xFF, 0xFF]);
        assert_eq!(&packet[4..], b"status\0");
    }

    #[test]
    fn test_connectionless_getstatus_packet() {
        let packet = connectionless_packet(STRUCTURED_STATUS_COMMAND);
        assert_eq!(packet.len(), 4 + "getstatus".len() + 1);
        assert_eq!(packet.last(), Some(&0u8));
    }

    #[test]
    fn test_timestamp_is_monotonic_enough() {
        let first = current_timestamp();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = current_timestamp();
        assert!(second > first);
    }
}
