//! Performance benchmarks for the parsing and accumulation hot paths

use minter::{chunk, AccumulationStore};
use poller::protocol::{a2s::decode_players, legacy::parse_status};
use shared::{parse_endpoints, sanitize, EndpointPoll, PlayerName, PollOutcome, PollSnapshot, QUERY_PREFIX};
use std::time::Instant;

/// Benchmarks the name sanitizer on decorated names
#[test]
fn benchmark_sanitize() {
    let raw = ["^1Player[CLAN]^7", "{bot}<x>Ranger(2)", "plain_name-01", "^4^5Ünïcode [T]"];
    let iterations = 50_000;
    let start = Instant::now();

    for i in 0..iterations {
        let _ = sanitize(raw[i % raw.len()]);
    }

    let duration = start.elapsed();
    println!(
        "Sanitize: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Benchmarks parsing a large endpoint list
#[test]
fn benchmark_registry_parse() {
    let mut text = String::new();
    for i in 0..5_000u32 {
        text.push_str(&format!(
            "QW,US,Server{},10.{}.{}.{}:27500\n",
            i,
            i / 65_536,
            (i / 256) % 256,
            i % 256
        ));
    }

    let start = Instant::now();
    let parsed = parse_endpoints(&text);
    let duration = start.elapsed();
    println!("Registry parse: 5000 lines in {:?}", duration);

    assert_eq!(parsed.endpoints.len(), 5_000);
    assert!(duration.as_millis() < 1000);
}

/// Benchmarks decoding text status replies
#[test]
fn benchmark_status_parse() {
    let mut payload = QUERY_PREFIX.to_vec();
    payload.extend_from_slice(b"n\\maxclients\\32\\map\\dm6\n");
    for i in 0..32 {
        payload.extend_from_slice(format!("{} 10 25 80 \"^1Player{}[CLAN]\" \"base\" 4 4\n", i, i).as_bytes());
    }

    let iterations = 5_000;
    let start = Instant::now();
    for _ in 0..iterations {
        let names = parse_status(&payload, 4).unwrap();
        assert_eq!(names.len(), 32);
    }

    let duration = start.elapsed();
    println!(
        "Status parse: {} replies in {:?} ({:.2} μs/reply)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );
    assert!(duration.as_millis() < 3000);
}

/// Benchmarks decoding a full A2S_PLAYER reply
#[test]
fn benchmark_a2s_decode() {
    let mut payload = QUERY_PREFIX.to_vec();
    payload.push(0x44);
    payload.push(64);
    for i in 0..64u8 {
        payload.push(i);
        payload.extend_from_slice(format!("player_{}", i).as_bytes());
        payload.push(0);
        payload.extend_from_slice(&(i as i32).to_le_bytes());
        payload.extend_from_slice(&(i as f32 * 1.5).to_le_bytes());
    }

    let iterations = 10_000;
    let start = Instant::now();
    for _ in 0..iterations {
        let players = decode_players(&payload).unwrap();
        assert_eq!(players.len(), 64);
    }

    let duration = start.elapsed();
    println!(
        "A2S decode: {} replies in {:?} ({:.2} μs/reply)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );
    assert!(duration.as_millis() < 3000);
}

/// Stress tests merging and chunking a large accumulated set
#[test]
fn benchmark_merge_and_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let mut store = AccumulationStore::load(dir.path().join("accumulated_players.txt")).unwrap();
    let endpoint = shared::parse_endpoint_line("Q3,SE,Load,10.0.0.9:27960").unwrap();

    let start = Instant::now();
    for cycle in 0..20 {
        let players = (0..500)
            .map(|i| PlayerName::new(format!("p{}_{}", cycle % 10, i)).unwrap())
            .collect();
        let snapshot = PollSnapshot::new(
            cycle,
            vec![EndpointPoll {
                endpoint: endpoint.clone(),
                outcome: PollOutcome::Responded,
                latency_ms: Some(1),
                players,
            }],
        );
        store.merge(&snapshot).unwrap();
    }
    let eligible: Vec<PlayerName> = store.players().iter().cloned().collect();
    let chunks = chunk(&eligible, 24);
    let duration = start.elapsed();

    println!("Merge 20 cycles + chunk {} players in {:?}", eligible.len(), duration);
    assert_eq!(eligible.len(), 5_000);
    assert_eq!(chunks.concat(), eligible);
    assert!(duration.as_millis() < 5000);
}
