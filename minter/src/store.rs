//! Durable set of every canonical player seen since the last purge.

use log::{debug, info, warn};
use shared::{PlayerName, PollSnapshot};
use std::collections::{BTreeSet, HashSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result of folding one snapshot into the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Size of the set after the merge.
    pub total: usize,
    /// Names that were not present before.
    pub added: usize,
}

/// The accumulated player set and the newline-delimited file backing it.
///
/// The store is the only writer of its file. Every write replaces the file
/// wholesale with the sorted set.
#[derive(Debug)]
pub struct AccumulationStore {
    path: PathBuf,
    players: BTreeSet<PlayerName>,
}

impl AccumulationStore {
    /// Opens the store at `path`. A missing file is an empty set.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => String::new(),
            Err(source) => return Err(StoreError::Read { path, source }),
        };

        let mut players = BTreeSet::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match PlayerName::new(line) {
                Ok(name) => {
                    players.insert(name);
                }
                Err(e) => warn!("{}: dropping stored entry: {}", path.display(), e),
            }
        }

        info!("Loaded {} accumulated players from {}", players.len(), path.display());
        Ok(Self { path, players })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn players(&self) -> &BTreeSet<PlayerName> {
        &self.players
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Unions the snapshot's players into the set, persisting only on growth.
    ///
    /// On a write failure the in-memory set keeps the new names and the error
    /// is returned.
    pub fn merge(&mut self, snapshot: &PollSnapshot) -> Result<MergeOutcome, StoreError> {
        let before = self.players.len();
        self.players.extend(snapshot.players().cloned());
        let outcome = MergeOutcome {
            total: self.players.len(),
            added: self.players.len() - before,
        };

        if outcome.added > 0 {
            self.persist()?;
        }
        Ok(outcome)
    }

    /// Accumulated names that are also in `known`, in ascending order.
    pub fn reconcile(&self, known: &HashSet<String>) -> Vec<PlayerName> {
        self.players
            .iter()
            .filter(|name| known.contains(name.as_str()))
            .cloned()
            .collect()
    }

    /// Empties the set and truncates the file.
    pub fn purge(&mut self) -> Result<(), StoreError> {
        let dropped = self.players.len();
        self.players.clear();
        self.persist()?;
        info!("Purged {} accumulated players", dropped);
        Ok(())
    }

    /// Replaces the set with `names` and persists it.
    pub fn retain_only<I>(&mut self, names: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = PlayerName>,
    {
        self.players = names.into_iter().collect();
        self.persist()?;
        info!("Retained {} accumulated players", self.players.len());
        Ok(())
    }

    fn persist(&self) -> Result<(), StoreError> {
        write_atomically(&self.path, &self.players).map_err(|source| StoreError::Persist {
            path: self.path.clone(),
            source,
        })?;
        debug!("Wrote {} players to {}", self.players.len(), self.path.display());
        Ok(())
    }
}

// Writes a sibling temp file, then renames it over the target.
fn write_atomically(path: &Path, players: &BTreeSet<PlayerName>) -> io::Result<()> {
    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    {
        let mut file = io::BufWriter::new(std::fs::File::create(&tmp_path)?);
        for name in players {
            writeln!(file, "{}", name)?;
        }
        file.into_inner().map_err(|e| e.into_error())?.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)
}

/// Splits `players` into groups of `size`; only the last may be shorter.
///
/// A size of zero is treated as one.
pub fn chunk(players: &[PlayerName], size: usize) -> Vec<Vec<PlayerName>> {
    players.chunks(size.max(1)).map(<[PlayerName]>::to_vec).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use shared::{parse_endpoint_line, EndpointPoll, PollOutcome};

    fn names(raw: &[&str]) -> Vec<PlayerName> {
        raw.iter().map(|n| PlayerName::new(*n).unwrap()).collect()
    }

    fn snapshot_with(players: &[&str]) -> PollSnapshot {
        let endpoint = parse_endpoint_line("QW,US,Test,10.0.0.5:27500").unwrap();
        PollSnapshot::new(
            0,
            vec![EndpointPoll {
                endpoint,
                outcome: PollOutcome::Responded,
                latency_ms: Some(10),
                players: names(players),
            }],
        )
    }

    fn known(raw: &[&str]) -> HashSet<String> {
        raw.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = AccumulationStore::load(dir.path().join("accumulated_players.txt")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_load_drops_non_canonical_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accumulated_players.txt");
        std::fs::write(&path, "Alice\n\n  Bob  \nbad name\nCarol\n").unwrap();

        let store = AccumulationStore::load(&path).unwrap();
        let loaded: Vec<&str> = store.players().iter().map(PlayerName::as_str).collect();
        assert_eq!(loaded, vec!["Alice", "Bob", "Carol"]);
    }

    #[test]
    fn test_merge_persists_sorted_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accumulated_players.txt");
        let mut store = AccumulationStore::load(&path).unwrap();

        let snapshot = snapshot_with(&["Zed", "Alice", "Zed"]);
        let first = store.merge(&snapshot).unwrap();
        assert_eq!(first, MergeOutcome { total: 2, added: 2 });
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Alice\nZed\n");

        let second = store.merge(&snapshot).unwrap();
        assert_eq!(second, MergeOutcome { total: 2, added: 0 });

        let reopened = AccumulationStore::load(&path).unwrap();
        assert_eq!(reopened.players(), store.players());
    }

    #[test]
    fn test_merge_without_growth_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accumulated_players.txt");
        let mut store = AccumulationStore::load(&path).unwrap();

        store.merge(&PollSnapshot::empty(0)).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_reconcile_is_sorted_intersection() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = AccumulationStore::load(dir.path().join("acc.txt")).unwrap();
        store
            .merge(&snapshot_with(&["Mallory", "Carol", "Alice", "Trent"]))
            .unwrap();

        let eligible = store.reconcile(&known(&["Trent", "Alice", "Carol", "Nobody"]));
        assert_eq!(eligible, names(&["Alice", "Carol", "Trent"]));
        assert!(store.reconcile(&HashSet::new()).is_empty());
    }

    #[test]
    fn test_purge_then_alice_is_new_again() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accumulated_players.txt");
        let mut store = AccumulationStore::load(&path).unwrap();
        store.merge(&snapshot_with(&["Alice", "Bob"])).unwrap();

        store.purge().unwrap();
        assert!(store.is_empty());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        let outcome = store.merge(&snapshot_with(&["Alice"])).unwrap();
        assert_eq!(outcome.added, 1);
    }

    #[test]
    fn test_retain_only_replaces_set() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("accumulated_players.txt");
        let mut store = AccumulationStore::load(&path).unwrap();
        store.merge(&snapshot_with(&["Alice", "Bob", "Carol"])).unwrap();

        store.retain_only(names(&["Carol"])).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Carol\n");
        assert!(!dir.path().join("accumulated_players.txt.tmp").exists());
    }

    #[test]
    fn test_persist_failure_keeps_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing_dir").join("acc.txt");
        let mut store = AccumulationStore::load(&path).unwrap();

        let result = store.merge(&snapshot_with(&["Alice"]));
        assert!(matches!(result, Err(StoreError::Persist { .. })));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_chunk_edge_sizes() {
        let players = names(&["A", "B", "C", "D", "E"]);
        assert_eq!(chunk(&players, 24), vec![players.clone()]);
        assert_eq!(chunk(&players, 0).len(), 5);
        assert!(chunk(&[], 24).is_empty());
    }

    fn player_list() -> impl Strategy<Value = Vec<PlayerName>> {
        prop::collection::vec("[A-Za-z0-9_-]{1,16}", 0..200).prop_map(|raw| {
            raw.into_iter()
                .map(|name| PlayerName::new(name).unwrap())
                .collect()
        })
    }

    proptest! {
        #[test]
        fn test_chunk_shapes(players in player_list(), size in 1usize..64) {
            let chunks = chunk(&players, size);

            prop_assert_eq!(chunks.concat(), players.clone());
            prop_assert!(chunks.iter().all(|c| !c.is_empty()));
            if let Some((last, full)) = chunks.split_last() {
                prop_assert!(full.iter().all(|c| c.len() == size));
                prop_assert!(last.len() <= size);
            } else {
                prop_assert!(players.is_empty());
            }
        }
    }
}
