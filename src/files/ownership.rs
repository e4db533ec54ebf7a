use std::collections::BTreeMap;
use std::path::PathBuf;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::hashspace::RingId;

/// The reduced ownership view exchanged during anti-entropy:
/// `filename -> locked`. A `BTreeMap` keeps the JSON wire form canonical.
pub type FileMap = BTreeMap<String, bool>;

/// Merges a peer's file map into the local one.
///
/// Absent filenames are inserted as sent; for filenames present on both sides
/// the lock flag is a monotonic union — a lock seen anywhere sticks, a merge
/// never clears one. The operation is idempotent and the union is commutative,
/// so peers may exchange maps in any order, any number of times.
pub fn merge_file_maps(local: &mut FileMap, peer: &FileMap) {
    for (filename, locked) in peer {
        match local.get_mut(filename) {
            None => {
                local.insert(filename.clone(), *locked);
            }
            Some(flag) => {
                if *locked {
                    *flag = true;
                }
            }
        }
    }
}

/// Folds filenames into the map as unlocked, leaving known entries untouched.
pub fn fold_in_unlocked<I: IntoIterator<Item = String>>(local: &mut FileMap, filenames: I) {
    for filename in filenames {
        local.entry(filename).or_insert(false);
    }
}

/// Provenance record for one replicated file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOwnershipEntry {
    pub filename: String,
    pub file_hash: RingId,
    /// Node that originally holds the file.
    pub local_owner: String,
    /// Node the placement algorithm assigned the replica to.
    pub replica_owner: String,
    pub locked: bool,
}

/// A node's ownership log: `filename -> FileOwnershipEntry`, JSON-persisted.
///
/// Entries appear when a replica is first written (or a `LOG` order arrives)
/// and disappear only through leave-time migration or an explicit clear.
pub struct OwnershipLog {
    entries: DashMap<String, FileOwnershipEntry>,
    path: Option<PathBuf>,
}

impl OwnershipLog {
    /// In-memory log without persistence; used by tests.
    pub fn ephemeral() -> Self {
        Self {
            entries: DashMap::new(),
            path: None,
        }
    }

    /// Opens the log at `path`, loading any previously saved entries. A
    /// missing or empty file is a fresh log, not an error.
    pub fn open(path: PathBuf) -> Self {
        let entries = DashMap::new();
        match std::fs::read_to_string(&path) {
            Ok(raw) if !raw.trim().is_empty() => {
                match serde_json::from_str::<Vec<FileOwnershipEntry>>(&raw) {
                    Ok(saved) => {
                        for entry in saved {
                            entries.insert(entry.filename.clone(), entry);
                        }
                    }
                    Err(e) => warn!("ignoring unreadable ownership log {:?}: {}", path, e),
                }
            }
            _ => {}
        }
        Self {
            entries,
            path: Some(path),
        }
    }

    pub fn record(&self, entry: FileOwnershipEntry) {
        self.entries.insert(entry.filename.clone(), entry);
        self.save();
    }

    pub fn get(&self, filename: &str) -> Option<FileOwnershipEntry> {
        self.entries.get(filename).map(|e| e.value().clone())
    }

    pub fn remove(&self, filename: &str) -> bool {
        let removed = self.entries.remove(filename).is_some();
        if removed {
            self.save();
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.clear();
        self.save();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries this node holds as the replica owner; the input set for
    /// leave-time migration.
    pub fn replicas_held_by(&self, address: &str) -> Vec<FileOwnershipEntry> {
        self.entries
            .iter()
            .filter(|e| e.replica_owner == address)
            .map(|e| e.value().clone())
            .collect()
    }

    /// The reduced `filename -> locked` view for anti-entropy.
    pub fn lock_map(&self) -> FileMap {
        self.entries
            .iter()
            .map(|e| (e.filename.clone(), e.locked))
            .collect()
    }

    fn save(&self) {
        let Some(path) = &self.path else {
            return;
        };
        let mut snapshot: Vec<FileOwnershipEntry> =
            self.entries.iter().map(|e| e.value().clone()).collect();
        snapshot.sort_by(|a, b| a.filename.cmp(&b.filename));
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    warn!("failed to persist ownership log {:?}: {}", path, e);
                }
            }
            Err(e) => warn!("failed to serialize ownership log: {}", e),
        }
    }
}
