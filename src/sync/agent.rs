use std::sync::{Arc, Mutex};

use tokio::sync::{watch, Notify};
use tracing::{debug, warn};

use crate::config::ClusterConfig;
use crate::files::ownership::{fold_in_unlocked, merge_file_maps, FileMap};
use crate::files::store::FileStore;
use crate::protocol::message::ControlMessage;
use crate::protocol::net;
use crate::ring::agent::RingAgent;

/// The per-node anti-entropy agent.
///
/// Owns this node's `FileMap`. The map is only ever mutated by this node's
/// tasks — peers see it through `REQUEST_FILE_MAP`/`FILEMAP` exchanges, never
/// through shared memory. The lock guards in-memory merges only; no await
/// happens while it is held.
pub struct SyncAgent {
    cfg: ClusterConfig,
    address: String,
    ring: Arc<RingAgent>,
    local_store: FileStore,
    replica_store: FileStore,
    file_map: Mutex<FileMap>,
    trigger: Notify,
}

impl SyncAgent {
    pub fn new(
        cfg: ClusterConfig,
        address: String,
        ring: Arc<RingAgent>,
        local_store: FileStore,
        replica_store: FileStore,
    ) -> Self {
        Self {
            cfg,
            address,
            ring,
            local_store,
            replica_store,
            file_map: Mutex::new(FileMap::new()),
            trigger: Notify::new(),
        }
    }

    pub fn snapshot(&self) -> FileMap {
        self.file_map.lock().unwrap().clone()
    }

    /// Requests an out-of-band cycle (pointer change, chained SYNC_REQUEST).
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Merges a peer's map: the response half of the anti-entropy exchange.
    pub fn merge_peer_map(&self, peer: &FileMap) {
        let mut map = self.file_map.lock().unwrap();
        merge_file_maps(&mut map, peer);
        debug!("merged peer map; {} file(s) known", map.len());
    }

    /// Folds this node's own stores into the map: replicas it holds and
    /// local files not yet replicated, all unlocked unless already known.
    pub fn absorb_local_state(&self) {
        let replicated = self.replica_store.list();
        let local = self.local_store.list();
        let mut map = self.file_map.lock().unwrap();
        fold_in_unlocked(&mut map, replicated);
        fold_in_unlocked(&mut map, local);
    }

    /// Answers a peer's `REQUEST_FILE_MAP` with this node's current map.
    pub async fn handle_request(&self, requester: &str) {
        let entries = self.snapshot();
        let reply = ControlMessage::FileMap { entries };
        if let Err(e) = net::send_unicast(requester, self.cfg.control_port, &reply).await {
            warn!("failed to answer file map request from {}: {}", requester, e);
        }
    }

    /// Runs cycles on the configured interval (and on demand) until the
    /// shutdown signal flips.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.cfg.sync_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.cycle().await,
                _ = self.trigger.notified() => self.cycle().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("sync agent stopping");
                        return;
                    }
                }
            }
        }
    }

    async fn cycle(&self) {
        self.absorb_local_state();

        if self.ring.num_nodes() < 2 {
            debug!("ring has a single member, skipping sync cycle");
            return;
        }
        let Some(successor) = self.ring.successor_address().await else {
            // Normal during churn; the next tick retries.
            debug!("successor unknown, skipping sync cycle");
            return;
        };

        let request = ControlMessage::RequestFileMap {
            address: self.address.clone(),
        };
        if let Err(e) = net::send_unicast(&successor, self.cfg.control_port, &request).await {
            warn!("failed to request file map from {}: {}", successor, e);
            return;
        }

        // Chain the cycle; the successor's map lands via merge_peer_map
        // whenever its answer arrives.
        if let Err(e) =
            net::send_unicast(&successor, self.cfg.control_port, &ControlMessage::SyncRequest).await
        {
            warn!("failed to chain sync to {}: {}", successor, e);
        }
    }
}
