use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use dashmap::DashMap;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use super::placement::owner_for;
use super::types::{JoinOutcome, NodeRecord, RegistryError};
use crate::config::ClusterConfig;
use crate::hashspace::{position, RingId};
use crate::protocol::message::ControlMessage;
use crate::protocol::net;

/// The authoritative ring membership table.
///
/// Owns the `ringID -> address` map, answers join/leave/locate, and drives
/// replication: every file report is run through the placement rule and, when
/// the owner is remote, turned into a `REPLICATE` order for the reporter and
/// a `LOG` order for the owner.
///
/// All state is owned by this struct; there are no statics. The table is
/// persisted to `cfg.nodes_file` on every mutation and reloaded on open.
pub struct MembershipRegistry {
    cfg: ClusterConfig,
    nodes: DashMap<RingId, String>,
}

impl MembershipRegistry {
    /// Opens the registry, restoring any membership saved by a previous run.
    /// A missing or unreadable table file starts an empty ring.
    pub fn open(cfg: ClusterConfig) -> Self {
        let nodes = DashMap::new();
        match std::fs::read_to_string(&cfg.nodes_file) {
            Ok(raw) if !raw.trim().is_empty() => {
                match serde_json::from_str::<BTreeMap<String, String>>(&raw) {
                    Ok(saved) => {
                        for (id, address) in saved {
                            match id.parse::<RingId>() {
                                Ok(id) => {
                                    nodes.insert(id, address);
                                }
                                Err(_) => warn!("skipping bad ring id {:?} in saved table", id),
                            }
                        }
                        info!("restored {} node(s) from {:?}", nodes.len(), cfg.nodes_file);
                    }
                    Err(e) => warn!("ignoring unreadable node table {:?}: {}", cfg.nodes_file, e),
                }
            }
            _ => {}
        }
        Self { cfg, nodes }
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.cfg
    }

    /// Registers `address` at its hashed position.
    ///
    /// Idempotent under retry. A position already taken answers
    /// `added = false` — a hash collision between distinct addresses reads
    /// as "already joined", never as rejection.
    pub fn join(&self, address: &str) -> JoinOutcome {
        let id = position(address);
        let added = match self.nodes.entry(id) {
            dashmap::mapref::entry::Entry::Occupied(existing) => {
                if existing.get() != address {
                    warn!(
                        "join of {} collides with {} at position {}; treating as already joined",
                        address,
                        existing.get(),
                        id
                    );
                }
                false
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(address.to_string());
                true
            }
        };
        if added {
            self.save();
            info!("node {} joined at position {}", address, id);
        }
        JoinOutcome {
            added,
            ring_size: self.nodes.len(),
        }
    }

    /// Removes the record at `address`'s position. Returns whether anything
    /// was removed.
    pub fn leave(&self, address: &str) -> bool {
        let id = position(address);
        let removed = self.nodes.remove(&id).is_some();
        if removed {
            self.save();
            info!("node {} left position {}", address, id);
        }
        removed
    }

    /// Finds the owner of a file hash over the current snapshot.
    pub fn locate(&self, file_hash: RingId) -> Result<NodeRecord, RegistryError> {
        let ids = self.ring_ids();
        let owner = owner_for(file_hash, &ids, None).ok_or(RegistryError::EmptyRing)?;
        self.record_of(owner).ok_or(RegistryError::EmptyRing)
    }

    /// Placement for a file report: the reporter never owns its own report.
    /// `None` means no eligible owner exists (the reporter is alone).
    pub fn owner_for_report(&self, reporter: &str, filename: &str) -> Option<NodeRecord> {
        let ids = self.ring_ids();
        let owner = owner_for(position(filename), &ids, Some(position(reporter)))?;
        self.record_of(owner)
    }

    /// Registered positions, sorted ascending.
    pub fn ring_ids(&self) -> Vec<RingId> {
        let mut ids: Vec<RingId> = self.nodes.iter().map(|e| *e.key()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn address_of(&self, id: RingId) -> Option<String> {
        self.nodes.get(&id).map(|e| e.value().clone())
    }

    pub fn record_of(&self, id: RingId) -> Option<NodeRecord> {
        self.address_of(id).map(|address| NodeRecord { id, address })
    }

    /// Looks a member up by address.
    pub fn find(&self, address: &str) -> Option<NodeRecord> {
        self.record_of(position(address))
    }

    /// Ring-order neighbors of a member: `(node, predecessor, successor)`.
    /// A singleton ring is its own neighbor on both sides.
    pub fn neighbors_of(&self, address: &str) -> Option<(NodeRecord, NodeRecord, NodeRecord)> {
        let node = self.find(address)?;
        let ids = self.ring_ids();
        let index = ids.iter().position(|id| *id == node.id)?;
        let pred = ids[(index + ids.len() - 1) % ids.len()];
        let succ = ids[(index + 1) % ids.len()];
        Some((node, self.record_of(pred)?, self.record_of(succ)?))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn save(&self) {
        // A JSON object of stringified-id -> address pairs.
        let snapshot: BTreeMap<String, String> = self
            .nodes
            .iter()
            .map(|e| (e.key().to_string(), e.value().clone()))
            .collect();
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&self.cfg.nodes_file, json) {
                    warn!("failed to persist node table {:?}: {}", self.cfg.nodes_file, e);
                }
            }
            Err(e) => warn!("failed to serialize node table: {}", e),
        }
    }

    /// Spawns the registry's protocol listeners: the multicast announcement
    /// listener and the unicast report listener.
    pub async fn start(self: Arc<Self>) -> Result<()> {
        let announcements =
            net::bind_multicast(self.cfg.multicast_group, self.cfg.multicast_port).await?;
        let control = net::bind_control(self.cfg.control_port).await?;
        info!(
            "registry listening: announcements on {}:{}, reports on {}",
            self.cfg.multicast_group, self.cfg.multicast_port, self.cfg.control_port
        );

        let service = self.clone();
        tokio::spawn(async move {
            service.receive_loop(announcements).await;
        });
        let service = self.clone();
        tokio::spawn(async move {
            service.receive_loop(control).await;
        });
        Ok(())
    }

    async fn receive_loop(self: Arc<Self>, socket: UdpSocket) {
        let mut buf = vec![0u8; net::MAX_DATAGRAM];
        loop {
            match socket.recv_from(&mut buf).await {
                Ok((len, src)) => {
                    let raw = String::from_utf8_lossy(&buf[..len]);
                    match ControlMessage::parse(&raw) {
                        Ok(msg) => self.handle_message(msg).await,
                        Err(e) => debug!("dropping datagram from {}: {}", src, e),
                    }
                }
                Err(e) => {
                    warn!("registry receive failed: {}", e);
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                }
            }
        }
    }

    async fn handle_message(&self, msg: ControlMessage) {
        match msg {
            ControlMessage::Bootstrap { address, id } => {
                if id != position(&address) {
                    debug!(
                        "announcement for {} carries id {}, expected {}",
                        address,
                        id,
                        position(&address)
                    );
                }
                let outcome = self.join(&address);
                // The joiner blocks on this count to finish bootstrapping, so
                // answer even when the join was a retry.
                let reply = ControlMessage::NumNodes {
                    count: outcome.ring_size,
                };
                if let Err(e) = net::send_unicast(&address, self.cfg.control_port, &reply).await {
                    warn!("failed to send ring size to {}: {}", address, e);
                }
            }
            ControlMessage::Shutdown { address, .. } => {
                self.leave(&address);
            }
            ControlMessage::Report { address, filename } => {
                self.handle_report(&address, &filename).await;
            }
            other => debug!("registry ignoring {:?}", other),
        }
    }

    /// Runs placement for one reported file and, when the owner is remote,
    /// orders the transfer and the ownership log entry.
    async fn handle_report(&self, reporter: &str, filename: &str) {
        let file_hash = position(filename);
        let Some(owner) = self.owner_for_report(reporter, filename) else {
            debug!(
                "no replication candidate for {} reported by {}",
                filename, reporter
            );
            return;
        };

        debug!(
            "file {} (hash {}) reported by {} is owned by {} (id {})",
            filename, file_hash, reporter, owner.address, owner.id
        );

        let replicate = ControlMessage::Replicate {
            target: owner.address.clone(),
            filename: filename.to_string(),
            file_hash,
        };
        if let Err(e) = net::send_unicast(reporter, self.cfg.control_port, &replicate).await {
            warn!("failed to order replication from {}: {}", reporter, e);
            return;
        }

        let log = ControlMessage::Log {
            local_owner: reporter.to_string(),
            filename: filename.to_string(),
        };
        if let Err(e) = net::send_unicast(&owner.address, self.cfg.control_port, &log).await {
            warn!("failed to order ownership log on {}: {}", owner.address, e);
        }
    }
}
