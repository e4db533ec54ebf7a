use std::sync::Mutex;

use anyhow::Result;
use dashmap::DashMap;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::pointers::RingPointers;
use crate::config::ClusterConfig;
use crate::hashspace::{position, RingId};
use crate::protocol::message::{ControlMessage, PointerKind};
use crate::protocol::net;
use crate::registry::client::RegistryClient;

/// Lifecycle of a node's ring membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    /// Announced, waiting for the registry's ring-size notification.
    Joining,
    /// Full ring member.
    Steady,
    /// Migrating replicas away; still answering control traffic.
    Leaving,
    /// Out of the ring; all handlers become no-ops.
    Gone,
}

struct AgentState {
    pointers: RingPointers,
    phase: AgentPhase,
    num_nodes: usize,
}

/// The per-node ring membership state machine.
///
/// Owns this node's `RingPointers` exclusively; every listener task goes
/// through the handlers here, which take the state lock only for the
/// in-memory pointer mutation — never across a send or any other await.
pub struct RingAgent {
    cfg: ClusterConfig,
    address: String,
    self_id: RingId,
    state: Mutex<AgentState>,
    /// id -> address cache fed by announcement traffic; corrections carry
    /// bare ids, so addresses must be re-learned from somewhere.
    peers: DashMap<RingId, String>,
    ring_size: watch::Sender<Option<usize>>,
    client: RegistryClient,
}

impl RingAgent {
    pub fn new(cfg: ClusterConfig, address: String) -> Self {
        let self_id = position(&address);
        let (ring_size, _) = watch::channel(None);
        let client = RegistryClient::new(&cfg.registry_http);
        Self {
            address,
            self_id,
            state: Mutex::new(AgentState {
                pointers: RingPointers::new(self_id),
                phase: AgentPhase::Joining,
                num_nodes: 0,
            }),
            peers: DashMap::new(),
            ring_size,
            client,
            cfg,
        }
    }

    pub fn self_id(&self) -> RingId {
        self.self_id
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn phase(&self) -> AgentPhase {
        self.state.lock().unwrap().phase
    }

    pub fn pointers(&self) -> RingPointers {
        self.state.lock().unwrap().pointers
    }

    pub fn num_nodes(&self) -> usize {
        self.state.lock().unwrap().num_nodes
    }

    /// Broadcasts this node's join announcement.
    pub async fn announce(&self) -> Result<()> {
        let msg = ControlMessage::Bootstrap {
            address: self.address.clone(),
            id: self.self_id,
        };
        net::send_multicast(self.cfg.multicast_group, self.cfg.multicast_port, &msg).await?;
        info!("announced join of {} at position {}", self.address, self.self_id);
        Ok(())
    }

    /// Blocks the joining flow (only) until the registry reports the ring
    /// size, then enters `Steady`. Returns the reported size.
    pub async fn wait_for_ring_size(&self) -> usize {
        let mut rx = self.ring_size.subscribe();
        loop {
            let seen = *rx.borrow_and_update();
            if let Some(count) = seen {
                let mut state = self.state.lock().unwrap();
                if state.phase == AgentPhase::Joining {
                    state.phase = AgentPhase::Steady;
                }
                info!("ring size is {}; {} is a full member", count, self.address);
                return count;
            }
            if rx.changed().await.is_err() {
                return 0;
            }
        }
    }

    /// Registry's answer to our announcement.
    pub fn handle_num_nodes(&self, count: usize) {
        self.state.lock().unwrap().num_nodes = count;
        // Wakes wait_for_ring_size; later NUMNODES just refresh the view.
        self.ring_size.send_replace(Some(count));
    }

    /// A peer's join announcement: updates the pointer pair per the interval
    /// rule and delivers the resulting corrections. Safe to call repeatedly
    /// with the same announcement.
    pub async fn handle_bootstrap(&self, peer_address: &str, peer_id: RingId) {
        if peer_id == self.self_id {
            return;
        }
        let unseen = self.peers.insert(peer_id, peer_address.to_string()).is_none();

        let corrections = {
            let mut state = self.state.lock().unwrap();
            if state.phase == AgentPhase::Gone {
                return;
            }
            if unseen {
                state.num_nodes += 1;
            }
            state.pointers.apply_announcement(peer_id)
        };

        if !corrections.is_empty() {
            debug!(
                "announcement of {} updated pointers to {:?}",
                peer_id,
                self.pointers()
            );
        }

        for correction in corrections {
            let msg = ControlMessage::Correction {
                kind: correction.kind,
                replaced: correction.replaced,
                sender: correction.sender,
            };
            let Some(target) = self.resolve_address(correction.to).await else {
                warn!("no address for ring position {}; dropping correction", correction.to);
                continue;
            };
            if let Err(e) = net::send_correction(&target, self.cfg.correction_port, &msg).await {
                warn!("failed to send correction to {}: {}", target, e);
            }
        }
    }

    /// A point-to-point pointer repair. Returns whether a pointer changed so
    /// the caller can trigger an anti-entropy cycle.
    pub fn handle_correction(&self, kind: PointerKind, replaced: RingId, sender: RingId) -> bool {
        let mut state = self.state.lock().unwrap();
        if state.phase == AgentPhase::Gone {
            return false;
        }
        let changed = state.pointers.apply_correction(kind, replaced, sender);
        if changed {
            debug!(
                "correction {:?} replaced {} with {}; pointers now {:?}",
                kind, replaced, sender, state.pointers
            );
        }
        changed
    }

    /// A peer's leave announcement.
    pub fn handle_shutdown(
        &self,
        peer_address: &str,
        leaver_pred: RingId,
        leaver_succ: RingId,
    ) -> bool {
        let leaver_id = position(peer_address);
        if leaver_id == self.self_id {
            return false;
        }
        self.peers.remove(&leaver_id);

        let mut state = self.state.lock().unwrap();
        if state.phase == AgentPhase::Gone {
            return false;
        }
        state.num_nodes = state.num_nodes.saturating_sub(1);
        let changed = state.pointers.apply_leave(leaver_pred, leaver_succ);
        if changed {
            info!(
                "{} left; pointers now {:?}",
                peer_address, state.pointers
            );
        }
        changed
    }

    pub fn begin_leaving(&self) {
        self.state.lock().unwrap().phase = AgentPhase::Leaving;
    }

    pub fn mark_gone(&self) {
        self.state.lock().unwrap().phase = AgentPhase::Gone;
    }

    /// Broadcasts this node's own leave announcement, carrying its pointers
    /// so both neighbors can re-link.
    pub async fn announce_leave(&self) -> Result<()> {
        let pointers = self.pointers();
        let msg = ControlMessage::Shutdown {
            address: self.address.clone(),
            predecessor: pointers.predecessor,
            successor: pointers.successor,
        };
        net::send_multicast(self.cfg.multicast_group, self.cfg.multicast_port, &msg).await
    }

    /// Resolves a ring position to an address: self, then the peer cache,
    /// then the registry. `None` is a normal churn condition.
    pub async fn resolve_address(&self, id: RingId) -> Option<String> {
        if id == self.self_id {
            return Some(self.address.clone());
        }
        if let Some(cached) = self.peers.get(&id) {
            return Some(cached.value().clone());
        }
        match self.client.node_address(id).await {
            Ok(Some(address)) => {
                self.peers.insert(id, address.clone());
                Some(address)
            }
            Ok(None) => None,
            Err(e) => {
                debug!("registry lookup for position {} failed: {}", id, e);
                None
            }
        }
    }

    /// Address of the current successor, unless the successor is this node
    /// itself (singleton) or cannot be resolved yet.
    pub async fn successor_address(&self) -> Option<String> {
        let successor = self.pointers().successor;
        if successor == self.self_id {
            return None;
        }
        self.resolve_address(successor).await
    }
}
