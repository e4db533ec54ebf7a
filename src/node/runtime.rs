use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::Result;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ClusterConfig;
use crate::failure::handler::FailureHandler;
use crate::files::ownership::{FileOwnershipEntry, OwnershipLog};
use crate::files::store::FileStore;
use crate::hashspace::position;
use crate::protocol::message::ControlMessage;
use crate::protocol::net;
use crate::ring::agent::RingAgent;
use crate::sync::agent::SyncAgent;
use crate::transfer::channel::{send_file, Provenance, TransferListener};

/// One running storage node: every listener the protocol needs, plus the
/// orchestration that ties pointer changes to sync triggers and replication
/// orders to transfers.
pub struct NodeRuntime {
    cfg: ClusterConfig,
    address: String,
    ring: Arc<RingAgent>,
    sync: Arc<SyncAgent>,
    log: Arc<OwnershipLog>,
    local_store: FileStore,
    failure: FailureHandler,
    shutdown: watch::Sender<bool>,
}

impl NodeRuntime {
    /// Boots the node: binds every listener, announces the join, waits for
    /// the registry's ring-size answer, then reports local files and starts
    /// the anti-entropy loop.
    pub async fn start(cfg: ClusterConfig, address: String) -> Result<Arc<Self>> {
        let local_store = FileStore::new(cfg.local_dir.clone());
        local_store.ensure_dir()?;
        let replica_store = FileStore::new(cfg.replica_dir.clone());
        replica_store.ensure_dir()?;
        let log = Arc::new(OwnershipLog::open(cfg.ownership_file.clone()));

        let ring = Arc::new(RingAgent::new(cfg.clone(), address.clone()));
        let sync = Arc::new(SyncAgent::new(
            cfg.clone(),
            address.clone(),
            ring.clone(),
            local_store.clone(),
            replica_store.clone(),
        ));
        let failure = FailureHandler::new(cfg.clone(), replica_store.clone(), log.clone());
        let (shutdown, _) = watch::channel(false);

        let runtime = Arc::new(Self {
            address,
            ring,
            sync,
            log: log.clone(),
            local_store,
            failure,
            shutdown,
            cfg,
        });

        runtime.spawn_transfer_listener(replica_store, log).await?;
        runtime.spawn_correction_listener().await?;
        runtime.spawn_announcement_listener().await?;
        runtime.spawn_control_listener().await?;

        // Join the ring: announce, then suspend this flow (and only this
        // flow) until the registry reports the ring size.
        runtime.ring.announce().await?;
        let ring_size = runtime.ring.wait_for_ring_size().await;
        info!(
            "{} joined a ring of {} node(s)",
            runtime.address, ring_size
        );

        runtime.report_local_files().await;

        let sync = runtime.sync.clone();
        let shutdown_rx = runtime.shutdown.subscribe();
        tokio::spawn(sync.run(shutdown_rx));

        Ok(runtime)
    }

    pub fn ring(&self) -> &Arc<RingAgent> {
        &self.ring
    }

    /// The graceful exit: migrate held replicas, broadcast the leave, stop
    /// every listener. The announcement only goes out once migration
    /// succeeded — deregistering first would risk losing the replicas.
    pub async fn leave(&self, force: bool) -> Result<()> {
        info!("{} leaving the ring", self.address);
        self.ring.begin_leaving();

        self.failure.migrate_on_leave(&self.address, force).await?;

        self.ring.announce_leave().await?;
        let _ = self.shutdown.send(true);
        self.ring.mark_gone();
        info!("{} has left the ring", self.address);
        Ok(())
    }

    async fn spawn_transfer_listener(
        &self,
        replica_store: FileStore,
        log: Arc<OwnershipLog>,
    ) -> Result<()> {
        let bind: SocketAddr = (Ipv4Addr::UNSPECIFIED, self.cfg.transfer_port).into();
        let listener =
            TransferListener::bind(bind, replica_store, log, self.address.clone()).await?;
        tokio::spawn(listener.run(self.shutdown.subscribe()));
        Ok(())
    }

    /// Pointer corrections arrive one per TCP connection.
    async fn spawn_correction_listener(&self) -> Result<()> {
        let listener =
            TcpListener::bind((Ipv4Addr::UNSPECIFIED, self.cfg.correction_port)).await?;
        let ring = self.ring.clone();
        let sync = self.sync.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            return;
                        }
                    }
                    accepted = listener.accept() => {
                        let Ok((mut stream, peer)) = accepted else {
                            continue;
                        };
                        let mut raw = String::new();
                        if stream.read_to_string(&mut raw).await.is_err() {
                            continue;
                        }
                        match ControlMessage::parse(&raw) {
                            Ok(ControlMessage::Correction { kind, replaced, sender }) => {
                                if ring.handle_correction(kind, replaced, sender) {
                                    sync.trigger();
                                }
                            }
                            Ok(other) => debug!("unexpected {:?} on correction channel", other),
                            Err(e) => debug!("dropping correction from {}: {}", peer, e),
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// Ring-wide announcements: peers joining and leaving.
    async fn spawn_announcement_listener(&self) -> Result<()> {
        let socket =
            net::bind_multicast(self.cfg.multicast_group, self.cfg.multicast_port).await?;
        let ring = self.ring.clone();
        let sync = self.sync.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut buf = vec![0u8; net::MAX_DATAGRAM];
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            return;
                        }
                    }
                    received = socket.recv_from(&mut buf) => {
                        let Ok((len, src)) = received else {
                            continue;
                        };
                        let raw = String::from_utf8_lossy(&buf[..len]);
                        match ControlMessage::parse(&raw) {
                            Ok(ControlMessage::Bootstrap { address, id }) => {
                                ring.handle_bootstrap(&address, id).await;
                            }
                            Ok(ControlMessage::Shutdown { address, predecessor, successor }) => {
                                if ring.handle_shutdown(&address, predecessor, successor) {
                                    sync.trigger();
                                }
                            }
                            Ok(other) => debug!("ignoring {:?} on announcement channel", other),
                            Err(e) => debug!("dropping announcement from {}: {}", src, e),
                        }
                    }
                }
            }
        });
        Ok(())
    }

    /// Unicast control traffic: everything addressed to this node alone.
    async fn spawn_control_listener(self: &Arc<Self>) -> Result<()> {
        let socket = net::bind_control(self.cfg.control_port).await?;
        let runtime = self.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut buf = vec![0u8; net::MAX_DATAGRAM];
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            return;
                        }
                    }
                    received = socket.recv_from(&mut buf) => {
                        let Ok((len, src)) = received else {
                            continue;
                        };
                        let raw = String::from_utf8_lossy(&buf[..len]).to_string();
                        match ControlMessage::parse(&raw) {
                            Ok(msg) => runtime.handle_control(msg).await,
                            Err(e) => debug!("dropping control datagram from {}: {}", src, e),
                        }
                    }
                }
            }
        });
        Ok(())
    }

    async fn handle_control(self: &Arc<Self>, msg: ControlMessage) {
        match msg {
            ControlMessage::NumNodes { count } => self.ring.handle_num_nodes(count),
            ControlMessage::Replicate {
                target,
                filename,
                file_hash,
            } => {
                debug!(
                    "ordered to replicate {} (hash {}) to {}",
                    filename, file_hash, target
                );
                // Off the listener task: a long push must not block control
                // traffic.
                let runtime = self.clone();
                tokio::spawn(async move {
                    runtime.push_local_file(&target, &filename).await;
                });
            }
            ControlMessage::Log {
                local_owner,
                filename,
            } => {
                self.log.record(FileOwnershipEntry {
                    file_hash: position(&filename),
                    local_owner,
                    replica_owner: self.address.clone(),
                    locked: false,
                    filename,
                });
            }
            ControlMessage::RequestFileMap { address } => {
                self.sync.handle_request(&address).await;
            }
            ControlMessage::FileMap { entries } => {
                self.sync.merge_peer_map(&entries);
            }
            ControlMessage::SyncRequest => self.sync.trigger(),
            other => debug!("ignoring {:?} on control channel", other),
        }
    }

    /// Pushes one of this node's own files to its assigned replica owner,
    /// with this node as provenance.
    async fn push_local_file(&self, target: &str, filename: &str) {
        let path = self.local_store.path_for(filename);
        let provenance = Provenance {
            local_owner: self.address.clone(),
            sender: self.address.clone(),
        };
        if let Err(e) = send_file(
            target,
            self.cfg.transfer_port,
            filename,
            &path,
            Some(&provenance),
        )
        .await
        {
            warn!("replication of {} to {} failed: {}", filename, target, e);
        }
    }

    /// Reports every local file to the registry, which answers with
    /// replication orders where placement demands them.
    async fn report_local_files(&self) {
        let registry_host = self
            .cfg
            .registry_http
            .split(':')
            .next()
            .unwrap_or("127.0.0.1")
            .to_string();
        for filename in self.local_store.list() {
            let report = ControlMessage::Report {
                address: self.address.clone(),
                filename,
            };
            if let Err(e) =
                net::send_unicast(&registry_host, self.cfg.control_port, &report).await
            {
                warn!("file report to registry failed: {}", e);
            }
        }
    }
}
