//! Cluster configuration.
//!
//! All addressing and timing knobs live in one owned struct that is passed
//! through constructors. Nothing in the crate reads global or static state, so
//! two differently-configured runtimes can coexist inside one test process.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

/// Shared settings for one cluster deployment.
///
/// The identity of a node is its `address` string (hashed onto the ring); the
/// ports below are uniform across the deployment, so a peer is reached by
/// combining its address with the well-known port for the channel in question.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Group that join/leave announcements are broadcast to.
    pub multicast_group: Ipv4Addr,
    pub multicast_port: u16,
    /// Datagram port for unicast control messages (NUMNODES, REPLICATE, ...).
    pub control_port: u16,
    /// TCP port for point-to-point pointer corrections.
    pub correction_port: u16,
    /// TCP port for bulk file transfers.
    pub transfer_port: u16,
    /// `host:port` of the naming service's HTTP surface.
    pub registry_http: String,
    /// Directory holding this node's own files.
    pub local_dir: PathBuf,
    /// Directory holding replicas this node stores for others.
    pub replica_dir: PathBuf,
    /// Persistence path for the registry's membership table.
    pub nodes_file: PathBuf,
    /// Persistence path for a node's ownership log.
    pub ownership_file: PathBuf,
    /// Anti-entropy cycle period.
    pub sync_interval: Duration,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            multicast_group: Ipv4Addr::new(224, 0, 0, 1),
            multicast_port: 3000,
            control_port: 8000,
            correction_port: 8001,
            transfer_port: 8002,
            registry_http: "127.0.0.1:8080".to_string(),
            local_dir: PathBuf::from("localFiles"),
            replica_dir: PathBuf::from("replicatedFiles"),
            nodes_file: PathBuf::from("nodes.json"),
            ownership_file: PathBuf::from("ownership.json"),
            sync_interval: Duration::from_secs(5),
        }
    }
}
