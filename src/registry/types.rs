use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hashspace::RingId;

/// One registered ring member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    pub id: RingId,
    pub address: String,
}

/// Outcome of a join request. `added == false` means the position was already
/// taken — by this address or by a colliding one; callers cannot tell the two
/// apart and are not supposed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinOutcome {
    pub added: bool,
    pub ring_size: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// `locate` was called before any node registered. Surfaced to the
    /// caller; never fatal to the registry itself.
    #[error("no nodes registered in the ring")]
    EmptyRing,
}

// --- Admin surface DTOs ---

#[derive(Debug, Serialize, Deserialize)]
pub struct AddResponse {
    pub added: bool,
    pub ring_size: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RemoveResponse {
    pub removed: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LocateResponse {
    pub filename: String,
    pub file_hash: RingId,
    pub node: NodeRecord,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NodesResponse {
    pub nodes: Vec<NodeRecord>,
}

/// Ring-order neighbors of one member; used by peers to resolve the
/// predecessor-of-predecessor during leave migration.
#[derive(Debug, Serialize, Deserialize)]
pub struct NeighborsResponse {
    pub node: NodeRecord,
    pub predecessor: NodeRecord,
    pub successor: NodeRecord,
}
