//! Ring Membership Module
//!
//! Each node's view of its place on the ring: its own position, its
//! predecessor, and its successor.
//!
//! ## Core Mechanisms
//! - **Pointer rule** (`pointers`): pure interval logic deciding, for every
//!   join announcement, whether the announcer displaces the current successor
//!   or predecessor, and which point-to-point corrections to emit so the
//!   displaced neighbor and the announcer both re-link. Modular "is-between"
//!   tests keep the wraparound correct, and every rule is idempotent so
//!   duplicated or reordered announcements cannot corrupt the topology.
//! - **Agent** (`agent`): the per-node state machine
//!   (`Joining -> Steady -> Leaving -> Gone`) wiring the pointer rule to the
//!   announcement and correction traffic, the bootstrap wait on the
//!   registry's ring-size notification, and the id-to-address peer cache.

pub mod agent;
pub mod pointers;

#[cfg(test)]
mod tests;
