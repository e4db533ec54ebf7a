//! Node Runtime Module
//!
//! Wires one storage node together: the ring agent, the sync agent, the
//! transfer listener, and the failure handler, each fed by its own listener
//! task. Also owns the leave sequence — migrate, announce, stop — in that
//! order, because the leave announcement is the point of no return.

pub mod runtime;
