//! Control-Plane Wire Protocol
//!
//! Defines the colon-delimited text messages exchanged between nodes and the
//! naming service, and the socket helpers used to move them.
//!
//! Announcements (`BOOTSTRAP`, `SHUTDOWN`) travel over UDP multicast so every
//! ring member observes them; the remaining control messages are unicast UDP
//! datagrams, except pointer corrections which use a short-lived TCP
//! connection. Bulk file data never touches this channel (see `transfer`).
//!
//! The wire tags are fixed: peers parse them by prefix, so renaming a tag is a
//! protocol break. Parsing produces one exhaustive [`message::ControlMessage`]
//! enum; anything unrecognized becomes a [`message::WireError`] that listeners
//! log and drop.

pub mod message;
pub mod net;
