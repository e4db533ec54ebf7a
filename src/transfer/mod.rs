//! Replication Channel Module
//!
//! The bulk-data side of the cluster: a point-to-point, connection-oriented
//! byte stream carrying exactly one file per connection.
//!
//! ## Wire Format
//! 1. filename length (u32, big-endian) + UTF-8 filename
//! 2. payload length (u64, big-endian)
//! 3. exactly that many payload bytes
//! 4. provenance length (u32, big-endian) + `"<localOwner>:<sender>"`, empty
//!    when not applicable
//!
//! ## Guarantees
//! The receiver stages incoming bytes in a hidden `.part` file and renames it
//! into place only after the full payload and trailer arrived, so a dropped
//! connection never leaves a half-written replica visible — and never records
//! an ownership entry. The accept loop runs for the life of the node, one
//! task per connection, and is interruptible through a shutdown signal.

pub mod channel;
