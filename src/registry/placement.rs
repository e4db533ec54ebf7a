//! File placement: which node owns the replica of a file.
//!
//! Realizes successor-in-hash-space semantics over a membership snapshot.
//! Take the nodes at or below the file's hash; the closest one from below
//! owns the file. Nothing below means the hash wrapped past the smallest id,
//! so ownership falls to the node with the largest id. The reporting node is
//! never its own owner: it is excluded from the candidates, and if the
//! wraparound lands on it the smallest id takes over instead.

use crate::hashspace::RingId;

/// Computes the owner for `file_hash` among `ids`, excluding the reporting
/// node when one is given.
///
/// Returns `None` only when no candidate remains: an empty snapshot, or a
/// ring whose sole member is the reporter itself. Deterministic for any given
/// `(ids, file_hash, exclude)` regardless of id order.
pub fn owner_for(file_hash: RingId, ids: &[RingId], exclude: Option<RingId>) -> Option<RingId> {
    let eligible = |id: &&RingId| exclude != Some(**id);

    // Largest id not exceeding the file hash wins.
    if let Some(owner) = ids
        .iter()
        .filter(eligible)
        .filter(|id| **id <= file_hash)
        .max()
    {
        return Some(*owner);
    }

    // Wraparound: the whole ring's maximum, unless that is the reporter.
    let max = ids.iter().copied().max()?;
    if exclude != Some(max) {
        return Some(max);
    }
    let min = ids.iter().copied().min()?;
    if exclude != Some(min) {
        return Some(min);
    }
    None
}
