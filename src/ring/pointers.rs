use crate::hashspace::RingId;
use crate::protocol::message::PointerKind;

/// One node's ring-adjacency state. A singleton ring points both fields at
/// `self_id`; in any larger ring both fields (eventually) name other nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingPointers {
    pub self_id: RingId,
    pub predecessor: RingId,
    pub successor: RingId,
}

/// A pointer repair this node must send after applying an announcement.
///
/// `to` is the ring position of the recipient; the wire form carries only
/// `(kind, replaced, sender)`, applied by the receiver as "if your `kind`
/// pointer equals `replaced`, adopt `sender`".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Correction {
    pub to: RingId,
    pub kind: PointerKind,
    pub replaced: RingId,
    pub sender: RingId,
}

/// Strict clockwise interval test: does `x` lie between `start` and `end`
/// going clockwise (by increasing id, wrapping at the top of the space)?
///
/// Endpoints are excluded. A degenerate interval (`start == end`) contains
/// nothing; the singleton case is handled by the caller, not here.
pub fn in_between(start: RingId, end: RingId, x: RingId) -> bool {
    if start == end {
        return false;
    }
    if start < end {
        start < x && x < end
    } else {
        x > start || x < end
    }
}

impl RingPointers {
    pub fn new(self_id: RingId) -> Self {
        Self {
            self_id,
            predecessor: self_id,
            successor: self_id,
        }
    }

    pub fn is_singleton(&self) -> bool {
        self.predecessor == self.self_id && self.successor == self.self_id
    }

    /// Applies a peer's join announcement.
    ///
    /// The successor pointer updates when the announcer falls strictly
    /// between this node and its current successor (clockwise), or when this
    /// node is still a singleton; the predecessor rule is symmetric. Both may
    /// fire for one announcement (a ring of two growing to three).
    ///
    /// Each firing yields corrections: the displaced neighbor is told its
    /// matching pointer now names the announcer, and the announcer is told
    /// this node is its new neighbor — which is how a joiner, whose pointers
    /// still name itself, acquires its place in rings of every size.
    /// Re-applying the same announcement changes nothing and yields nothing.
    pub fn apply_announcement(&mut self, received: RingId) -> Vec<Correction> {
        let mut corrections = Vec::new();
        if received == self.self_id {
            return corrections;
        }

        if self.successor == self.self_id || in_between(self.self_id, self.successor, received) {
            let displaced = self.successor;
            self.successor = received;
            if displaced != self.self_id {
                corrections.push(Correction {
                    to: displaced,
                    kind: PointerKind::Prev,
                    replaced: self.self_id,
                    sender: received,
                });
            }
            corrections.push(Correction {
                to: received,
                kind: PointerKind::Prev,
                replaced: received,
                sender: self.self_id,
            });
        }

        if self.predecessor == self.self_id || in_between(self.predecessor, self.self_id, received)
        {
            let displaced = self.predecessor;
            self.predecessor = received;
            if displaced != self.self_id {
                corrections.push(Correction {
                    to: displaced,
                    kind: PointerKind::Next,
                    replaced: self.self_id,
                    sender: received,
                });
            }
            corrections.push(Correction {
                to: received,
                kind: PointerKind::Next,
                replaced: received,
                sender: self.self_id,
            });
        }

        corrections
    }

    /// Applies a point-to-point correction. Returns whether a pointer
    /// changed; a correction whose `replaced` no longer matches is stale and
    /// does nothing, which also makes redelivery a no-op.
    pub fn apply_correction(&mut self, kind: PointerKind, replaced: RingId, sender: RingId) -> bool {
        match kind {
            PointerKind::Next => {
                if self.successor == replaced && self.successor != sender {
                    self.successor = sender;
                    return true;
                }
            }
            PointerKind::Prev => {
                if self.predecessor == replaced && self.predecessor != sender {
                    self.predecessor = sender;
                    return true;
                }
            }
        }
        false
    }

    /// Applies a leave announcement carrying the leaver's own pointers: the
    /// leaver's predecessor inherits its successor and vice versa.
    pub fn apply_leave(&mut self, leaver_pred: RingId, leaver_succ: RingId) -> bool {
        let mut changed = false;
        if self.self_id == leaver_pred && self.successor != leaver_succ {
            self.successor = leaver_succ;
            changed = true;
        }
        if self.self_id == leaver_succ && self.predecessor != leaver_pred {
            self.predecessor = leaver_pred;
            changed = true;
        }
        changed
    }
}
