//! Ring Membership Tests
//!
//! Validates the pointer-update rule the way the network exercises it: join
//! announcements fan out to every member, the emitted corrections are
//! delivered (in various orders), and the resulting pointer pairs must match
//! the unique ring ordering of the sorted ids — for rings of size 1, 2, and
//! beyond, under duplication and reordering.

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use crate::hashspace::RingId;
    use crate::protocol::message::PointerKind;
    use crate::ring::pointers::{in_between, Correction, RingPointers};

    /// Runs a full join sequence: every existing member processes each
    /// announcement, then the emitted corrections are delivered to their
    /// targets (the joiner included).
    fn converge(join_order: &[RingId]) -> HashMap<RingId, RingPointers> {
        let mut nodes: HashMap<RingId, RingPointers> = HashMap::new();
        for &joiner in join_order {
            let mut pending: Vec<Correction> = Vec::new();
            for pointers in nodes.values_mut() {
                pending.extend(pointers.apply_announcement(joiner));
            }
            nodes.insert(joiner, RingPointers::new(joiner));
            for c in pending {
                if let Some(pointers) = nodes.get_mut(&c.to) {
                    pointers.apply_correction(c.kind, c.replaced, c.sender);
                }
            }
        }
        nodes
    }

    /// The unique ring ordering implied by the sorted ids.
    fn assert_ring(nodes: &HashMap<RingId, RingPointers>) {
        let mut ids: Vec<RingId> = nodes.keys().copied().collect();
        ids.sort_unstable();
        for (i, &id) in ids.iter().enumerate() {
            let expected_pred = ids[(i + ids.len() - 1) % ids.len()];
            let expected_succ = ids[(i + 1) % ids.len()];
            let p = &nodes[&id];
            assert_eq!(
                p.predecessor, expected_pred,
                "node {} has predecessor {}, expected {}",
                id, p.predecessor, expected_pred
            );
            assert_eq!(
                p.successor, expected_succ,
                "node {} has successor {}, expected {}",
                id, p.successor, expected_succ
            );
        }
    }

    // ============================================================
    // INTERVAL TEST
    // ============================================================

    #[test]
    fn test_in_between_plain_interval() {
        assert!(in_between(100, 500, 300));
        assert!(!in_between(100, 500, 100));
        assert!(!in_between(100, 500, 500));
        assert!(!in_between(100, 500, 900));
    }

    #[test]
    fn test_in_between_wraps_around_the_top() {
        // Clockwise from 900 past the top of the space back to 100.
        assert!(in_between(900, 100, 32_000));
        assert!(in_between(900, 100, 50));
        assert!(!in_between(900, 100, 500));
    }

    #[test]
    fn test_in_between_degenerate_interval_is_empty() {
        assert!(!in_between(500, 500, 300));
    }

    // ============================================================
    // CONVERGENCE
    // ============================================================

    #[test]
    fn test_singleton_points_at_itself() {
        let nodes = converge(&[700]);
        let p = &nodes[&700];
        assert_eq!(p.predecessor, 700);
        assert_eq!(p.successor, 700);
        assert!(p.is_singleton());
    }

    #[test]
    fn test_ring_of_two_points_both_ways_at_the_other() {
        for order in [[100, 900], [900, 100]] {
            let nodes = converge(&order);
            assert_eq!(nodes[&100].predecessor, 900);
            assert_eq!(nodes[&100].successor, 900);
            assert_eq!(nodes[&900].predecessor, 100);
            assert_eq!(nodes[&900].successor, 100);
        }
    }

    #[test]
    fn test_ring_of_three_converges_in_any_join_order() {
        let orders: [[RingId; 3]; 6] = [
            [100, 500, 900],
            [100, 900, 500],
            [500, 100, 900],
            [500, 900, 100],
            [900, 100, 500],
            [900, 500, 100],
        ];
        for order in orders {
            let nodes = converge(&order);
            assert_ring(&nodes);
        }
    }

    #[test]
    fn test_larger_ring_converges() {
        let nodes = converge(&[16_810, 50, 31_000, 8_000, 24_000]);
        assert_ring(&nodes);
    }

    #[test]
    fn test_largest_id_wraps_to_smallest_successor() {
        let nodes = converge(&[100, 900, 32_000]);
        assert_eq!(nodes[&32_000].successor, 100);
        assert_eq!(nodes[&100].predecessor, 32_000);
    }

    // ============================================================
    // IDEMPOTENCE
    // ============================================================

    #[test]
    fn test_reapplying_announcements_is_a_no_op() {
        let mut nodes = converge(&[100, 500, 900]);
        let before: HashMap<RingId, RingPointers> = nodes.clone();

        for joiner in [100, 500, 900] {
            for pointers in nodes.values_mut() {
                let corrections = pointers.apply_announcement(joiner);
                assert!(
                    corrections.is_empty(),
                    "duplicate announcement of {} emitted {:?}",
                    joiner,
                    corrections
                );
            }
        }
        assert_eq!(nodes, before);
    }

    #[test]
    fn test_own_announcement_is_ignored() {
        let mut p = RingPointers::new(500);
        assert!(p.apply_announcement(500).is_empty());
        assert!(p.is_singleton());
    }

    #[test]
    fn test_correction_applies_once_then_is_stale() {
        // A correction (NEXT, old=500, new=900) at a node with
        // successor 500 updates it; the second delivery is a no-op.
        let mut p = RingPointers {
            self_id: 100,
            predecessor: 900,
            successor: 500,
        };
        assert!(p.apply_correction(PointerKind::Next, 500, 900));
        assert_eq!(p.successor, 900);
        assert!(!p.apply_correction(PointerKind::Next, 500, 900));
        assert_eq!(p.successor, 900);
    }

    #[test]
    fn test_correction_with_mismatched_pointer_is_dropped() {
        let mut p = RingPointers {
            self_id: 100,
            predecessor: 900,
            successor: 300,
        };
        assert!(!p.apply_correction(PointerKind::Next, 500, 900));
        assert_eq!(p.successor, 300, "stale correction must not touch the pointer");
        assert!(!p.apply_correction(PointerKind::Prev, 500, 100));
        assert_eq!(p.predecessor, 900);
    }

    #[test]
    fn test_corrections_converge_when_delivered_in_reverse() {
        // Same join sequence, but every batch of corrections is delivered
        // backwards; arrival order must not matter.
        let mut nodes: HashMap<RingId, RingPointers> = HashMap::new();
        for joiner in [100, 500, 900, 20_000] {
            let mut pending: Vec<Correction> = Vec::new();
            for pointers in nodes.values_mut() {
                pending.extend(pointers.apply_announcement(joiner));
            }
            nodes.insert(joiner, RingPointers::new(joiner));
            pending.reverse();
            for c in pending {
                if let Some(pointers) = nodes.get_mut(&c.to) {
                    pointers.apply_correction(c.kind, c.replaced, c.sender);
                }
            }
        }
        assert_ring(&nodes);
    }

    // ============================================================
    // LEAVE
    // ============================================================

    #[test]
    fn test_leave_relinks_both_neighbors() {
        let mut nodes = converge(&[100, 500, 900]);

        // 500 leaves; its announcement carries its pointer pair.
        let leaving = nodes.remove(&500).unwrap();
        for pointers in nodes.values_mut() {
            pointers.apply_leave(leaving.predecessor, leaving.successor);
        }

        assert_eq!(nodes[&100].successor, 900);
        assert_eq!(nodes[&900].predecessor, 100);
        assert_ring(&nodes);
    }

    #[test]
    fn test_leave_is_idempotent() {
        let mut nodes = converge(&[100, 500, 900]);
        let leaving = nodes.remove(&500).unwrap();
        for pointers in nodes.values_mut() {
            assert!(pointers.apply_leave(leaving.predecessor, leaving.successor));
            assert!(
                !pointers.apply_leave(leaving.predecessor, leaving.successor),
                "replayed leave announcement must change nothing"
            );
        }
        assert_ring(&nodes);
    }

    #[test]
    fn test_ring_of_two_collapses_to_singleton_on_leave() {
        let mut nodes = converge(&[100, 900]);
        let leaving = nodes.remove(&900).unwrap();
        let survivor = nodes.get_mut(&100).unwrap();
        survivor.apply_leave(leaving.predecessor, leaving.successor);
        assert!(survivor.is_singleton());
    }

    #[test]
    fn test_uninvolved_node_ignores_leave() {
        let mut nodes = converge(&[100, 500, 900, 20_000]);
        let leaving = nodes.remove(&500).unwrap();
        let bystander_before = nodes[&20_000];
        for pointers in nodes.values_mut() {
            pointers.apply_leave(leaving.predecessor, leaving.successor);
        }
        assert_eq!(nodes[&20_000], bystander_before);
        assert_ring(&nodes);
    }
}
