//! Registry Module Tests
//!
//! Validates the placement rule against concrete ring scenarios, the
//! join/leave lifecycle (idempotence, collisions), and persistence of the
//! membership table.

#[cfg(test)]
mod tests {
    use crate::config::ClusterConfig;
    use crate::hashspace::position;
    use crate::registry::placement::owner_for;
    use crate::registry::service::MembershipRegistry;
    use crate::registry::types::RegistryError;

    fn test_config(dir: &std::path::Path) -> ClusterConfig {
        ClusterConfig {
            nodes_file: dir.join("nodes.json"),
            ..ClusterConfig::default()
        }
    }

    // ============================================================
    // PLACEMENT RULE
    // ============================================================

    #[test]
    fn test_owner_is_largest_id_below_hash() {
        // Ring {A=100, B=500, C=900}: a file hashing to 650 belongs to B.
        let ids = vec![100, 500, 900];
        assert_eq!(owner_for(650, &ids, None), Some(500));
    }

    #[test]
    fn test_owner_wraps_to_largest_id() {
        // Nothing at or below 50, so ownership wraps to C=900.
        let ids = vec![100, 500, 900];
        assert_eq!(owner_for(50, &ids, None), Some(900));
    }

    #[test]
    fn test_owner_is_deterministic_regardless_of_id_order() {
        let sorted = vec![100, 500, 900];
        let shuffled = vec![900, 100, 500];
        for hash in [0, 99, 100, 101, 650, 900, 32_000] {
            assert_eq!(
                owner_for(hash, &sorted, None),
                owner_for(hash, &shuffled, None),
                "hash {} placed differently across snapshots",
                hash
            );
        }
    }

    #[test]
    fn test_owner_exact_hit_owns_the_file() {
        let ids = vec![100, 500, 900];
        assert_eq!(owner_for(500, &ids, None), Some(500));
    }

    #[test]
    fn test_reporter_is_excluded_from_candidates() {
        let ids = vec![100, 500, 900];
        // 500 would own hash 650, but not for its own report.
        assert_eq!(owner_for(650, &ids, Some(500)), Some(100));
    }

    #[test]
    fn test_wraparound_falls_back_to_minimum_when_reporter_is_maximum() {
        let ids = vec![100, 500, 900];
        // Hash 50 wraps to 900; when 900 itself reports, 100 takes over.
        assert_eq!(owner_for(50, &ids, Some(900)), Some(100));
    }

    #[test]
    fn test_singleton_reporter_has_no_owner() {
        let ids = vec![700];
        assert_eq!(owner_for(123, &ids, Some(700)), None);
        assert_eq!(owner_for(123, &ids, None), Some(700));
    }

    #[test]
    fn test_empty_ring_has_no_owner() {
        assert_eq!(owner_for(123, &[], None), None);
    }

    // ============================================================
    // JOIN / LEAVE / LOCATE
    // ============================================================

    #[test]
    fn test_join_then_leave() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MembershipRegistry::open(test_config(dir.path()));

        let outcome = registry.join("10.0.0.1");
        assert!(outcome.added);
        assert_eq!(outcome.ring_size, 1);
        assert_eq!(
            registry.find("10.0.0.1").unwrap().id,
            position("10.0.0.1")
        );

        assert!(registry.leave("10.0.0.1"));
        assert!(registry.is_empty());
        assert!(!registry.leave("10.0.0.1"), "second leave removes nothing");
    }

    #[test]
    fn test_join_is_idempotent_under_retry() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MembershipRegistry::open(test_config(dir.path()));

        assert!(registry.join("10.0.0.1").added);
        let retry = registry.join("10.0.0.1");
        assert!(!retry.added);
        assert_eq!(retry.ring_size, 1);
    }

    #[test]
    fn test_colliding_address_is_treated_as_already_joined() {
        // The bounded hash collapses nearby addresses onto one position;
        // find such a pair and check the "already joined" semantic.
        let addresses: Vec<String> = (1..=32).map(|i| format!("192.168.0.{}", i)).collect();
        let collision = addresses
            .windows(2)
            .find(|w| position(&w[0]) == position(&w[1]))
            .expect("expected a colliding pair among close addresses");

        let dir = tempfile::tempdir().unwrap();
        let registry = MembershipRegistry::open(test_config(dir.path()));

        assert!(registry.join(&collision[0]).added);
        let second = registry.join(&collision[1]);
        assert!(!second.added, "collision must read as already joined");
        assert_eq!(second.ring_size, 1);
        // The original registrant keeps the position.
        assert_eq!(
            registry.address_of(position(&collision[0])).unwrap(),
            collision[0]
        );
    }

    #[test]
    fn test_locate_on_empty_ring_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MembershipRegistry::open(test_config(dir.path()));

        assert_eq!(registry.locate(650), Err(RegistryError::EmptyRing));
    }

    #[test]
    fn test_locate_returns_owner_record() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MembershipRegistry::open(test_config(dir.path()));
        registry.join("10.0.0.1");

        let owner = registry.locate(0).unwrap();
        assert_eq!(owner.address, "10.0.0.1");
        assert_eq!(owner.id, position("10.0.0.1"));
    }

    #[test]
    fn test_owner_for_report_excludes_reporter() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MembershipRegistry::open(test_config(dir.path()));
        registry.join("10.0.0.1");

        // A lone reporter never replicates to itself.
        assert!(registry.owner_for_report("10.0.0.1", "file.txt").is_none());

        registry.join("172.16.5.9");
        let owner = registry
            .owner_for_report("10.0.0.1", "file.txt")
            .expect("two nodes always yield an owner");
        assert_eq!(owner.address, "172.16.5.9");
    }

    // ============================================================
    // NEIGHBORS
    // ============================================================

    #[test]
    fn test_singleton_is_its_own_neighbor() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MembershipRegistry::open(test_config(dir.path()));
        registry.join("10.0.0.1");

        let (node, pred, succ) = registry.neighbors_of("10.0.0.1").unwrap();
        assert_eq!(pred, node);
        assert_eq!(succ, node);
    }

    #[test]
    fn test_neighbors_follow_sorted_ring_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MembershipRegistry::open(test_config(dir.path()));

        let mut members: Vec<(u32, String)> = ["10.0.0.1", "172.16.5.9", "203.0.113.77"]
            .iter()
            .map(|a| {
                registry.join(a);
                (position(a), a.to_string())
            })
            .collect();
        members.sort();
        assert_eq!(registry.len(), 3, "test addresses must not collide");

        // The middle member's neighbors are the adjacent sorted positions.
        let (_, pred, succ) = registry.neighbors_of(&members[1].1).unwrap();
        assert_eq!(pred.id, members[0].0);
        assert_eq!(succ.id, members[2].0);

        // The largest wraps forward to the smallest.
        let (_, pred, succ) = registry.neighbors_of(&members[2].1).unwrap();
        assert_eq!(pred.id, members[1].0);
        assert_eq!(succ.id, members[0].0);
    }

    #[test]
    fn test_neighbors_of_unknown_address_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let registry = MembershipRegistry::open(test_config(dir.path()));
        assert!(registry.neighbors_of("10.9.9.9").is_none());
    }

    // ============================================================
    // PERSISTENCE
    // ============================================================

    #[test]
    fn test_membership_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = test_config(dir.path());

        {
            let registry = MembershipRegistry::open(cfg.clone());
            registry.join("10.0.0.1");
            registry.join("172.16.5.9");
        }

        let reopened = MembershipRegistry::open(cfg);
        assert_eq!(reopened.len(), 2);
        assert!(reopened.find("10.0.0.1").is_some());
        assert!(reopened.find("172.16.5.9").is_some());
    }
}
