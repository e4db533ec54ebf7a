//! Anti-Entropy Agent Tests
//!
//! The merge rule itself is covered in `files`; these tests exercise the
//! agent around it: absorbing local stores, merge exposure through the
//! snapshot, and clean shutdown of the cycle loop.

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::watch;

    use crate::config::ClusterConfig;
    use crate::files::ownership::FileMap;
    use crate::files::store::FileStore;
    use crate::ring::agent::RingAgent;
    use crate::sync::agent::SyncAgent;

    fn build_agent(dir: &std::path::Path) -> Arc<SyncAgent> {
        let cfg = ClusterConfig {
            nodes_file: dir.join("nodes.json"),
            local_dir: dir.join("local"),
            replica_dir: dir.join("replicas"),
            sync_interval: Duration::from_millis(50),
            ..ClusterConfig::default()
        };
        let ring = Arc::new(RingAgent::new(cfg.clone(), "10.0.0.1".to_string()));
        let local = FileStore::new(cfg.local_dir.clone());
        let replicas = FileStore::new(cfg.replica_dir.clone());
        Arc::new(SyncAgent::new(
            cfg,
            "10.0.0.1".to_string(),
            ring,
            local,
            replicas,
        ))
    }

    #[test]
    fn test_absorb_picks_up_both_stores() {
        let dir = tempfile::tempdir().unwrap();
        let agent = build_agent(dir.path());

        FileStore::new(dir.path().join("local"))
            .write("mine.txt", b"x")
            .unwrap();
        FileStore::new(dir.path().join("replicas"))
            .write("held.txt", b"y")
            .unwrap();

        agent.absorb_local_state();

        let map = agent.snapshot();
        assert_eq!(map.get("mine.txt"), Some(&false));
        assert_eq!(map.get("held.txt"), Some(&false));
    }

    #[test]
    fn test_absorb_keeps_merged_locks() {
        let dir = tempfile::tempdir().unwrap();
        let agent = build_agent(dir.path());

        FileStore::new(dir.path().join("replicas"))
            .write("held.txt", b"y")
            .unwrap();

        // A peer already told us the file is locked; the disk scan must not
        // downgrade that.
        let mut peer = FileMap::new();
        peer.insert("held.txt".to_string(), true);
        agent.merge_peer_map(&peer);

        agent.absorb_local_state();
        assert_eq!(agent.snapshot().get("held.txt"), Some(&true));
    }

    #[test]
    fn test_merge_peer_map_is_idempotent_through_the_agent() {
        let dir = tempfile::tempdir().unwrap();
        let agent = build_agent(dir.path());

        let mut peer = FileMap::new();
        peer.insert("a.txt".to_string(), true);
        peer.insert("b.txt".to_string(), false);

        agent.merge_peer_map(&peer);
        let once = agent.snapshot();
        agent.merge_peer_map(&peer);
        assert_eq!(agent.snapshot(), once);
    }

    #[tokio::test]
    async fn test_run_loop_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let agent = build_agent(dir.path());

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(agent.run(shutdown_rx));

        tokio::time::sleep(Duration::from_millis(120)).await;
        shutdown.send(true).unwrap();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sync loop should stop promptly")
            .unwrap();
    }

    #[tokio::test]
    async fn test_singleton_cycle_still_absorbs_local_files() {
        let dir = tempfile::tempdir().unwrap();
        let agent = build_agent(dir.path());

        FileStore::new(dir.path().join("local"))
            .write("solo.txt", b"x")
            .unwrap();

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(agent.clone().run(shutdown_rx));

        // One tick is enough: with a single member the cycle folds local
        // state in and skips the network half.
        tokio::time::sleep(Duration::from_millis(120)).await;
        shutdown.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;

        assert_eq!(agent.snapshot().get("solo.txt"), Some(&false));
    }
}
