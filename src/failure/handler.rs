use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::config::ClusterConfig;
use crate::files::ownership::{FileOwnershipEntry, OwnershipLog};
use crate::files::store::FileStore;
use crate::hashspace::position;
use crate::registry::client::RegistryClient;
use crate::registry::types::NodeRecord;
use crate::transfer::channel::{send_file, Provenance};

const MIGRATION_ATTEMPTS: usize = 3;

/// One file the leaving node must hand off, and to whom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationTarget {
    pub filename: String,
    pub local_owner: String,
    pub target_address: String,
}

/// Decides where each held replica goes when this node leaves.
///
/// The default destination is the immediate predecessor — the node that
/// inherits this node's arc of the ring. The exception: when the file's
/// original owner hashes to that predecessor, the predecessor must not end up
/// holding its own file's replica, so the copy goes one step further
/// counter-clockwise, to the predecessor's predecessor.
pub fn plan_migration(
    entries: &[FileOwnershipEntry],
    self_address: &str,
    predecessor: &NodeRecord,
    pred_of_pred: &NodeRecord,
) -> Vec<MigrationTarget> {
    entries
        .iter()
        .filter(|e| e.replica_owner == self_address)
        .map(|e| {
            let target = if position(&e.local_owner) == predecessor.id {
                pred_of_pred
            } else {
                predecessor
            };
            MigrationTarget {
                filename: e.filename.clone(),
                local_owner: e.local_owner.clone(),
                target_address: target.address.clone(),
            }
        })
        .collect()
}

/// Executes the leave-time migration.
pub struct FailureHandler {
    cfg: ClusterConfig,
    replica_store: FileStore,
    log: Arc<OwnershipLog>,
    client: RegistryClient,
}

impl FailureHandler {
    pub fn new(cfg: ClusterConfig, replica_store: FileStore, log: Arc<OwnershipLog>) -> Self {
        let client = RegistryClient::new(&cfg.registry_http);
        Self {
            cfg,
            replica_store,
            log,
            client,
        }
    }

    /// Pushes every held replica to its new owner, then clears the local
    /// replica store and ownership log. Nothing is cleared — and the caller
    /// must not deregister — until every transfer succeeded, unless `force`
    /// is set as an operator override for abandoning unreachable targets.
    ///
    /// Returns the number of files migrated.
    pub async fn migrate_on_leave(&self, self_address: &str, force: bool) -> Result<usize> {
        let held = self.log.replicas_held_by(self_address);
        if held.is_empty() {
            self.clear_local_state()?;
            return Ok(0);
        }

        let (predecessor, pred_of_pred) = self
            .resolve_targets(self_address)
            .await
            .context("resolving migration targets")?;

        if predecessor.address == self_address {
            // Alone on the ring: nobody to hand the replicas to. They are
            // dropped with the rest of the local state.
            warn!(
                "leaving as the only ring member; {} replica(s) have no new owner",
                held.len()
            );
            self.clear_local_state()?;
            return Ok(0);
        }

        let plan = plan_migration(&held, self_address, &predecessor, &pred_of_pred);
        info!(
            "migrating {} replica(s) before leaving (predecessor {}, fallback {})",
            plan.len(),
            predecessor.address,
            pred_of_pred.address
        );

        let mut migrated = 0;
        for target in &plan {
            match self.push_with_retry(target, self_address).await {
                Ok(()) => migrated += 1,
                Err(e) if force => {
                    warn!(
                        "abandoning replica {} after failed migration (operator override): {}",
                        target.filename, e
                    );
                }
                Err(e) => {
                    // Data-loss risk: surface it and keep the node in the
                    // ring so the operator can retry.
                    return Err(e.context(format!(
                        "migration of {} to {} failed; refusing to leave",
                        target.filename, target.target_address
                    )));
                }
            }
        }

        self.clear_local_state()?;
        Ok(migrated)
    }

    /// Looks up this node's predecessor and that node's own predecessor from
    /// the registry's current ring ordering.
    async fn resolve_targets(&self, self_address: &str) -> Result<(NodeRecord, NodeRecord)> {
        let own = self
            .client
            .neighbors(self_address)
            .await?
            .ok_or_else(|| anyhow::anyhow!("{} is not registered", self_address))?;
        let pred = self
            .client
            .neighbors(&own.predecessor.address)
            .await?
            .ok_or_else(|| {
                anyhow::anyhow!("predecessor {} vanished mid-leave", own.predecessor.address)
            })?;
        Ok((own.predecessor, pred.predecessor))
    }

    async fn push_with_retry(&self, target: &MigrationTarget, self_address: &str) -> Result<()> {
        let path = self.replica_store.path_for(&target.filename);
        let provenance = Provenance {
            local_owner: target.local_owner.clone(),
            sender: self_address.to_string(),
        };

        let mut delay_ms = 200u64;
        for attempt in 0..MIGRATION_ATTEMPTS {
            match send_file(
                &target.target_address,
                self.cfg.transfer_port,
                &target.filename,
                &path,
                Some(&provenance),
            )
            .await
            {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if attempt + 1 == MIGRATION_ATTEMPTS {
                        return Err(e);
                    }
                    warn!(
                        "migration of {} to {} failed (attempt {}): {}",
                        target.filename,
                        target.target_address,
                        attempt + 1,
                        e
                    );
                    let jitter = rand::random::<u64>() % 100;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(2000);
                }
            }
        }
        bail!("retry attempts exhausted");
    }

    fn clear_local_state(&self) -> Result<()> {
        self.replica_store.clear()?;
        self.log.clear();
        Ok(())
    }
}
