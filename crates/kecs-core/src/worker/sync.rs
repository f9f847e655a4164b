use std::sync::Arc;

use tracing::{debug, info, warn};

use super::Periodic;
use crate::{config::SyncConfig, engine::TaskEngine};

/// Periodically reconciles every live task against its pod.
pub struct StatusSyncWorker {
    engine: Arc<TaskEngine>,
    config: SyncConfig,
    runner: Periodic,
}

impl StatusSyncWorker {
    pub fn new(engine: Arc<TaskEngine>, config: SyncConfig) -> Self {
        Self {
            engine,
            config,
            runner: Periodic::new("status-sync"),
        }
    }

    pub fn start(self: &Arc<Self>) -> bool {
        if !self.config.enabled {
            info!("status sync disabled");
            return false;
        }
        let worker = Arc::clone(self);
        self.runner.spawn(self.config.interval(), move || {
            let worker = Arc::clone(&worker);
            async move {
                worker.sync_once().await;
            }
        })
    }

    pub async fn stop(&self) {
        self.runner.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.runner.is_running()
    }

    /// One pass over all clusters. Returns how many tasks changed status.
    pub async fn sync_once(&self) -> usize {
        let clusters = match self.engine.store().clusters().list().await {
            Ok(clusters) => clusters,
            Err(e) => {
                warn!(error = %e, "status sync: failed to list clusters");
                return 0;
            }
        };

        let mut changed = 0;
        for cluster in &clusters {
            match self.engine.reconcile_cluster(cluster).await {
                Ok(n) => changed += n,
                Err(e) => warn!(cluster = %cluster.cluster_name, error = %e, "status sync failed"),
            }
        }
        if changed > 0 {
            debug!(changed, "status sync updated tasks");
        }
        changed
    }
}
