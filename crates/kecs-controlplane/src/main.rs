mod cli;

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use kecs_api::{EngineApiAdapter, HttpApi};
use kecs_core::{CleanupWorker, MemoryStore, StatusSyncWorker, Storage, TaskEngine, TaskRuntime};
use kecs_exec::{KubeRuntime, SimRuntime};
use kecs_model::api::CreateClusterRequest;
use kecs_observe::logger_init;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 1) Logger
    logger_init(&cli.logger_config())?;

    // 2) Engine
    let config = cli.engine_config()?;
    let store: Arc<dyn Storage> = Arc::new(MemoryStore::new());
    let runtime: Arc<dyn TaskRuntime> = if config.test_mode {
        Arc::new(SimRuntime::default())
    } else {
        Arc::new(KubeRuntime::new(cli.kube_config()))
    };
    info!(
        region = %config.region,
        runtime = runtime.name(),
        test_mode = config.test_mode,
        "engine configured"
    );

    let cleanup_config = config.cleanup.clone();
    let sync_config = config.sync.clone();
    let engine = Arc::new(TaskEngine::new(Arc::clone(&store), runtime, config));

    let cluster = engine.create_cluster(CreateClusterRequest::default()).await?;
    info!(cluster = %cluster.cluster_name, namespace = %cluster.namespace(), "default cluster ready");

    // 3) Workers
    let cleanup = Arc::new(
        CleanupWorker::new(Arc::clone(&store), Arc::clone(engine.clock()), cleanup_config)
            .with_runtime(Arc::clone(engine.runtime())),
    );
    cleanup.start();
    let sync = Arc::new(StatusSyncWorker::new(Arc::clone(&engine), sync_config));
    sync.start();

    // 4) HTTP
    let router = HttpApi::new(Arc::new(EngineApiAdapter::new(Arc::clone(&engine)))).router();
    let listener = TcpListener::bind(cli.listen).await?;
    info!(addr = %listener.local_addr()?, "ECS API listening");

    let served = axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
            info!("shutting down");
        })
        .await;

    // 5) Drain
    sync.stop().await;
    cleanup.stop().await;
    served?;
    Ok(())
}
