/// Server setup and initialization
///
/// Wires together all components: storage, trigger scheduler, cluster bus, activation
/// coordinator, push hub and HTTP routes. `build_state` is shared by `main` and the
/// integration tests.

use crate::{
    api::{
        create_orchestration_routes, create_push_routes, create_webhook_routes,
        create_workflow_routes, AppState,
    },
    config::Config,
    orchestration::{
        ActivationCoordinator, ClusterChannel, ClusterListener, LocalClusterChannel, Notifier,
        PushHub, TriggerRegistry, WorkflowLanes,
    },
    runtime::{AdmissionGate, TriggerScheduler},
    workflow::{ActiveWorkflowRegistry, WorkflowStorage},
};
use anyhow::Result;
use axum::{routing::get, Router};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Build every shared component on top of an existing pool and start the
/// background tasks (cluster listener, trigger scheduler, trigger log).
///
/// A leader restores its stored active workflows before returning.
pub async fn build_state(config: &Config, pool: SqlitePool) -> Result<AppState> {
    tracing::info!("📋 Initializing workflow storage");
    let storage = WorkflowStorage::new(pool);
    storage.init_schema().await
        .map_err(|e| anyhow::anyhow!("Failed to initialize workflow schema: {}", e))?;

    tracing::info!("⏰ Initializing trigger scheduler");
    let registry = Arc::new(ActiveWorkflowRegistry::new());
    let scheduler = Arc::new(
        TriggerScheduler::new(storage.clone(), Arc::clone(&registry)).await
            .map_err(|e| anyhow::anyhow!("Failed to initialize trigger scheduler: {}", e))?,
    );

    let orchestration = &config.orchestration;
    tracing::info!(
        "🛰️ Joining cluster as {} ({})",
        orchestration.instance_id,
        if orchestration.leader { "leader" } else { "follower" }
    );
    if orchestration.cluster_token.is_none() {
        tracing::warn!("⚠️ MECHAWAY_CLUSTER_TOKEN not set, cluster endpoint accepts any sender");
    }
    let cluster = Arc::new(
        LocalClusterChannel::new(
            orchestration.instance_id.clone(),
            orchestration.leader,
            orchestration.peers.clone(),
        )
        .with_token(orchestration.cluster_token.clone()),
    );
    let push = PushHub::default();
    let notifier: Arc<dyn Notifier> = Arc::new(push.clone());

    tracing::info!("🚦 Activation gate capacity: {}", orchestration.activation_concurrency);
    let coordinator = Arc::new(ActivationCoordinator::new(
        Arc::new(storage.clone()),
        Arc::clone(&scheduler) as Arc<dyn TriggerRegistry>,
        Arc::clone(&cluster) as Arc<dyn ClusterChannel>,
        Arc::clone(&notifier),
        AdmissionGate::new(orchestration.activation_concurrency),
    ));
    let lanes = Arc::new(WorkflowLanes::new(Arc::clone(&coordinator)));

    // Subscribe before anything can publish
    let listener = ClusterListener::new(Arc::clone(&lanes), notifier);
    tokio::spawn(listener.run(cluster.subscribe()));

    scheduler.start().await
        .map_err(|e| anyhow::anyhow!("Failed to start trigger scheduler: {}", e))?;

    if cluster.is_leader() {
        tracing::info!("📥 Restoring active workflows");
        scheduler.restore_active().await
            .map_err(|e| anyhow::anyhow!("Failed to restore active workflows: {}", e))?;
    }

    let mut fired = scheduler.subscribe();
    tokio::spawn(async move {
        loop {
            match fired.recv().await {
                Ok(event) => tracing::info!(
                    "🎯 Trigger fired: {}/{} via {:?}",
                    event.workflow_id, event.node_id, event.source
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("⚠️ Trigger log lagged, {} firings skipped", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    Ok(AppState { storage, scheduler, cluster, coordinator, lanes, push })
}

/// Assemble the HTTP router for the given state
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check endpoint
        .route("/healthz", get(health_check))
        .merge(create_workflow_routes())
        .merge(create_orchestration_routes())
        .merge(create_push_routes())
        .merge(create_webhook_routes())
        .with_state(state)
}

/// Open (or create) the SQLite database under the configured data directory
pub async fn open_database(config: &Config) -> Result<SqlitePool> {
    tracing::info!("📁 Ensuring data directory exists: {}", config.database.data_dir);
    std::fs::create_dir_all(&config.database.data_dir)
        .map_err(|e| anyhow::anyhow!("Failed to create data directory: {}", e))?;

    let options = SqliteConnectOptions::new()
        .filename(config.database_path())
        .create_if_missing(true);
    SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to open workflow database: {}", e))
}

/// Start the HTTP server with the given configuration
///
/// Serves until Ctrl+C or SIGTERM, then takes every live trigger down.
pub async fn start_server(config: Config) -> Result<()> {
    // RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    config.validate()?;

    tracing::info!("Starting Mechaway orchestrator...");

    let pool = open_database(&config).await?;
    let state = build_state(&config, pool).await?;
    let scheduler = Arc::clone(&state.scheduler);
    let app = router(state);
    tracing::info!("✅ Application initialized successfully");

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&bind_addr).await?;

    tracing::info!("Server listening on http://{}", bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Mechaway orchestrator shutting down");
    scheduler.stop().await?;

    Ok(())
}

/// Resolves on Ctrl+C or, on unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("❌ Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("❌ Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("Received terminate signal, initiating graceful shutdown"),
    }
}

/// Health check endpoint handler
async fn health_check() -> &'static str {
    "ok"
}
