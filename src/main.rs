/// Mechaway orchestrator
///
/// Main entry point for a main instance. Loads configuration from the environment
/// and starts the HTTP server.

use mechaway_orchestrator::{config::Config, server::start_server};

/// Application entry point
///
/// The server provides:
/// - Workflow management and activation API at /api/workflows/*
/// - Cluster delivery and status at /api/orchestration/*
/// - Frontend push stream at /api/push
/// - Webhook triggers at /webhook/{workflow_id}/*
/// - Health check at /healthz
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // MECHAWAY_* environment variables, defaults to a single leader on 0.0.0.0:3004
    let config = Config::default();

    start_server(config).await?;

    Ok(())
}
