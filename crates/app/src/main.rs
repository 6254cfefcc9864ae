mod documents;
mod maintenance;
mod mutation;
mod problem;
mod router;
mod sse;
mod telemetry;
mod views;

use std::net::SocketAddr;

use hirehub_storage::Database;
use hirehub_util::{load_env_file, AppConfig};
use tracing::info;

use crate::maintenance::MaintenanceWorker;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    load_env_file();
    let config = AppConfig::from_env()?;

    telemetry::init_tracing(&config)?;
    let metrics = telemetry::init_metrics()?;

    let database = Database::connect(&config.database_url).await?;
    database.run_migrations().await?;
    info!(stage = "storage", url = %config.database_url, "database ready");

    MaintenanceWorker::new(database.clone(), config.change_log_ttl_hours).spawn();

    let state = router::AppState::new(
        metrics,
        database,
        config.sse_ring_max,
        config.sse_heartbeat_secs,
    );

    let addr: SocketAddr = config.bind_addr;
    info!(stage = "app", %addr, env = %config.environment.as_str(), "starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router::app_router(state))
        .await
        .map_err(|err| err.into())
}
