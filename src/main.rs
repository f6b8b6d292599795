//! Feed monitor binary entrypoint.
//! Boots storage, the ingestion scheduler and the Axum HTTP server.

use eth_feed_monitor::config::MonitorConfig;
use eth_feed_monitor::ingest::scheduler::spawn_scheduler;
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    eth_feed_monitor::init_tracing();

    let cfg = MonitorConfig::load_default()?;
    let (router, state) = eth_feed_monitor::app(&cfg).await?;

    // Detached; lives as long as the runtime.
    let _scheduler = spawn_scheduler(
        state.orchestrator.clone(),
        state.gate.clone(),
        &cfg.schedule,
    );

    Ok(router.into())
}
