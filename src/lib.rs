// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod api;
pub mod classify;
pub mod config;
pub mod fanout;
pub mod ingest;
pub mod metrics;
pub mod relevance;
pub mod store;

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use sqlx::sqlite::SqlitePool;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use crate::api::{router, AppState};

use crate::classify::{
    gemini::build_oracle_from_config, ClassifierGateway, ClassifierOracle, DynOracle,
};
use crate::config::sources::SourceRegistry;
use crate::config::MonitorConfig;
use crate::fanout::LiveFanout;
use crate::ingest::providers::twitter_search::TwitterSearchProvider;
use crate::ingest::scheduler::PassGate;
use crate::ingest::types::FeedProvider;
use crate::ingest::Orchestrator;
use crate::store::{RecordStore, WatermarkStore};

/// Install the global subscriber. `RUST_LOG` wins over the default filter;
/// `LOG_FORMAT=json` switches to JSON lines. A subscriber installed earlier
/// (e.g. by the hosting runtime) is left in place.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn,reqwest=warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let res = if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init()
    };
    if res.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

/// Wire the pipeline around an open pool and the two external oracles.
pub fn assemble(
    cfg: &MonitorConfig,
    pool: SqlitePool,
    provider: Arc<dyn FeedProvider>,
    oracle: DynOracle,
    sources: SourceRegistry,
) -> AppState {
    let lookback = cfg.pipeline.lookback();
    let orchestrator = Orchestrator::new(
        provider,
        ClassifierGateway::new(oracle),
        Arc::new(WatermarkStore::new(pool.clone(), lookback)),
        RecordStore::new(pool),
        LiveFanout::new(cfg.fanout.capacity),
        Arc::new(sources),
        cfg.pipeline.clone(),
    );
    AppState::new(Arc::new(orchestrator), PassGate::new())
}

/// Build the full service from config: storage, oracles, HTTP routes and
/// `/metrics`. The scheduler is not started here.
pub async fn app(cfg: &MonitorConfig) -> anyhow::Result<(Router, AppState)> {
    let pool = store::connect(&cfg.storage.database_url).await?;
    let provider = TwitterSearchProvider::from_config(&cfg.feed)?;
    let oracle = build_oracle_from_config(&cfg.classifier).context("building classifier")?;
    info!(classifier = oracle.name(), "classifier ready");

    let state = assemble(
        cfg,
        pool,
        Arc::new(provider),
        oracle,
        SourceRegistry::from_path(&cfg.sources_path),
    );
    let metrics = metrics::Metrics::global()?;
    let router = router(state.clone()).merge(metrics.router());
    Ok((router, state))
}
