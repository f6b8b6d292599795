// tests/common/mod.rs
//
// Shared test doubles: a scripted feed provider and a keyword-driven
// classification oracle, plus a helper that wires an in-memory app.
#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use eth_feed_monitor::classify::ClassifierOracle;
use eth_feed_monitor::config::sources::SourceRegistry;
use eth_feed_monitor::config::MonitorConfig;
use eth_feed_monitor::ingest::types::{
    CanonicalRecord, FeedProvider, MediaKind, RawAuthor, RawItem,
};
use eth_feed_monitor::store;
use eth_feed_monitor::AppState;

pub const HIGH_DEFI: &str =
    r#"{"sentiment":"positive","topics":["Defi"],"impact":"high","summary":"relevant"}"#;
pub const LOW_IMPACT: &str =
    r#"{"sentiment":"positive","topics":["Defi"],"impact":"low","summary":"noise"}"#;

pub fn raw(id: &str, handle: &str, text: &str) -> RawItem {
    RawItem {
        id: Some(id.to_string()),
        text: Some(text.to_string()),
        url: Some(format!("https://x.com/{handle}/status/{id}")),
        created_at: Some("Tue May 14 10:00:00 +0000 2024".to_string()),
        author: Some(RawAuthor {
            name: Some(handle.to_uppercase()),
            user_name: Some(handle.to_string()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn record(url: &str, topics: &[&str], inserted_at: DateTime<Utc>) -> CanonicalRecord {
    CanonicalRecord {
        external_id: None,
        text: format!("post at {url}"),
        author_display_name: "Alice".into(),
        author_handle: "alice".into(),
        author_verified: false,
        author_verification_kind: String::new(),
        author_avatar_url: String::new(),
        canonical_url: url.to_string(),
        media_preview_url: None,
        media_kind: MediaKind::None,
        topics: topics.iter().map(|t| t.to_string()).collect(),
        published_at: "Tue May 14 10:00:00 +0000 2024".into(),
        inserted_at,
    }
}

/// Per-source canned responses; a source mapped to `None` fails to fetch.
/// Unknown sources return nothing.
#[derive(Default)]
pub struct ScriptedProvider {
    script: HashMap<String, Option<Vec<RawItem>>>,
    pub calls: Mutex<Vec<(String, DateTime<Utc>)>>,
}

impl ScriptedProvider {
    pub fn with(mut self, source: &str, items: Vec<RawItem>) -> Self {
        self.script.insert(source.to_string(), Some(items));
        self
    }

    pub fn failing(mut self, source: &str) -> Self {
        self.script.insert(source.to_string(), None);
        self
    }
}

#[async_trait]
impl FeedProvider for ScriptedProvider {
    async fn fetch(&self, source: &str, since: DateTime<Utc>) -> Result<Vec<RawItem>> {
        self.calls.lock().unwrap().push((source.to_string(), since));
        match self.script.get(source) {
            Some(Some(items)) => Ok(items.clone()),
            Some(None) => Err(anyhow!("upstream 503 for {source}")),
            None => Ok(Vec::new()),
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Answers by keyword in the candidate text:
/// `noise` -> low impact, `garbage` -> unparseable, `boom` -> oracle error,
/// anything else -> high impact Defi.
#[derive(Default)]
pub struct KeywordOracle {
    pub calls: AtomicUsize,
}

impl ClassifierOracle for KeywordOracle {
    fn complete<'a>(
        &'a self,
        prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let tweet = prompt.rsplit("Tweet to analyze:").next().unwrap_or_default();
        let out = if tweet.contains("boom") {
            Err(anyhow!("quota exceeded"))
        } else if tweet.contains("garbage") {
            Ok("I cannot answer that.".to_string())
        } else if tweet.contains("noise") {
            Ok(format!("```json\n{LOW_IMPACT}\n```"))
        } else {
            Ok(HIGH_DEFI.to_string())
        };
        Box::pin(async move { out })
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

/// Tracks how many calls are in flight at once.
#[derive(Default)]
pub struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Every fetch takes `latency` and yields `per_source` relevant items.
pub struct SlowProvider {
    pub latency: Duration,
    pub per_source: usize,
    pub in_flight: InFlight,
}

impl SlowProvider {
    pub fn new(latency: Duration, per_source: usize) -> Self {
        Self {
            latency,
            per_source,
            in_flight: InFlight::default(),
        }
    }
}

#[async_trait]
impl FeedProvider for SlowProvider {
    async fn fetch(&self, source: &str, _since: DateTime<Utc>) -> Result<Vec<RawItem>> {
        self.in_flight.enter();
        tokio::time::sleep(self.latency).await;
        self.in_flight.leave();
        Ok((0..self.per_source)
            .map(|i| raw(&format!("{source}-{i}"), source, "DeFi yields are up"))
            .collect())
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

/// Always relevant, but each answer takes `latency`.
pub struct SlowOracle {
    pub latency: Duration,
    pub in_flight: InFlight,
}

impl SlowOracle {
    pub fn new(latency: Duration) -> Self {
        Self {
            latency,
            in_flight: InFlight::default(),
        }
    }
}

impl ClassifierOracle for SlowOracle {
    fn complete<'a>(
        &'a self,
        _prompt: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>> {
        Box::pin(async move {
            self.in_flight.enter();
            tokio::time::sleep(self.latency).await;
            self.in_flight.leave();
            Ok(HIGH_DEFI.to_string())
        })
    }

    fn name(&self) -> &'static str {
        "slow"
    }
}

/// Zero pacing so tests do not sleep.
pub fn fast_config() -> MonitorConfig {
    let mut cfg = MonitorConfig::default();
    cfg.pipeline.group_delay_ms = 0;
    cfg.pipeline.batch_delay_ms = 0;
    cfg.pipeline.group_size = 2;
    cfg.pipeline.batch_size = 2;
    cfg
}

pub async fn in_memory_app(
    provider: Arc<dyn FeedProvider>,
    oracle: Arc<dyn ClassifierOracle>,
    sources: &[&str],
) -> AppState {
    in_memory_app_with(&fast_config(), provider, oracle, sources).await
}

pub async fn in_memory_app_with(
    cfg: &MonitorConfig,
    provider: Arc<dyn FeedProvider>,
    oracle: Arc<dyn ClassifierOracle>,
    sources: &[&str],
) -> AppState {
    let pool = store::connect_in_memory().await.expect("in-memory db");
    eth_feed_monitor::assemble(
        cfg,
        pool,
        provider,
        oracle,
        SourceRegistry::fixed(sources.iter().map(|s| s.to_string()).collect()),
    )
}
