// src/ingest/providers/twitter_search.rs
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Deserialize;
use std::time::Duration;

use crate::config::monitor::FeedConfig;
use crate::ingest::types::{FeedProvider, RawItem};

const SEARCH_PATH: &str = "/twitter/tweet/advanced_search";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    tweets: Vec<RawItem>,
    #[serde(default)]
    #[allow(dead_code)] // one page per pass; kept for diagnostics
    has_next_page: bool,
}

/// `2024-03-05T07:08:09Z` -> `2024-03-05_07:08:09_UTC`, the search grammar.
pub fn format_since(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d_%H:%M:%S_UTC").to_string()
}

/// `from:<source> since:<formatted>`
pub fn build_query(source: &str, since: DateTime<Utc>) -> String {
    format!("from:{} since:{}", source, format_since(since))
}

/// Parse one search response body into raw items.
pub fn parse_search_response(body: &str) -> Result<Vec<RawItem>> {
    let resp: SearchResponse =
        serde_json::from_str(body).context("parsing advanced_search response")?;
    Ok(resp.tweets)
}

pub struct TwitterSearchProvider {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http {
        base_url: String,
        api_key: String,
        client: reqwest::Client,
    },
}

impl TwitterSearchProvider {
    /// Serves the same canned body for every source.
    pub fn from_fixture(body: &str) -> Self {
        Self {
            mode: Mode::Fixture(body.to_string()),
        }
    }

    pub fn from_config(cfg: &FeedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("eth-feed-monitor/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("building feed http client")?;
        Ok(Self {
            mode: Mode::Http {
                base_url: cfg.base_url.trim_end_matches('/').to_string(),
                api_key: cfg.api_key.clone(),
                client,
            },
        })
    }

    fn parse_timed(body: &str) -> Result<Vec<RawItem>> {
        let t0 = std::time::Instant::now();
        let items = parse_search_response(body)?;
        histogram!("monitor_fetch_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("monitor_raw_items_total").increment(items.len() as u64);
        Ok(items)
    }
}

#[async_trait]
impl FeedProvider for TwitterSearchProvider {
    async fn fetch(&self, source: &str, since: DateTime<Utc>) -> Result<Vec<RawItem>> {
        match &self.mode {
            Mode::Fixture(body) => Self::parse_timed(body),
            Mode::Http {
                base_url,
                api_key,
                client,
            } => {
                let query = build_query(source, since);
                tracing::debug!(target: "ingest", source, %query, "feed search");
                let resp = client
                    .get(format!("{base_url}{SEARCH_PATH}"))
                    .header("X-API-Key", api_key)
                    .query(&[("query", query.as_str()), ("queryType", "Latest")])
                    .send()
                    .await
                    .context("feed search request")?;
                let status = resp.status();
                let body = resp.text().await.context("feed search .text()")?;
                if !status.is_success() {
                    bail!("feed search returned {status}");
                }
                Self::parse_timed(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "twitter-search"
    }
}
