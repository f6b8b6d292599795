// src/ingest/mod.rs
//! Ingestion pass: for every source, fetch what is new since its watermark,
//! classify each candidate, publish the relevant ones live, and finally store
//! everything accepted in one bulk insert.
//!
//! Failures are resolved at the smallest scope. A failed fetch skips the
//! source and leaves its watermark alone; a failed classification drops one
//! candidate. Nothing here aborts a pass.

pub mod normalize;
pub mod providers;
pub mod scheduler;
pub mod types;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::future::join_all;
use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram,
};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::classify::{anon_hash, ClassifierGateway};
use crate::config::monitor::PipelineConfig;
use crate::config::sources::SourceRegistry;
use crate::fanout::LiveFanout;
use crate::relevance;
use crate::store::{InsertSummary, RecordStore, WatermarkStore};
use types::{CanonicalRecord, FeedProvider};

/// One-time metrics registration (so series show up on /metrics).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("monitor_passes_total", "Completed ingestion passes.");
        describe_counter!(
            "monitor_fetch_errors_total",
            "Sources skipped because the feed fetch failed."
        );
        describe_counter!(
            "monitor_candidates_total",
            "Normalized candidates sent to classification."
        );
        describe_counter!("monitor_accepted_total", "Candidates accepted as relevant.");
        describe_counter!(
            "monitor_rejected_total",
            "Candidates rejected by the relevance filter, by reason."
        );
        describe_counter!(
            "monitor_classify_errors_total",
            "Candidates dropped because classification failed."
        );
        describe_counter!(
            "monitor_persist_duplicates_total",
            "Accepted records already stored (duplicate url/id)."
        );
        describe_counter!(
            "monitor_persist_errors_total",
            "Accepted records that failed to store."
        );
        describe_counter!(
            "monitor_fanout_published_total",
            "Records pushed to live subscribers."
        );
        describe_gauge!(
            "monitor_last_pass_ts",
            "Unix ts when the last pass finished."
        );
        describe_histogram!("monitor_pass_ms", "Pass duration in milliseconds.");
    });
}

/// Outcome of one pass. `accepted` lists every record that passed the filter
/// (and was published), whether or not it was new to storage.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    pub accepted: Vec<CanonicalRecord>,
    pub sources: usize,
    pub fetch_failures: usize,
    pub candidates: usize,
    pub rejected: usize,
    pub classify_errors: usize,
    pub persisted: InsertSummary,
}

#[derive(Default)]
struct SourceOutcome {
    accepted: Vec<CanonicalRecord>,
    fetch_failed: bool,
    candidates: usize,
    rejected: usize,
    classify_errors: usize,
}

enum Candidate {
    Accepted(CanonicalRecord),
    Rejected,
    Failed,
}

impl PassReport {
    fn absorb(&mut self, o: SourceOutcome) {
        self.accepted.extend(o.accepted);
        self.fetch_failures += o.fetch_failed as usize;
        self.candidates += o.candidates;
        self.rejected += o.rejected;
        self.classify_errors += o.classify_errors;
    }
}

pub struct Orchestrator {
    provider: Arc<dyn FeedProvider>,
    classifier: ClassifierGateway,
    watermarks: Arc<WatermarkStore>,
    records: RecordStore,
    fanout: LiveFanout,
    sources: Arc<SourceRegistry>,
    tuning: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        provider: Arc<dyn FeedProvider>,
        classifier: ClassifierGateway,
        watermarks: Arc<WatermarkStore>,
        records: RecordStore,
        fanout: LiveFanout,
        sources: Arc<SourceRegistry>,
        tuning: PipelineConfig,
    ) -> Self {
        Self {
            provider,
            classifier,
            watermarks,
            records,
            fanout,
            sources,
            tuning,
        }
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    pub fn fanout(&self) -> &LiveFanout {
        &self.fanout
    }

    pub fn watermarks(&self) -> &WatermarkStore {
        &self.watermarks
    }

    pub fn sources(&self) -> &SourceRegistry {
        &self.sources
    }

    /// One full pass over the registered sources.
    pub async fn run_pass(&self) -> PassReport {
        let sources = self.sources.list();
        self.run_pass_for(&sources).await
    }

    /// One full pass over an explicit source list.
    pub async fn run_pass_for(&self, sources: &[String]) -> PassReport {
        ensure_metrics_described();
        let started = Instant::now();
        let mut report = PassReport {
            sources: sources.len(),
            ..Default::default()
        };

        let group_delay = self.tuning.group_delay();
        for (i, group) in sources.chunks(self.tuning.group_size.max(1)).enumerate() {
            if i > 0 && !group_delay.is_zero() {
                tokio::time::sleep(group_delay).await;
            }
            let outcomes = join_all(group.iter().map(|s| self.process_source(s))).await;
            for o in outcomes {
                report.absorb(o);
            }
        }

        report.persisted = self.records.bulk_insert(&report.accepted).await;

        let elapsed_ms = started.elapsed().as_millis() as f64;
        counter!("monitor_passes_total").increment(1);
        counter!("monitor_persist_duplicates_total")
            .increment(report.persisted.duplicates as u64);
        counter!("monitor_persist_errors_total").increment(report.persisted.failed as u64);
        gauge!("monitor_last_pass_ts").set(Utc::now().timestamp() as f64);
        histogram!("monitor_pass_ms").record(elapsed_ms);

        info!(
            target: "ingest",
            sources = report.sources,
            fetch_failures = report.fetch_failures,
            candidates = report.candidates,
            accepted = report.accepted.len(),
            rejected = report.rejected,
            classify_errors = report.classify_errors,
            inserted = report.persisted.inserted,
            duplicates = report.persisted.duplicates,
            elapsed_ms,
            "ingest pass finished"
        );
        report
    }

    async fn process_source(&self, source: &str) -> SourceOutcome {
        let mut out = SourceOutcome::default();
        let since = self.watermarks.get(source).await;
        let checked_at = Utc::now();

        let raw = match self.provider.fetch(source, since).await {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    target: "ingest",
                    source,
                    provider = self.provider.name(),
                    error = ?e,
                    "fetch failed; source skipped"
                );
                counter!("monitor_fetch_errors_total").increment(1);
                out.fetch_failed = true;
                return out;
            }
        };

        let candidates: Vec<CanonicalRecord> = raw
            .iter()
            .map(|item| normalize::normalize(item, Utc::now()))
            .filter(|rec| !rec.text.is_empty())
            .collect();
        out.candidates = candidates.len();
        counter!("monitor_candidates_total").increment(candidates.len() as u64);
        debug!(
            target: "ingest",
            source,
            raw = raw.len(),
            candidates = out.candidates,
            "source fetched"
        );

        let batch_delay = self.tuning.batch_delay();
        for (i, batch) in candidates.chunks(self.tuning.batch_size.max(1)).enumerate() {
            if i > 0 && !batch_delay.is_zero() {
                tokio::time::sleep(batch_delay).await;
            }
            let results = join_all(
                batch
                    .iter()
                    .cloned()
                    .map(|c| self.process_candidate(source, c)),
            )
            .await;
            for r in results {
                match r {
                    Candidate::Accepted(rec) => out.accepted.push(rec),
                    Candidate::Rejected => out.rejected += 1,
                    Candidate::Failed => out.classify_errors += 1,
                }
            }
        }

        self.watermarks.advance(source, checked_at).await;
        out
    }

    async fn process_candidate(&self, source: &str, mut record: CanonicalRecord) -> Candidate {
        let result = match self.classifier.classify(&record.text).await {
            Ok(r) => r,
            Err(e) => {
                warn!(
                    target: "classify",
                    source,
                    id = %anon_hash(&record.text),
                    error = %e,
                    "candidate dropped"
                );
                counter!("monitor_classify_errors_total").increment(1);
                return Candidate::Failed;
            }
        };

        if !relevance::accept(&result) {
            let reason = relevance::rejection_reason(&result).unwrap_or("rejected");
            debug!(
                target: "classify",
                source,
                id = %anon_hash(&record.text),
                reason,
                "candidate not relevant"
            );
            counter!("monitor_rejected_total", "reason" => reason).increment(1);
            return Candidate::Rejected;
        }

        record.topics = result.topics;
        self.fanout.publish(&record);
        counter!("monitor_accepted_total").increment(1);
        Candidate::Accepted(record)
    }
}
