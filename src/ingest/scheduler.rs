// src/ingest/scheduler.rs
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::{Orchestrator, PassReport};
use crate::config::monitor::ScheduleConfig;

/// Keeps at most one pass in flight across the timer and manual triggers.
#[derive(Clone, Default)]
pub struct PassGate {
    lock: Arc<Mutex<()>>,
}

impl PassGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while another pass holds the gate.
    pub fn try_acquire(&self) -> Option<OwnedMutexGuard<()>> {
        self.lock.clone().try_lock_owned().ok()
    }

    pub fn is_busy(&self) -> bool {
        self.lock.try_lock().is_err()
    }
}

/// Run one pass unless one is already running. `trigger` only labels logs.
pub async fn run_gated(
    orchestrator: &Orchestrator,
    gate: &PassGate,
    trigger: &'static str,
) -> Option<PassReport> {
    let Some(_guard) = gate.try_acquire() else {
        tracing::info!(target: "ingest", trigger, "pass already running; trigger skipped");
        return None;
    };
    tracing::debug!(target: "ingest", trigger, "pass starting");
    Some(orchestrator.run_pass().await)
}

/// Periodic trigger. Returns `None` (and spawns nothing) when disabled.
/// The first pass fires one full interval after startup.
pub fn spawn_scheduler(
    orchestrator: Arc<Orchestrator>,
    gate: PassGate,
    cfg: &ScheduleConfig,
) -> Option<JoinHandle<()>> {
    if !cfg.enabled {
        tracing::info!(target: "ingest", "scheduler disabled");
        return None;
    }
    let period = cfg.period();
    tracing::info!(target: "ingest", interval_secs = period.as_secs(), "scheduler started");

    Some(tokio::spawn(async move {
        let now = tokio::time::Instant::now();
        let first = now.checked_add(period).unwrap_or(now);
        let mut ticker = tokio::time::interval_at(first, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Some(report) = run_gated(&orchestrator, &gate, "timer").await {
                tracing::info!(
                    target: "ingest",
                    accepted = report.accepted.len(),
                    inserted = report.persisted.inserted,
                    "scheduled pass done"
                );
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_admits_one_holder_at_a_time() {
        let gate = PassGate::new();
        let first = gate.try_acquire();
        assert!(first.is_some());
        assert!(gate.is_busy());
        assert!(gate.clone().try_acquire().is_none());
        drop(first);
        assert!(!gate.is_busy());
        assert!(gate.try_acquire().is_some());
    }
}
