//! Periodic maintenance of the tracking tables.
//!
//! Without sweeping, the replay ledger grows by one entry per accepted
//! message and the quota table by one bucket per distinct user agent,
//! forever. The sweeper bounds both:
//!
//! 1. **Replay entries** older than `replay_retention_ms` are dropped.
//!    Those timestamps already fail the freshness gate, so forgetting
//!    them cannot re-admit anything.
//! 2. **Idle buckets** past the idle threshold are dropped. Such a
//!    bucket has refilled to the burst ceiling, which is exactly the
//!    state a new bucket starts in.
//!
//! The message ledger is never pruned; its size is only reported.
//! All operations are idempotent.

use std::sync::Arc;
use std::time::Instant;

use pqbook_protocol::replay::ReplayGuard;
use pqbook_protocol::validation::current_time_ms;
use pqbook_types::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ledger::MessageLedger;
use crate::pipeline::SubmissionPipeline;
use crate::rate_limiter::AdmissionLimiter;

// ---------------------------------------------------------------------------
// SweepReport
// ---------------------------------------------------------------------------

/// Summary of a sweep run.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SweepReport {
    /// Replay timestamps removed.
    pub replay_entries_removed: usize,
    /// Idle quota buckets removed.
    pub buckets_removed: usize,
    /// Public keys still tracked by the replay guard.
    pub replay_keys: usize,
    /// Devices still tracked by the limiter.
    pub devices: usize,
    /// Messages in the ledger.
    pub messages: usize,
}

// ---------------------------------------------------------------------------
// Sweep entry point
// ---------------------------------------------------------------------------

/// Sweeps the replay guard as of `now_ms` and the limiter as of `now`.
///
/// # Errors
///
/// Returns [`pqbook_types::PqbookError::Internal`] if a table lock is
/// poisoned. The replay sweep runs first; a limiter failure does not
/// undo it.
pub fn run_sweep(
    replay: &ReplayGuard,
    limiter: &AdmissionLimiter,
    ledger: &MessageLedger,
    now_ms: i64,
    now: Instant,
) -> Result<SweepReport> {
    let replay_entries_removed = replay.sweep(now_ms)?;
    let buckets_removed = limiter.sweep(now)?;

    let report = SweepReport {
        replay_entries_removed,
        buckets_removed,
        replay_keys: replay.tracked_keys()?,
        devices: limiter.tracked_devices(),
        messages: ledger.len(),
    };

    tracing::debug!(
        replay_removed = report.replay_entries_removed,
        buckets_removed = report.buckets_removed,
        replay_keys = report.replay_keys,
        devices = report.devices,
        messages = report.messages,
        "maintenance sweep completed"
    );

    Ok(report)
}

/// Spawns a task that sweeps the pipeline's tables every
/// `sweep_interval_secs` until `shutdown` flips to `true` or its
/// sender is dropped.
pub fn spawn_sweeper(
    pipeline: Arc<SubmissionPipeline>,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = pipeline.config().sweep_interval();
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // The first tick completes immediately.
        tick.tick().await;

        tracing::info!(interval_secs = period.as_secs(), "maintenance sweeper started");

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = run_sweep(
                        pipeline.replay_guard(),
                        pipeline.limiter(),
                        pipeline.ledger(),
                        current_time_ms(),
                        Instant::now(),
                    ) {
                        tracing::warn!(%e, "maintenance sweep failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("maintenance sweeper stopped");
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
