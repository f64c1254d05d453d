//! Admission configuration with sensible defaults.
//!
//! Every bound and policy consumed by the admission pipeline lives
//! here. Defaults reproduce the reference guestbook deployment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{PqbookError, Result};

/// How the client-declared algorithm hint is treated.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlgorithmHintPolicy {
    /// The hint is informational; a mismatch is only logged.
    #[default]
    Ignore,
    /// A non-empty hint that does not name the scheme derived from the
    /// key length rejects the submission.
    Enforce,
}

/// Bounds, freshness window and quota policy for the admission pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Maximum author length in bytes, after trimming.
    pub max_author_len: usize,

    /// Maximum content length in bytes, after trimming.
    pub max_content_len: usize,

    /// Maximum summed size of all submission fields. Also used by the
    /// HTTP layer as the raw body limit.
    pub max_request_bytes: usize,

    /// Maximum decoded public key size, checked before any decoding work.
    pub max_public_key_bytes: usize,

    /// Maximum decoded signature size, checked before any decoding work.
    pub max_signature_bytes: usize,

    /// Allowed skew between the signed timestamp and server time (±).
    pub freshness_window_ms: i64,

    /// How long accepted (key, timestamp) pairs are remembered. Must be
    /// at least the freshness window, otherwise a still-fresh message
    /// could be replayed after its record is swept.
    pub replay_retention_ms: i64,

    /// Token bucket ceiling per device.
    pub burst_capacity: f64,

    /// Continuous refill rate per device, tokens per second.
    pub refill_per_sec: f64,

    /// Idle buckets are swept after this many full-refill periods.
    pub bucket_idle_multiple: u32,

    /// Interval between maintenance sweeps.
    pub sweep_interval_secs: u64,

    /// Treatment of the client algorithm hint.
    pub algorithm_hint_policy: AlgorithmHintPolicy,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_author_len: 80,
            max_content_len: 2000,
            max_request_bytes: 16 * 1024,
            max_public_key_bytes: 5000,
            max_signature_bytes: 5000,
            freshness_window_ms: 15_000,
            replay_retention_ms: 30_000,
            burst_capacity: 8.0,
            refill_per_sec: 0.25,
            bucket_idle_multiple: 2,
            sweep_interval_secs: 30,
            algorithm_hint_policy: AlgorithmHintPolicy::Ignore,
        }
    }
}

impl AdmissionConfig {
    /// Validates all configuration values.
    ///
    /// Returns an error if any value is outside its acceptable range.
    pub fn validate(&self) -> Result<()> {
        if self.max_author_len == 0 {
            return Err(config_err("max_author_len must be greater than 0"));
        }

        if self.max_content_len == 0 {
            return Err(config_err("max_content_len must be greater than 0"));
        }

        if self.max_request_bytes == 0 {
            return Err(config_err("max_request_bytes must be greater than 0"));
        }

        if self.max_public_key_bytes == 0 || self.max_signature_bytes == 0 {
            return Err(config_err(
                "max_public_key_bytes and max_signature_bytes must be greater than 0",
            ));
        }

        if self.freshness_window_ms <= 0 {
            return Err(config_err("freshness_window_ms must be greater than 0"));
        }

        if self.replay_retention_ms < self.freshness_window_ms {
            return Err(config_err(
                "replay_retention_ms must be at least freshness_window_ms",
            ));
        }

        if !self.burst_capacity.is_finite() || self.burst_capacity < 1.0 {
            return Err(config_err("burst_capacity must be a finite value >= 1"));
        }

        if !self.refill_per_sec.is_finite() || self.refill_per_sec <= 0.0 {
            return Err(config_err("refill_per_sec must be a finite value > 0"));
        }

        if self.bucket_idle_multiple == 0 {
            return Err(config_err("bucket_idle_multiple must be greater than 0"));
        }

        if self.sweep_interval_secs == 0 {
            return Err(config_err("sweep_interval_secs must be greater than 0"));
        }

        self.bucket_idle_threshold()?;

        Ok(())
    }

    /// Time for an empty bucket to refill to `burst_capacity`.
    ///
    /// # Errors
    ///
    /// Returns [`PqbookError::ConfigError`] if the period is not a
    /// representable [`Duration`] (zero or non-finite refill rate, or a
    /// burst/refill ratio too large).
    pub fn full_refill_period(&self) -> Result<Duration> {
        Duration::try_from_secs_f64(self.burst_capacity / self.refill_per_sec).map_err(|e| {
            config_err(&format!(
                "burst_capacity / refill_per_sec is not a valid duration: {e}"
            ))
        })
    }

    /// Idle time after which a bucket is dropped by the sweeper.
    ///
    /// # Errors
    ///
    /// Returns [`PqbookError::ConfigError`] if the refill period is
    /// invalid or the multiple overflows.
    pub fn bucket_idle_threshold(&self) -> Result<Duration> {
        self.full_refill_period()?
            .checked_mul(self.bucket_idle_multiple)
            .ok_or_else(|| config_err("bucket idle threshold overflows"))
    }

    /// Interval between maintenance sweeps.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn config_err(reason: &str) -> PqbookError {
    PqbookError::ConfigError {
        reason: reason.into(),
    }
}
