//! Per-device token bucket admission limiter.
//!
//! Each pseudonymous [`DeviceId`] gets an independent bucket. Tokens
//! refill continuously at `refill_per_sec` up to `burst_capacity`;
//! each admitted request consumes one. Refill and consumption happen
//! under a single lock acquisition so concurrent requests from one
//! device cannot spend the same token twice.
//!
//! Buckets idle for longer than the configured threshold are removed
//! by [`AdmissionLimiter::sweep`]. The threshold is a multiple of the
//! full-refill period, so a swept bucket would have been full anyway.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use pqbook_crypto::mac::{derive_device_id, DeviceSecret};
use pqbook_types::config::AdmissionConfig;
use pqbook_types::{DeviceId, PqbookError, Result};

// ---------------------------------------------------------------------------
// Bucket
// ---------------------------------------------------------------------------

/// Per-device token state.
struct Bucket {
    /// Current number of available tokens (fractional).
    tokens: f64,
    /// Time of the last refill computation, i.e. the last request.
    last_refill: Instant,
}

impl Bucket {
    fn refill(&mut self, capacity: f64, per_sec: f64, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill);
        if elapsed.is_zero() {
            return;
        }
        self.tokens = (self.tokens + elapsed.as_secs_f64() * per_sec).min(capacity);
        self.last_refill = now;
    }
}

// ---------------------------------------------------------------------------
// AdmissionLimiter
// ---------------------------------------------------------------------------

/// Thread-safe, per-device token bucket limiter.
///
/// Holds the server secret used to derive device identifiers, so the
/// raw user agent never needs to be stored.
pub struct AdmissionLimiter {
    secret: DeviceSecret,
    buckets: Mutex<HashMap<DeviceId, Bucket>>,
    burst_capacity: f64,
    refill_per_sec: f64,
    idle_threshold: Duration,
}

impl AdmissionLimiter {
    /// Creates a limiter with the quota policy from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`PqbookError::ConfigError`] if `config` fails validation.
    pub fn new(secret: DeviceSecret, config: &AdmissionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            secret,
            buckets: Mutex::new(HashMap::new()),
            burst_capacity: config.burst_capacity,
            refill_per_sec: config.refill_per_sec,
            idle_threshold: config.bucket_idle_threshold()?,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<DeviceId, Bucket>>> {
        self.buckets.lock().map_err(|_| PqbookError::Internal {
            reason: "rate limiter lock poisoned".into(),
        })
    }

    /// Derives the pseudonymous device id for a declared user agent.
    pub fn device_id(&self, user_agent: &str) -> Result<DeviceId> {
        derive_device_id(&self.secret, user_agent)
    }

    /// Refills and consumes one token for `device` as of `now`.
    ///
    /// A device seen for the first time starts with a full bucket.
    ///
    /// # Errors
    ///
    /// - [`PqbookError::QuotaExceeded`] if fewer than one token is
    ///   available. The bucket is left unconsumed.
    /// - [`PqbookError::Internal`] if the lock is poisoned.
    pub fn check_at(&self, device: &DeviceId, now: Instant) -> Result<()> {
        let mut buckets = self.lock()?;

        let capacity = self.burst_capacity;
        let bucket = buckets.entry(*device).or_insert_with(|| Bucket {
            tokens: capacity,
            last_refill: now,
        });

        bucket.refill(capacity, self.refill_per_sec, now);

        if bucket.tokens >= 1.0 {
            bucket.tokens -= 1.0;
            Ok(())
        } else {
            Err(PqbookError::QuotaExceeded)
        }
    }

    /// Removes buckets idle for longer than the idle threshold.
    ///
    /// Returns the number of buckets removed.
    pub fn sweep(&self, now: Instant) -> Result<usize> {
        let mut buckets = self.lock()?;
        let before = buckets.len();
        let threshold = self.idle_threshold;
        buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) <= threshold);
        Ok(before - buckets.len())
    }

    /// Returns the number of currently tracked devices.
    pub fn tracked_devices(&self) -> usize {
        self.buckets.lock().map(|inner| inner.len()).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
