//! Submission admission pipeline.
//!
//! Runs a [`Submission`] through the admission gates in a fixed order,
//! short-circuiting at the first failure:
//!
//! 1. **Structural validation**: trimmed author/content bounds, total size.
//! 2. **Size bounds**: key/signature byte limits around base64 decoding.
//! 3. **Freshness**: timestamp within the configured window.
//! 4. **Signature**: scheme from key length, hint policy, canonical
//!    payload, ML-DSA verification.
//! 5. **Replay**: record `(public key, timestamp)` once.
//! 6. **Quota**: per-device token bucket.
//! 7. **Ledger**: append the admitted message.
//!
//! Gates 1 to 4 touch no shared state. Verification runs outside every
//! lock. If gate 6 rejects, the replay record written by gate 5 for the
//! same request is released, so a rejected request leaves no trace in
//! any table.

use std::sync::Arc;
use std::time::Instant;

use pqbook_crypto::hash::key_fingerprint;
use pqbook_crypto::signing::SignatureVerifier;
use pqbook_protocol::canonical::canonicalize;
use pqbook_protocol::replay::ReplayGuard;
use pqbook_protocol::validation::{
    check_algorithm_hint, current_time_ms, decode_bounded, validate_fields, validate_freshness,
};
use pqbook_types::config::AdmissionConfig;
use pqbook_types::{PqbookError, Result, SignatureScheme, StoredMessage, Submission};

use crate::ledger::MessageLedger;
use crate::rate_limiter::AdmissionLimiter;

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// Outcome of a successful submission.
#[derive(Clone, Debug)]
pub struct Admission {
    /// The stored entry, as now visible in the ledger.
    pub message: Arc<StoredMessage>,
    /// Scheme derived from the public key length.
    pub scheme: SignatureScheme,
    /// Short hex fingerprint of the sender's public key.
    pub key_fingerprint: String,
    /// Position in the ledger's append order, starting at 1.
    pub sequence: u64,
}

// ---------------------------------------------------------------------------
// SubmissionPipeline
// ---------------------------------------------------------------------------

/// Orchestrates the admission gates over shared tracking tables.
///
/// The pipeline never owns the tables; they are constructed once at
/// startup and handed in, so each can be inspected or swept
/// independently.
pub struct SubmissionPipeline {
    config: AdmissionConfig,
    verifier: SignatureVerifier,
    replay: Arc<ReplayGuard>,
    limiter: Arc<AdmissionLimiter>,
    ledger: Arc<MessageLedger>,
}

impl SubmissionPipeline {
    /// Wires the pipeline over existing tables.
    ///
    /// # Errors
    ///
    /// Returns [`PqbookError::ConfigError`] if `config` fails validation.
    pub fn new(
        config: AdmissionConfig,
        replay: Arc<ReplayGuard>,
        limiter: Arc<AdmissionLimiter>,
        ledger: Arc<MessageLedger>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            verifier: SignatureVerifier::new(),
            replay,
            limiter,
            ledger,
        })
    }

    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    pub fn replay_guard(&self) -> &Arc<ReplayGuard> {
        &self.replay
    }

    pub fn limiter(&self) -> &Arc<AdmissionLimiter> {
        &self.limiter
    }

    pub fn ledger(&self) -> &Arc<MessageLedger> {
        &self.ledger
    }

    /// Admits `submission` against the current wall-clock time.
    pub fn submit(&self, submission: &Submission) -> Result<Admission> {
        self.submit_at(submission, current_time_ms(), Instant::now())
    }

    /// Admits `submission` as of `now_ms` (freshness, `accepted_at`)
    /// and `now` (quota refill).
    ///
    /// # Errors
    ///
    /// Returns the [`PqbookError`] of the first gate that rejects.
    pub fn submit_at(
        &self,
        submission: &Submission,
        now_ms: i64,
        now: Instant,
    ) -> Result<Admission> {
        let outcome = self.run_gates(submission, now_ms, now);

        match &outcome {
            Ok(admission) => {
                tracing::info!(
                    scheme = %admission.scheme,
                    key = %admission.key_fingerprint,
                    ts = admission.message.timestamp,
                    "submission accepted"
                );
            }
            Err(e) if e.is_client_fault() => {
                tracing::debug!(kind = %e.kind(), %e, "submission rejected");
            }
            Err(e) => {
                tracing::warn!(kind = %e.kind(), %e, "submission failed");
            }
        }

        outcome
    }

    /// Gates 1 to 7 in order.
    ///
    /// A `ReplayDetected` outcome can be transient under quota pressure:
    /// when two identical submissions race, the loser sees the winner's
    /// replay record, and if the winner is then refused a token that
    /// record is released. The same message may then be admitted on a
    /// later retry although it was once reported as a replay.
    fn run_gates(&self, submission: &Submission, now_ms: i64, now: Instant) -> Result<Admission> {
        let config = &self.config;

        // 1. Structural validation.
        let fields = validate_fields(submission, config)?;

        // 2. Size bounds and decoding.
        let public_key =
            decode_bounded(&submission.public_key, "pubkey", config.max_public_key_bytes)?;
        let signature = decode_bounded(&submission.signature, "sig", config.max_signature_bytes)?;

        // 3. Freshness.
        validate_freshness(submission.timestamp, now_ms, config.freshness_window_ms)?;

        // 4. Signature over the canonical payload.
        let scheme = SignatureScheme::from_public_key_len(public_key.len()).ok_or(
            PqbookError::UnsupportedKeySize {
                len: public_key.len(),
            },
        )?;
        check_algorithm_hint(
            config.algorithm_hint_policy,
            &submission.algorithm_hint,
            scheme,
        )?;

        let payload = canonicalize(&fields.author, &fields.content, submission.timestamp);
        let verification = self.verifier.verify(&public_key, &payload, &signature)?;
        if !verification.valid {
            return Err(PqbookError::SignatureInvalid {
                reason: format!("{scheme} signature does not match payload"),
            });
        }

        let fingerprint = key_fingerprint(&public_key);

        // 5. Replay.
        if !self.replay.check_and_record(&public_key, submission.timestamp)? {
            tracing::debug!(key = %fingerprint, ts = submission.timestamp, "replayed submission");
            return Err(PqbookError::ReplayDetected {
                reason: "this signed message was already accepted".into(),
            });
        }

        // 6. Quota. On rejection, undo step 5 for this request.
        if let Err(e) = self.consume_quota(submission.user_agent(), now) {
            self.replay.release(&public_key, submission.timestamp)?;
            return Err(e);
        }

        // 7. Ledger.
        let (sequence, message) = self.ledger.append(StoredMessage {
            author: fields.author,
            content: fields.content,
            timestamp: submission.timestamp,
            algorithm_hint: submission.algorithm_hint.clone(),
            signature: submission.signature.clone(),
            public_key: submission.public_key.clone(),
            scheme,
            accepted_at: now_ms,
            client: submission.client.clone(),
        })?;

        tracing::debug!(key = %fingerprint, sequence, "message appended");

        Ok(Admission {
            message,
            scheme,
            key_fingerprint: fingerprint,
            sequence,
        })
    }

    fn consume_quota(&self, user_agent: &str, now: Instant) -> Result<()> {
        let device = self.limiter.device_id(user_agent)?;
        self.limiter.check_at(&device, now)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pqbook_crypto::mac::DeviceSecret;
    use pqbook_crypto::signing::SchemeKeypair;
    use pqbook_protocol::validation::encode_base64;
    use pqbook_types::config::AlgorithmHintPolicy;
    use pqbook_types::ClientMeta;

    const NOW: i64 = 1_700_000_000_000;

    fn pipeline(config: AdmissionConfig) -> std::result::Result<SubmissionPipeline, PqbookError> {
        let limiter = AdmissionLimiter::new(DeviceSecret::from_bytes([0x42; 32]), &config)?;
        SubmissionPipeline::new(
            config.clone(),
            Arc::new(ReplayGuard::new(config.replay_retention_ms)),
            Arc::new(limiter),
            Arc::new(MessageLedger::new()),
        )
    }

    fn signed(kp: &SchemeKeypair, content: &str, ts: i64) -> std::result::Result<Submission, PqbookError> {
        let sig = kp.sign(&canonicalize("ada", content, ts))?;
        Ok(Submission {
            author: "ada".into(),
            content: content.into(),
            timestamp: ts,
            algorithm_hint: kp.scheme().name().into(),
            signature: encode_base64(&sig),
            public_key: encode_base64(&kp.public_key_bytes()),
            client: ClientMeta {
                user_agent: Some("test-agent".into()),
                ..ClientMeta::default()
            },
        })
    }

    #[test]
    fn accepted_message_is_stored_with_scheme() -> std::result::Result<(), PqbookError> {
        let p = pipeline(AdmissionConfig::default())?;
        let kp = SchemeKeypair::from_seed(SignatureScheme::MlDsa65, &[0x01; 32]);
        let admission = p.submit_at(&signed(&kp, "hello", NOW)?, NOW, Instant::now())?;

        assert_eq!(admission.scheme, SignatureScheme::MlDsa65);
        assert_eq!(admission.message.accepted_at, NOW);
        assert_eq!(p.ledger().len(), 1);
        Ok(())
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = AdmissionConfig {
            refill_per_sec: 0.0,
            ..AdmissionConfig::default()
        };
        assert!(matches!(pipeline(config), Err(PqbookError::ConfigError { .. })));
    }

    #[test]
    fn unrepresentable_refill_period_is_rejected() {
        let config = AdmissionConfig {
            burst_capacity: 1e12,
            refill_per_sec: 1e-9,
            ..AdmissionConfig::default()
        };
        assert!(matches!(pipeline(config), Err(PqbookError::ConfigError { .. })));
    }

    #[test]
    fn structural_failure_skips_verification() -> std::result::Result<(), PqbookError> {
        let p = pipeline(AdmissionConfig::default())?;
        let kp = SchemeKeypair::from_seed(SignatureScheme::MlDsa44, &[0x02; 32]);
        let mut sub = signed(&kp, "hello", NOW)?;
        sub.author = "   ".into();

        let result = p.submit_at(&sub, NOW, Instant::now());
        assert!(matches!(result, Err(PqbookError::InvalidInput { .. })));
        assert_eq!(p.verifier().crypto_invocations(), 0);
        Ok(())
    }

    #[test]
    fn future_timestamp_rejected_before_verification() -> std::result::Result<(), PqbookError> {
        let p = pipeline(AdmissionConfig::default())?;
        let kp = SchemeKeypair::from_seed(SignatureScheme::MlDsa44, &[0x03; 32]);
        let result = p.submit_at(&signed(&kp, "hello", NOW + 16_000)?, NOW, Instant::now());

        assert!(matches!(result, Err(PqbookError::StaleOrFutureTimestamp { .. })));
        assert_eq!(p.verifier().crypto_invocations(), 0);
        Ok(())
    }

    #[test]
    fn enforced_hint_mismatch_is_invalid_input() -> std::result::Result<(), PqbookError> {
        let p = pipeline(AdmissionConfig {
            algorithm_hint_policy: AlgorithmHintPolicy::Enforce,
            ..AdmissionConfig::default()
        })?;
        let kp = SchemeKeypair::from_seed(SignatureScheme::MlDsa44, &[0x04; 32]);
        let mut sub = signed(&kp, "hello", NOW)?;
        sub.algorithm_hint = "ML-DSA-87".into();

        let result = p.submit_at(&sub, NOW, Instant::now());
        assert!(matches!(result, Err(PqbookError::InvalidInput { .. })));
        assert_eq!(p.verifier().crypto_invocations(), 0);
        Ok(())
    }

    #[test]
    fn ignored_hint_mismatch_is_accepted() -> std::result::Result<(), PqbookError> {
        let p = pipeline(AdmissionConfig::default())?;
        let kp = SchemeKeypair::from_seed(SignatureScheme::MlDsa44, &[0x05; 32]);
        let mut sub = signed(&kp, "hello", NOW)?;
        sub.algorithm_hint = "Dilithium5".into();

        p.submit_at(&sub, NOW, Instant::now())?;
        Ok(())
    }

    #[test]
    fn invalid_signature_leaves_no_replay_record() -> std::result::Result<(), PqbookError> {
        let p = pipeline(AdmissionConfig::default())?;
        let kp = SchemeKeypair::from_seed(SignatureScheme::MlDsa87, &[0x06; 32]);
        let mut sub = signed(&kp, "hello", NOW)?;
        sub.content = "hellO".into();

        let result = p.submit_at(&sub, NOW, Instant::now());
        assert!(matches!(result, Err(PqbookError::SignatureInvalid { .. })));
        assert_eq!(p.replay_guard().tracked_entries()?, 0);
        assert_eq!(p.limiter().tracked_devices(), 0);
        assert!(p.ledger().is_empty());
        Ok(())
    }

    #[test]
    fn quota_rejection_releases_replay_record() -> std::result::Result<(), PqbookError> {
        let p = pipeline(AdmissionConfig {
            burst_capacity: 1.0,
            ..AdmissionConfig::default()
        })?;
        let kp = SchemeKeypair::from_seed(SignatureScheme::MlDsa44, &[0x07; 32]);
        let t0 = Instant::now();

        p.submit_at(&signed(&kp, "first", NOW)?, NOW, t0)?;
        let second = signed(&kp, "second", NOW + 1)?;
        let result = p.submit_at(&second, NOW + 1, t0);
        assert!(matches!(result, Err(PqbookError::QuotaExceeded)));
        assert_eq!(p.replay_guard().tracked_entries()?, 1);
        assert_eq!(p.ledger().len(), 1);

        // Once the bucket refills, the very same signed message is
        // admitted: it was never recorded as seen.
        let later = t0 + std::time::Duration::from_secs(4);
        p.submit_at(&second, NOW + 1, later)?;
        assert_eq!(p.ledger().len(), 2);
        Ok(())
    }
}
