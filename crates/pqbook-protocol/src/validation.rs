//! Structural, size and freshness gates.
//!
//! Everything here is pure and cheap: no shared state is touched and
//! no signature primitive is invoked. The pipeline runs these gates
//! first so that garbage input is rejected before any expensive or
//! state-mutating work.
//!
//! # Gates
//!
//! 1. [`validate_fields`]: trimmed author/content bounds and total size
//! 2. [`decode_bounded`]: key/signature byte bounds around base64 decoding
//! 3. [`validate_freshness`]: timestamp within the freshness window
//!
//! [`check_algorithm_hint`] applies the configured policy to the
//! client-declared algorithm label.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use pqbook_types::config::{AdmissionConfig, AlgorithmHintPolicy};
use pqbook_types::{PqbookError, Result, SignatureScheme, Submission};

/// Standard-alphabet base64 that emits no padding and accepts input
/// with or without it.
pub const BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

// ---------------------------------------------------------------------------
// Structural validation
// ---------------------------------------------------------------------------

/// Author and content after trimming, ready for canonicalization.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ValidatedFields {
    /// Trimmed author.
    pub author: String,
    /// Trimmed content.
    pub content: String,
}

/// Gate 1: trims author and content and enforces their bounds, then
/// bounds the summed size of all submitted fields.
///
/// Lengths are measured in UTF-8 bytes.
///
/// # Errors
///
/// - [`PqbookError::InvalidInput`] if author or content is empty after
///   trimming.
/// - [`PqbookError::PayloadTooLarge`] if a field or the submission as
///   a whole exceeds its bound.
pub fn validate_fields(submission: &Submission, config: &AdmissionConfig) -> Result<ValidatedFields> {
    let author = submission.author.trim();
    let content = submission.content.trim();

    if author.is_empty() || content.is_empty() {
        return Err(PqbookError::InvalidInput {
            reason: "author and content must not be empty".into(),
        });
    }

    if author.len() > config.max_author_len {
        return Err(PqbookError::PayloadTooLarge {
            reason: format!(
                "author is {} bytes, limit is {}",
                author.len(),
                config.max_author_len
            ),
        });
    }

    if content.len() > config.max_content_len {
        return Err(PqbookError::PayloadTooLarge {
            reason: format!(
                "content is {} bytes, limit is {}",
                content.len(),
                config.max_content_len
            ),
        });
    }

    let total = submission.declared_size();
    if total > config.max_request_bytes {
        return Err(PqbookError::PayloadTooLarge {
            reason: format!(
                "submission is {total} bytes, limit is {}",
                config.max_request_bytes
            ),
        });
    }

    Ok(ValidatedFields {
        author: author.to_owned(),
        content: content.to_owned(),
    })
}

// ---------------------------------------------------------------------------
// Bounded base64 decoding
// ---------------------------------------------------------------------------

/// Longest base64 string that can decode to at most `max_bytes` bytes.
fn max_encoded_len(max_bytes: usize) -> usize {
    max_bytes.div_ceil(3).saturating_mul(4)
}

/// Gate 2: decodes a base64 field while bounding its byte size.
///
/// The encoded length is checked before any decoding work, then the
/// decoded length is re-checked against `max_bytes`. `field` names the
/// field in error messages.
///
/// # Errors
///
/// - [`PqbookError::PayloadTooLarge`] if either length exceeds the bound.
/// - [`PqbookError::InvalidInput`] if the field is empty or not valid
///   base64.
pub fn decode_bounded(encoded: &str, field: &str, max_bytes: usize) -> Result<Vec<u8>> {
    if encoded.len() > max_encoded_len(max_bytes) {
        return Err(PqbookError::PayloadTooLarge {
            reason: format!("{field} exceeds {max_bytes} bytes"),
        });
    }

    if encoded.is_empty() {
        return Err(PqbookError::InvalidInput {
            reason: format!("{field} is missing"),
        });
    }

    let decoded = BASE64
        .decode(encoded)
        .map_err(|e| PqbookError::InvalidInput {
            reason: format!("{field} is not valid base64: {e}"),
        })?;

    if decoded.len() > max_bytes {
        return Err(PqbookError::PayloadTooLarge {
            reason: format!("{field} exceeds {max_bytes} bytes"),
        });
    }

    Ok(decoded)
}

/// Encodes bytes the way clients are expected to submit them.
pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

// ---------------------------------------------------------------------------
// Freshness
// ---------------------------------------------------------------------------

/// Current wall-clock time in milliseconds since the Unix epoch.
pub fn current_time_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Gate 3: accepts `timestamp` only if `|now_ms - timestamp| <= window_ms`.
///
/// # Errors
///
/// Returns [`PqbookError::StaleOrFutureTimestamp`] carrying the
/// observed drift (positive when stale, negative when future-dated).
pub fn validate_freshness(timestamp: i64, now_ms: i64, window_ms: i64) -> Result<()> {
    let drift_ms = now_ms.saturating_sub(timestamp);
    if drift_ms.unsigned_abs() > window_ms.unsigned_abs() {
        return Err(PqbookError::StaleOrFutureTimestamp {
            drift_ms,
            window_ms,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Algorithm hint
// ---------------------------------------------------------------------------

/// Lowercases and strips `-` / `_` so that `"ML-DSA-65"`, `"mldsa65"`
/// and `"ml_dsa_65"` compare equal.
fn normalize_hint(hint: &str) -> String {
    hint.chars()
        .filter(|c| *c != '-' && *c != '_' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Returns `true` if `hint` names `scheme`.
pub fn hint_matches(hint: &str, scheme: SignatureScheme) -> bool {
    normalize_hint(hint) == normalize_hint(scheme.name())
}

/// Applies `policy` to the client-declared algorithm hint.
///
/// An empty hint is always accepted. Under
/// [`AlgorithmHintPolicy::Ignore`] a mismatch is only logged.
///
/// # Errors
///
/// Returns [`PqbookError::InvalidInput`] under
/// [`AlgorithmHintPolicy::Enforce`] when a non-empty hint does not name
/// the scheme derived from the public key length.
pub fn check_algorithm_hint(
    policy: AlgorithmHintPolicy,
    hint: &str,
    scheme: SignatureScheme,
) -> Result<()> {
    if hint.trim().is_empty() || hint_matches(hint, scheme) {
        return Ok(());
    }

    match policy {
        AlgorithmHintPolicy::Ignore => {
            tracing::debug!(%scheme, hint, "algorithm hint does not match key length");
            Ok(())
        }
        AlgorithmHintPolicy::Enforce => Err(PqbookError::InvalidInput {
            reason: format!("declared algorithm does not match {scheme} public key"),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
