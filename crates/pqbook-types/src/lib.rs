//! Core shared types for the pqbook signed-guestbook service.
//!
//! This crate defines every type that crosses a crate boundary in the
//! workspace: the inbound [`Submission`], the admitted
//! [`StoredMessage`], the pseudonymous [`DeviceId`], the closed set of
//! [`SignatureScheme`]s, and the central [`PqbookError`]. No other
//! crate should define shared types.

pub mod config;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// DeviceId
// ---------------------------------------------------------------------------

/// Pseudonymous per-device identifier used only for quota bookkeeping.
///
/// Derived as a truncated keyed hash of the declared user-agent string
/// (see `pqbook_crypto::mac::derive_device_id`). It cannot be reversed
/// to the user agent without the server secret, and is never used for
/// authentication.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct DeviceId([u8; 8]);

impl DeviceId {
    /// The fixed byte length of a device identifier.
    pub const LEN: usize = 8;

    /// Creates a new `DeviceId` from raw bytes.
    pub fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Returns the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

/// Renders as 16 lowercase hex characters.
impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

// ---------------------------------------------------------------------------
// SignatureScheme
// ---------------------------------------------------------------------------

/// The supported signature strengths (FIPS 204 ML-DSA parameter sets).
///
/// The effective scheme of a submission is always derived from the
/// byte length of its public key via [`SignatureScheme::from_public_key_len`],
/// never from the client-declared hint.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum SignatureScheme {
    /// ML-DSA-44 (NIST security category 2).
    #[serde(rename = "ML-DSA-44")]
    MlDsa44,
    /// ML-DSA-65 (NIST security category 3).
    #[serde(rename = "ML-DSA-65")]
    MlDsa65,
    /// ML-DSA-87 (NIST security category 5).
    #[serde(rename = "ML-DSA-87")]
    MlDsa87,
}

/// Public-key length → scheme lookup table.
const SCHEME_TABLE: [(usize, SignatureScheme); 3] = [
    (1312, SignatureScheme::MlDsa44),
    (1952, SignatureScheme::MlDsa65),
    (2592, SignatureScheme::MlDsa87),
];

impl SignatureScheme {
    /// All supported schemes, weakest first.
    pub const ALL: [SignatureScheme; 3] = [Self::MlDsa44, Self::MlDsa65, Self::MlDsa87];

    /// Selects the scheme whose encoded public key is exactly `len` bytes.
    ///
    /// Returns `None` for any length outside the table.
    pub fn from_public_key_len(len: usize) -> Option<Self> {
        SCHEME_TABLE
            .iter()
            .find(|(size, _)| *size == len)
            .map(|(_, scheme)| *scheme)
    }

    /// Encoded public key size in bytes.
    pub fn public_key_len(self) -> usize {
        match self {
            Self::MlDsa44 => 1312,
            Self::MlDsa65 => 1952,
            Self::MlDsa87 => 2592,
        }
    }

    /// Encoded signature size in bytes.
    pub fn signature_len(self) -> usize {
        match self {
            Self::MlDsa44 => 2420,
            Self::MlDsa65 => 3309,
            Self::MlDsa87 => 4627,
        }
    }

    /// Canonical display name, e.g. `"ML-DSA-65"`.
    pub fn name(self) -> &'static str {
        match self {
            Self::MlDsa44 => "ML-DSA-44",
            Self::MlDsa65 => "ML-DSA-65",
            Self::MlDsa87 => "ML-DSA-87",
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Submission
// ---------------------------------------------------------------------------

/// Informational client metadata. Never used for trust decisions; the
/// user agent only feeds the pseudonymous quota identifier.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientMeta {
    /// Browser label, e.g. `"Chrome 120"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    /// Platform label, e.g. `"Windows 10"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    /// Full declared user-agent string.
    #[serde(rename = "ua", skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl ClientMeta {
    /// Summed byte length of all present fields.
    pub fn declared_size(&self) -> usize {
        [&self.browser, &self.platform, &self.user_agent]
            .iter()
            .map(|f| f.as_ref().map_or(0, String::len))
            .sum()
    }
}

/// A signed submission as decoded from the transport, before any
/// admission gate has run.
///
/// Missing JSON fields decode to their zero values so that every
/// problem surfaces as a typed admission outcome rather than a decode
/// failure.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Submission {
    /// Display name of the author.
    pub author: String,
    /// Message body.
    pub content: String,
    /// Client-supplied signing time, milliseconds since the Unix epoch.
    #[serde(rename = "ts")]
    pub timestamp: i64,
    /// Client-declared algorithm label. Informational only.
    #[serde(rename = "algo")]
    pub algorithm_hint: String,
    /// Base64 signature over the canonical payload.
    #[serde(rename = "sig")]
    pub signature: String,
    /// Base64 public key; the raw bytes are the sender's identity.
    #[serde(rename = "pubkey")]
    pub public_key: String,
    /// Optional browser/platform/user-agent strings.
    #[serde(flatten)]
    pub client: ClientMeta,
}

impl Submission {
    /// Approximate wire size: the summed byte length of every text field.
    pub fn declared_size(&self) -> usize {
        self.author.len()
            + self.content.len()
            + self.algorithm_hint.len()
            + self.signature.len()
            + self.public_key.len()
            + self.client.declared_size()
    }

    /// The declared user agent, or the empty string when absent.
    pub fn user_agent(&self) -> &str {
        self.client.user_agent.as_deref().unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// StoredMessage
// ---------------------------------------------------------------------------

/// An admitted submission. Immutable once placed in the ledger.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Trimmed author.
    pub author: String,
    /// Trimmed content.
    pub content: String,
    /// Signed timestamp, milliseconds since the Unix epoch.
    #[serde(rename = "ts")]
    pub timestamp: i64,
    /// Hint as declared by the client.
    #[serde(rename = "algo")]
    pub algorithm_hint: String,
    /// Signature exactly as submitted (base64).
    #[serde(rename = "sig")]
    pub signature: String,
    /// Public key exactly as submitted (base64).
    #[serde(rename = "pubkey")]
    pub public_key: String,
    /// Scheme derived from the public key length.
    pub scheme: SignatureScheme,
    /// Server time of admission, milliseconds since the Unix epoch.
    pub accepted_at: i64,
    /// Client metadata as declared.
    #[serde(flatten)]
    pub client: ClientMeta,
}

// ---------------------------------------------------------------------------
// PqbookError
// ---------------------------------------------------------------------------

/// Central error type for the pqbook workspace.
///
/// Every admission gate reports its rejection through one of these
/// variants. All admission outcomes are client-attributable; only
/// [`PqbookError::ConfigError`], [`PqbookError::CryptoError`] and
/// [`PqbookError::Internal`] originate on the server side. No variant
/// carries the server secret, rate-limit bucket state, or another
/// sender's identity.
#[derive(Debug, Error)]
pub enum PqbookError {
    /// Empty fields, malformed encodings, or a rejected algorithm hint.
    #[error("invalid input: {reason}")]
    InvalidInput {
        /// Human-readable description of the problem.
        reason: String,
    },

    /// A field or the request as a whole exceeds its configured bound.
    #[error("payload too large: {reason}")]
    PayloadTooLarge {
        /// Which bound was exceeded.
        reason: String,
    },

    /// The submission timestamp lies outside the freshness window.
    #[error("timestamp not fresh: drift {drift_ms} ms exceeds ±{window_ms} ms")]
    StaleOrFutureTimestamp {
        /// `now - timestamp`; positive for stale, negative for future-dated.
        drift_ms: i64,
        /// The configured window.
        window_ms: i64,
    },

    /// The (public key, timestamp) pair was already accepted.
    #[error("replay detected: {reason}")]
    ReplayDetected {
        /// Human-readable description of the replay.
        reason: String,
    },

    /// The public key length matches no supported scheme.
    #[error("unsupported public key size: {len} bytes")]
    UnsupportedKeySize {
        /// Observed public key length.
        len: usize,
    },

    /// The public key has a supported length but fails to parse.
    #[error("malformed public key: {reason}")]
    MalformedKey {
        /// Parser diagnostic.
        reason: String,
    },

    /// The signature does not verify over the canonical payload.
    #[error("invalid signature: {reason}")]
    SignatureInvalid {
        /// Human-readable description of the failure.
        reason: String,
    },

    /// The sender's device quota is exhausted.
    #[error("rate limit exceeded")]
    QuotaExceeded,

    /// A configuration value is invalid or missing.
    #[error("config error: {reason}")]
    ConfigError {
        /// Human-readable description of the configuration problem.
        reason: String,
    },

    /// A cryptographic operation outside verification failed
    /// (key generation, signing, MAC initialisation).
    #[error("crypto error: {reason}")]
    CryptoError {
        /// Human-readable description of the failure.
        reason: String,
    },

    /// Shared state became unusable (poisoned lock).
    #[error("internal error: {reason}")]
    Internal {
        /// Human-readable description of the failure.
        reason: String,
    },
}

/// Stable, machine-readable label for each [`PqbookError`] variant.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionKind {
    InvalidInput,
    PayloadTooLarge,
    StaleOrFutureTimestamp,
    ReplayDetected,
    UnsupportedKeySize,
    MalformedKey,
    SignatureInvalid,
    QuotaExceeded,
    ConfigError,
    CryptoError,
    Internal,
}

impl RejectionKind {
    /// snake_case label used in logs and error bodies.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid_input",
            Self::PayloadTooLarge => "payload_too_large",
            Self::StaleOrFutureTimestamp => "stale_or_future_timestamp",
            Self::ReplayDetected => "replay_detected",
            Self::UnsupportedKeySize => "unsupported_key_size",
            Self::MalformedKey => "malformed_key",
            Self::SignatureInvalid => "signature_invalid",
            Self::QuotaExceeded => "quota_exceeded",
            Self::ConfigError => "config_error",
            Self::CryptoError => "crypto_error",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for RejectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PqbookError {
    /// Returns the stable kind label of this error.
    pub fn kind(&self) -> RejectionKind {
        match self {
            Self::InvalidInput { .. } => RejectionKind::InvalidInput,
            Self::PayloadTooLarge { .. } => RejectionKind::PayloadTooLarge,
            Self::StaleOrFutureTimestamp { .. } => RejectionKind::StaleOrFutureTimestamp,
            Self::ReplayDetected { .. } => RejectionKind::ReplayDetected,
            Self::UnsupportedKeySize { .. } => RejectionKind::UnsupportedKeySize,
            Self::MalformedKey { .. } => RejectionKind::MalformedKey,
            Self::SignatureInvalid { .. } => RejectionKind::SignatureInvalid,
            Self::QuotaExceeded => RejectionKind::QuotaExceeded,
            Self::ConfigError { .. } => RejectionKind::ConfigError,
            Self::CryptoError { .. } => RejectionKind::CryptoError,
            Self::Internal { .. } => RejectionKind::Internal,
        }
    }

    /// `true` for outcomes caused by the submitted data rather than
    /// the server.
    pub fn is_client_fault(&self) -> bool {
        !matches!(
            self,
            Self::ConfigError { .. } | Self::CryptoError { .. } | Self::Internal { .. }
        )
    }
}

// ---------------------------------------------------------------------------
// Result alias
// ---------------------------------------------------------------------------

/// Convenience result type using [`PqbookError`].
pub type Result<T> = std::result::Result<T, PqbookError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
