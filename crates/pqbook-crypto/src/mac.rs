//! HMAC-SHA256 and pseudonymous device identifiers.
//!
//! The admission limiter never sees a user agent in the clear. It
//! keys its buckets on `HMAC-SHA256(secret, user_agent)` truncated to
//! [`DeviceId::LEN`] bytes, which is stable per sender but cannot be
//! reversed without the server-held [`DeviceSecret`].

use std::fmt;

use hmac::{Hmac, Mac};
use pqbook_types::{DeviceId, PqbookError, Result};
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// HMAC-SHA256 type alias.
type HmacSha256 = Hmac<Sha256>;

/// Required byte length of the server secret.
pub const DEVICE_SECRET_LEN: usize = 32;

// ---------------------------------------------------------------------------
// DeviceSecret
// ---------------------------------------------------------------------------

/// Server-held key for device-id derivation.
///
/// Zeroized on drop. `Debug` is redacted so the secret never reaches
/// a log line.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DeviceSecret([u8; DEVICE_SECRET_LEN]);

impl DeviceSecret {
    /// Wraps raw secret bytes.
    pub fn from_bytes(bytes: [u8; DEVICE_SECRET_LEN]) -> Self {
        Self(bytes)
    }

    /// Parses a hex string that must decode to exactly 32 bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PqbookError::ConfigError`] if the string is empty,
    /// not valid hex, or decodes to the wrong length.
    pub fn from_hex(encoded: &str) -> Result<Self> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(PqbookError::ConfigError {
                reason: "device secret is empty".into(),
            });
        }

        let mut bytes = hex::decode(encoded).map_err(|e| PqbookError::ConfigError {
            reason: format!("device secret must be hex: {e}"),
        })?;

        if bytes.len() != DEVICE_SECRET_LEN {
            let len = bytes.len();
            bytes.zeroize();
            return Err(PqbookError::ConfigError {
                reason: format!(
                    "device secret must decode to exactly {DEVICE_SECRET_LEN} bytes, got {len}"
                ),
            });
        }

        let mut arr = [0u8; DEVICE_SECRET_LEN];
        arr.copy_from_slice(&bytes);
        bytes.zeroize();
        Ok(Self(arr))
    }

    /// Returns the raw secret bytes.
    pub fn as_bytes(&self) -> &[u8; DEVICE_SECRET_LEN] {
        &self.0
    }
}

impl fmt::Debug for DeviceSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceSecret([REDACTED])")
    }
}

// ---------------------------------------------------------------------------
// HMAC
// ---------------------------------------------------------------------------

/// Computes HMAC-SHA256 over `data` using `key`.
///
/// # Errors
///
/// Returns [`PqbookError::CryptoError`] if HMAC initialisation fails
/// (should not happen with SHA-256, but we avoid `unwrap`).
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<[u8; 32]> {
    let mut mac = HmacSha256::new_from_slice(key).map_err(|e| PqbookError::CryptoError {
        reason: format!("HMAC-SHA256 key init failed: {e}"),
    })?;
    mac.update(data);
    let result = mac.finalize().into_bytes();

    let mut output = [0u8; 32];
    output.copy_from_slice(&result);
    Ok(output)
}

/// Derives the pseudonymous [`DeviceId`] for a declared user agent.
///
/// `DeviceId = HMAC-SHA256(secret, user_agent)[..8]`. An empty user
/// agent is valid input and maps to one shared identifier.
pub fn derive_device_id(secret: &DeviceSecret, user_agent: &str) -> Result<DeviceId> {
    let tag = hmac_sha256(secret.as_bytes(), user_agent.as_bytes())?;
    let mut id = [0u8; DeviceId::LEN];
    id.copy_from_slice(&tag[..DeviceId::LEN]);
    Ok(DeviceId::new(id))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
