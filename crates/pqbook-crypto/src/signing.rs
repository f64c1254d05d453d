//! ML-DSA signing keypairs and length-dispatched verification.
//!
//! The verifier is handed a public key and signature of unknown
//! strength. It selects the scheme purely from the public key length
//! ([`SignatureScheme::from_public_key_len`]) and fails fast with
//! [`PqbookError::UnsupportedKeySize`] before touching any primitive
//! when the length is not in the table.
//!
//! All signatures use the pure ML-DSA mode with an empty context
//! string.

use std::sync::atomic::{AtomicU64, Ordering};

use ml_dsa::{
    EncodedSignature, EncodedVerifyingKey, KeyGen, KeyPair, MlDsa44, MlDsa65, MlDsa87,
    MlDsaParams, Signature, VerifyingKey,
};
use pqbook_types::{PqbookError, Result, SignatureScheme};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

/// Empty ML-DSA context string.
const NO_CONTEXT: &[u8] = &[];

// ---------------------------------------------------------------------------
// SchemeKeypair
// ---------------------------------------------------------------------------

/// An ML-DSA signing keypair at one of the supported strengths.
///
/// Used by clients and tests to produce submissions; the server side
/// never holds a signing key.
pub enum SchemeKeypair {
    /// ML-DSA-44 keypair.
    MlDsa44(KeyPair<MlDsa44>),
    /// ML-DSA-65 keypair.
    MlDsa65(KeyPair<MlDsa65>),
    /// ML-DSA-87 keypair.
    MlDsa87(KeyPair<MlDsa87>),
}

// No Clone or Debug: signing keys stay out of copies and logs.

impl SchemeKeypair {
    /// Generates a new random keypair using OS-level entropy.
    pub fn generate(scheme: SignatureScheme) -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let keypair = Self::from_seed(scheme, &seed);
        seed.zeroize();
        keypair
    }

    /// Reconstructs a keypair deterministically from a 32-byte seed.
    ///
    /// Given the same scheme and seed, this always produces the same
    /// keypair.
    pub fn from_seed(scheme: SignatureScheme, seed: &[u8; 32]) -> Self {
        let xi = (*seed).into();
        match scheme {
            SignatureScheme::MlDsa44 => Self::MlDsa44(MlDsa44::key_gen_internal(&xi)),
            SignatureScheme::MlDsa65 => Self::MlDsa65(MlDsa65::key_gen_internal(&xi)),
            SignatureScheme::MlDsa87 => Self::MlDsa87(MlDsa87::key_gen_internal(&xi)),
        }
    }

    /// The strength of this keypair.
    pub fn scheme(&self) -> SignatureScheme {
        match self {
            Self::MlDsa44(_) => SignatureScheme::MlDsa44,
            Self::MlDsa65(_) => SignatureScheme::MlDsa65,
            Self::MlDsa87(_) => SignatureScheme::MlDsa87,
        }
    }

    /// Encoded public key bytes (the sender identity).
    pub fn public_key_bytes(&self) -> Vec<u8> {
        match self {
            Self::MlDsa44(kp) => kp.verifying_key().encode().to_vec(),
            Self::MlDsa65(kp) => kp.verifying_key().encode().to_vec(),
            Self::MlDsa87(kp) => kp.verifying_key().encode().to_vec(),
        }
    }

    /// Signs `message` deterministically with an empty context string.
    ///
    /// # Errors
    ///
    /// Returns [`PqbookError::CryptoError`] if the primitive refuses
    /// to sign.
    pub fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let encoded = match self {
            Self::MlDsa44(kp) => sign_with(kp, message)?,
            Self::MlDsa65(kp) => sign_with(kp, message)?,
            Self::MlDsa87(kp) => sign_with(kp, message)?,
        };
        Ok(encoded)
    }
}

fn sign_with<P: MlDsaParams>(keypair: &KeyPair<P>, message: &[u8]) -> Result<Vec<u8>> {
    let signature = keypair
        .signing_key()
        .sign_deterministic(message, NO_CONTEXT)
        .map_err(|e| PqbookError::CryptoError {
            reason: format!("ML-DSA signing failed: {e}"),
        })?;
    Ok(signature.encode().to_vec())
}

// ---------------------------------------------------------------------------
// SignatureVerifier
// ---------------------------------------------------------------------------

/// Result of running a scheme's verification routine.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Verification {
    /// Whether the signature verified.
    pub valid: bool,
    /// Scheme selected from the public key length.
    pub scheme: SignatureScheme,
}

/// Stateless verifier with an invocation counter.
///
/// The counter records how often a cryptographic primitive was
/// actually reached, which lets callers confirm that rejected key
/// shapes never cost a verification.
#[derive(Debug, Default)]
pub struct SignatureVerifier {
    invocations: AtomicU64,
}

impl SignatureVerifier {
    /// Creates a verifier with a zeroed counter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Verifies `signature` over `message` under `public_key`.
    ///
    /// # Errors
    ///
    /// - [`PqbookError::UnsupportedKeySize`] when the key length matches
    ///   no scheme. No primitive is invoked.
    /// - [`PqbookError::MalformedKey`] when the key has a supported
    ///   length but cannot be parsed for that scheme.
    ///
    /// A signature of the wrong length or encoding is reported as
    /// `valid: false`, not as an error.
    pub fn verify(
        &self,
        public_key: &[u8],
        message: &[u8],
        signature: &[u8],
    ) -> Result<Verification> {
        let scheme = SignatureScheme::from_public_key_len(public_key.len()).ok_or(
            PqbookError::UnsupportedKeySize {
                len: public_key.len(),
            },
        )?;

        self.invocations.fetch_add(1, Ordering::Relaxed);

        let valid = match scheme {
            SignatureScheme::MlDsa44 => verify_with::<MlDsa44>(public_key, message, signature)?,
            SignatureScheme::MlDsa65 => verify_with::<MlDsa65>(public_key, message, signature)?,
            SignatureScheme::MlDsa87 => verify_with::<MlDsa87>(public_key, message, signature)?,
        };

        Ok(Verification { valid, scheme })
    }

    /// Number of times a scheme's verification routine was entered.
    pub fn crypto_invocations(&self) -> u64 {
        self.invocations.load(Ordering::Relaxed)
    }
}

fn verify_with<P: MlDsaParams>(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<bool> {
    let encoded_key =
        EncodedVerifyingKey::<P>::try_from(public_key).map_err(|_| PqbookError::MalformedKey {
            reason: format!("cannot parse {} byte public key", public_key.len()),
        })?;
    let verifying_key = VerifyingKey::<P>::decode(&encoded_key);

    let Ok(encoded_sig) = EncodedSignature::<P>::try_from(signature) else {
        return Ok(false);
    };
    let Some(signature) = Signature::<P>::decode(&encoded_sig) else {
        return Ok(false);
    };

    Ok(verifying_key.verify_with_context(message, NO_CONTEXT, &signature))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoded_sizes_match_scheme_table() -> std::result::Result<(), PqbookError> {
        for scheme in SignatureScheme::ALL {
            let kp = SchemeKeypair::from_seed(scheme, &[0x11; 32]);
            assert_eq!(kp.scheme(), scheme);
            assert_eq!(kp.public_key_bytes().len(), scheme.public_key_len());
            assert_eq!(kp.sign(b"size probe")?.len(), scheme.signature_len());
        }
        Ok(())
    }

    #[test]
    fn every_scheme_verifies_its_own_signature() -> std::result::Result<(), PqbookError> {
        let verifier = SignatureVerifier::new();
        for scheme in SignatureScheme::ALL {
            let kp = SchemeKeypair::generate(scheme);
            let sig = kp.sign(b"hello")?;
            let outcome = verifier.verify(&kp.public_key_bytes(), b"hello", &sig)?;
            assert!(outcome.valid, "{scheme} signature must verify");
            assert_eq!(outcome.scheme, scheme);
        }
        assert_eq!(verifier.crypto_invocations(), 3);
        Ok(())
    }

    #[test]
    fn from_seed_is_deterministic() -> std::result::Result<(), PqbookError> {
        let kp1 = SchemeKeypair::from_seed(SignatureScheme::MlDsa65, &[0x42; 32]);
        let kp2 = SchemeKeypair::from_seed(SignatureScheme::MlDsa65, &[0x42; 32]);
        assert_eq!(kp1.public_key_bytes(), kp2.public_key_bytes());
        assert_eq!(kp1.sign(b"determinism")?, kp2.sign(b"determinism")?);
        Ok(())
    }

    #[test]
    fn wrong_message_fails_verification() -> std::result::Result<(), PqbookError> {
        let verifier = SignatureVerifier::new();
        let kp = SchemeKeypair::from_seed(SignatureScheme::MlDsa44, &[0x01; 32]);
        let sig = kp.sign(b"correct message")?;
        let outcome = verifier.verify(&kp.public_key_bytes(), b"wrong message", &sig)?;
        assert!(!outcome.valid);
        Ok(())
    }

    #[test]
    fn wrong_key_fails_verification() -> std::result::Result<(), PqbookError> {
        let verifier = SignatureVerifier::new();
        let kp1 = SchemeKeypair::from_seed(SignatureScheme::MlDsa87, &[0x01; 32]);
        let kp2 = SchemeKeypair::from_seed(SignatureScheme::MlDsa87, &[0x02; 32]);
        let sig = kp1.sign(b"test")?;
        let outcome = verifier.verify(&kp2.public_key_bytes(), b"test", &sig)?;
        assert!(!outcome.valid);
        Ok(())
    }

    #[test]
    fn unsupported_key_size_never_reaches_primitive() {
        let verifier = SignatureVerifier::new();
        for len in [0usize, 32, 1311, 1953, 4096] {
            let result = verifier.verify(&vec![0u8; len], b"msg", &[0u8; 2420]);
            assert!(matches!(
                result,
                Err(PqbookError::UnsupportedKeySize { len: l }) if l == len
            ));
        }
        assert_eq!(verifier.crypto_invocations(), 0);
    }

    #[test]
    fn signature_of_other_scheme_is_invalid_not_error() -> std::result::Result<(), PqbookError> {
        let verifier = SignatureVerifier::new();
        let kp44 = SchemeKeypair::from_seed(SignatureScheme::MlDsa44, &[0x05; 32]);
        let kp65 = SchemeKeypair::from_seed(SignatureScheme::MlDsa65, &[0x05; 32]);
        let sig65 = kp65.sign(b"cross")?;
        let outcome = verifier.verify(&kp44.public_key_bytes(), b"cross", &sig65)?;
        assert!(!outcome.valid);
        assert_eq!(outcome.scheme, SignatureScheme::MlDsa44);
        Ok(())
    }

    #[test]
    fn truncated_signature_is_invalid() -> std::result::Result<(), PqbookError> {
        let verifier = SignatureVerifier::new();
        let kp = SchemeKeypair::from_seed(SignatureScheme::MlDsa65, &[0x09; 32]);
        let sig = kp.sign(b"msg")?;
        let outcome = verifier.verify(&kp.public_key_bytes(), b"msg", &sig[..sig.len() - 1])?;
        assert!(!outcome.valid);
        Ok(())
    }
}
