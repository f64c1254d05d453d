//! Cryptographic primitives for the pqbook admission pipeline.
//!
//! This crate is the **sole** location for raw cryptographic
//! operations. No other crate in the workspace touches a primitive
//! directly.
//!
//! # Modules
//!
//! - [`signing`]: ML-DSA keypairs and length-dispatched verification
//! - [`mac`]: HMAC-SHA256, the server secret, and device-id derivation
//! - [`hash`]: SHA-256 digests and public-key fingerprints for logs

pub mod hash;
pub mod mac;
pub mod signing;
