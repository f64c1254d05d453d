//! Submission protocol for the pqbook guestbook.
//!
//! Defines the canonical signed payload, the structural and freshness
//! gates a submission passes before any signature work, and per-key
//! replay protection.
//!
//! # Modules
//!
//! - [`canonical`]: Length-prefixed canonical payload encoding
//! - [`validation`]: Field bounds, base64 decoding, freshness, algorithm hints
//! - [`replay`]: Per-public-key timestamp ledger for replay detection

pub mod canonical;
pub mod replay;
pub mod validation;
