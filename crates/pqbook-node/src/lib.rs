//! pqbook admission runtime.
//!
//! Owns the process-wide tracking tables (quota buckets, message
//! ledger) and orchestrates the submission pipeline over them,
//! together with the periodic sweep that keeps those tables bounded.

pub mod ledger;
pub mod maintenance;
pub mod pipeline;
pub mod rate_limiter;
