//! Canonical payload encoding.
//!
//! The canonical payload is the exact byte string a client signs and
//! the server verifies. It is a pure function of
//! `(author, content, timestamp)`:
//!
//! ```text
//! "pqbook/v1\n" || u32_be(len(author))  || author
//!               || u32_be(len(content)) || content
//!               || i64_be(timestamp)
//! ```
//!
//! Every variable-length field carries an explicit length prefix, so
//! no reassignment of bytes between author and content (or into the
//! timestamp) can produce the same payload from different inputs. The
//! leading tag separates these signatures from anything else a user
//! might sign with the same key.
//!
//! No length limits are enforced here; bounds belong to
//! [`crate::validation`].

/// Domain-separation tag prefixed to every canonical payload.
pub const CANONICAL_TAG: &[u8] = b"pqbook/v1\n";

/// Size of a length prefix in bytes.
const LEN_PREFIX: usize = 4;

/// Size of the encoded timestamp in bytes.
const TIMESTAMP_LEN: usize = 8;

/// Serializes `(author, content, timestamp)` into canonical bytes.
///
/// Fields longer than `u32::MAX` bytes cannot be represented; callers
/// reach this function only after the pipeline's length bounds, which
/// are far smaller.
pub fn canonicalize(author: &str, content: &str, timestamp: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(
        CANONICAL_TAG.len() + 2 * LEN_PREFIX + author.len() + content.len() + TIMESTAMP_LEN,
    );
    buf.extend_from_slice(CANONICAL_TAG);
    push_field(&mut buf, author.as_bytes());
    push_field(&mut buf, content.as_bytes());
    buf.extend_from_slice(&timestamp.to_be_bytes());
    buf
}

fn push_field(buf: &mut Vec<u8>, field: &[u8]) {
    let len = u32::try_from(field.len()).unwrap_or(u32::MAX);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(field);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
