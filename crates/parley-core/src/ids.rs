// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifier generation for messages and idempotency keys.
//!
//! Identifiers have the shape `prefix_timestampMillis_randomSuffix`, e.g.
//! `msg_1703123456789_abc123def`. The millisecond timestamp keeps them roughly
//! FIFO-ordered within a session; the 9-character base-36 suffix makes
//! collisions vanishingly unlikely.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

/// Structural shape of a client-generated identifier.
static IDENTIFIER_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z]+_\d+_[a-zA-Z0-9]+$").unwrap());

const SUFFIX_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const SUFFIX_LEN: usize = 9;

/// Generate a fresh identifier with the given alphabetic prefix.
pub fn generate(prefix: &str) -> String {
    let millis = chrono::Utc::now().timestamp_millis();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
        .collect();
    format!("{prefix}_{millis}_{suffix}")
}

/// Returns true if `candidate` has the `prefix_digits_alphanumerics` shape.
///
/// Backend-assigned ids are not required to pass this check.
pub fn is_valid(candidate: &str) -> bool {
    IDENTIFIER_PATTERN.is_match(candidate)
}

/// Extract the embedded millisecond timestamp, or `None` for malformed identifiers.
pub fn timestamp_of(identifier: &str) -> Option<i64> {
    if !is_valid(identifier) {
        return None;
    }
    identifier.split('_').nth(1)?.parse().ok()
}
