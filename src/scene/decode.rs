//! Raw-reply decoding: fence stripping and structured parse
//!
//! The generation service is asked for bare JSON but routinely wraps its
//! reply in a Markdown code fence. Decoding strips exactly one such wrapper,
//! trims whitespace, and parses. It is pure and synchronous; callers keep
//! the original text, which is what gets cached when a decode fails.

use thiserror::Error;

/// A reply that could not be parsed as structured data
///
/// Carries only the parse reason. The original text stays with the caller
/// unmodified so it can be cached for a later re-decode.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("reply is not structured data: {reason}")]
pub struct DecodeError {
    reason: String,
}

impl DecodeError {
    /// The underlying parse failure, human-readable
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

/// Parse raw reply text into structured data
///
/// Strips at most one triple-backtick wrapper (optionally tagged `json`)
/// before parsing. Nested fences inside the wrapper survive; a second
/// wrapper does not get stripped and will fail the parse.
pub fn decode(raw: &str) -> Result<serde_json::Value, DecodeError> {
    let candidate = strip_fence(raw);
    serde_json::from_str(candidate).map_err(|e| DecodeError {
        reason: e.to_string(),
    })
}

/// Remove one full-text fence wrapper if present, otherwise return the
/// trimmed input unchanged
fn strip_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Only a bare or `json`-tagged fence counts as a wrapper.
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let Some(body) = rest.strip_suffix("```") else {
        // Opening fence with no closing fence is not a wrapper.
        return trimmed;
    };
    body.trim()
}
