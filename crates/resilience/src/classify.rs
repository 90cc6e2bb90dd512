//! Transient-error classification
//!
//! Ready-made predicates for [`RetryHandler::execute`](crate::RetryHandler::execute).
//! Matching is on the rendered error message because most upstream
//! failures (HTTP clients, agent SDKs) only surface a string.

use std::fmt::Display;

/// Message fragments that mark a failure as worth retrying
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "econnreset",
    "econnrefused",
    "connection reset",
    "connection refused",
    "rate limit",
    "429",
    "502",
    "503",
    "504",
];

/// Errors that know whether retrying them can help
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Check a raw error message against the transient markers (case-insensitive)
pub fn is_transient_message(message: &str) -> bool {
    let message = message.to_lowercase();
    TRANSIENT_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}

/// Classify any displayable error by its message
pub fn is_transient<E: Display + ?Sized>(error: &E) -> bool {
    is_transient_message(&error.to_string())
}
