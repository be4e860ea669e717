//! Error types for the SAME reconciliation engine.

use snafu::Snafu;

/// Failures that can occur while manipulating SAME headers or the event cache.
#[derive(Debug, Snafu)]
pub enum SameError {
    /// The confidence vector did not have one entry per byte.
    #[snafu(display(
        "confidence vector has {actual} entries, expected {expected} (one per byte)"
    ))]
    BadConfidenceLength { expected: usize, actual: usize },

    /// A FIPS code was neither 5 nor 6 characters.
    #[snafu(display("FIPS code must be 5 or 6 characters, got {len}"))]
    InvalidFipsLength { len: usize },

    /// `add_header` was called on a message that already latched `fully_received`.
    #[snafu(display("message is already complete"))]
    AlreadyComplete,

    /// The event-type pattern supplied to `get_active_messages` failed to compile as a regex.
    #[snafu(display("invalid event pattern {pattern:?}: {source}"))]
    InvalidEventPattern {
        pattern: String,
        source: regex::Error,
    },
}

pub type Result<T, E = SameError> = std::result::Result<T, E>;
