//! The SAME header reconciliation engine: static reference data, grammar, word reconciliation,
//! whole-header averaging, and the `SAMEMessage` aggregation state machine.

pub mod averager;
pub mod grammar;
pub mod message;
pub mod reconcile;
pub mod reference;

pub use averager::{average_header, merge_headers, truncate_and_frame, RawHeader};
pub use message::{MessageSummary, SameMessage};

use crate::error::{InvalidFipsLengthSnafu, Result};
use snafu::ensure;

/// Render raw header bytes for logging/debug output without risking a non-UTF8 panic or
/// dumping unprintable control/high-bit bytes straight to a terminal. Printable ASCII passes
/// through; anything else is escaped as `\xNN`.
pub fn unicode_safe(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        if b.is_ascii_graphic() || b == b' ' {
            out.push(b as char);
        } else {
            out.push_str(&format!("\\x{b:02x}"));
        }
    }
    out
}

/// Normalize a 5- or 6-digit FIPS code to the canonical 6-digit form, prepending `0` (the
/// "whole county" P-code) to a bare 5-digit county code.
pub fn normalize_fips(fips: &str) -> Result<String> {
    ensure!(
        fips.len() == 5 || fips.len() == 6,
        InvalidFipsLengthSnafu { len: fips.len() }
    );
    if fips.len() == 5 {
        Ok(format!("0{fips}"))
    } else {
        Ok(fips.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_five_digit_codes() {
        assert_eq!(normalize_fips("39173").unwrap(), "039173");
        assert_eq!(normalize_fips("039173").unwrap(), "039173");
    }

    #[test]
    fn rejects_other_lengths() {
        assert!(normalize_fips("123").is_err());
        assert!(normalize_fips("1234567").is_err());
    }

    #[test]
    fn unicode_safe_escapes_control_bytes_and_passes_through_printable_ones() {
        assert_eq!(unicode_safe(b"WXR-TOR"), "WXR-TOR");
        assert_eq!(unicode_safe(&[0x07, 0x80, b'A']), "\\x07\\x80A");
    }
}
