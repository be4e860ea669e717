//! Static SAME vocabulary and per-transmitter geography tables.
//!
//! Mirrors the constant tables published in the NWS SAME/EAS directives (originator codes,
//! event codes, valid durations) plus a small built-in per-transmitter FIPS/WFO lookup,
//! covering only the transmitters exercised by the tests in this crate. A nationwide data
//! loader hydrating that lookup from an external county/transmitter file is out of scope.

use lazy_static::lazy_static;
use std::collections::HashMap;

/// Valid SAME originator codes.
pub const ORIGINATOR_CODES: [&str; 4] = ["EAS", "CIV", "WXR", "PEP"];

/// Valid SAME event type codes (NWS directives pd01017012curr.pdf).
pub const EVENT_CODES: [&str; 57] = [
    "BZW", "CFA", "CFW", "DSW", "FFA", "FFW", "FFS", "FLA", "FLW", "FLS", "HWA", "HWW", "HUA",
    "HUW", "HLS", "SVA", "SVR", "SVS", "SMW", "SPS", "TOA", "TOR", "TRA", "TRW", "TSA", "TSW",
    "WSA", "WSW", "EAN", "EAT", "NIC", "NPT", "RMT", "RWT", "ADR", "AVA", "AVW", "CAE", "CDW",
    "CEM", "EQW", "EVI", "FRW", "HMW", "LEW", "LAE", "TOE", "NUW", "RHW", "SPW", "VOW", "NMN",
    "DMO", "TXF", "TXO", "TXB", "TXP",
];

/// Valid purge-duration strings with their reconciliation prior weights, "HHMM" with HH<=06.
pub const VALID_DURATIONS: [(f32, &str); 14] = [
    (1.0, "0015"),
    (1.0, "0030"),
    (1.1, "0045"),
    (1.1, "0100"),
    (1.0, "0130"),
    (1.1, "0200"),
    (1.0, "0230"),
    (1.1, "0300"),
    (0.9, "0330"),
    (1.1, "0400"),
    (0.9, "0430"),
    (1.1, "0500"),
    (0.9, "0530"),
    (1.1, "0600"),
];

lazy_static! {
    /// FIPS county codes (6-digit, leading "P" digit included) known to be broadcast by each
    /// transmitter call sign. Populated with the transmitters this crate's own tests exercise;
    /// a deployment wires in the full NWR county/transmitter table externally.
    static ref TRANSMITTER_FIPS: HashMap<&'static str, &'static [&'static str]> = {
        let mut m = HashMap::new();
        m.insert("KCLE", &["039173", "039051", "139069"][..]);
        m.insert(
            "KRAH",
            &[
                "037183", "007183", "037101", "037063", "037069", "037145", "037122",
            ][..],
        );
        m
    };

    /// WFO (station) call sign for each transmitter.
    static ref TRANSMITTER_WFO: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("KCLE", "KCLE");
        m.insert("KRAH", "KRAH");
        m
    };
}

/// FIPS codes known to be broadcast by `transmitter`, or an empty list for an unknown one —
/// an empty candidate list simply leaves that field unconstrained during reconciliation.
pub fn counties_for(transmitter: &str) -> Vec<String> {
    TRANSMITTER_FIPS
        .get(transmitter)
        .map(|codes| codes.iter().map(|c| c.to_string()).collect())
        .unwrap_or_default()
}

/// The WFO call sign for `transmitter`, if known.
pub fn wfo_for(transmitter: &str) -> Option<&'static str> {
    TRANSMITTER_WFO.get(transmitter).copied()
}

/// Default log severity for a completed message, keyed by event type: immediate-threat codes
/// (tornado, flash flood, extreme wind) log loudest, routine tests and administrative codes
/// log quietest. Event types absent from the table fall back to `INFO`.
pub fn log_level(event_type: &str) -> tracing::Level {
    use tracing::Level;
    match event_type {
        "TOR" | "EQW" | "FFW" | "EAN" => Level::ERROR,
        "SVR" | "FFA" | "HUW" | "TSW" | "BZW" => Level::WARN,
        "RWT" | "RMT" | "NPT" | "DMO" | "NMN" => Level::TRACE,
        _ => Level::INFO,
    }
}
