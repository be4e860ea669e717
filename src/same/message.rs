//! The `SAMEMessage` aggregation state machine: collects redundant header copies, decides
//! completion, and exposes typed field accessors over the averaged header.

use std::sync::Mutex;

use chrono::{Datelike, TimeZone, Utc};
use tracing::{debug, error, trace, warn, Level};

use snafu::ensure;

use crate::clock::SharedClock;
use crate::error::{AlreadyCompleteSnafu, BadConfidenceLengthSnafu, Result};

use super::averager::{self, RawHeader};
use super::{reference, unicode_safe};

const HEADER_TIMEOUT_SECS: f64 = 6.0;
const MAX_HEADERS: usize = 3;

/// One callback, consumed exactly once, fired the instant a message first becomes complete.
type ReceivedCallback = Box<dyn FnOnce(&SameMessage) + Send>;

/// Snapshot view returned by [`SameMessage::summary`].
#[derive(Debug, Clone)]
pub struct MessageSummary {
    pub text: String,
    pub confidence: String,
    pub raw_headers: Vec<String>,
    pub start_time: f64,
}

struct Inner {
    headers: Vec<RawHeader>,
    fully_received: bool,
    timeout: f64,
    averaged: Option<(String, Vec<u8>)>,
    received_callback: Option<ReceivedCallback>,
}

/// An in-progress or completed SAME header aggregation.
///
/// Construct with [`SameMessage::new`] and feed it header copies via
/// [`SameMessage::add_header`] as the radio driver decodes them; at most three copies are
/// meaningful, and `fully_received` latches once three arrive, the timeout elapses, or the
/// caller forces completion.
pub struct SameMessage {
    transmitter: Option<String>,
    start_time: f64,
    clock: SharedClock,
    inner: Mutex<Inner>,
}

impl SameMessage {
    pub fn new(transmitter: Option<String>, clock: SharedClock) -> Self {
        let start_time = clock.now();
        SameMessage {
            transmitter,
            start_time,
            clock: clock.clone(),
            inner: Mutex::new(Inner {
                headers: Vec::new(),
                fully_received: false,
                timeout: start_time + HEADER_TIMEOUT_SECS,
                averaged: None,
                received_callback: None,
            }),
        }
    }

    /// Build a message from an already-decoded literal header string, for tests and tools that
    /// bypass live reconciliation. `start_time` becomes the message's provisional start time.
    pub fn from_literal(literal: &str, confidence: u8, clock: SharedClock) -> Self {
        let msg = SameMessage::new(None, clock.clone());
        {
            let mut inner = msg.inner.lock().expect("SameMessage mutex poisoned");
            inner.headers.push(RawHeader::from_str(literal, confidence, clock.now()));
            inner.fully_received = true;
        }
        msg
    }

    pub fn set_received_callback(&self, callback: ReceivedCallback) {
        let mut inner = self.inner.lock().expect("SameMessage mutex poisoned");
        inner.received_callback = Some(callback);
    }

    /// The `"{transmitter}-{start_time:.3}"` identifier, or the averaged string if no
    /// transmitter is known (constructed from a pre-decoded literal).
    pub fn event_id(&self) -> String {
        match &self.transmitter {
            Some(t) => format!("{}-{:.3}", t, self.start_time),
            None => self.get_same_message().0,
        }
    }

    pub fn transmitter(&self) -> Option<&str> {
        self.transmitter.as_deref()
    }

    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Append a header copy. Fails if the message has already latched complete, or if
    /// `confidences` doesn't have exactly one entry per byte.
    pub fn add_header(&self, bytes: Vec<u8>, confidences: Vec<u8>) -> Result<()> {
        ensure!(
            bytes.len() == confidences.len(),
            BadConfidenceLengthSnafu {
                expected: bytes.len(),
                actual: confidences.len(),
            }
        );
        let now = self.clock.now();
        let mut inner = self.inner.lock().expect("SameMessage mutex poisoned");
        if inner.fully_received {
            return Err(AlreadyCompleteSnafu.build());
        }
        inner.headers.push(RawHeader::new(bytes, confidences, now));
        inner.timeout = now + HEADER_TIMEOUT_SECS;
        inner.averaged = None;
        trace!(count = inner.headers.len(), "header copy accepted");
        if inner.headers.len() >= MAX_HEADERS {
            drop(inner);
            self.latch_complete();
        }
        Ok(())
    }

    /// True once `timeout < now` or three headers have arrived; `make_it_so` forces it.
    /// `extend_timeout` pushes the timeout out by [`HEADER_TIMEOUT_SECS`] when not yet complete.
    pub fn fully_received(&self, make_it_so: bool, extend_timeout: bool) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock().expect("SameMessage mutex poisoned");
        if inner.fully_received {
            return true;
        }
        if make_it_so || inner.timeout < now || inner.headers.len() >= MAX_HEADERS {
            drop(inner);
            self.latch_complete();
            return true;
        }
        if extend_timeout {
            inner.timeout = now + HEADER_TIMEOUT_SECS;
        }
        false
    }

    fn latch_complete(&self) {
        let callback = {
            let mut inner = self.inner.lock().expect("SameMessage mutex poisoned");
            if inner.fully_received {
                return;
            }
            inner.fully_received = true;
            inner.received_callback.take()
        };
        let event_type = self.get_event_type();
        match reference::log_level(&event_type) {
            Level::ERROR => error!(event_id = %self.event_id(), event_type, "message fully received"),
            Level::WARN => warn!(event_id = %self.event_id(), event_type, "message fully received"),
            _ => debug!(event_id = %self.event_id(), event_type, "message fully received"),
        }
        if let Some(callback) = callback {
            callback(self);
        }
    }

    /// A serializable snapshot of this message, suitable for a JSON boundary or a diagnostic
    /// dump: the averaged text, its per-character confidence digits, and every raw header copy
    /// received so far (rendered through [`unicode_safe`] since a raw copy may carry unprintable
    /// or high-bit bytes before reconciliation cleans them up).
    pub fn summary(&self) -> MessageSummary {
        let (text, confidences) = self.get_same_message();
        let confidence = confidences
            .iter()
            .map(|&c| char::from_digit(c.min(9) as u32, 10).unwrap_or('?'))
            .collect();
        let raw_headers = {
            let inner = self.inner.lock().expect("SameMessage mutex poisoned");
            inner.headers.iter().map(|h| unicode_safe(&h.bytes)).collect()
        };
        MessageSummary {
            text,
            confidence,
            raw_headers,
            start_time: self.start_time,
        }
    }

    /// The best-available averaged header: the cached latch if complete, a live best-effort
    /// view otherwise, or `("", [])` if nothing has arrived yet.
    pub fn get_same_message(&self) -> (String, Vec<u8>) {
        let mut inner = self.inner.lock().expect("SameMessage mutex poisoned");
        if inner.headers.is_empty() {
            return (String::new(), Vec::new());
        }
        if let Some(cached) = &inner.averaged {
            return cached.clone();
        }
        let result = averager::average_header(&inner.headers, self.transmitter.as_deref());
        inner.averaged = Some(result.clone());
        result
    }

    fn field(&self, start: usize, len: usize) -> String {
        let (s, _) = self.get_same_message();
        s.chars().skip(start).take(len).collect()
    }

    pub fn get_originator(&self) -> String {
        self.field(1, 3)
    }

    pub fn get_event_type(&self) -> String {
        self.field(5, 3)
    }

    pub fn get_counties(&self) -> Vec<String> {
        let (s, _) = self.get_same_message();
        let chars: Vec<char> = s.chars().collect();
        let plus = chars.iter().position(|&c| c == '+').unwrap_or(chars.len());
        if plus <= 9 {
            return Vec::new();
        }
        chars[9..plus].iter().collect::<String>().split('-').map(String::from).collect()
    }

    pub fn get_duration_str(&self) -> String {
        let (s, _) = self.get_same_message();
        let chars: Vec<char> = s.chars().collect();
        let Some(plus) = chars.iter().position(|&c| c == '+') else {
            return String::new();
        };
        chars.iter().skip(plus + 1).take(4).collect()
    }

    pub fn get_start_time_str(&self) -> String {
        let (s, _) = self.get_same_message();
        let chars: Vec<char> = s.chars().collect();
        let Some(plus) = chars.iter().position(|&c| c == '+') else {
            return String::new();
        };
        chars.iter().skip(plus + 1 + 4 + 1).take(7).collect()
    }

    pub fn get_duration_sec(&self) -> i64 {
        let d = self.get_duration_str();
        if d.len() != 4 {
            return 0;
        }
        let hh: i64 = d[0..2].parse().unwrap_or(0);
        let mm: i64 = d[2..4].parse().unwrap_or(0);
        hh * 3600 + mm * 60
    }

    /// UTC epoch seconds for `JJJHHMM`, inferring the year from the message's own creation
    /// time with a year-boundary rollover correction. Anchored to `self.start_time` (frozen
    /// when the message was first created) rather than the live clock, so repeated calls on
    /// an unchanged message always agree, even across a Dec31/Jan1 boundary.
    pub fn get_start_time_sec(&self) -> i64 {
        let issued = self.get_start_time_str();
        if issued.len() != 7 {
            return 0;
        }
        let day: u32 = issued[0..3].parse().unwrap_or(1);
        let hour: u32 = issued[3..5].parse().unwrap_or(0);
        let minute: u32 = issued[5..7].parse().unwrap_or(0);

        let reference_time = Utc
            .timestamp_opt(self.start_time as i64, 0)
            .single()
            .unwrap_or_else(Utc::now);
        let mut year = reference_time.year();
        let now_doy = reference_time.ordinal();
        if now_doy < 10 && day > 355 {
            year -= 1;
        } else if now_doy > 355 && day < 10 {
            year += 1;
        }

        let base = Utc
            .with_ymd_and_hms(year, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
        let dt = base + chrono::Duration::days(day as i64 - 1)
            + chrono::Duration::hours(hour as i64)
            + chrono::Duration::minutes(minute as i64);
        dt.timestamp()
    }

    pub fn get_end_time_sec(&self) -> i64 {
        self.get_start_time_sec() + self.get_duration_sec()
    }

    pub fn get_broadcaster(&self) -> String {
        let (s, _) = self.get_same_message();
        let chars: Vec<char> = s.chars().collect();
        if chars.len() < 9 {
            return String::new();
        }
        let slash = chars.iter().rposition(|&c| c == '/').unwrap_or(chars.len());
        let dash_before = chars[..slash].iter().rposition(|&c| c == '-').map(|p| p + 1).unwrap_or(0);
        chars[dash_before..slash].iter().collect()
    }

    /// Accepts a 5- or 6-digit FIPS code (a bare 5-digit county code is prefixed with `0`).
    /// Matches if the trailing 5 digits agree and the leading "P" digit is 0 on either side or
    /// equal on both.
    pub fn applies_to_fips(&self, fips: &str) -> Result<bool> {
        let normalized = super::normalize_fips(fips)?;
        let query_p = normalized.as_bytes()[0];
        let query_tail = &normalized[1..];
        for county in self.get_counties() {
            if county.len() != 6 {
                continue;
            }
            let county_p = county.as_bytes()[0];
            let county_tail = &county[1..];
            if county_tail == query_tail && (county_p == b'0' || query_p == b'0' || county_p == query_p) {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use std::sync::Arc;

    const CLEAN_KCLE: &str = "-WXR-TOR-039173-039051-139069+0030-1591829-KCLE/NWS-";

    fn clean_message() -> SameMessage {
        let clock: SharedClock = Arc::new(TestClock::new(1_591_829_000.0));
        let msg = SameMessage::new(Some("KCLE".to_string()), clock);
        msg.add_header(CLEAN_KCLE.bytes().collect(), vec![9; CLEAN_KCLE.len()]).unwrap();
        msg.add_header(CLEAN_KCLE.bytes().collect(), vec![9; CLEAN_KCLE.len()]).unwrap();
        msg.add_header(CLEAN_KCLE.bytes().collect(), vec![9; CLEAN_KCLE.len()]).unwrap();
        msg
    }

    #[test]
    fn accessors_match_clean_literal() {
        let msg = clean_message();
        assert_eq!(msg.get_originator(), "WXR");
        assert_eq!(msg.get_event_type(), "TOR");
        assert_eq!(msg.get_counties(), vec!["039173", "039051", "139069"]);
        assert_eq!(msg.get_duration_str(), "0030");
        assert_eq!(msg.get_duration_sec(), 1800);
        assert_eq!(msg.get_start_time_str(), "1591829");
    }

    #[test]
    fn fully_received_latches_after_three_headers() {
        let msg = clean_message();
        assert!(msg.fully_received(false, false));
        assert!(msg.add_header(CLEAN_KCLE.bytes().collect(), vec![9; CLEAN_KCLE.len()]).is_err());
    }

    #[test]
    fn fully_received_is_monotone_via_timeout() {
        let clock = Arc::new(TestClock::new(0.0));
        let msg = SameMessage::new(Some("KCLE".to_string()), clock.clone());
        msg.add_header(CLEAN_KCLE.bytes().collect(), vec![9; CLEAN_KCLE.len()]).unwrap();
        assert!(!msg.fully_received(false, false));
        clock.advance(10.0);
        assert!(msg.fully_received(false, false));
        assert!(msg.fully_received(false, false));
    }

    #[test]
    fn received_callback_fires_exactly_once() {
        let clock: SharedClock = Arc::new(TestClock::new(1_591_829_000.0));
        let msg = SameMessage::new(Some("KCLE".to_string()), clock);
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();
        msg.set_received_callback(Box::new(move |_| {
            *count_clone.lock().unwrap() += 1;
        }));
        msg.add_header(CLEAN_KCLE.bytes().collect(), vec![9; CLEAN_KCLE.len()]).unwrap();
        msg.add_header(CLEAN_KCLE.bytes().collect(), vec![9; CLEAN_KCLE.len()]).unwrap();
        msg.add_header(CLEAN_KCLE.bytes().collect(), vec![9; CLEAN_KCLE.len()]).unwrap();
        assert_eq!(*count.lock().unwrap(), 1);
        assert!(msg.fully_received(true, false));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn applies_to_fips_ignores_leading_p_digit_mismatch() {
        let msg = clean_message();
        assert!(msg.applies_to_fips("39173").unwrap());
        assert!(msg.applies_to_fips("039173").unwrap());
        assert!(!msg.applies_to_fips("039174").unwrap());
    }

    #[test]
    fn applies_to_fips_rejects_bad_length() {
        let msg = clean_message();
        assert!(msg.applies_to_fips("123").is_err());
    }

    #[test]
    fn summary_reports_text_confidence_and_raw_copies() {
        let msg = clean_message();
        let summary = msg.summary();
        assert_eq!(summary.text, CLEAN_KCLE);
        assert_eq!(summary.confidence.len(), CLEAN_KCLE.len());
        assert!(summary.confidence.chars().all(|c| c == '9'));
        assert_eq!(summary.raw_headers.len(), 3);
        assert_eq!(summary.raw_headers[0], CLEAN_KCLE);
    }
}
