//! Whole-header averaging: merge 1-3 redundant copies into a single best-estimate header.
//!
//! This is the largest piece of the reconciliation engine, tying together
//! [`crate::confidence`], [`super::grammar`], [`super::reference`], and [`super::reconcile`]:
//! bit-merge the copies, decide the header's true length against the terminal skeleton,
//! walk the grammar enforcing delimiters and vocabulary, and fall back to nearest-candidate
//! repair for anything still illegal.

use chrono::{Datelike, Duration as ChronoDuration, TimeZone, Timelike, Utc};

use super::grammar::{self, FieldClass};
use super::reconcile::{median_u8, reconcile_word};
use super::reference;
use crate::confidence::ConfidentByte;

/// One received copy of a header: bytes, per-byte confidence (0-9), and arrival time.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHeader {
    pub bytes: Vec<u8>,
    pub confidences: Vec<u8>,
    pub arrival_time: f64,
}

impl RawHeader {
    pub fn new(bytes: impl Into<Vec<u8>>, confidences: impl Into<Vec<u8>>, arrival_time: f64) -> Self {
        RawHeader {
            bytes: bytes.into(),
            confidences: confidences.into(),
            arrival_time,
        }
    }

    /// Build a header copy from a clean ASCII string with a uniform confidence.
    pub fn from_str(s: &str, confidence: u8, arrival_time: f64) -> Self {
        RawHeader {
            bytes: s.bytes().collect(),
            confidences: vec![confidence; s.len()],
            arrival_time,
        }
    }
}

/// Fold 1-3 header copies into one merged byte/confidence vector, null bytes (no data)
/// skipped per-copy rather than treated as a vote for `0x00`.
pub fn merge_headers(headers: &[RawHeader]) -> (Vec<u8>, Vec<u8>) {
    if headers.is_empty() {
        return (Vec::new(), Vec::new());
    }
    let len = headers.iter().map(|h| h.bytes.len()).max().unwrap_or(0);
    let mut bytes = vec![0u8; len];
    let mut confidences = vec![0u8; len];

    for i in 0..len {
        let mut merged: Option<ConfidentByte> = None;
        for header in headers {
            let Some(&b) = header.bytes.get(i) else {
                continue;
            };
            if b == 0 {
                continue;
            }
            let conf = header.confidences.get(i).copied().unwrap_or(0) as u32;
            let cb = ConfidentByte::from_scalar(b, conf);
            merged = Some(match merged {
                None => cb,
                Some(existing) => existing.merge(&cb),
            });
        }
        if let Some(cb) = merged {
            bytes[i] = cb.byte();
            confidences[i] = cb.confidence().min(9) as u8;
        }
    }
    (bytes, confidences)
}

fn candidate_lengths(total_len: usize) -> Vec<usize> {
    let mut lengths = Vec::new();
    let mut l = grammar::END_SKELETON.len() + 8;
    while l <= total_len {
        lengths.push(l);
        l += 7;
    }
    if lengths.is_empty() {
        lengths.push(total_len);
    }
    lengths
}

fn skeleton_score(bytes: &[u8], confidences: &[u8], l: usize) -> i64 {
    let skeleton = grammar::END_SKELETON.as_bytes();
    let start = l - skeleton.len();
    let mut score = 0i64;
    for (i, &sc) in skeleton.iter().enumerate() {
        if sc == b'_' {
            continue;
        }
        if bytes[start + i] != sc {
            score += 1 + confidences[start + i] as i64;
        }
    }
    score
}

fn best_length(bytes: &[u8], confidences: &[u8]) -> usize {
    candidate_lengths(bytes.len())
        .into_iter()
        .min_by_key(|&l| skeleton_score(bytes, confidences, l))
        .unwrap_or_else(|| bytes.len())
}

/// Pick the true header length and stamp the terminal skeleton's literal bytes.
pub fn truncate_and_frame(bytes: &[u8], confidences: &[u8]) -> (Vec<u8>, Vec<u8>) {
    if bytes.len() < grammar::END_SKELETON.len() {
        return (bytes.to_vec(), confidences.to_vec());
    }
    let l = best_length(bytes, confidences);
    let mut bytes = bytes[..l].to_vec();
    let mut confidences = confidences[..l].to_vec();

    let skeleton = grammar::END_SKELETON.as_bytes();
    let start = l - skeleton.len();
    let med = median_u8(&confidences);
    let confidence_chars = skeleton.iter().filter(|&&c| c != b'_').count().max(1) as f64;
    let score = skeleton_score(&bytes, &confidences, l) as f64;
    let end_confidence = ((confidence_chars * med - score) / confidence_chars)
        .max(0.0)
        .round()
        .clamp(0.0, 9.0) as u8;

    for (i, &sc) in skeleton.iter().enumerate() {
        if sc == b'_' {
            continue;
        }
        let pos = start + i;
        if bytes[pos] == sc {
            confidences[pos] = confidences[pos].max(end_confidence);
        } else {
            bytes[pos] = sc;
            confidences[pos] = end_confidence;
        }
    }
    (bytes, confidences)
}

fn confident_slice(bytes: &[u8], confidences: &[u8], start: usize, len: usize) -> Vec<ConfidentByte> {
    (0..len)
        .map(|i| ConfidentByte::from_scalar(bytes[start + i], confidences[start + i] as u32))
        .collect()
}

/// Overwrite `bytes[start..start+word.len()]` with `word` and rewrite confidences, preserving
/// the `>>3` treatment of unchanged positions — likely unintended in its origin, kept verbatim.
fn apply_word(bytes: &mut [u8], confidences: &mut [u8], start: usize, word: &str, distance: i64) {
    let len = word.len();
    let word_bytes = word.as_bytes();
    let unchanged: Vec<bool> = (0..len).map(|i| bytes[start + i] == word_bytes[i]).collect();
    let max_conf = confidences[start..start + len].iter().copied().max().unwrap_or(0) as i64;
    let base = (max_conf.max(4) - distance / len as i64).max(0);
    for i in 0..len {
        bytes[start + i] = word_bytes[i];
        confidences[start + i] = if unchanged[i] {
            ((base >> 3).clamp(0, 9)) as u8
        } else {
            (base.clamp(0, 9)) as u8
        };
    }
}

/// Reconcile `bytes[start..]` against a weighted vocabulary; returns whether a candidate
/// cleared [`reconcile_word`]'s acceptance gate.
fn reconcile_field(bytes: &mut [u8], confidences: &mut [u8], start: usize, vocabulary: &[(f32, &str)]) -> bool {
    let Some(len) = vocabulary.first().map(|(_, w)| w.len()) else {
        return false;
    };
    if start + len > bytes.len() {
        return false;
    }
    let received = confident_slice(bytes, confidences, start, len);
    let Some(reconciled) = reconcile_word(&received, vocabulary.iter().copied()) else {
        return false;
    };
    if reconciled.matched {
        apply_word(bytes, confidences, start, &reconciled.word, reconciled.distance);
        true
    } else {
        false
    }
}

/// Reconcile one FIPS slot against the remaining (not-yet-matched) county candidates,
/// removing the winner so later slots in the same header can't re-claim it.
fn reconcile_fips_block(bytes: &mut [u8], confidences: &mut [u8], start: usize, remaining: &mut Vec<String>) -> bool {
    const LEN: usize = 6;
    if remaining.is_empty() || start + LEN > bytes.len() {
        return false;
    }
    let received = confident_slice(bytes, confidences, start, LEN);
    let vocabulary = remaining.iter().map(|c| (1.0, c.as_str()));
    let Some(reconciled) = reconcile_word(&received, vocabulary) else {
        return false;
    };
    if !reconciled.matched {
        return false;
    }
    let idx = remaining
        .iter()
        .position(|c| c == &reconciled.word)
        .expect("a reconciled word must be one of the candidates it was reconciled against");
    let word = remaining.remove(idx);
    apply_word(bytes, confidences, start, &word, reconciled.distance);
    true
}

/// For a byte still outside its grammar class, pick the nearest legal character by signed-bit
/// distance. Confidence is 2 if the winner is unique, 1 on a tie.
fn nearest_candidate(byte: u8, confidence: u8, candidates: &[char]) -> (u8, u8) {
    let cb = ConfidentByte::from_scalar(byte, confidence as u32);
    let (bits_true, bits_false) = cb.bit_confidences();
    let mut best: Option<(u8, i64)> = None;
    let mut unique = true;
    for &c in candidates {
        let cand_byte = c as u8;
        let mut distance = 0i64;
        for k in 0..8 {
            let cand_bit = (cand_byte >> k) & 1;
            let disagreement_weight = if cand_bit == 1 { bits_false[k] } else { bits_true[k] };
            distance += disagreement_weight as i64;
        }
        match best {
            None => best = Some((cand_byte, distance)),
            Some((_, bd)) if distance < bd => {
                best = Some((cand_byte, distance));
                unique = true;
            }
            Some((_, bd)) if distance == bd => unique = false,
            _ => {}
        }
    }
    let (winner, _) = best.unwrap_or((byte, 0));
    (winner, if unique { 2 } else { 1 })
}

fn time_candidates(arrival: f64) -> Vec<(f32, String)> {
    let seconds = arrival.floor() as i64;
    let dt = Utc
        .timestamp_opt(seconds, 0)
        .single()
        .unwrap_or_else(|| Utc.timestamp_opt(0, 0).unwrap());
    let offsets_minutes: [i64; 5] = [-4, -3, -2, -1, 0];
    let weights: [f32; 5] = [0.5, 0.7, 0.9, 1.1, 1.0];
    offsets_minutes
        .iter()
        .zip(weights.iter())
        .map(|(&offset, &weight)| {
            let t = dt + ChronoDuration::minutes(offset);
            (
                weight,
                format!("{:03}{:02}{:02}", t.ordinal(), t.hour(), t.minute()),
            )
        })
        .collect()
}

/// Merge, frame, and reconcile 1-3 header copies into the canonical averaged string.
/// Returns `("", [])` for zero headers.
pub fn average_header(headers: &[RawHeader], transmitter: Option<&str>) -> (String, Vec<u8>) {
    if headers.is_empty() {
        return (String::new(), Vec::new());
    }

    let (merged_bytes, merged_confidences) = merge_headers(headers);
    let (mut bytes, mut confidences) = truncate_and_frame(&merged_bytes, &merged_confidences);
    if bytes.len() < 9 {
        return (
            bytes.iter().map(|&b| b as char).collect(),
            confidences,
        );
    }

    let fips_count = grammar::fips_count_for_len(bytes.len()).max(1);
    let classes = grammar::frame(fips_count);

    for (i, class) in classes.iter().enumerate() {
        if i >= bytes.len() {
            break;
        }
        if let FieldClass::Literal(c) = class {
            let literal = *c as u8;
            if bytes[i] != literal {
                bytes[i] = literal;
                confidences[i] = 3;
            }
        }
    }

    let originator_vocab: Vec<(f32, &str)> = reference::ORIGINATOR_CODES.iter().map(|&w| (1.0, w)).collect();
    reconcile_field(&mut bytes, &mut confidences, 1, &originator_vocab);

    let event_vocab: Vec<(f32, &str)> = reference::EVENT_CODES.iter().map(|&w| (1.0, w)).collect();
    reconcile_field(&mut bytes, &mut confidences, 5, &event_vocab);

    let mut remaining_counties = transmitter.map(reference::counties_for).unwrap_or_default();
    for block in 0..fips_count {
        let start = 9 + block * 7;
        reconcile_fips_block(&mut bytes, &mut confidences, start, &mut remaining_counties);
    }

    let duration_start = 9 + fips_count * 7;
    let duration_vocab: Vec<(f32, &str)> = reference::VALID_DURATIONS.iter().map(|&(w, s)| (w, s)).collect();
    reconcile_field(&mut bytes, &mut confidences, duration_start, &duration_vocab);

    let time_start = duration_start + 5;
    let time_cands = time_candidates(headers[0].arrival_time);
    let time_vocab: Vec<(f32, &str)> = time_cands.iter().map(|(w, s)| (*w, s.as_str())).collect();
    reconcile_field(&mut bytes, &mut confidences, time_start, &time_vocab);

    let callsign_start = time_start + 8;
    if let Some(wfo) = transmitter.and_then(reference::wfo_for) {
        reconcile_field(&mut bytes, &mut confidences, callsign_start, &[(1.0, wfo)]);
    }

    for (i, class) in classes.iter().enumerate() {
        if i >= bytes.len() {
            break;
        }
        if let FieldClass::Subset(_) = class {
            let c = bytes[i] as char;
            if !class.matches(c) {
                let candidates = class.candidates();
                let (winner, conf) = nearest_candidate(bytes[i], confidences[i], &candidates);
                bytes[i] = winner;
                confidences[i] = conf;
            }
        }
    }

    for c in confidences.iter_mut() {
        *c = (*c).min(9);
    }

    (bytes.iter().map(|&b| b as char).collect(), confidences)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN_KCLE: &str = "-WXR-TOR-039173-039051-139069+0030-1591829-KCLE/NWS-";
    const CLEAN_KRAH: &str = "-WXR-SVR-007183+0005-1232003-KRAH/NWS-";

    #[test]
    fn single_clean_header_round_trips() {
        let header = RawHeader::from_str(CLEAN_KCLE, 9, 1_591_829_000.0);
        let (string, confidences) = average_header(&[header], Some("KCLE"));
        assert_eq!(string, CLEAN_KCLE);
        assert!(confidences.iter().all(|&c| c <= 9));
    }

    #[test]
    fn three_identical_clean_copies_average_to_the_same_header() {
        let headers: Vec<RawHeader> = (0..3)
            .map(|_| RawHeader::from_str(CLEAN_KCLE, 9, 1_591_829_000.0))
            .collect();
        let (string, confidences) = average_header(&headers, Some("KCLE"));
        assert_eq!(string, CLEAN_KCLE);
        // literal positions (delimiters and the fixed "NWS") never go through apply_word and
        // keep the merged confidence (9); every vocabulary-reconciled position does go through
        // it, and its preserved `>>3` rewrite on unchanged bytes (kept verbatim, see
        // apply_word's doc comment) knocks even an exact three-way match down to 1.
        let classes = grammar::frame(3);
        for (i, &c) in confidences.iter().enumerate() {
            if matches!(classes.get(i), Some(FieldClass::Literal(_))) {
                assert_eq!(c, 9, "literal byte at {i} should keep its merged confidence");
            } else {
                assert_eq!(c, 1, "reconciled byte at {i} should be knocked down by >>3");
            }
        }
    }

    #[test]
    fn majority_vote_fixes_a_single_bit_flip() {
        let mut flipped = CLEAN_KCLE.to_string();
        flipped.replace_range(6..7, "N"); // TOR -> TNR in the first copy
        let headers = vec![
            RawHeader::from_str(&flipped, 9, 1_591_829_000.0),
            RawHeader::from_str(CLEAN_KCLE, 9, 1_591_829_000.0),
            RawHeader::from_str(CLEAN_KCLE, 9, 1_591_829_000.0),
        ];
        let (string, _) = average_header(&headers, Some("KCLE"));
        assert_eq!(string, CLEAN_KCLE);
    }

    #[test]
    fn dirty_message_is_rescued_by_vocabulary_reconciliation() {
        let mut garbled: Vec<u8> = CLEAN_KRAH.bytes().collect();
        let mut confidences = vec![8u8; garbled.len()];
        // corrupt a handful of single bytes to a high-bit variant with low confidence
        for &pos in &[2usize, 10, 18, 26, 34] {
            garbled[pos] |= 0x80;
            confidences[pos] = 1;
        }
        let header = RawHeader::new(garbled, confidences, 1_232_003_000.0);
        let (string, _) = average_header(&[header], Some("KRAH"));
        assert_eq!(string, CLEAN_KRAH);
    }

    #[test]
    fn trailing_garbage_is_truncated_away() {
        let mut bytes: Vec<u8> = CLEAN_KCLE.bytes().collect();
        let mut confidences = vec![9u8; bytes.len()];
        bytes.extend_from_slice(b"ZZZZZZZ");
        confidences.extend_from_slice(&[1; 7]);
        let header = RawHeader::new(bytes, confidences, 1_591_829_000.0);
        let (string, _) = average_header(&[header], Some("KCLE"));
        assert_eq!(string, CLEAN_KCLE);
    }

    #[test]
    fn zero_headers_average_to_empty() {
        let (string, confidences) = average_header(&[], Some("KCLE"));
        assert_eq!(string, "");
        assert!(confidences.is_empty());
    }
}
