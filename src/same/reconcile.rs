//! Vocabulary-based word reconciliation.
//!
//! After the bitwise averager has produced its best-guess bytes for a field, some fields (the
//! originator code, event type, duration, and callsign-adjacent words) are drawn from a small
//! closed vocabulary. [`reconcile_word`] scores every vocabulary candidate against the received
//! bytes, weighting each byte's contribution by its confidence, and returns the closest match,
//! together with whether it clears the acceptance gate — rescuing fields where the averaged
//! bytes don't exactly match any legal word, without over-eagerly "reconciling" a clearly wrong
//! candidate. This is the sole word-reconciliation entry point; the averager calls it for both
//! plain fields and FIPS blocks rather than re-deriving the gate itself.

use crate::confidence::ConfidentByte;

/// The result of reconciling one field against a vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciled {
    pub word: String,
    /// Lower is a better match.
    pub distance: i64,
    /// Whether `word` clears the acceptance gate: strictly better than the runner-up, and
    /// under `max(4, median(confidences))`.
    pub matched: bool,
}

pub(crate) fn median_u8(values: &[u8]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted: Vec<u8> = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    } else {
        sorted[mid] as f64
    }
}

/// Distance between `received` and `candidate`: each mismatched byte contributes
/// `1 + confidence`, then the accumulated total is itself incremented by 1 and scaled down by
/// `prior_weight` (a higher prior makes a candidate relatively cheaper to match).
pub(crate) fn word_distance(received: &[ConfidentByte], candidate: &str, prior_weight: f32) -> i64 {
    let candidate_bytes = candidate.as_bytes();
    let mut distance: i64 = 0;
    for (cb, &cand_byte) in received.iter().zip(candidate_bytes.iter()) {
        if cb.byte() != cand_byte {
            distance += 1 + cb.confidence() as i64;
        }
    }
    (((distance + 1) as f64) / prior_weight as f64).round() as i64
}

/// Reconcile `received` (one [`ConfidentByte`] per character) against `vocabulary`, an
/// iterator of `(prior_weight, word)` pairs all of the same length as `received`. Returns the
/// candidate with the lowest weighted distance, with `matched` set per the acceptance gate;
/// ties keep the first (vocabulary order is significant, matching the original's
/// stable-iteration behavior). `None` only when no candidate in `vocabulary` has a matching
/// length.
pub fn reconcile_word<'a, I>(received: &[ConfidentByte], vocabulary: I) -> Option<Reconciled>
where
    I: IntoIterator<Item = (f32, &'a str)>,
{
    let mut scored: Vec<(i64, &str)> = vocabulary
        .into_iter()
        .filter(|(_, w)| w.len() == received.len())
        .map(|(prior_weight, candidate)| (word_distance(received, candidate, prior_weight), candidate))
        .collect();
    if scored.is_empty() {
        return None;
    }
    scored.sort_by_key(|&(d, _)| d);
    let (best_distance, best_word) = scored[0];
    let next_distance = scored.get(1).map(|&(d, _)| d).unwrap_or(i64::MAX);
    let confidences: Vec<u8> = received.iter().map(|cb| cb.confidence().min(9) as u8).collect();
    let threshold = median_u8(&confidences).max(4.0) as i64;
    let matched = best_distance < next_distance && best_distance < threshold;
    Some(Reconciled {
        word: best_word.to_string(),
        distance: best_distance,
        matched,
    })
}

/// Reconcile a plain, unweighted vocabulary (every word has prior weight 1.0), the common case
/// for originator codes, event codes, and callsigns.
pub fn reconcile_word_unweighted<'a, I>(received: &[ConfidentByte], vocabulary: I) -> Option<Reconciled>
where
    I: IntoIterator<Item = &'a str>,
{
    reconcile_word(received, vocabulary.into_iter().map(|w| (1.0, w)))
}
