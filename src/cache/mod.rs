//! `MessageCache`: the event-driven collection of active alerts for one configured location.
//!
//! A small channel-free state machine: [`MessageCache::submit`] and [`MessageCache::tick`] are
//! the only mutation paths, and [`MessageCache::subscribe`] registers listeners that are invoked
//! synchronously on the caller's thread when the cache's aggregate score changes.

pub mod group;
pub mod region;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use regex::Regex;
use snafu::ResultExt;
use tracing::{debug, info};

use crate::clock::SharedClock;
use crate::error::{InvalidEventPatternSnafu, Result};
use crate::same::SameMessage;
use group::EventMessageGroup;
use region::PointInRegion;

/// The cache's configured home location: the point used for polygon containment and the
/// county FIPS used for "is this effective here" queries.
#[derive(Debug, Clone)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    pub fips: String,
}

/// Comparator used to order [`ScoredMessage`] results from [`MessageCache::get_active_messages`].
pub type Sorter = Arc<dyn Fn(&ScoredMessage, &ScoredMessage) -> Ordering + Send + Sync>;

/// `score` descending, then `start_time` descending — the default ordering.
pub fn by_score_and_time() -> Sorter {
    Arc::new(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| b.message.start_time().partial_cmp(&a.message.start_time()).unwrap_or(Ordering::Equal))
    })
}

/// Event code -> priority, used to rank simultaneously-active alerts. Event codes absent from
/// the table score 0.
pub fn default_message_scores() -> HashMap<String, i32> {
    let mut scores = HashMap::new();
    scores.insert("SVA".to_string(), 20);
    scores.insert("SV.A".to_string(), 20);
    scores.insert("SVR".to_string(), 30);
    scores.insert("SV.W".to_string(), 30);
    scores.insert("TOA".to_string(), 35);
    scores.insert("TO.A".to_string(), 35);
    scores.insert("TOR".to_string(), 40);
    scores.insert("TO.W".to_string(), 45);
    scores
}

pub struct CacheConfig {
    pub location: Location,
    pub message_scores: HashMap<String, i32>,
    pub sorter: Sorter,
}

impl CacheConfig {
    pub fn new(location: Location) -> Self {
        CacheConfig {
            location,
            message_scores: default_message_scores(),
            sorter: by_score_and_time(),
        }
    }
}

/// A message paired with the priority score it currently contributes to the cache.
pub struct ScoredMessage {
    message: Arc<SameMessage>,
    score: i32,
}

impl ScoredMessage {
    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn message(&self) -> &Arc<SameMessage> {
        &self.message
    }
}

impl std::ops::Deref for ScoredMessage {
    type Target = SameMessage;

    fn deref(&self) -> &SameMessage {
        &self.message
    }
}

/// Outbound notification fired synchronously when the cache's emitted score changes.
#[derive(Clone)]
pub enum CacheEvent {
    ScoreChanged {
        score: i32,
        triggering_message: Option<Arc<SameMessage>>,
    },
}

type Listener = Box<dyn Fn(&CacheEvent) + Send + Sync>;

struct State {
    groups: HashMap<String, EventMessageGroup>,
    last_score: i32,
    listeners: Vec<Listener>,
}

/// Event-driven collection of [`EventMessageGroup`]s for one configured location.
pub struct MessageCache {
    config: Mutex<CacheConfig>,
    clock: SharedClock,
    state: Mutex<State>,
}

impl MessageCache {
    pub fn new(config: CacheConfig, clock: SharedClock) -> Self {
        MessageCache {
            config: Mutex::new(config),
            clock,
            state: Mutex::new(State {
                groups: HashMap::new(),
                last_score: 0,
                listeners: Vec::new(),
            }),
        }
    }

    pub fn subscribe(&self, listener: Listener) {
        self.state.lock().expect("cache mutex poisoned").listeners.push(listener);
    }

    /// Inbound `new_message`: append to the group keyed by `event_id`, then recompute score.
    pub fn submit(&self, message: Arc<SameMessage>, polygon: Option<Arc<dyn PointInRegion>>) {
        let event_id = message.event_id();
        {
            let mut state = self.state.lock().expect("cache mutex poisoned");
            state
                .groups
                .entry(event_id.clone())
                .or_insert_with(|| EventMessageGroup::new(event_id))
                .add_message(message.clone(), polygon);
        }
        debug!(event_id = %message.event_id(), "message submitted to cache");
        self.update_score(Some(&message));
    }

    /// Inbound `generate_events`: drop expired groups and return the suggested next tick delay,
    /// capped at 15 minutes.
    pub fn tick(&self, now: f64) -> Duration {
        let first_expiry = {
            let state = self.state.lock().expect("cache mutex poisoned");
            state
                .groups
                .values()
                .filter_map(|g| g.latest_message().map(|m| m.get_end_time_sec() as f64))
                .fold(f64::INFINITY, f64::min)
        };

        if first_expiry < now {
            let mut state = self.state.lock().expect("cache mutex poisoned");
            state.groups.retain(|_, g| {
                g.latest_message().map(|m| m.get_end_time_sec() as f64 > now).unwrap_or(false)
            });
            drop(state);
            info!("expired groups dropped from cache");
            self.update_score(None);
            return Duration::from_secs(0);
        }

        let delay = (first_expiry - now).max(0.0).min(15.0 * 60.0);
        Duration::from_secs_f64(delay)
    }

    fn score_for(&self, config: &CacheConfig, event_type: &str, elsewhere: bool) -> i32 {
        let base = config.message_scores.get(event_type).copied().unwrap_or(0);
        if elsewhere {
            base - 10
        } else {
            base
        }
    }

    /// Recompute the aggregate score across all active groups and, if it changed since the last
    /// emission, fire [`CacheEvent::ScoreChanged`] to every subscriber.
    fn update_score(&self, triggering: Option<&Arc<SameMessage>>) {
        let now = self.clock.now();
        let config = self.config.lock().expect("cache mutex poisoned");
        let state = self.state.lock().expect("cache mutex poisoned");

        let mut best = 0;
        for group in state.groups.values() {
            let local = group.is_effective(
                Some((config.location.lat, config.location.lon)),
                &config.location.fips,
                true,
                now,
            );
            if local {
                if let Some(msg) = group.latest_message() {
                    best = best.max(self.score_for(&config, &msg.get_event_type(), false));
                }
                continue;
            }
            let elsewhere = group.is_effective(
                Some((config.location.lat, config.location.lon)),
                &config.location.fips,
                false,
                now,
            );
            if elsewhere {
                if let Some(msg) = group.latest_message() {
                    best = best.max(self.score_for(&config, &msg.get_event_type(), true));
                }
            }
        }

        let listeners_fire = best != state.last_score;
        drop(state);
        if listeners_fire {
            let mut state = self.state.lock().expect("cache mutex poisoned");
            state.last_score = best;
            let event = CacheEvent::ScoreChanged {
                score: best,
                triggering_message: triggering.cloned(),
            };
            for listener in &state.listeners {
                listener(&event);
            }
            info!(score = best, "cache score changed");
        }
    }

    /// Active messages matching `event_pattern` (a regex over the 3-letter event code),
    /// effective `here` or elsewhere, sorted by the configured [`Sorter`].
    pub fn get_active_messages(&self, event_pattern: &str, here: bool) -> Result<Vec<ScoredMessage>> {
        let pattern = Regex::new(event_pattern).context(InvalidEventPatternSnafu {
            pattern: event_pattern.to_string(),
        })?;

        let now = self.clock.now();
        let config = self.config.lock().expect("cache mutex poisoned");
        let state = self.state.lock().expect("cache mutex poisoned");

        let mut results: Vec<ScoredMessage> = state
            .groups
            .values()
            .filter_map(|group| {
                let effective = group.is_effective(
                    Some((config.location.lat, config.location.lon)),
                    &config.location.fips,
                    here,
                    now,
                );
                if !effective {
                    return None;
                }
                let msg = group.latest_message()?.clone();
                if !pattern.is_match(&msg.get_event_type()) {
                    return None;
                }
                let score = self.score_for(&config, &msg.get_event_type(), false);
                Some(ScoredMessage { message: msg, score })
            })
            .collect();

        results.sort_by(|a, b| (config.sorter)(a, b));
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;

    fn cache(clock: SharedClock) -> MessageCache {
        MessageCache::new(
            CacheConfig::new(Location {
                lat: 35.5,
                lon: -78.5,
                fips: "037183".to_string(),
            }),
            clock,
        )
    }

    #[test]
    fn submitting_a_tornado_warning_raises_score_to_forty() {
        let clock: SharedClock = Arc::new(TestClock::new(1_591_829_100.0));
        let cache = cache(clock.clone());
        let scores = Arc::new(Mutex::new(Vec::new()));
        let scores_clone = scores.clone();
        cache.subscribe(Box::new(move |e| {
            let CacheEvent::ScoreChanged { score, .. } = e;
            scores_clone.lock().unwrap().push(*score);
        }));
        let msg = Arc::new(SameMessage::from_literal(
            "-WXR-TOR-037183+0030-1622245-KRAH/NWS-",
            9,
            clock.clone(),
        ));
        cache.submit(msg, None);
        assert_eq!(*scores.lock().unwrap(), vec![40]);
    }

    #[test]
    fn expiry_tick_drops_ended_groups_and_lowers_score() {
        let clock: SharedClock = Arc::new(TestClock::new(1_591_829_100.0));
        let cache = cache(clock.clone());
        let scores = Arc::new(Mutex::new(Vec::new()));
        let scores_clone = scores.clone();
        cache.subscribe(Box::new(move |e| {
            let CacheEvent::ScoreChanged { score, .. } = e;
            scores_clone.lock().unwrap().push(*score);
        }));

        let svr = Arc::new(SameMessage::from_literal(
            "-WXR-SVR-037183+0005-1622245-KRAH/NWS-",
            9,
            clock.clone(),
        ));
        cache.submit(svr, None);
        assert_eq!(*scores.lock().unwrap(), vec![30]);

        clock.advance(301.0);
        cache.tick(clock.now());
        assert_eq!(*scores.lock().unwrap(), vec![30, 0]);
    }

    #[test]
    fn get_active_messages_filters_by_event_pattern() {
        let clock: SharedClock = Arc::new(TestClock::new(1_591_829_100.0));
        let cache = cache(clock.clone());
        cache.submit(
            Arc::new(SameMessage::from_literal(
                "-WXR-TOR-037183+0030-1622245-KRAH/NWS-",
                9,
                clock.clone(),
            )),
            None,
        );
        let matches = cache.get_active_messages("TOR", true).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score(), 40);
        assert!(cache.get_active_messages("SVR", true).unwrap().is_empty());
    }

    #[test]
    fn invalid_event_pattern_is_an_error() {
        let clock: SharedClock = Arc::new(TestClock::new(0.0));
        let cache = cache(clock);
        assert!(cache.get_active_messages("(", true).is_err());
    }
}
