//! `EventMessageGroup`: all `SameMessage` copies sharing one event identifier.

use std::collections::HashSet;
use std::sync::Arc;

use super::region::PointInRegion;
use crate::same::SameMessage;

/// Messages that share an `event_id` (typically successive updates to the same warning),
/// answering locality/effectiveness queries over their union of covered areas.
pub struct EventMessageGroup {
    event_id: String,
    messages: Vec<Arc<SameMessage>>,
    /// The polygon refining the most recently added message's footprint, if one was supplied
    /// alongside it (SAME headers alone carry no polygon; it comes from a companion product).
    latest_polygon: Option<Arc<dyn PointInRegion>>,
}

impl EventMessageGroup {
    pub fn new(event_id: impl Into<String>) -> Self {
        EventMessageGroup {
            event_id: event_id.into(),
            messages: Vec::new(),
            latest_polygon: None,
        }
    }

    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    /// Append-only; re-adding the same `Arc` is idempotent by pointer identity.
    pub fn add_message(&mut self, message: Arc<SameMessage>, polygon: Option<Arc<dyn PointInRegion>>) {
        if self.messages.iter().any(|m| Arc::ptr_eq(m, &message)) {
            return;
        }
        self.messages.push(message);
        if polygon.is_some() {
            self.latest_polygon = polygon;
        }
    }

    pub fn messages(&self) -> &[Arc<SameMessage>] {
        &self.messages
    }

    pub fn latest_message(&self) -> Option<&Arc<SameMessage>> {
        self.messages.last()
    }

    /// Union of FIPS areas covered by any message in the group.
    pub fn areas(&self) -> HashSet<String> {
        self.messages.iter().flat_map(|m| m.get_counties()).collect()
    }

    fn currently_applicable(&self, fips: &str, when: f64) -> Vec<&Arc<SameMessage>> {
        self.messages
            .iter()
            .filter(|m| {
                let end = m.get_end_time_sec() as f64;
                let start = m.get_start_time_sec() as f64;
                end > when && start <= when && m.applies_to_fips(fips).unwrap_or(false)
            })
            .collect()
    }

    /// Is this event effective at `fips` right now (`when`)?
    ///
    /// `test_for_here=true` answers for exactly this area. `test_for_here=false` additionally
    /// widens the search to every other area this group covers when a sub-county polygon
    /// excludes `latlon` from the queried area.
    pub fn is_effective(&self, latlon: Option<(f64, f64)>, fips: &str, test_for_here: bool, when: f64) -> bool {
        let matches = self.currently_applicable(fips, when);
        let truthy = !matches.is_empty();

        if truthy {
            if let (Some((lat, lon)), Some(polygon)) = (latlon, &self.latest_polygon) {
                if !polygon.contains(lat, lon) {
                    if test_for_here {
                        return false;
                    }
                    // polygon exists and excludes the point: per the documented behavior this
                    // still counts as effective for the wider "not here" query.
                    return true;
                }
            }
            if !test_for_here {
                // plain, unrestricted match for this exact fips: no polygon excluded the
                // point, so the wider "not here" query is answered right here, without
                // widening the search to the group's other covered areas.
                return false;
            }
        }

        if test_for_here {
            return truthy;
        }

        for area in self.areas() {
            if area == fips {
                continue;
            }
            if self.is_effective(None, &area, true, when) {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::region::RectangleRegion;
    use crate::clock::{SharedClock, TestClock};

    fn message(clock: SharedClock, literal: &str) -> Arc<SameMessage> {
        Arc::new(SameMessage::from_literal(literal, 9, clock))
    }

    #[test]
    fn effective_within_covered_county_and_time_window() {
        let clock: SharedClock = Arc::new(TestClock::new(1_591_829_100.0));
        let mut group = EventMessageGroup::new("evt");
        group.add_message(
            message(clock.clone(), "-WXR-TOR-039173+0030-1622245-KCLE/NWS-"),
            None,
        );
        assert!(group.is_effective(None, "039173", true, clock.now()));
        assert!(!group.is_effective(None, "039174", true, clock.now()));
    }

    #[test]
    fn polygon_excludes_point_for_here_query() {
        let clock: SharedClock = Arc::new(TestClock::new(1_591_829_100.0));
        let mut group = EventMessageGroup::new("evt");
        let outside = RectangleRegion {
            min_lat: 10.0,
            max_lat: 11.0,
            min_lon: 10.0,
            max_lon: 11.0,
        };
        group.add_message(
            message(clock.clone(), "-WXR-TOR-039173+0030-1622245-KCLE/NWS-"),
            Some(Arc::new(outside)),
        );
        assert!(!group.is_effective(Some((35.0, -80.0)), "039173", true, clock.now()));
        assert!(group.is_effective(Some((35.0, -80.0)), "039173", false, clock.now()));
    }

    #[test]
    fn duplicate_message_is_idempotent() {
        let clock: SharedClock = Arc::new(TestClock::new(1_591_829_100.0));
        let mut group = EventMessageGroup::new("evt");
        let m = message(clock.clone(), "-WXR-TOR-039173+0030-1622245-KCLE/NWS-");
        group.add_message(m.clone(), None);
        group.add_message(m, None);
        assert_eq!(group.messages().len(), 1);
    }
}
