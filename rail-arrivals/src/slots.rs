//! The three published slots.
//!
//! Slot assignment is a projection of the ranked candidate list: slot 1
//! holds the first candidate, slot 2 the second, and so on. Nothing is
//! carried between publications, so when the next train departs every
//! remaining train simply moves up a slot on the following cycle.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;

use crate::domain::{LocalTime, clock};
use crate::engine::{ArrivalCandidate, SLOT_COUNT, TrackerTarget};

/// State shown for a slot with no train.
pub const EMPTY_STATE: &str = "No data";

/// One rank position, 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    pub number: usize,
    pub candidate: Option<ArrivalCandidate>,
}

/// A complete set of slots, published atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub line_name: String,
    pub departure_station: String,
    pub arrival_station: String,
    /// Always `SLOT_COUNT` entries, numbered from 1.
    pub slots: Vec<Slot>,
    /// When the realtime feed last succeeded. `None` until it has.
    pub last_update: Option<LocalTime>,
    /// When this publication was built. `None` for the startup placeholder.
    pub published_at: Option<LocalTime>,
}

impl Publication {
    /// The placeholder shown before the first cycle completes.
    pub fn empty() -> Self {
        Self {
            line_name: String::new(),
            departure_station: String::new(),
            arrival_station: String::new(),
            slots: (1..=SLOT_COUNT)
                .map(|number| Slot {
                    number,
                    candidate: None,
                })
                .collect(),
            last_update: None,
            published_at: None,
        }
    }

    /// Assign ranked candidates to slots. Extra candidates are ignored and
    /// missing ones leave their slots empty.
    pub fn new(
        target: &TrackerTarget,
        candidates: Vec<ArrivalCandidate>,
        last_update: Option<LocalTime>,
        published_at: LocalTime,
    ) -> Self {
        let mut candidates = candidates.into_iter();
        let slots = (1..=SLOT_COUNT)
            .map(|number| Slot {
                number,
                candidate: candidates.next(),
            })
            .collect();

        Self {
            line_name: target.line_name.clone(),
            departure_station: target.departure_name.clone(),
            arrival_station: target.arrival_name.clone(),
            slots,
            last_update,
            published_at: Some(published_at),
        }
    }

    /// Slot by 1-based number.
    pub fn slot(&self, number: usize) -> Option<&Slot> {
        number.checked_sub(1).and_then(|i| self.slots.get(i))
    }

    /// External view of one slot.
    pub fn view(&self, number: usize) -> Option<SlotView> {
        self.slot(number).map(|slot| self.render(slot))
    }

    /// External views of all slots, in order.
    pub fn views(&self) -> Vec<SlotView> {
        self.slots.iter().map(|slot| self.render(slot)).collect()
    }

    /// Number of slots holding a train.
    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|s| s.candidate.is_some()).count()
    }

    fn render(&self, slot: &Slot) -> SlotView {
        let last_update = self.last_update.as_ref().map(|t| t.to_rfc3339());

        let Some(c) = &slot.candidate else {
            return SlotView {
                state: EMPTY_STATE.to_string(),
                attributes: SlotAttributes {
                    last_update,
                    train_number: slot.number,
                    ..SlotAttributes::default()
                },
            };
        };

        let mut state = match &c.arrival {
            Some(arrival) => format!("{} → {}", clock(&c.departure), clock(arrival)),
            None => format!("Departs {}", clock(&c.departure)),
        };
        if let Some(published) = &self.published_at
            && c.departure.date_naive() > published.date_naive()
        {
            state.push_str(" (Tomorrow)");
        }

        SlotView {
            state,
            attributes: SlotAttributes {
                last_update,
                train_number: slot.number,
                departure_time: Some(clock(&c.departure)),
                arrival_time: c.arrival.as_ref().map(clock),
                departure_station: Some(c.departure_station.clone()),
                arrival_station: Some(c.arrival_station.clone()),
                departure_full: Some(c.departure.to_rfc3339()),
                arrival_full: c.arrival.as_ref().map(|t| t.to_rfc3339()),
                trip_id: Some(c.trip_id.to_string()),
            },
        }
    }
}

/// What an external consumer sees for one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotView {
    pub state: String,
    pub attributes: SlotAttributes,
}

/// Slot attributes. Absent values are left out of the JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SlotAttributes {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_update: Option<String>,
    pub train_number: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_station: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_station: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub departure_full: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arrival_full: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
}

/// Holder of a tracker's latest publication.
///
/// Readers get an `Arc` to a complete publication; a publish swaps the
/// pointer, so no reader sees a mix of old and new slots.
#[derive(Debug)]
pub struct SlotBoard {
    current: RwLock<Arc<Publication>>,
}

impl Default for SlotBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl SlotBoard {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(Arc::new(Publication::empty())),
        }
    }

    /// Replace the published slots.
    pub async fn publish(&self, publication: Publication) {
        *self.current.write().await = Arc::new(publication);
    }

    /// The latest full publication.
    pub async fn current(&self) -> Arc<Publication> {
        Arc::clone(&*self.current.read().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RouteId, StopId, TripId};
    use chrono::{Duration, NaiveDate, TimeZone};
    use chrono_tz::America::Chicago;

    fn local(d: u32, h: u32, m: u32) -> LocalTime {
        Chicago.with_ymd_and_hms(2024, 3, d, h, m, 0).unwrap()
    }

    fn target() -> TrackerTarget {
        TrackerTarget {
            line_id: RouteId::new("UP-W"),
            line_name: "Union Pacific West".into(),
            departure_stop: StopId::new("OAKPARK"),
            arrival_stop: StopId::new("OTC"),
            departure_name: "Oak Park".into(),
            arrival_name: "Chicago OTC".into(),
            grace: Duration::minutes(5),
        }
    }

    fn candidate(id: &str, dep: LocalTime, arr: Option<LocalTime>) -> ArrivalCandidate {
        ArrivalCandidate {
            trip_id: TripId::new(id),
            service_date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            departure: dep,
            arrival: arr,
            departure_station: "Oak Park".into(),
            arrival_station: "Chicago OTC".into(),
            has_realtime: true,
        }
    }

    #[test]
    fn renders_known_and_unknown_arrivals() {
        let publication = Publication::new(
            &target(),
            vec![
                candidate("UW40", local(15, 22, 30), Some(local(15, 22, 49))),
                candidate("UW42", local(15, 22, 33), None),
            ],
            Some(local(15, 22, 0)),
            local(15, 22, 0),
        );

        let views = publication.views();
        assert_eq!(views.len(), 3);
        assert_eq!(views[0].state, "22:30 → 22:49");
        assert_eq!(views[0].attributes.train_number, 1);
        assert_eq!(views[0].attributes.arrival_time.as_deref(), Some("22:49"));
        assert_eq!(
            views[0].attributes.departure_full.as_deref(),
            Some("2024-03-15T22:30:00-05:00")
        );

        assert_eq!(views[1].state, "Departs 22:33");
        assert_eq!(views[1].attributes.arrival_time, None);
        assert_eq!(views[1].attributes.arrival_full, None);

        assert_eq!(views[2].state, EMPTY_STATE);
        assert_eq!(views[2].attributes.train_number, 3);
        assert_eq!(publication.filled(), 2);
    }

    #[test]
    fn tomorrow_suffix() {
        let publication = Publication::new(
            &target(),
            vec![candidate("UW2", local(16, 5, 40), Some(local(16, 6, 20)))],
            None,
            local(15, 23, 55),
        );
        assert_eq!(publication.views()[0].state, "05:40 → 06:20 (Tomorrow)");
    }

    #[test]
    fn empty_slot_serializes_minimal_attributes() {
        let publication = Publication::new(&target(), vec![], Some(local(15, 22, 0)), local(15, 22, 0));
        let json = serde_json::to_value(publication.view(1).unwrap()).unwrap();

        assert_eq!(json["state"], "No data");
        let attrs = json["attributes"].as_object().unwrap();
        let mut keys: Vec<&str> = attrs.keys().map(|k| k.as_str()).collect();
        keys.sort();
        assert_eq!(keys, vec!["last_update", "train_number"]);
    }

    #[test]
    fn slot_numbers_are_one_based() {
        let publication = Publication::empty();
        assert!(publication.slot(0).is_none());
        assert_eq!(publication.slot(1).unwrap().number, 1);
        assert_eq!(publication.slot(3).unwrap().number, 3);
        assert!(publication.view(4).is_none());
    }

    #[tokio::test]
    async fn board_swaps_whole_publication() {
        let board = SlotBoard::new();
        assert_eq!(board.current().await.filled(), 0);

        let before = board.current().await;
        let publication = Publication::new(
            &target(),
            vec![candidate("UW40", local(15, 22, 30), None)],
            None,
            local(15, 22, 0),
        );
        board.publish(publication.clone()).await;

        assert_eq!(*board.current().await, publication);
        assert_eq!(before.filled(), 0);
    }
}
