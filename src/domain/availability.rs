use crate::domain::models::{SlotRange, SlotStatus, VenueRow, VenueSession};
use crate::domain::time_classifier::{is_future, is_past};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum SlotCategory {
    Past,
    FreePriced { price: f64 },
    FreeComplimentary,
    Sold,
    Reserved { purpose: Option<String> },
}

impl SlotCategory {
    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::FreePriced { .. } | Self::FreeComplimentary)
    }
}

pub fn classify(session: &VenueSession, past: bool) -> SlotCategory {
    if past {
        return SlotCategory::Past;
    }
    match session.status {
        SlotStatus::Free if session.price > 0.0 => SlotCategory::FreePriced {
            price: session.price,
        },
        SlotStatus::Free => SlotCategory::FreeComplimentary,
        SlotStatus::Sold => SlotCategory::Sold,
        SlotStatus::Reserved => SlotCategory::Reserved {
            purpose: session
                .fixed_purpose
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(ToOwned::to_owned),
        },
    }
}

pub fn is_bookable(session: &VenueSession, past: bool) -> bool {
    classify(session, past).is_interactive()
}

/// A free, not-yet-past slot picked out of a date's rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotSelection {
    pub date: NaiveDate,
    pub slot: SlotRange,
    pub venue_name: String,
    pub session: VenueSession,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BookingActions {
    pub direct: bool,
    pub lock: bool,
}

impl SlotSelection {
    pub fn from_rows(
        rows: &[VenueRow],
        date: NaiveDate,
        venue: &str,
        slot: SlotRange,
        now: NaiveDateTime,
    ) -> Result<Self, String> {
        let venue = venue.trim();
        let row = rows
            .iter()
            .find(|row| row.id == venue || row.name == venue)
            .ok_or_else(|| format!("venue {venue} not found on {date}"))?;
        let session = row
            .session_for(&slot)
            .ok_or_else(|| format!("venue {} has no {slot} session on {date}", row.name))?;
        let category = classify(session, is_past(date, &slot, now));
        if !category.is_interactive() {
            return Err(format!(
                "{} {slot} on {date} is not bookable ({})",
                row.name,
                category_label(&category)
            ));
        }
        Ok(Self {
            date,
            slot,
            venue_name: row.name.clone(),
            session: session.clone(),
        })
    }

    pub fn offered_actions(&self, now: NaiveDateTime) -> BookingActions {
        let past = is_past(self.date, &self.slot, now);
        BookingActions {
            direct: is_bookable(&self.session, past),
            lock: is_future(self.date, &self.slot, now),
        }
    }
}

pub fn category_label(category: &SlotCategory) -> &'static str {
    match category {
        SlotCategory::Past => "past",
        SlotCategory::FreePriced { .. } => "free",
        SlotCategory::FreeComplimentary => "free (complimentary)",
        SlotCategory::Sold => "sold",
        SlotCategory::Reserved { .. } => "reserved",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(status: SlotStatus, price: f64, purpose: Option<&str>) -> VenueSession {
        VenueSession {
            name: None,
            venue_id: "v-1".to_string(),
            start_time: "18:00".to_string(),
            end_time: "20:00".to_string(),
            status,
            price,
            stadium_id: None,
            fixed_purpose: purpose.map(ToOwned::to_owned),
        }
    }

    fn rows() -> Vec<VenueRow> {
        vec![VenueRow {
            name: "Court 1".to_string(),
            id: "v-1".to_string(),
            sessions: vec![
                session(SlotStatus::Free, 40.0, None),
                VenueSession {
                    start_time: "08:00".to_string(),
                    end_time: "09:00".to_string(),
                    ..session(SlotStatus::Sold, 40.0, None)
                },
            ],
        }]
    }

    fn at(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 3, 10)
            .expect("date")
            .and_hms_opt(hour, 0, 0)
            .expect("time")
    }

    #[test]
    fn classify_covers_each_category() {
        assert_eq!(
            classify(&session(SlotStatus::Free, 40.0, None), false),
            SlotCategory::FreePriced { price: 40.0 }
        );
        assert_eq!(
            classify(&session(SlotStatus::Free, 0.0, None), false),
            SlotCategory::FreeComplimentary
        );
        assert_eq!(classify(&session(SlotStatus::Sold, 40.0, None), false), SlotCategory::Sold);
        assert_eq!(
            classify(&session(SlotStatus::Reserved, 0.0, Some(" team training ")), false),
            SlotCategory::Reserved {
                purpose: Some("team training".to_string())
            }
        );
        assert_eq!(classify(&session(SlotStatus::Free, 40.0, None), true), SlotCategory::Past);
    }

    #[test]
    fn bookable_requires_free_and_not_past() {
        for status in [SlotStatus::Free, SlotStatus::Sold, SlotStatus::Reserved] {
            for past in [false, true] {
                let expected = status == SlotStatus::Free && !past;
                assert_eq!(is_bookable(&session(status, 40.0, None), past), expected);
            }
        }
    }

    #[test]
    fn selection_resolves_by_name_or_id() {
        let date = at(10).date();
        let slot: SlotRange = "18:00-20:00".parse().expect("slot");
        let by_id = SlotSelection::from_rows(&rows(), date, "v-1", slot, at(10)).expect("by id");
        let by_name =
            SlotSelection::from_rows(&rows(), date, "Court 1", slot, at(10)).expect("by name");
        assert_eq!(by_id, by_name);
        assert_eq!(by_id.venue_name, "Court 1");
    }

    #[test]
    fn selection_rejects_sold_or_past_slots() {
        let date = at(10).date();
        let sold: SlotRange = "08:00-09:00".parse().expect("slot");
        let error = SlotSelection::from_rows(&rows(), date, "v-1", sold, at(7)).expect_err("sold");
        assert!(error.contains("sold"));

        let evening: SlotRange = "18:00-20:00".parse().expect("slot");
        let error =
            SlotSelection::from_rows(&rows(), date, "v-1", evening, at(21)).expect_err("past");
        assert!(error.contains("past"));
    }

    #[test]
    fn lock_is_offered_only_before_the_slot_starts() {
        let date = at(10).date();
        let slot: SlotRange = "18:00-20:00".parse().expect("slot");
        let selection = SlotSelection::from_rows(&rows(), date, "v-1", slot, at(10)).expect("select");
        assert_eq!(
            selection.offered_actions(at(10)),
            BookingActions {
                direct: true,
                lock: true
            }
        );
        assert_eq!(
            selection.offered_actions(at(19)),
            BookingActions {
                direct: true,
                lock: false
            }
        );
    }
}
