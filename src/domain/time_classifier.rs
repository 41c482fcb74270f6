//! Wall-clock classification of slots at hour granularity.
//!
//! `is_past` and `is_future` are evaluated independently. For the current
//! date a slot that started this hour is neither past nor future, and a slot
//! whose end hour equals the current hour is past even though its start hour
//! may also be earlier.

use crate::domain::models::SlotRange;
use chrono::{Duration, NaiveDate, NaiveDateTime, Timelike};

pub fn is_past(date: NaiveDate, slot: &SlotRange, now: NaiveDateTime) -> bool {
    let today = now.date();
    if date < today {
        return true;
    }
    if date > today {
        return false;
    }
    slot.end_hour() <= now.hour()
}

pub fn is_future(date: NaiveDate, slot: &SlotRange, now: NaiveDateTime) -> bool {
    let today = now.date();
    if date > today {
        return true;
    }
    if date < today {
        return false;
    }
    slot.start_hour() >= now.hour()
}

/// Consecutive dates starting at `today`.
pub fn rolling_window(today: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..i64::from(days))
        .map(|offset| today + Duration::days(offset))
        .collect()
}
