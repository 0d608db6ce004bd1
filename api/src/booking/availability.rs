use std::collections::HashMap;

use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::booking::schedule::{at_hour, check_date};
use crate::error::BookingError;
use crate::models::slot::{Availability, AvailabilitySlot, DayAvailability, HourAvailability, SlotKind};
use crate::models::venue::{BookingMode, BookingPolicy};

pub const MAX_CALENDAR_DAYS: i64 = 92;

pub fn check_range(from: NaiveDate, to: NaiveDate) -> Result<(), BookingError> {
    check_date(from)?;
    check_date(to)?;
    if to < from {
        return Err(BookingError::Validation("`to` must not be before `from`".to_string()));
    }
    if (to - from).num_days() >= MAX_CALENDAR_DAYS {
        return Err(BookingError::Validation(format!(
            "availability can be queried for at most {} days",
            MAX_CALENDAR_DAYS
        )));
    }
    Ok(())
}

/// Claims that can affect `[from, to]`: the days themselves plus the
/// transition window after `to`.
pub fn claim_window(
    from: NaiveDate,
    to: NaiveDate,
    policy: &BookingPolicy,
) -> (NaiveDateTime, NaiveDateTime) {
    (
        at_hour(from, 0),
        at_hour(to, 24) + Duration::hours(i64::from(policy.transition_hours)),
    )
}

pub fn day_availability(
    policy: &BookingPolicy,
    from: NaiveDate,
    to: NaiveDate,
    slots: &[AvailabilitySlot],
) -> Vec<DayAvailability> {
    let claimed: HashMap<NaiveDateTime, SlotKind> =
        slots.iter().map(|s| (s.starts_at, s.kind)).collect();
    let transition = i64::from(policy.transition_hours);

    let hour_state = |hour: NaiveDateTime| match claimed.get(&hour) {
        Some(SlotKind::Booked) => Availability::Booked,
        Some(SlotKind::Transition) => Availability::Transition,
        // A free hour right before a claim cannot be used: the booking's own
        // turnover would run into it.
        None if (1..=transition).any(|k| claimed.contains_key(&(hour + Duration::hours(k)))) => {
            Availability::Transition
        }
        None => Availability::Available,
    };

    let mut days = Vec::new();
    let mut date = from;
    while date <= to {
        let day = match policy.mode {
            BookingMode::Daily => {
                let states: Vec<Availability> =
                    (0..24).map(|h| hour_state(at_hour(date, h))).collect();
                let state = if states.contains(&Availability::Booked) {
                    Availability::Booked
                } else if states.iter().any(|s| *s != Availability::Available) {
                    Availability::Transition
                } else {
                    Availability::Available
                };
                DayAvailability { date, state, hours: Vec::new() }
            }
            BookingMode::Hourly => {
                let hours: Vec<HourAvailability> = (policy.open_hour..policy.close_hour)
                    .map(|hour| HourAvailability { hour, state: hour_state(at_hour(date, hour)) })
                    .collect();
                // No bookable hour left means the day is taken, whether by
                // events or by turnover.
                let free = hours.iter().filter(|h| h.state == Availability::Available).count();
                let state = if free == hours.len() {
                    Availability::Available
                } else if free > 0 {
                    Availability::Partial
                } else {
                    Availability::Booked
                };
                DayAvailability { date, state, hours }
            }
        };
        days.push(day);
        date = date + Duration::days(1);
    }
    days
}
