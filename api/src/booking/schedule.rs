//! Turns requested booking dates into hour intervals and the set of venue
//! hours a booking holds once confirmed.
//!
//! A confirmed booking claims its core hours as `booked` and the
//! `transition_hours` after every hold as `transition`. Two bookings fit side
//! by side exactly when their claim sets are disjoint, which is the same as
//! saying the gap between them is at least the venue's transition time in
//! either direction.

use std::collections::HashSet;

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::BookingError;
use crate::models::booking::BookingDate;
use crate::models::slot::{AvailabilitySlot, SlotKind};
use crate::models::venue::{BookingMode, BookingPolicy};

/// Half-open `[start, end)` range of whole hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Interval {
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn len_hours(&self) -> i64 {
        (self.end - self.start).num_hours()
    }

    pub fn hours(&self) -> impl Iterator<Item = NaiveDateTime> {
        let start = self.start;
        (0..self.len_hours()).map(move |h| start + Duration::hours(h))
    }
}

/// Years a booking or calendar query may refer to. Keeps every hour and
/// buffer computed from a date inside chrono's range.
pub const EARLIEST_YEAR: i32 = 2000;
pub const LATEST_YEAR: i32 = 9999;

pub fn check_date(date: NaiveDate) -> Result<(), BookingError> {
    if !(EARLIEST_YEAR..=LATEST_YEAR).contains(&date.year()) {
        return Err(BookingError::Validation(format!(
            "{} is outside the supported years {}..={}",
            date, EARLIEST_YEAR, LATEST_YEAR
        )));
    }
    Ok(())
}

pub fn at_hour(date: NaiveDate, hour: u32) -> NaiveDateTime {
    date.and_time(NaiveTime::default()) + Duration::hours(i64::from(hour))
}

/// The core (paid-for) hours of a single requested date.
pub fn core_interval(date: &BookingDate, mode: BookingMode) -> Result<Interval, BookingError> {
    check_date(date.date)?;
    match (mode, date.start_hour, date.end_hour) {
        (BookingMode::Daily, None, None) => Ok(Interval {
            start: at_hour(date.date, 0),
            end: at_hour(date.date, 24),
        }),
        (BookingMode::Daily, _, _) => Err(BookingError::Validation(format!(
            "{}: this venue is booked by whole dates, hours are not accepted",
            date.date
        ))),
        (BookingMode::Hourly, Some(start), Some(end)) => {
            if start >= end || end > 24 {
                return Err(BookingError::Validation(format!(
                    "{}: hour range {}..{} is invalid",
                    date.date, start, end
                )));
            }
            Ok(Interval {
                start: at_hour(date.date, start),
                end: at_hour(date.date, end),
            })
        }
        (BookingMode::Hourly, _, _) => Err(BookingError::Validation(format!(
            "{}: start_hour and end_hour are required for this venue",
            date.date
        ))),
    }
}

#[derive(Debug, Clone)]
pub struct SlotPlan {
    /// Core intervals in chronological order, one per requested date.
    pub segments: Vec<Interval>,
    /// Every hour the booking holds once confirmed.
    pub claims: Vec<(NaiveDateTime, SlotKind)>,
}

impl SlotPlan {
    pub fn build(dates: &[BookingDate], policy: &BookingPolicy) -> Result<Self, BookingError> {
        if dates.is_empty() {
            return Err(BookingError::Validation(
                "at least one booking date is required".to_string(),
            ));
        }

        let mut segments = dates
            .iter()
            .map(|d| core_interval(d, policy.mode))
            .collect::<Result<Vec<_>, _>>()?;
        segments.sort_by_key(|s| s.start);

        for pair in segments.windows(2) {
            if pair[0].overlaps(&pair[1]) {
                return Err(BookingError::Validation(format!(
                    "requested dates overlap around {}",
                    pair[1].start
                )));
            }
        }

        let transition = Duration::hours(i64::from(policy.transition_hours));
        let mut claims = Vec::new();
        let mut i = 0;
        while i < segments.len() {
            claims.extend(segments[i].hours().map(|h| (h, SlotKind::Booked)));

            // Segments closer together than the transition time form one hold;
            // the hours between them are turnover, not free time.
            let mut j = i + 1;
            while j < segments.len() && segments[j].start < segments[j - 1].end + transition {
                let gap = Interval { start: segments[j - 1].end, end: segments[j].start };
                claims.extend(gap.hours().map(|h| (h, SlotKind::Transition)));
                claims.extend(segments[j].hours().map(|h| (h, SlotKind::Booked)));
                j += 1;
            }

            let trailing = Interval {
                start: segments[j - 1].end,
                end: segments[j - 1].end + transition,
            };
            claims.extend(trailing.hours().map(|h| (h, SlotKind::Transition)));
            i = j;
        }

        Ok(SlotPlan { segments, claims })
    }

    pub fn starts_at(&self) -> NaiveDateTime {
        self.segments[0].start
    }

    pub fn ends_at(&self) -> NaiveDateTime {
        self.segments[self.segments.len() - 1].end
    }

    pub fn core_hours(&self) -> i64 {
        self.segments.iter().map(Interval::len_hours).sum()
    }

    /// First claimed hour and the end of the last claimed hour.
    pub fn hold_range(&self) -> (NaiveDateTime, NaiveDateTime) {
        let first = self.claims.iter().map(|(h, _)| *h).min().unwrap_or_else(|| self.starts_at());
        let last = self.claims.iter().map(|(h, _)| *h).max().unwrap_or_else(|| self.ends_at());
        (first, last + Duration::hours(1))
    }

    pub fn collides(&self, other: &SlotPlan) -> bool {
        let mine: HashSet<NaiveDateTime> = self.claims.iter().map(|(h, _)| *h).collect();
        other.claims.iter().any(|(h, _)| mine.contains(h))
    }

    pub fn collides_with_slots(&self, slots: &[AvailabilitySlot]) -> Option<NaiveDateTime> {
        let held: HashSet<NaiveDateTime> = slots.iter().map(|s| s.starts_at).collect();
        self.claims.iter().map(|(h, _)| *h).find(|h| held.contains(h))
    }

    pub fn to_slots(&self, venue_id: &str, booking_id: &str, claim_id: &str) -> Vec<AvailabilitySlot> {
        self.claims
            .iter()
            .map(|(hour, kind)| AvailabilitySlot::new(venue_id, *hour, *kind, booking_id, claim_id))
            .collect()
    }
}
