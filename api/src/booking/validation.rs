use chrono::{Days, Duration, NaiveDateTime};

use crate::booking::schedule::SlotPlan;
use crate::error::BookingError;
use crate::models::booking::BookingDate;
use crate::models::venue::{BookingMode, BookingPolicy};

pub const MAX_BOOKING_DATES: usize = 31;

/// Checks a booking request against the venue's policy and returns the hours
/// it would hold. Conflicts with other bookings are not checked here.
pub fn validate_booking_dates(
    dates: &[BookingDate],
    policy: &BookingPolicy,
    now: NaiveDateTime,
) -> Result<SlotPlan, BookingError> {
    if dates.is_empty() {
        return Err(BookingError::Validation(
            "at least one booking date is required".to_string(),
        ));
    }
    if dates.len() > MAX_BOOKING_DATES {
        return Err(BookingError::Validation(format!(
            "a booking may cover at most {} dates",
            MAX_BOOKING_DATES
        )));
    }

    if policy.mode == BookingMode::Hourly {
        for date in dates {
            if let (Some(start), Some(end)) = (date.start_hour, date.end_hour) {
                if start < policy.open_hour || end > policy.close_hour {
                    return Err(BookingError::Validation(format!(
                        "{}: {}..{} is outside opening hours {}..{}",
                        date.date, start, end, policy.open_hour, policy.close_hour
                    )));
                }
            }
        }
    }

    let plan = SlotPlan::build(dates, policy)?;

    let earliest_allowed = Duration::try_hours(i64::from(policy.min_notice_hours))
        .and_then(|notice| now.checked_add_signed(notice))
        .ok_or_else(|| BookingError::Validation("min_notice_hours is out of range".to_string()))?;
    if plan.starts_at() < earliest_allowed {
        return Err(BookingError::Validation(format!(
            "bookings need {} hours notice, earliest possible start is {}",
            policy.min_notice_hours,
            earliest_allowed.format("%Y-%m-%d %H:%M")
        )));
    }

    let last_date = plan.segments[plan.segments.len() - 1].start.date();
    let horizon = now
        .date()
        .checked_add_days(Days::new(u64::from(policy.max_advance_days)))
        .ok_or_else(|| BookingError::Validation("max_advance_days is out of range".to_string()))?;
    if last_date > horizon {
        return Err(BookingError::Validation(format!(
            "bookings can be made at most {} days in advance",
            policy.max_advance_days
        )));
    }

    Ok(plan)
}
