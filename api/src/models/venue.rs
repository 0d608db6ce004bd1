// models/venue.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BookingError;

pub const MAX_TRANSITION_HOURS: u32 = 72;
pub const MAX_ADVANCE_DAYS: u32 = 5 * 365;
pub const MAX_POLICY_DAYS: u32 = 365;
pub const MAX_POLICY_HOURS: u32 = 365 * 24;
pub const MAX_UNIT_PRICE_CENTS: i64 = 10_000_000_000;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BookingMode {
    Daily,  // whole dates
    Hourly, // hour ranges inside opening hours
}

/// Per-venue booking rules. Every field except `mode` has a default so venue
/// owners only send what they want to change.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct BookingPolicy {
    pub mode: BookingMode,
    pub open_hour: u32,
    pub close_hour: u32,
    pub transition_hours: u32,
    pub deposit_percent: u32,
    pub requires_approval: bool,
    pub deposit_window_hours: u32,
    pub balance_due_days: u32,
    pub refund_cutoff_days: u32,
    pub min_notice_hours: u32,
    pub max_advance_days: u32,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        BookingPolicy {
            mode: BookingMode::Daily,
            open_hour: 0,
            close_hour: 24,
            transition_hours: 0,
            deposit_percent: 30,
            requires_approval: true,
            deposit_window_hours: 48,
            balance_due_days: 7,
            refund_cutoff_days: 14,
            min_notice_hours: 24,
            max_advance_days: 365,
        }
    }
}

impl BookingPolicy {
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.deposit_percent > 100 {
            return Err(BookingError::Validation(format!(
                "deposit_percent must be between 0 and 100, got {}",
                self.deposit_percent
            )));
        }
        if self.close_hour > 24 || self.open_hour >= self.close_hour {
            return Err(BookingError::Validation(format!(
                "opening hours {}..{} are invalid",
                self.open_hour, self.close_hour
            )));
        }
        if self.transition_hours > MAX_TRANSITION_HOURS {
            return Err(BookingError::Validation(format!(
                "transition_hours may not exceed {}",
                MAX_TRANSITION_HOURS
            )));
        }
        check_range("deposit_window_hours", self.deposit_window_hours, 1, MAX_POLICY_HOURS)?;
        check_range("min_notice_hours", self.min_notice_hours, 0, MAX_POLICY_HOURS)?;
        check_range("max_advance_days", self.max_advance_days, 1, MAX_ADVANCE_DAYS)?;
        check_range("balance_due_days", self.balance_due_days, 0, MAX_POLICY_DAYS)?;
        check_range("refund_cutoff_days", self.refund_cutoff_days, 0, MAX_POLICY_DAYS)?;
        Ok(())
    }
}

fn check_range(field: &str, value: u32, min: u32, max: u32) -> Result<(), BookingError> {
    if value < min || value > max {
        return Err(BookingError::Validation(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, value
        )));
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Venue {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub capacity: u32,
    pub unit_price_cents: i64, // per date (daily) or per hour (hourly)
    pub policy: BookingPolicy,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewVenue {
    pub name: String,
    pub capacity: u32,
    pub unit_price_cents: i64,
    #[serde(default)]
    pub policy: BookingPolicy,
}

impl NewVenue {
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.name.trim().is_empty() {
            return Err(BookingError::Validation("venue name is required".to_string()));
        }
        if self.capacity == 0 {
            return Err(BookingError::Validation("capacity must be positive".to_string()));
        }
        if self.unit_price_cents <= 0 || self.unit_price_cents > MAX_UNIT_PRICE_CENTS {
            return Err(BookingError::Validation(format!(
                "unit_price_cents must be between 1 and {}",
                MAX_UNIT_PRICE_CENTS
            )));
        }
        self.policy.validate()
    }

    pub fn into_venue(self, id: String, owner_id: &str, now: DateTime<Utc>) -> Venue {
        Venue {
            id,
            name: self.name.trim().to_string(),
            owner_id: owner_id.to_string(),
            capacity: self.capacity,
            unit_price_cents: self.unit_price_cents,
            policy: self.policy,
            created_at: now,
        }
    }
}
