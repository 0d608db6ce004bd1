// models/slot.rs

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Booked,
    Transition,
}

/// One claimed venue hour. The id is derived from `(venue_id, starts_at)`, so
/// two bookings can never hold the same hour.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AvailabilitySlot {
    #[serde(rename = "_id")]
    pub id: String,
    pub venue_id: String,
    pub starts_at: NaiveDateTime,
    pub kind: SlotKind,
    pub booking_id: String,
    pub claim_id: String,
}

impl AvailabilitySlot {
    pub fn new(
        venue_id: &str,
        starts_at: NaiveDateTime,
        kind: SlotKind,
        booking_id: &str,
        claim_id: &str,
    ) -> Self {
        AvailabilitySlot {
            id: slot_id(venue_id, starts_at),
            venue_id: venue_id.to_string(),
            starts_at,
            kind,
            booking_id: booking_id.to_string(),
            claim_id: claim_id.to_string(),
        }
    }
}

pub fn slot_id(venue_id: &str, starts_at: NaiveDateTime) -> String {
    format!("{}:{}", venue_id, starts_at.format("%Y-%m-%dT%H"))
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Available,
    Booked,
    Transition,
    Partial,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HourAvailability {
    pub hour: u32,
    pub state: Availability,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub state: Availability,
    pub hours: Vec<HourAvailability>,
}
