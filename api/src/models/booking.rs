// models/booking.rs

use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

// No 0/O or 1/I so references survive being read out over the phone.
const REFERENCE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const REFERENCE_LEN: usize = 8;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BookingDate {
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_hour: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_hour: Option<u32>,
}

impl BookingDate {
    pub fn whole_day(date: NaiveDate) -> Self {
        BookingDate { date, start_hour: None, end_hour: None }
    }

    pub fn hours(date: NaiveDate, start_hour: u32, end_hour: u32) -> Self {
        BookingDate { date, start_hour: Some(start_hour), end_hour: Some(end_hour) }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,   // waiting for the venue owner
    Approved,  // waiting for the deposit
    Confirmed, // deposit paid, slots claimed
    Completed,
    Cancelled,
    Rejected,
    Expired,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Approved => "approved",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Rejected => "rejected",
            BookingStatus::Expired => "expired",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Unpaid,
    DepositPaid,
    FullyPaid,
    Refunded,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    RequestedByCustomer,
    RequestedByOwner,
    Superseded,
    BalanceOverdue,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentKind {
    Deposit,
    Balance,
    Full,
    Refund,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PaymentRecord {
    pub reference: String,
    pub kind: PaymentKind,
    pub amount_cents: i64,
    pub received_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub from: Option<BookingStatus>,
    pub to: BookingStatus,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct VenueBooking {
    #[serde(rename = "_id")]
    pub id: String,
    pub reference: String,
    pub venue_id: String,
    pub event_id: Option<String>,
    pub customer_id: String,
    pub dates: Vec<BookingDate>,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub status: BookingStatus,
    pub payment_status: PaymentStatus,
    pub cancellation: Option<CancellationReason>,
    pub total_cents: i64,
    pub deposit_cents: i64,
    pub paid_cents: i64,
    pub refunded_cents: i64,
    pub payments: Vec<PaymentRecord>,
    pub deposit_due_at: Option<DateTime<Utc>>,
    pub balance_due_at: DateTime<Utc>,
    pub history: Vec<StatusChange>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VenueBooking {
    pub fn outstanding_cents(&self) -> i64 {
        (self.total_cents - self.paid_cents).max(0)
    }

    pub fn has_payment(&self, reference: &str) -> bool {
        self.payments.iter().any(|p| p.reference == reference)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewBookingRequest {
    pub venue_id: String,
    #[serde(default)]
    pub event_id: Option<String>,
    pub dates: Vec<BookingDate>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentRequest {
    pub reference: String,
    pub amount_cents: i64,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NoteRequest {
    #[serde(default)]
    pub note: Option<String>,
}

pub fn generate_reference() -> String {
    let mut rng = rand::thread_rng();
    let code: String = (0..REFERENCE_LEN)
        .filter_map(|_| REFERENCE_ALPHABET.choose(&mut rng).map(|b| *b as char))
        .collect();
    format!("BK-{}", code)
}
