use chrono::{DateTime, Utc};

use crate::error::BookingError;
use crate::models::booking::{BookingStatus, StatusChange, VenueBooking};

impl BookingStatus {
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Rejected)
                | (Pending, Cancelled)
                | (Pending, Expired)
                | (Approved, Confirmed)
                | (Approved, Cancelled)
                | (Approved, Expired)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BookingStatus::Completed
                | BookingStatus::Cancelled
                | BookingStatus::Rejected
                | BookingStatus::Expired
        )
    }

    /// Still competing for (or holding) the venue.
    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    pub fn holds_claims(self) -> bool {
        self == BookingStatus::Confirmed
    }
}

impl VenueBooking {
    pub fn transition(
        &mut self,
        to: BookingStatus,
        at: DateTime<Utc>,
        note: Option<String>,
    ) -> Result<(), BookingError> {
        if !self.status.can_transition_to(to) {
            return Err(BookingError::InvalidTransition { from: self.status, to });
        }
        self.history.push(StatusChange { from: Some(self.status), to, at, note });
        self.status = to;
        self.updated_at = at;
        Ok(())
    }
}
