use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::error::Result;
use crate::models::booking::{BookingStatus, VenueBooking};
use crate::models::slot::AvailabilitySlot;
use crate::models::venue::Venue;

/// Persistence used by the booking service.
///
/// Two guarantees carry the concurrency story, so every backend must keep
/// them:
/// * `update_booking` is a compare-and-swap on `version`. It fails with
///   `StaleWrite` when the stored version differs and bumps the caller's copy
///   on success.
/// * `claim_slots` is all-or-nothing. If any hour is already held it fails
///   with `SlotConflict` and leaves nothing of this claim behind.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert_venue(&self, venue: &Venue) -> Result<()>;

    async fn find_venue(&self, venue_id: &str) -> Result<Option<Venue>>;

    async fn list_venues(&self) -> Result<Vec<Venue>>;

    async fn insert_booking(&self, booking: &VenueBooking) -> Result<()>;

    async fn find_booking(&self, booking_id: &str) -> Result<Option<VenueBooking>>;

    async fn update_booking(&self, booking: &mut VenueBooking) -> Result<()>;

    /// An empty `statuses` slice means any status.
    async fn bookings_for_venue(
        &self,
        venue_id: &str,
        statuses: &[BookingStatus],
    ) -> Result<Vec<VenueBooking>>;

    async fn bookings_for_customer(&self, customer_id: &str) -> Result<Vec<VenueBooking>>;

    async fn bookings_with_status(&self, statuses: &[BookingStatus]) -> Result<Vec<VenueBooking>>;

    async fn claim_slots(&self, slots: &[AvailabilitySlot]) -> Result<()>;

    async fn release_slots(&self, booking_id: &str) -> Result<u64>;

    /// Slots of a venue starting in `[from, to)`, ordered by start.
    async fn slots_between(
        &self,
        venue_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<AvailabilitySlot>>;
}
