use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDateTime;
use tokio::sync::Mutex;

use crate::error::{BookingError, Result};
use crate::models::booking::{BookingStatus, VenueBooking};
use crate::models::slot::AvailabilitySlot;
use crate::models::venue::Venue;
use crate::repository::store::BookingStore;

#[derive(Default)]
struct MemoryState {
    venues: HashMap<String, Venue>,
    bookings: HashMap<String, VenueBooking>,
    slots: BTreeMap<String, AvailabilitySlot>,
}

/// In-process store for local runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_status(booking: &VenueBooking, statuses: &[BookingStatus]) -> bool {
    statuses.is_empty() || statuses.contains(&booking.status)
}

fn by_start(mut bookings: Vec<VenueBooking>) -> Vec<VenueBooking> {
    bookings.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then_with(|| a.id.cmp(&b.id)));
    bookings
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn insert_venue(&self, venue: &Venue) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.venues.contains_key(&venue.id) {
            return Err(BookingError::Validation(format!("venue {} already exists", venue.id)));
        }
        state.venues.insert(venue.id.clone(), venue.clone());
        Ok(())
    }

    async fn find_venue(&self, venue_id: &str) -> Result<Option<Venue>> {
        Ok(self.state.lock().await.venues.get(venue_id).cloned())
    }

    async fn list_venues(&self) -> Result<Vec<Venue>> {
        let mut venues: Vec<Venue> = self.state.lock().await.venues.values().cloned().collect();
        venues.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(venues)
    }

    async fn insert_booking(&self, booking: &VenueBooking) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.bookings.contains_key(&booking.id) {
            return Err(BookingError::Validation(format!("booking {} already exists", booking.id)));
        }
        state.bookings.insert(booking.id.clone(), booking.clone());
        Ok(())
    }

    async fn find_booking(&self, booking_id: &str) -> Result<Option<VenueBooking>> {
        Ok(self.state.lock().await.bookings.get(booking_id).cloned())
    }

    async fn update_booking(&self, booking: &mut VenueBooking) -> Result<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .bookings
            .get_mut(&booking.id)
            .ok_or_else(|| BookingError::not_found("booking", booking.id.clone()))?;
        if stored.version != booking.version {
            return Err(BookingError::StaleWrite(booking.id.clone()));
        }
        booking.version += 1;
        *stored = booking.clone();
        Ok(())
    }

    async fn bookings_for_venue(
        &self,
        venue_id: &str,
        statuses: &[BookingStatus],
    ) -> Result<Vec<VenueBooking>> {
        let state = self.state.lock().await;
        Ok(by_start(
            state
                .bookings
                .values()
                .filter(|b| b.venue_id == venue_id && matches_status(b, statuses))
                .cloned()
                .collect(),
        ))
    }

    async fn bookings_for_customer(&self, customer_id: &str) -> Result<Vec<VenueBooking>> {
        let state = self.state.lock().await;
        Ok(by_start(
            state.bookings.values().filter(|b| b.customer_id == customer_id).cloned().collect(),
        ))
    }

    async fn bookings_with_status(&self, statuses: &[BookingStatus]) -> Result<Vec<VenueBooking>> {
        let state = self.state.lock().await;
        Ok(by_start(
            state.bookings.values().filter(|b| matches_status(b, statuses)).cloned().collect(),
        ))
    }

    async fn claim_slots(&self, slots: &[AvailabilitySlot]) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(taken) = slots.iter().find(|s| state.slots.contains_key(&s.id)) {
            return Err(BookingError::SlotConflict(format!(
                "{} is already held",
                taken.starts_at.format("%Y-%m-%d %H:00")
            )));
        }
        for slot in slots {
            state.slots.insert(slot.id.clone(), slot.clone());
        }
        Ok(())
    }

    async fn release_slots(&self, booking_id: &str) -> Result<u64> {
        let mut state = self.state.lock().await;
        let before = state.slots.len();
        state.slots.retain(|_, s| s.booking_id != booking_id);
        Ok((before - state.slots.len()) as u64)
    }

    async fn slots_between(
        &self,
        venue_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<AvailabilitySlot>> {
        let state = self.state.lock().await;
        let mut slots: Vec<AvailabilitySlot> = state
            .slots
            .values()
            .filter(|s| s.venue_id == venue_id && s.starts_at >= from && s.starts_at < to)
            .cloned()
            .collect();
        slots.sort_by_key(|s| s.starts_at);
        Ok(slots)
    }
}
