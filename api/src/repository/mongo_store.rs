use async_trait::async_trait;
use chrono::NaiveDateTime;
use mongodb::options::ClientOptions;
use mongodb::{Client, Database};
use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::error::{BookingError, Result};
use crate::models::booking::{BookingStatus, VenueBooking};
use crate::models::slot::AvailabilitySlot;
use crate::models::venue::Venue;
use crate::repository::booking_repository::BookingRepository;
use crate::repository::slot_repository::{is_duplicate_key, SlotRepository};
use crate::repository::store::BookingStore;
use crate::repository::venue_repository::VenueRepository;

#[derive(Clone)]
pub struct MongoStore {
    venues: VenueRepository,
    bookings: BookingRepository,
    slots: SlotRepository,
}

impl MongoStore {
    pub fn new(db: &Database) -> Self {
        MongoStore {
            venues: VenueRepository::new(db),
            bookings: BookingRepository::new(db),
            slots: SlotRepository::new(db),
        }
    }

    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let mut client_options = ClientOptions::parse(&config.uri).await?;
        client_options.app_name = Some(config.app_name.clone());
        let client = Client::with_options(client_options)?;

        let store = MongoStore::new(&client.database(&config.name));
        store.bookings.create_indexes().await?;
        store.slots.create_indexes().await?;

        info!(database = %config.name, "connected to MongoDB");
        Ok(store)
    }
}

/// The insert error is what the caller sees. A failed rollback is only logged.
fn failed_claim(original: BookingError, rollback: Result<u64>, claim_id: &str) -> BookingError {
    if let Err(e) = rollback {
        warn!(claim_id, error = %e, "could not roll back a failed slot claim");
    }
    original
}

#[async_trait]
impl BookingStore for MongoStore {
    async fn insert_venue(&self, venue: &Venue) -> Result<()> {
        Ok(self.venues.add_venue(venue).await?)
    }

    async fn find_venue(&self, venue_id: &str) -> Result<Option<Venue>> {
        Ok(self.venues.find_venue_by_id(venue_id).await?)
    }

    async fn list_venues(&self) -> Result<Vec<Venue>> {
        Ok(self.venues.get_all_venues().await?)
    }

    async fn insert_booking(&self, booking: &VenueBooking) -> Result<()> {
        Ok(self.bookings.add_booking(booking).await?)
    }

    async fn find_booking(&self, booking_id: &str) -> Result<Option<VenueBooking>> {
        Ok(self.bookings.find_booking_by_id(booking_id).await?)
    }

    async fn update_booking(&self, booking: &mut VenueBooking) -> Result<()> {
        let expected = booking.version;
        let mut next = booking.clone();
        next.version = expected + 1;

        if self.bookings.replace_if_version(&next, expected).await? {
            booking.version = next.version;
            return Ok(());
        }
        match self.bookings.find_booking_by_id(&booking.id).await? {
            Some(_) => Err(BookingError::StaleWrite(booking.id.clone())),
            None => Err(BookingError::not_found("booking", booking.id.clone())),
        }
    }

    async fn bookings_for_venue(
        &self,
        venue_id: &str,
        statuses: &[BookingStatus],
    ) -> Result<Vec<VenueBooking>> {
        Ok(self.bookings.find_by_venue(venue_id, statuses).await?)
    }

    async fn bookings_for_customer(&self, customer_id: &str) -> Result<Vec<VenueBooking>> {
        Ok(self.bookings.find_by_customer(customer_id).await?)
    }

    async fn bookings_with_status(&self, statuses: &[BookingStatus]) -> Result<Vec<VenueBooking>> {
        Ok(self.bookings.find_by_status(statuses).await?)
    }

    async fn claim_slots(&self, slots: &[AvailabilitySlot]) -> Result<()> {
        let Some(first) = slots.first() else {
            return Ok(());
        };
        match self.slots.insert_all(slots).await {
            Ok(()) => Ok(()),
            Err(e) if is_duplicate_key(&e) => {
                // Hours inserted before the duplicate belong to this claim only.
                let rolled_back = self.slots.delete_by_claim(&first.claim_id).await?;
                warn!(
                    booking_id = %first.booking_id,
                    claim_id = %first.claim_id,
                    rolled_back,
                    "slot claim collided with an existing booking"
                );
                Err(BookingError::SlotConflict(
                    "one or more requested hours are already held".to_string(),
                ))
            }
            Err(e) => {
                let rollback = self.slots.delete_by_claim(&first.claim_id).await;
                Err(failed_claim(e.into(), rollback, &first.claim_id))
            }
        }
    }

    async fn release_slots(&self, booking_id: &str) -> Result<u64> {
        self.slots.delete_by_booking(booking_id).await
    }

    async fn slots_between(
        &self,
        venue_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<AvailabilitySlot>> {
        self.slots.find_between(venue_id, from, to).await
    }
}
