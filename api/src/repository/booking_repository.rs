// src/repository/booking_repository.rs
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::error::Result;
use mongodb::options::FindOptions;
use mongodb::{Collection, Database, IndexModel};

use crate::models::booking::{BookingStatus, VenueBooking};

#[derive(Clone)]
pub struct BookingRepository {
    collection: Collection<VenueBooking>,
}

fn status_filter(statuses: &[BookingStatus]) -> Option<Document> {
    if statuses.is_empty() {
        return None;
    }
    let names: Vec<&str> = statuses.iter().map(|s| s.as_str()).collect();
    Some(doc! { "$in": names })
}

impl BookingRepository {
    pub fn new(db: &Database) -> Self {
        let collection = db.collection::<VenueBooking>("venue_bookings");
        BookingRepository { collection }
    }

    pub async fn create_indexes(&self) -> Result<()> {
        let indexes = vec![
            IndexModel::builder().keys(doc! { "venue_id": 1, "status": 1 }).build(),
            IndexModel::builder().keys(doc! { "customer_id": 1 }).build(),
            IndexModel::builder().keys(doc! { "status": 1 }).build(),
        ];
        self.collection.create_indexes(indexes, None).await.map(|_| ())
    }

    pub async fn add_booking(&self, booking: &VenueBooking) -> Result<()> {
        self.collection.insert_one(booking, None).await.map(|_| ())
    }

    pub async fn find_booking_by_id(&self, booking_id: &str) -> Result<Option<VenueBooking>> {
        self.collection.find_one(doc! { "_id": booking_id }, None).await
    }

    /// Replaces the stored booking only if it is still at `expected_version`.
    /// Returns false when nothing matched.
    pub async fn replace_if_version(
        &self,
        booking: &VenueBooking,
        expected_version: i64,
    ) -> Result<bool> {
        let filter = doc! { "_id": booking.id.as_str(), "version": expected_version };
        let result = self.collection.replace_one(filter, booking, None).await?;
        Ok(result.matched_count == 1)
    }

    pub async fn find_by_venue(
        &self,
        venue_id: &str,
        statuses: &[BookingStatus],
    ) -> Result<Vec<VenueBooking>> {
        let mut filter = doc! { "venue_id": venue_id };
        if let Some(status) = status_filter(statuses) {
            filter.insert("status", status);
        }
        self.find_sorted(filter).await
    }

    pub async fn find_by_customer(&self, customer_id: &str) -> Result<Vec<VenueBooking>> {
        self.find_sorted(doc! { "customer_id": customer_id }).await
    }

    pub async fn find_by_status(&self, statuses: &[BookingStatus]) -> Result<Vec<VenueBooking>> {
        let mut filter = Document::new();
        if let Some(status) = status_filter(statuses) {
            filter.insert("status", status);
        }
        self.find_sorted(filter).await
    }

    async fn find_sorted(&self, filter: Document) -> Result<Vec<VenueBooking>> {
        let options = FindOptions::builder().sort(doc! { "starts_at": 1, "_id": 1 }).build();
        let cursor = self.collection.find(filter, options).await?;
        cursor.try_collect().await
    }
}
