// src/repository/slot_repository.rs
use chrono::NaiveDateTime;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, to_bson};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{FindOptions, InsertManyOptions};
use mongodb::{Collection, Database, IndexModel};

use crate::error::Result;
use crate::models::slot::AvailabilitySlot;

const DUPLICATE_KEY: i32 = 11000;

pub fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::BulkWrite(failure) => failure
            .write_errors
            .as_ref()
            .map_or(false, |errors| errors.iter().any(|e| e.code == DUPLICATE_KEY)),
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

#[derive(Clone)]
pub struct SlotRepository {
    collection: Collection<AvailabilitySlot>,
}

impl SlotRepository {
    pub fn new(db: &Database) -> Self {
        let collection = db.collection::<AvailabilitySlot>("availability_slots");
        SlotRepository { collection }
    }

    pub async fn create_indexes(&self) -> Result<()> {
        let indexes = vec![
            IndexModel::builder().keys(doc! { "booking_id": 1 }).build(),
            IndexModel::builder().keys(doc! { "claim_id": 1 }).build(),
            IndexModel::builder().keys(doc! { "venue_id": 1, "starts_at": 1 }).build(),
        ];
        self.collection.create_indexes(indexes, None).await?;
        Ok(())
    }

    /// Ordered insert: the first duplicate `_id` stops the batch.
    pub async fn insert_all(&self, slots: &[AvailabilitySlot]) -> mongodb::error::Result<()> {
        let options = InsertManyOptions::builder().ordered(true).build();
        self.collection.insert_many(slots, options).await.map(|_| ())
    }

    pub async fn delete_by_claim(&self, claim_id: &str) -> Result<u64> {
        let result = self.collection.delete_many(doc! { "claim_id": claim_id }, None).await?;
        Ok(result.deleted_count)
    }

    pub async fn delete_by_booking(&self, booking_id: &str) -> Result<u64> {
        let result = self.collection.delete_many(doc! { "booking_id": booking_id }, None).await?;
        Ok(result.deleted_count)
    }

    pub async fn find_between(
        &self,
        venue_id: &str,
        from: NaiveDateTime,
        to: NaiveDateTime,
    ) -> Result<Vec<AvailabilitySlot>> {
        // Same encoding as the stored documents, so the range compares like for like.
        let filter = doc! {
            "venue_id": venue_id,
            "starts_at": { "$gte": to_bson(&from)?, "$lt": to_bson(&to)? },
        };
        let options = FindOptions::builder().sort(doc! { "starts_at": 1 }).build();
        let cursor = self.collection.find(filter, options).await?;
        Ok(cursor.try_collect().await?)
    }
}
