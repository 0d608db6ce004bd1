// src/repository/venue_repository.rs
use futures::stream::TryStreamExt;
use mongodb::bson::doc;
use mongodb::error::Result;
use mongodb::options::FindOptions;
use mongodb::{Collection, Database};

use crate::models::venue::Venue;

#[derive(Clone)]
pub struct VenueRepository {
    collection: Collection<Venue>,
}

impl VenueRepository {
    pub fn new(db: &Database) -> Self {
        let collection = db.collection::<Venue>("venues");
        VenueRepository { collection }
    }

    pub async fn add_venue(&self, venue: &Venue) -> Result<()> {
        self.collection.insert_one(venue, None).await.map(|_| ())
    }

    pub async fn find_venue_by_id(&self, venue_id: &str) -> Result<Option<Venue>> {
        let filter = doc! { "_id": venue_id };
        self.collection.find_one(filter, None).await
    }

    pub async fn get_all_venues(&self) -> Result<Vec<Venue>> {
        let options = FindOptions::builder().sort(doc! { "name": 1 }).build();
        let cursor = self.collection.find(None, options).await?;
        cursor.try_collect().await
    }
}
