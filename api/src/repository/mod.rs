pub mod booking_repository;
pub mod memory_store;
pub mod mongo_store;
pub mod slot_repository;
pub mod store;
pub mod venue_repository;

use std::sync::Arc;

use tracing::warn;

use crate::config::{DatabaseConfig, StoreBackend};
use crate::error::Result;

pub use memory_store::MemoryStore;
pub use mongo_store::MongoStore;
pub use store::BookingStore;

pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn BookingStore>> {
    match config.backend {
        StoreBackend::Mongo => Ok(Arc::new(MongoStore::connect(config).await?)),
        StoreBackend::Memory => {
            warn!("using the in-memory store, data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
