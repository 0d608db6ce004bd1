use anyhow::Context;
use tracing::info;

use booking_api::config::AppConfig;
use booking_api::jwt::JwtKeys;
use booking_api::services::BookingService;
use booking_api::{build_rocket, logging, repository};

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    let figment = AppConfig::figment();
    let config = AppConfig::from_figment(&figment).context("loading configuration")?;
    logging::init(&config.log);

    let store = repository::connect(&config.database)
        .await
        .context("connecting to the booking store")?;
    let service = BookingService::new(store);
    let keys = JwtKeys::new(&config.auth);

    info!(backend = ?config.database.backend, "starting booking API");
    build_rocket(figment, service, keys)
        .launch()
        .await
        .map_err(|e| anyhow::anyhow!("rocket stopped: {}", e))?;
    Ok(())
}
