mod services;

use std::time::Duration;

use chrono::Utc;
use clap::Parser;
use tracing::{error, info};

use booking_api::config::{AppConfig, SchedulerConfig};
use booking_api::error::BookingError;
use booking_api::services::BookingService;
use booking_api::{logging, repository};

use services::redis_service::SweepLease;
use services::scheduler_service::BookingScheduler;

/// Periodic sweeps for venue bookings: expiry, overdue balances, completion.
#[derive(Parser, Debug)]
#[command(name = "booking-scheduler", version)]
struct Args {
    /// Run a single sweep and exit
    #[arg(long)]
    once: bool,

    /// Override `scheduler.interval_secs`
    #[arg(long)]
    interval_secs: Option<u64>,
}

/// The configured scheduler section with CLI overrides applied.
fn scheduler_settings(args: &Args, config: &SchedulerConfig) -> Result<SchedulerConfig, BookingError> {
    let mut settings = config.clone();
    if let Some(interval_secs) = args.interval_secs {
        settings.interval_secs = interval_secs;
    }
    settings.validate()?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::load()?;
    logging::init(&config.log);
    let settings = scheduler_settings(&args, &config.scheduler)?;

    let store = repository::connect(&config.database).await?;
    let service = BookingService::new(store);

    let lease = match &settings.redis_url {
        Some(url) => Some(SweepLease::connect(url, &settings.lease_key, settings.lease_secs).await?),
        None => None,
    };
    let scheduler = BookingScheduler::new(service, lease);

    if args.once {
        scheduler.run_once(Utc::now()).await?;
        scheduler.shutdown().await;
        return Ok(());
    }

    info!(interval_secs = settings.interval_secs, "booking scheduler started");
    let ticks = scheduler
        .run_until(Duration::from_secs(settings.interval_secs), async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("shutdown requested"),
                Err(e) => {
                    error!(error = %e, "could not listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await;
    info!(ticks, "booking scheduler stopped");

    scheduler.shutdown().await;
    Ok(())
}
