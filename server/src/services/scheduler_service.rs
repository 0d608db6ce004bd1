use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use booking_api::services::{BookingService, SweepReport};

use crate::services::redis_service::SweepLease;

pub struct BookingScheduler {
    service: BookingService,
    lease: Option<SweepLease>,
}

impl BookingScheduler {
    pub fn new(service: BookingService, lease: Option<SweepLease>) -> Self {
        BookingScheduler { service, lease }
    }

    /// Runs one pass of the sweeps. Returns `None` when another replica holds
    /// the lease for this tick.
    pub async fn run_once(&self, now: DateTime<Utc>) -> anyhow::Result<Option<SweepReport>> {
        if let Some(lease) = &self.lease {
            if !lease.try_acquire().await? {
                debug!("sweep lease held elsewhere, skipping tick");
                return Ok(None);
            }
        }

        let report = self.service.run_sweeps(now).await?;
        if report.touched() > 0 || report.failed > 0 {
            info!(
                expired = report.expired,
                cancelled_overdue = report.cancelled_overdue,
                completed = report.completed,
                failed = report.failed,
                "sweep finished"
            );
        } else {
            debug!("sweep found nothing to do");
        }
        Ok(Some(report))
    }

    /// Sweeps every `every` until `shutdown` resolves and returns how many
    /// ticks ran. The same `shutdown` future is polled for the whole run, so a
    /// signal that arrives mid-sweep stops the loop once that sweep returns.
    pub async fn run_until<F>(&self, every: Duration, shutdown: F) -> usize
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut ticks = 0;
        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    ticks += 1;
                    if let Err(e) = self.run_once(Utc::now()).await {
                        error!(error = %e, "sweep failed");
                    }
                }
            }
        }
        ticks
    }

    pub async fn shutdown(&self) {
        if let Some(lease) = &self.lease {
            match lease.release().await {
                Ok(true) => info!("sweep lease released"),
                Ok(false) => debug!("sweep lease was not ours"),
                Err(e) => warn!(error = %e, "could not release sweep lease"),
            }
        }
    }
}
