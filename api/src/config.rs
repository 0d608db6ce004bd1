//! Application configuration.
//!
//! Values come from Rocket's own figment (defaults, `Rocket.toml`,
//! `ROCKET_*`), then `Booking.toml`, then `BOOKING_*` environment variables
//! where `__` separates nested keys (`BOOKING_DATABASE__URI`). The API and the
//! scheduler read the same sources.

use rocket::figment::providers::{Env, Format, Toml};
use rocket::figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::BookingError;

pub const CONFIG_FILE: &str = "Booking.toml";
pub const ENV_PREFIX: &str = "BOOKING_";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    Mongo,
    Memory,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    pub backend: StoreBackend,
    pub uri: String,
    pub name: String,
    pub app_name: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            backend: StoreBackend::Mongo,
            uri: "mongodb://localhost:27017".to_string(),
            name: "venue_booking".to_string(),
            app_name: "venue-booking".to_string(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig { jwt_secret: String::new(), token_ttl_secs: 60 * 60 }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig { filter: "info".to_string(), json: false }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(default)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
    pub redis_url: Option<String>,
    pub lease_key: String,
    pub lease_secs: u64,
}

impl SchedulerConfig {
    /// The lease must lapse before the next tick, or its holder would skip
    /// every tick until it expires.
    pub fn validate(&self) -> Result<(), BookingError> {
        if self.interval_secs == 0 {
            return Err(BookingError::Config(
                "scheduler.interval_secs must be positive".to_string(),
            ));
        }
        if self.lease_secs == 0 {
            return Err(BookingError::Config("scheduler.lease_secs must be positive".to_string()));
        }
        if self.lease_secs >= self.interval_secs {
            return Err(BookingError::Config(format!(
                "scheduler.lease_secs ({}) must be shorter than the sweep interval ({})",
                self.lease_secs, self.interval_secs
            )));
        }
        Ok(())
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            interval_secs: 60,
            redis_url: None,
            lease_key: "venue-booking:sweep-lease".to_string(),
            lease_secs: 55,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub log: LogConfig,
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    pub fn figment() -> Figment {
        rocket::Config::figment()
            .merge(Toml::file(CONFIG_FILE).nested())
            .merge(Env::prefixed(ENV_PREFIX).split("__").global())
    }

    pub fn from_figment(figment: &Figment) -> Result<Self, BookingError> {
        let config: AppConfig = figment
            .extract()
            .map_err(|e| BookingError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load() -> Result<Self, BookingError> {
        Self::from_figment(&Self::figment())
    }

    pub fn validate(&self) -> Result<(), BookingError> {
        if self.auth.jwt_secret.trim().is_empty() {
            return Err(BookingError::Config("auth.jwt_secret must be set".to_string()));
        }
        self.scheduler.validate()
    }
}
