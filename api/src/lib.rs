//! Venue booking backend: availability, transition buffers, deposits and
//! payment reconciliation behind a Rocket JSON API.

#[macro_use]
extern crate rocket;

pub mod booking;
pub mod config;
pub mod error;
pub mod jwt;
pub mod logging;
pub mod models;
pub mod repository;
pub mod routes;
pub mod services;

use rocket::figment::Figment;
use rocket::{Build, Rocket};

use crate::jwt::JwtKeys;
use crate::services::cors_fairing::Cors;
use crate::services::BookingService;

pub fn build_rocket(figment: Figment, service: BookingService, keys: JwtKeys) -> Rocket<Build> {
    rocket::custom(figment)
        .manage(service)
        .manage(keys)
        .attach(Cors)
        .mount("/", routes::all_routes())
        .register("/", routes::all_catchers())
}
