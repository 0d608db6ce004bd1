pub mod booking_service;
pub mod cors_fairing;

pub use booking_service::{BookingService, SweepReport};
