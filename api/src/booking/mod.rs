//! Booking rules that do not touch storage: slot planning, request
//! validation, the status machine, payments and the availability calendar.

pub mod availability;
pub mod lifecycle;
pub mod payment;
pub mod schedule;
pub mod validation;
