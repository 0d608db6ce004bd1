use chrono::Utc;
use rocket::serde::json::Json;
use rocket::State;

use crate::jwt::AuthUser;
use crate::models::booking::{NewBookingRequest, NoteRequest, PaymentRequest, VenueBooking};
use crate::routes::{created, ok, ApiResult};
use crate::services::BookingService;

fn note(body: Option<Json<NoteRequest>>) -> Option<String> {
    body.and_then(|b| b.into_inner().note).filter(|n| !n.trim().is_empty())
}

#[post("/bookings", format = "json", data = "<request>")]
pub async fn request_booking(
    service: &State<BookingService>,
    user: AuthUser,
    request: Json<NewBookingRequest>,
) -> ApiResult<VenueBooking> {
    let booking = service.request_booking(&user.user_id, request.into_inner(), Utc::now()).await?;
    Ok(created(booking))
}

#[get("/bookings")]
pub async fn my_bookings(
    service: &State<BookingService>,
    user: AuthUser,
) -> ApiResult<Vec<VenueBooking>> {
    Ok(ok(service.customer_bookings(&user.user_id).await?))
}

#[get("/bookings/<booking_id>")]
pub async fn get_booking(
    service: &State<BookingService>,
    user: AuthUser,
    booking_id: &str,
) -> ApiResult<VenueBooking> {
    Ok(ok(service.get_booking(booking_id, &user.user_id).await?))
}

#[post("/bookings/<booking_id>/approve")]
pub async fn approve_booking(
    service: &State<BookingService>,
    user: AuthUser,
    booking_id: &str,
) -> ApiResult<VenueBooking> {
    Ok(ok(service.approve(booking_id, &user.user_id, Utc::now()).await?))
}

#[post("/bookings/<booking_id>/reject", data = "<body>")]
pub async fn reject_booking(
    service: &State<BookingService>,
    user: AuthUser,
    booking_id: &str,
    body: Option<Json<NoteRequest>>,
) -> ApiResult<VenueBooking> {
    let booking = service.reject(booking_id, &user.user_id, note(body), Utc::now()).await?;
    Ok(ok(booking))
}

#[post("/bookings/<booking_id>/payments", format = "json", data = "<payment>")]
pub async fn record_payment(
    service: &State<BookingService>,
    user: AuthUser,
    booking_id: &str,
    payment: Json<PaymentRequest>,
) -> ApiResult<VenueBooking> {
    let booking = service
        .record_payment(booking_id, &user.user_id, payment.into_inner(), Utc::now())
        .await?;
    Ok(ok(booking))
}

#[post("/bookings/<booking_id>/cancel", data = "<body>")]
pub async fn cancel_booking(
    service: &State<BookingService>,
    user: AuthUser,
    booking_id: &str,
    body: Option<Json<NoteRequest>>,
) -> ApiResult<VenueBooking> {
    let booking = service.cancel(booking_id, &user.user_id, note(body), Utc::now()).await?;
    Ok(ok(booking))
}
