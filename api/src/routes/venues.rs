use chrono::{Duration, NaiveDate, Utc};
use rocket::serde::json::Json;
use rocket::State;

use crate::error::BookingError;
use crate::jwt::AuthUser;
use crate::models::booking::VenueBooking;
use crate::models::slot::DayAvailability;
use crate::models::venue::{NewVenue, Venue};
use crate::routes::{created, ok, ApiResult};
use crate::services::BookingService;

const DEFAULT_CALENDAR_DAYS: i64 = 30;

fn parse_date(name: &str, value: &str) -> Result<NaiveDate, BookingError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        BookingError::Validation(format!("`{}` must be a date like 2030-06-01, got {:?}", name, value))
    })
}

#[post("/venues", format = "json", data = "<new_venue>")]
pub async fn create_venue(
    service: &State<BookingService>,
    user: AuthUser,
    new_venue: Json<NewVenue>,
) -> ApiResult<Venue> {
    let venue = service.create_venue(&user.user_id, new_venue.into_inner(), Utc::now()).await?;
    Ok(created(venue))
}

#[get("/venues")]
pub async fn list_venues(service: &State<BookingService>) -> ApiResult<Vec<Venue>> {
    Ok(ok(service.list_venues().await?))
}

#[get("/venues/<venue_id>")]
pub async fn get_venue(service: &State<BookingService>, venue_id: &str) -> ApiResult<Venue> {
    Ok(ok(service.get_venue(venue_id).await?))
}

// Defaults to the next 30 days
#[get("/venues/<venue_id>/availability?<from>&<to>")]
pub async fn availability(
    service: &State<BookingService>,
    venue_id: &str,
    from: Option<&str>,
    to: Option<&str>,
) -> ApiResult<Vec<DayAvailability>> {
    let from = match from {
        Some(value) => parse_date("from", value)?,
        None => Utc::now().date_naive(),
    };
    let to = match to {
        Some(value) => parse_date("to", value)?,
        None => from + Duration::days(DEFAULT_CALENDAR_DAYS - 1),
    };
    Ok(ok(service.availability(venue_id, from, to).await?))
}

#[get("/venues/<venue_id>/bookings")]
pub async fn venue_bookings(
    service: &State<BookingService>,
    user: AuthUser,
    venue_id: &str,
) -> ApiResult<Vec<VenueBooking>> {
    Ok(ok(service.venue_bookings(venue_id, &user.user_id).await?))
}
