pub mod bookings;
pub mod venues;

use rocket::http::Status;
use rocket::serde::json::Json;
use rocket::{Catcher, Request, Route};
use serde::{Deserialize, Serialize};

use crate::error::BookingError;

// Response envelope shared by every endpoint
#[derive(Serialize, Deserialize, Debug)]
pub struct ApiResponse<T> {
    pub message: String,
    pub result: Option<T>,
}

pub type ApiResult<T> = Result<(Status, Json<ApiResponse<T>>), BookingError>;

pub fn ok<T>(result: T) -> (Status, Json<ApiResponse<T>>) {
    (Status::Ok, Json(ApiResponse { message: "200: Success".to_string(), result: Some(result) }))
}

pub fn created<T>(result: T) -> (Status, Json<ApiResponse<T>>) {
    (
        Status::Created,
        Json(ApiResponse { message: "201: Created".to_string(), result: Some(result) }),
    )
}

#[get("/health")]
fn health() -> Json<ApiResponse<String>> {
    Json(ApiResponse { message: "200: Success".to_string(), result: Some("ok".to_string()) })
}

// CORS preflight
#[options("/<_..>")]
fn all_options() -> Status {
    Status::Ok
}

#[catch(404)]
fn not_found(req: &Request) -> (Status, Json<ApiResponse<()>>) {
    (
        Status::NotFound,
        Json(ApiResponse {
            message: format!("404: '{}' route not found", req.uri()),
            result: None,
        }),
    )
}

#[catch(401)]
fn unauthorized() -> (Status, Json<ApiResponse<()>>) {
    (
        Status::Unauthorized,
        Json(ApiResponse {
            message: "401: Unauthorized - missing or invalid bearer token".to_string(),
            result: None,
        }),
    )
}

#[catch(default)]
fn default_catcher(status: Status, _req: &Request) -> (Status, Json<ApiResponse<()>>) {
    (
        status,
        Json(ApiResponse {
            message: format!("{}: {}", status.code, status.reason_lossy()),
            result: None,
        }),
    )
}

pub fn all_routes() -> Vec<Route> {
    routes![
        health,
        all_options,
        venues::create_venue,
        venues::list_venues,
        venues::get_venue,
        venues::availability,
        venues::venue_bookings,
        bookings::request_booking,
        bookings::my_bookings,
        bookings::get_booking,
        bookings::approve_booking,
        bookings::reject_booking,
        bookings::record_payment,
        bookings::cancel_booking,
    ]
}

pub fn all_catchers() -> Vec<Catcher> {
    catchers![not_found, unauthorized, default_catcher]
}
