use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::Request;
use thiserror::Error;

use crate::models::booking::BookingStatus;
use crate::routes::ApiResponse;

#[derive(Error, Debug)]
pub enum BookingError {
    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("document encoding error: {0}")]
    Bson(#[from] mongodb::bson::ser::Error),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("{0}")]
    Validation(String),

    #[error("venue is not available: {0}")]
    SlotConflict(String),

    #[error("cannot move booking from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },

    #[error("payment rejected: {0}")]
    Payment(String),

    #[error("booking {0} was modified concurrently, retry the request")]
    StaleWrite(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BookingError>;

impl BookingError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        BookingError::NotFound { entity, id: id.into() }
    }

    pub fn status(&self) -> Status {
        match self {
            BookingError::Database(_) | BookingError::Bson(_) | BookingError::Config(_) => {
                Status::InternalServerError
            }
            BookingError::NotFound { .. } => Status::NotFound,
            BookingError::Validation(_) => Status::BadRequest,
            BookingError::SlotConflict(_)
            | BookingError::InvalidTransition { .. }
            | BookingError::StaleWrite(_) => Status::Conflict,
            BookingError::Payment(_) => Status::UnprocessableEntity,
            BookingError::Unauthorized(_) => Status::Unauthorized,
            BookingError::Forbidden(_) => Status::Forbidden,
        }
    }
}

impl<'r> Responder<'r, 'static> for BookingError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status == Status::InternalServerError {
            tracing::error!(uri = %request.uri(), error = %self, "request failed");
        } else {
            tracing::debug!(uri = %request.uri(), error = %self, "request rejected");
        }

        let body = Json(ApiResponse::<()> {
            message: format!("{}: {} - {}", status.code, status.reason_lossy(), self),
            result: None,
        });
        (status, body).respond_to(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_errors_to_http_statuses() {
        assert_eq!(BookingError::not_found("venue", "v1").status(), Status::NotFound);
        assert_eq!(BookingError::SlotConflict("x".into()).status(), Status::Conflict);
        assert_eq!(
            BookingError::InvalidTransition {
                from: BookingStatus::Cancelled,
                to: BookingStatus::Confirmed
            }
            .status(),
            Status::Conflict
        );
        assert_eq!(BookingError::Payment("x".into()).status(), Status::UnprocessableEntity);
        assert_eq!(BookingError::Validation("x".into()).status(), Status::BadRequest);
    }

    #[test]
    fn transition_errors_name_both_states() {
        let err = BookingError::InvalidTransition {
            from: BookingStatus::Expired,
            to: BookingStatus::Approved,
        };
        assert_eq!(err.to_string(), "cannot move booking from expired to approved");
    }
}
