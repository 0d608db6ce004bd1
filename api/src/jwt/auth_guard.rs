use rocket::http::Status;
use rocket::request::{FromRequest, Outcome, Request};

use crate::error::BookingError;
use crate::jwt::jwt_helper::JwtKeys;

/// Caller identity from an `Authorization: Bearer <jwt>` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for AuthUser {
    type Error = BookingError;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let Some(keys) = request.rocket().state::<JwtKeys>() else {
            return Outcome::Error((
                Status::InternalServerError,
                BookingError::Config("JWT keys are not managed".to_string()),
            ));
        };

        let token = request
            .headers()
            .get_one("Authorization")
            .and_then(|value| value.strip_prefix("Bearer "));
        let Some(token) = token else {
            return Outcome::Error((
                Status::Unauthorized,
                BookingError::Unauthorized("missing bearer token".to_string()),
            ));
        };

        match keys.verify_token(token.trim()) {
            Ok(claims) => Outcome::Success(AuthUser { user_id: claims.sub }),
            Err(e) => {
                tracing::debug!(error = %e, "rejected bearer token");
                Outcome::Error((Status::Unauthorized, e))
            }
        }
    }
}
