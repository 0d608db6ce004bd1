// src/jwt/jwt_helper.rs
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::config::AuthConfig;
use crate::error::BookingError;
use crate::jwt::claims::Claims;

/// HS256 keys shared with whatever issues tokens for the platform.
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: u64,
}

impl JwtKeys {
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret.as_bytes();
        JwtKeys {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl_secs: config.token_ttl_secs,
        }
    }

    pub fn create_token(&self, user_id: &str) -> Result<String, BookingError> {
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (Utc::now().timestamp().max(0) as u64 + self.ttl_secs) as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| BookingError::Config(format!("could not sign token: {}", e)))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, BookingError> {
        decode::<Claims>(token, &self.decoding, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| BookingError::Unauthorized(format!("invalid token: {}", e)))
    }
}
