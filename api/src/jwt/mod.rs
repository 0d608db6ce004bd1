pub mod auth_guard;
pub mod claims;
pub mod jwt_helper;

pub use auth_guard::AuthUser;
pub use jwt_helper::JwtKeys;
