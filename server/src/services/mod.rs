pub mod redis_service;
pub mod scheduler_service;
