// Income Clarity Infrastructure - Redis Adapter
// Implements: QueueBackend

mod connection;
mod keys;
mod queue_backend;
mod scripts;

pub use connection::{connect, connection_info};
pub use keys::{QueueKeys, KEY_PREFIX};
pub use queue_backend::RedisQueueBackend;

// Note: redis::RedisError conversion goes through `connection::map_redis_error`
// because of the orphan rule (no From<redis::RedisError> for AppError here)
