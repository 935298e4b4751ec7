// Redis Connection Setup

use clarity_core::application::BackendConfig;
use clarity_core::error::{AppError, Result};
use redis::aio::ConnectionManager;
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo};
use tracing::info;

/// Translate the backend descriptor into redis connection parameters
pub fn connection_info(config: &BackendConfig) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.host.clone(), config.port),
        redis: RedisConnectionInfo {
            db: config.db,
            password: config.password.clone(),
            ..Default::default()
        },
    }
}

/// Open the shared multiplexed connection
///
/// The manager reconnects on its own; every consumer and scheduler clones it.
pub async fn connect(config: &BackendConfig) -> Result<ConnectionManager> {
    let client = redis::Client::open(connection_info(config)).map_err(map_redis_error)?;
    let manager = ConnectionManager::new(client).await.map_err(map_redis_error)?;
    info!(host = %config.host, port = config.port, db = config.db, "Connected to Redis");
    Ok(manager)
}

/// Convert redis::RedisError to AppError with its category attached
pub(crate) fn map_redis_error(err: redis::RedisError) -> AppError {
    if err.is_connection_refusal() {
        AppError::Backend(format!("Redis connection refused: {}", err))
    } else if err.is_timeout() {
        AppError::Backend(format!("Redis timeout: {}", err))
    } else if err.is_io_error() {
        AppError::Backend(format!("Redis I/O error: {}", err))
    } else {
        AppError::Backend(format!("Redis error [{:?}]: {}", err.kind(), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_info_from_config() {
        let config = BackendConfig {
            host: "redis.internal".into(),
            port: 6380,
            password: Some("s3cret".into()),
            db: 2,
        };
        let info = connection_info(&config);
        match &info.addr {
            ConnectionAddr::Tcp(host, port) => {
                assert_eq!(host, "redis.internal");
                assert_eq!(*port, 6380);
            }
            other => panic!("unexpected address {:?}", other),
        }
        assert_eq!(info.redis.db, 2);
        assert_eq!(info.redis.password.as_deref(), Some("s3cret"));
        assert_eq!(info.redis.username, None);
    }

    #[test]
    fn test_map_redis_error_is_backend_error() {
        let err = redis::RedisError::from((redis::ErrorKind::TypeError, "bad type"));
        assert!(matches!(map_redis_error(err), AppError::Backend(_)));
    }
}
