//! Broker error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("Broker connection error: {0}")]
    Connection(String),

    #[error("Broker pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("Broker command error: {0}")]
    Command(#[from] deadpool_redis::redis::RedisError),

    #[error("Payload decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
