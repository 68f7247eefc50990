//! Error types for the service backends.

use thiserror::Error;

/// Result type alias for backend operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while talking to the store, cache, or channel.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("channel error: {0}")]
    Channel(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("subscribe error: {0}")]
    Subscribe(String),

    #[error("credential bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("{0} unavailable")]
    Unavailable(&'static str),
}

impl StateError {
    /// Whether the store refused the service credentials.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// SQLSTATE `invalid_password` or `invalid_authorization_specification`.
fn is_auth_sqlstate(code: &str) -> bool {
    matches!(code, "28P01" | "28000")
}

pub(crate) fn from_connect(e: sqlx::Error) -> StateError {
    let rejected = match &e {
        sqlx::Error::Database(db) => db.code().is_some_and(|code| is_auth_sqlstate(&code)),
        _ => false,
    };
    if rejected {
        StateError::Auth(e.to_string())
    } else {
        StateError::Connect(e.to_string())
    }
}

pub(crate) fn from_query(e: sqlx::Error) -> StateError {
    StateError::Query(e.to_string())
}

pub(crate) fn from_cache(e: redis::RedisError) -> StateError {
    StateError::Cache(e.to_string())
}

pub(crate) fn from_publish(e: redis::RedisError) -> StateError {
    StateError::Publish(e.to_string())
}
