//! Error types shared across the Capstan crates.

use crate::object::ObjectRef;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("secret '{0}' not found")]
    SecretNotFound(ObjectRef),

    #[error("serviceaccount '{0}' not found")]
    ServiceAccountNotFound(ObjectRef),

    #[error("failed to {operation}")]
    Api {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("failed to {operation}: unexpected status {status}: {body}")]
    UnexpectedStatus {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("{0}")]
    Precondition(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an arbitrary error with the operation that failed.
    pub fn api(operation: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Error::Api {
            operation: operation.into(),
            source: Box::new(source),
        }
    }
}
