//! Error type for credential acquisition.

use capstan_core::ObjectRef;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Core(#[from] capstan_core::Error),

    #[error(transparent)]
    Secret(#[from] capstan_secrets::SecretError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{operation}: unexpected status {status}: {body}")]
    Exchange {
        operation: &'static str,
        status: u16,
        body: String,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("missing annotation '{key}' on serviceaccount '{service_account}'")]
    MissingAnnotation {
        key: &'static str,
        service_account: ObjectRef,
    },

    #[error("provider '{provider}' does not support {operation}")]
    Unsupported {
        provider: &'static str,
        operation: &'static str,
    },

    #[error("failed to parse JWT: {0}")]
    InvalidJwt(String),

    #[error("failed to sign JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("failed to parse timestamp: {0}")]
    InvalidTimestamp(#[from] chrono::ParseError),

    #[error("failed to {operation}")]
    Context {
        operation: String,
        #[source]
        source: Box<AuthError>,
    },

    #[error("{0}")]
    Internal(String),
}

impl AuthError {
    /// Wrap an error with the operation that failed.
    pub fn context(operation: impl Into<String>, source: AuthError) -> Self {
        AuthError::Context {
            operation: operation.into(),
            source: Box::new(source),
        }
    }
}
