//! Error types for secret extraction and construction.

use crate::keys;
use capstan_core::ObjectRef;
use std::fmt;
use thiserror::Error;

/// The kind of TLS data validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsValidationKind {
    /// A certificate exists but the private key is missing.
    MissingPrivateKey,
    /// A private key exists but the certificate is missing.
    MissingCertificate,
    /// Neither a certificate pair nor a CA certificate is present.
    NoCertPairOrCa,
}

impl fmt::Display for TlsValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPrivateKey => {
                write!(f, "contains '{}' but missing '{}'", keys::TLS_CERT, keys::TLS_PRIVATE_KEY)
            }
            Self::MissingCertificate => {
                write!(f, "contains '{}' but missing '{}'", keys::TLS_PRIVATE_KEY, keys::TLS_CERT)
            }
            Self::NoCertPairOrCa => write!(
                f,
                "must contain either '{}' or both '{}' and '{}'",
                keys::CA_CERT,
                keys::TLS_CERT,
                keys::TLS_PRIVATE_KEY
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum SecretError {
    #[error("secret '{secret}': key '{key}' not found")]
    KeyNotFound { secret: ObjectRef, key: String },

    #[error("secret '{secret}': malformed basic auth - has '{present}' but missing '{missing}'")]
    MalformedBasicAuth {
        secret: ObjectRef,
        present: &'static str,
        missing: &'static str,
    },

    #[error("secret '{secret}': {kind}")]
    TlsValidation {
        secret: ObjectRef,
        kind: TlsValidationKind,
    },

    #[error("secret '{secret}': malformed GitHub App auth - missing '{missing}'")]
    MalformedGitHubApp {
        secret: ObjectRef,
        missing: &'static str,
    },

    #[error("secret '{secret}': '{key}' is not a valid integer")]
    InvalidInteger {
        secret: ObjectRef,
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("secret '{secret}': proxy address is empty")]
    EmptyProxyAddress { secret: ObjectRef },

    #[error("secret '{secret}': failed to parse proxy address '{address}'")]
    InvalidProxyAddress {
        secret: ObjectRef,
        address: String,
        #[source]
        source: url::ParseError,
    },

    #[error("secret '{secret}': proxy address scheme must be http or https, got '{scheme}'")]
    UnsupportedProxyScheme { secret: ObjectRef, scheme: String },

    #[error("failed to parse target URL '{url}'")]
    InvalidTargetUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    // Factory errors.
    #[error("{0} is required")]
    RequiredField(&'static str),

    #[error("invalid proxy address")]
    InvalidAddress(#[source] url::ParseError),

    #[error("invalid TLS certificate and key pair: {0}")]
    InvalidTlsPair(String),

    #[error("at least one key must be provided")]
    NoSopsKeys,

    #[error("Age key cannot be empty")]
    EmptyAgeKey,

    #[error("GPG key cannot be empty")]
    EmptyGpgKey,

    #[error("failed to marshal Docker config")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tls_validation_messages() {
        let secret = ObjectRef::new("default", "tls-secret");
        let err = SecretError::TlsValidation {
            secret,
            kind: TlsValidationKind::MissingPrivateKey,
        };
        assert_eq!(
            err.to_string(),
            "secret 'default/tls-secret': contains 'tls.crt' but missing 'tls.key'"
        );
    }

    #[test]
    fn test_malformed_basic_auth_names_both_keys() {
        let err = SecretError::MalformedBasicAuth {
            secret: ObjectRef::new("default", "creds"),
            present: keys::USERNAME,
            missing: keys::PASSWORD,
        };
        assert_eq!(
            err.to_string(),
            "secret 'default/creds': malformed basic auth - has 'username' but missing 'password'"
        );
    }
}
