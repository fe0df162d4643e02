//! Credential types returned by providers.

use capstan_cache::Expiring;
use chrono::{DateTime, Utc};
use std::time::Duration;

fn until(expires_at: DateTime<Utc>) -> Duration {
    (expires_at - Utc::now()).to_std().unwrap_or(Duration::ZERO)
}

/// A bearer-shaped cloud access token with an absolute expiry.
///
/// The expiry is immutable once set; remaining validity is always computed
/// against the current time.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expires_at,
        }
    }

    /// Token expiring `expires_in` seconds from now.
    pub fn with_expires_in(token: impl Into<String>, expires_in: i64) -> Self {
        Self::new(token, Utc::now() + chrono::Duration::seconds(expires_in))
    }
}

impl Expiring for AccessToken {
    fn time_to_live(&self) -> Duration {
        until(self.expires_at)
    }
}

/// Credentials for authenticating with an artifact registry.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactRegistryCredentials {
    pub username: String,
    pub password: String,
    pub expires_at: DateTime<Utc>,
}

impl Expiring for ArtifactRegistryCredentials {
    fn time_to_live(&self) -> Duration {
        until(self.expires_at)
    }
}

/// Connection parameters for a Kubernetes API server.
#[derive(Debug, Clone, PartialEq)]
pub struct RestConfig {
    /// Canonical `https://host:port` address.
    pub host: String,
    pub bearer_token: String,
    /// PEM-encoded CA bundle, when known.
    pub ca_data: Option<Vec<u8>>,
    pub expires_at: DateTime<Utc>,
}

impl Expiring for RestConfig {
    fn time_to_live(&self) -> Duration {
        until(self.expires_at)
    }
}

/// Authentication data for accessing a Git repository.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GitCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
    pub bearer_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl GitCredentials {
    /// The credentials in the shape of generic secret data, under the
    /// standard `username`/`password`/`bearerToken` keys.
    pub fn to_secret_data(&self) -> std::collections::BTreeMap<String, Vec<u8>> {
        let mut data = std::collections::BTreeMap::new();
        if let Some(username) = &self.username {
            data.insert(capstan_secrets::keys::USERNAME.to_string(), username.clone().into_bytes());
        }
        if let Some(password) = &self.password {
            data.insert(capstan_secrets::keys::PASSWORD.to_string(), password.clone().into_bytes());
        }
        if let Some(bearer_token) = &self.bearer_token {
            data.insert(
                capstan_secrets::keys::BEARER_TOKEN.to_string(),
                bearer_token.clone().into_bytes(),
            );
        }
        data
    }
}

impl Expiring for GitCredentials {
    fn time_to_live(&self) -> Duration {
        until(self.expires_at)
    }
}

/// Any credential Capstan can cache.
///
/// Providers return concrete types; this enum is what flows through the
/// token cache. Cache keys incorporate the operation, so a key always maps
/// back to the variant that produced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Credential {
    Access(AccessToken),
    Registry(ArtifactRegistryCredentials),
    RestConfig(RestConfig),
    Git(GitCredentials),
}

impl Credential {
    pub fn into_access_token(self) -> Option<AccessToken> {
        match self {
            Credential::Access(token) => Some(token),
            _ => None,
        }
    }

    pub fn into_registry_credentials(self) -> Option<ArtifactRegistryCredentials> {
        match self {
            Credential::Registry(creds) => Some(creds),
            _ => None,
        }
    }

    pub fn into_rest_config(self) -> Option<RestConfig> {
        match self {
            Credential::RestConfig(config) => Some(config),
            _ => None,
        }
    }

    pub fn into_git_credentials(self) -> Option<GitCredentials> {
        match self {
            Credential::Git(creds) => Some(creds),
            _ => None,
        }
    }
}

impl Expiring for Credential {
    fn time_to_live(&self) -> Duration {
        match self {
            Credential::Access(token) => token.time_to_live(),
            Credential::Registry(creds) => creds.time_to_live(),
            Credential::RestConfig(config) => config.time_to_live(),
            Credential::Git(creds) => creds.time_to_live(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_to_live_is_relative_to_now() {
        let token = AccessToken::with_expires_in("t", 3600);
        let ttl = token.time_to_live();
        assert!(ttl <= Duration::from_secs(3600));
        assert!(ttl > Duration::from_secs(3590));
    }

    #[test]
    fn test_expired_token_reports_zero_ttl() {
        let token = AccessToken::new("t", Utc::now() - chrono::Duration::seconds(10));
        assert_eq!(token.time_to_live(), Duration::ZERO);
    }

    #[test]
    fn test_credential_variant_accessors() {
        let token = AccessToken::with_expires_in("t", 60);
        let credential = Credential::Access(token.clone());
        assert_eq!(credential.clone().into_access_token(), Some(token));
        assert_eq!(credential.into_registry_credentials(), None);
    }
}
