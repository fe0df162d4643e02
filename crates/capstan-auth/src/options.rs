//! Options for credential acquisition.
//!
//! Options are assembled once through [`AuthOptionsBuilder`] and treated
//! as read-only afterwards. Scalar fields are last-write-wins; scope and
//! audience lists append.

use crate::error::AuthError;
use crate::token::Credential;
use capstan_cache::TokenCache;
use capstan_core::{Cluster, ObjectRef, Secret};
use std::sync::Arc;
use url::Url;

/// Configuration for the credential acquisition entry points.
#[derive(Clone, Default)]
pub struct AuthOptions {
    /// Kubernetes API access, required for service account flows.
    pub cluster: Option<Arc<dyn Cluster>>,
    /// Token cache; when absent every call fetches fresh credentials.
    pub cache: Option<Arc<TokenCache<Credential>>>,
    /// Tenant service account to impersonate instead of using the
    /// controller's own identity.
    pub service_account: Option<ObjectRef>,
    /// Scopes requested for cloud access tokens.
    pub scopes: Vec<String>,
    /// Audiences for issued Kubernetes ServiceAccount tokens.
    pub audiences: Vec<String>,
    /// Artifact repository to derive registry credentials for.
    pub artifact_repository: Option<String>,
    /// Provider-specific cluster resource name for REST config discovery.
    pub cluster_resource: Option<String>,
    /// Explicit Kubernetes API server address.
    pub cluster_address: Option<String>,
    /// Base64-encoded CA bundle for the cluster address.
    pub ca_data: Option<String>,
    /// Proxy for provider HTTP exchanges.
    pub proxy_url: Option<Url>,
    /// Replaces the default HTTP client (and the proxy configuration).
    pub http_client: Option<reqwest::Client>,
    /// Secret carrying provider configuration, e.g. GitHub App data.
    pub secret: Option<Secret>,
}

impl AuthOptions {
    pub fn builder() -> AuthOptionsBuilder {
        AuthOptionsBuilder::default()
    }

    /// The HTTP client for provider exchanges: the override when set,
    /// otherwise a client honoring the proxy option.
    pub fn http_client(&self) -> Result<reqwest::Client, AuthError> {
        if let Some(client) = &self.http_client {
            return Ok(client.clone());
        }
        let mut builder = reqwest::Client::builder().use_rustls_tls();
        if let Some(proxy) = &self.proxy_url {
            builder = builder.proxy(reqwest::Proxy::all(proxy.as_str())?);
        }
        Ok(builder.build()?)
    }
}

/// Builder for [`AuthOptions`].
#[derive(Default)]
pub struct AuthOptionsBuilder {
    options: AuthOptions,
}

impl AuthOptionsBuilder {
    pub fn cluster(mut self, cluster: Arc<dyn Cluster>) -> Self {
        self.options.cluster = Some(cluster);
        self
    }

    pub fn cache(mut self, cache: Arc<TokenCache<Credential>>) -> Self {
        self.options.cache = Some(cache);
        self
    }

    pub fn service_account(mut self, sa_ref: ObjectRef) -> Self {
        self.options.service_account = Some(sa_ref);
        self
    }

    /// Add a scope. Repeated calls append.
    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.options.scopes.push(scope.into());
        self
    }

    /// Add an audience. Repeated calls append.
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.options.audiences.push(audience.into());
        self
    }

    pub fn artifact_repository(mut self, repository: impl Into<String>) -> Self {
        self.options.artifact_repository = Some(repository.into());
        self
    }

    pub fn cluster_resource(mut self, resource: impl Into<String>) -> Self {
        self.options.cluster_resource = Some(resource.into());
        self
    }

    pub fn cluster_address(mut self, address: impl Into<String>) -> Self {
        self.options.cluster_address = Some(address.into());
        self
    }

    pub fn ca_data(mut self, ca_data: impl Into<String>) -> Self {
        self.options.ca_data = Some(ca_data.into());
        self
    }

    pub fn proxy_url(mut self, proxy_url: Url) -> Self {
        self.options.proxy_url = Some(proxy_url);
        self
    }

    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.options.http_client = Some(client);
        self
    }

    pub fn secret(mut self, secret: Secret) -> Self {
        self.options.secret = Some(secret);
        self
    }

    pub fn build(self) -> AuthOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_and_audiences_append() {
        let options = AuthOptions::builder()
            .scope("https://management.azure.com/.default")
            .scope("offline_access")
            .audience("api://AzureADTokenExchange")
            .build();
        assert_eq!(options.scopes.len(), 2);
        assert_eq!(options.audiences, vec!["api://AzureADTokenExchange"]);
    }

    #[test]
    fn test_scalar_fields_are_last_write_wins() {
        let options = AuthOptions::builder()
            .cluster_address("https://first:6443")
            .cluster_address("https://second:6443")
            .build();
        assert_eq!(options.cluster_address.as_deref(), Some("https://second:6443"));
    }

    #[test]
    fn test_http_client_override_wins_over_proxy() {
        let client = reqwest::Client::new();
        let options = AuthOptions::builder()
            .http_client(client)
            .proxy_url(Url::parse("http://proxy:8080").unwrap())
            .build();
        assert!(options.http_client().is_ok());
    }
}
