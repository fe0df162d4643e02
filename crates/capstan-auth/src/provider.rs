//! The provider contract.

use crate::error::AuthError;
use crate::options::AuthOptions;
use crate::token::{AccessToken, ArtifactRegistryCredentials, RestConfig};
use async_trait::async_trait;
use capstan_core::ServiceAccount;

/// Logic to retrieve security credentials for a cloud provider.
///
/// Providers are stateless apart from configuration captured at
/// construction time, which is read-only afterwards. They never retry;
/// failures are wrapped with the failing operation and returned.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable identifier used in cache keys and error messages.
    fn name(&self) -> &'static str;

    /// Audiences for Kubernetes tokens issued for the OIDC exchange.
    /// Empty means the API server's default audiences.
    fn audiences(&self, service_account: &ServiceAccount) -> Result<Vec<String>, AuthError>;

    /// The cloud identity the service account impersonates, derived from
    /// its annotations. Fails closed when required annotations are
    /// missing.
    fn identity(&self, service_account: &ServiceAccount) -> Result<String, AuthError>;

    /// Token for the controller's own identity, retrieved from the pod
    /// environment (mounted files, environment variables, metadata
    /// services).
    async fn new_controller_token(&self, opts: &AuthOptions) -> Result<AccessToken, AuthError>;

    /// Exchange a Kubernetes-issued OIDC token for a cloud token
    /// impersonating the service account's configured identity.
    async fn new_token_for_service_account(
        &self,
        oidc_token: &str,
        service_account: &ServiceAccount,
        opts: &AuthOptions,
    ) -> Result<AccessToken, AuthError>;

    /// Canonical registry input derived from an artifact repository,
    /// included in cache keys.
    fn parse_artifact_repository(&self, artifact_repository: &str) -> Result<String, AuthError>;

    /// Exchange a cloud access token for registry-scoped credentials.
    async fn new_artifact_registry_credentials(
        &self,
        registry: &str,
        access_token: AccessToken,
        opts: &AuthOptions,
    ) -> Result<ArtifactRegistryCredentials, AuthError>;
}

/// Providers that can build Kubernetes REST configurations for their
/// managed clusters.
#[async_trait]
pub trait RestConfigProvider: Provider {
    /// Scope sets for the access tokens a REST config needs, one entry
    /// per token. An empty scope set keeps the caller's scopes.
    fn access_token_scopes_for_cluster(
        &self,
        opts: &AuthOptions,
    ) -> Result<Vec<Vec<String>>, AuthError>;

    /// Build connection parameters from the access tokens, using the
    /// explicit cluster address or discovering it by describing the
    /// cluster resource via the provider's management API.
    async fn new_rest_config(
        &self,
        access_tokens: Vec<AccessToken>,
        opts: &AuthOptions,
    ) -> Result<RestConfig, AuthError>;
}
