//! Artifact registry credential orchestration.

use crate::error::AuthError;
use crate::get_token::{
    access_token_cache_key_parts, fetch_access_token, hash_key, service_account_context,
};
use crate::options::AuthOptions;
use crate::provider::Provider;
use crate::token::{ArtifactRegistryCredentials, Credential};
use tracing::debug;

/// Get registry-scoped credentials for the artifact repository in the
/// options.
///
/// The access token and the registry exchange are performed together and
/// cached as one entry, keyed by the parsed repository on top of the
/// access token inputs.
pub async fn get_registry_credentials<P: Provider + ?Sized>(
    provider: &P,
    opts: &AuthOptions,
) -> Result<ArtifactRegistryCredentials, AuthError> {
    let repository = opts.artifact_repository.as_ref().ok_or_else(|| {
        AuthError::InvalidConfig("an artifact repository is required".to_string())
    })?;
    let registry = provider.parse_artifact_repository(repository).map_err(|e| {
        AuthError::context(format!("parse artifact repository '{repository}'"), e)
    })?;

    let sa_ctx = service_account_context(provider, opts).await?;
    let sa = sa_ctx.as_ref();

    let registry_ref = registry.as_str();
    let fetch = move || async move {
        let access_token = fetch_access_token(provider, sa, opts).await?;
        provider
            .new_artifact_registry_credentials(registry_ref, access_token, opts)
            .await
            .map_err(|e| AuthError::context("create artifact registry credentials", e))
    };

    let Some(cache) = &opts.cache else {
        return fetch().await;
    };

    let mut parts = access_token_cache_key_parts(provider, sa, opts);
    parts.push(format!("artifactRepositoryKey={registry}"));
    let (credential, cached) = cache
        .get_or_set(&hash_key(&parts), move || async move {
            fetch().await.map(Credential::Registry)
        })
        .await?;
    debug!(provider = provider.name(), registry = %registry, cached, "Resolved registry credentials");

    credential.into_registry_credentials().ok_or_else(|| {
        AuthError::Internal("cached credential is not registry credentials".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{GcpProvider, ServiceAccountTokenProvider};

    #[tokio::test]
    async fn test_requires_artifact_repository_option() {
        let provider = GcpProvider::new();
        let err = get_registry_credentials(&provider, &AuthOptions::default()).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid configuration: an artifact repository is required");
    }

    #[tokio::test]
    async fn test_unparseable_repository_is_wrapped() {
        let provider = GcpProvider::new();
        let opts = AuthOptions::builder().artifact_repository("registry.example.com/app").build();
        let err = get_registry_credentials(&provider, &opts).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to parse artifact repository 'registry.example.com/app'"
        );
    }

    #[tokio::test]
    async fn test_unsupported_provider_is_surfaced() {
        let provider = ServiceAccountTokenProvider::new();
        let opts = AuthOptions::builder().artifact_repository("registry.example.com/app").build();
        let err = get_registry_credentials(&provider, &opts).await.unwrap_err();
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(
            source.to_string(),
            "provider 'generic' does not support artifact registry credentials"
        );
    }
}
