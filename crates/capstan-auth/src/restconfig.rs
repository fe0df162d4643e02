//! Kubernetes REST config orchestration.

use crate::error::AuthError;
use crate::get_token::{get_access_token, hash_key};
use crate::options::AuthOptions;
use crate::provider::RestConfigProvider;
use crate::token::{Credential, RestConfig};
use tracing::debug;
use url::Url;

/// Parse a cluster address into the canonical form
/// `https://<lowercase host>:<port>`.
pub fn parse_cluster_address(address: &str) -> Result<String, AuthError> {
    if address.is_empty() {
        return Err(AuthError::InvalidConfig("empty cluster address".to_string()));
    }

    let address = if address.starts_with("http") {
        address.to_string()
    } else {
        format!("https://{address}")
    };
    let url = Url::parse(&address).map_err(|e| {
        AuthError::InvalidConfig(format!(
            "failed to parse Kubernetes API server address '{address}': {e}"
        ))
    })?;
    if url.scheme() != "https" {
        return Err(AuthError::InvalidConfig(format!(
            "the Kubernetes API server address '{address}' must use https scheme"
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| {
            AuthError::InvalidConfig(format!(
                "the Kubernetes API server address '{address}' has no host"
            ))
        })?
        .to_lowercase();
    let port = url.port().unwrap_or(443);

    Ok(format!("https://{host}:{port}"))
}

/// Get the connection details for a remote Kubernetes cluster.
///
/// The required access tokens are fetched first, under their own cache
/// keys; the REST config built from them is cached separately.
pub async fn get_rest_config<P: RestConfigProvider + ?Sized>(
    provider: &P,
    opts: &AuthOptions,
) -> Result<RestConfig, AuthError> {
    let scope_sets = provider.access_token_scopes_for_cluster(opts)?;

    let mut access_tokens = Vec::with_capacity(scope_sets.len());
    for scopes in &scope_sets {
        let mut token_opts = opts.clone();
        if !scopes.is_empty() {
            token_opts.scopes = scopes.clone();
        }
        let token = get_access_token(provider, &token_opts)
            .await
            .map_err(|e| AuthError::context("get access token for cluster", e))?;
        access_tokens.push(token);
    }

    let fetch = || {
        let access_tokens = access_tokens.clone();
        async move {
            provider
                .new_rest_config(access_tokens, opts)
                .await
                .map_err(|e| AuthError::context("create REST config", e))
        }
    };

    let Some(cache) = &opts.cache else {
        return fetch().await;
    };

    let mut parts = vec![format!("provider={}", provider.name())];
    if let Some(sa_ref) = &opts.service_account {
        parts.push(format!("serviceAccountName={}", sa_ref.name));
        parts.push(format!("serviceAccountNamespace={}", sa_ref.namespace));
    }
    if let Some(cluster_resource) = &opts.cluster_resource {
        parts.push(format!("clusterResource={cluster_resource}"));
    }
    if let Some(cluster_address) = &opts.cluster_address {
        parts.push(format!("clusterAddress={cluster_address}"));
    }
    if let Some(ca_data) = &opts.ca_data {
        parts.push(format!("caData={ca_data}"));
    }
    for (i, scopes) in scope_sets.iter().enumerate() {
        parts.push(format!("accessTokenScopes{i}={}", scopes.join(",")));
    }

    let (credential, cached) = cache
        .get_or_set(&hash_key(&parts), move || async move {
            fetch().await.map(Credential::RestConfig)
        })
        .await?;
    debug!(provider = provider.name(), cached, "Resolved REST config");

    credential
        .into_rest_config()
        .ok_or_else(|| AuthError::Internal("cached credential is not a REST config".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ServiceAccountTokenProvider;
    use capstan_cache::TokenCache;
    use capstan_core::mock::MockCluster;
    use capstan_core::{ObjectRef, ServiceAccount};
    use std::sync::Arc;

    #[test]
    fn test_parse_cluster_address_canonicalizes() {
        assert_eq!(
            parse_cluster_address("API.example.com").unwrap(),
            "https://api.example.com:443"
        );
        assert_eq!(
            parse_cluster_address("https://api.example.com:6443").unwrap(),
            "https://api.example.com:6443"
        );
    }

    #[test]
    fn test_parse_cluster_address_rejects_http() {
        let err = parse_cluster_address("http://api.example.com").unwrap_err();
        assert!(err.to_string().contains("must use https scheme"));
    }

    #[test]
    fn test_parse_cluster_address_rejects_empty() {
        assert!(parse_cluster_address("").is_err());
    }

    #[tokio::test]
    async fn test_rest_config_for_service_account_token_provider() {
        let cluster = Arc::new(MockCluster::new());
        cluster.add_service_account(ServiceAccount::new("app", "tenant-a")).await;
        let provider = ServiceAccountTokenProvider::new();

        let opts = AuthOptions::builder()
            .cluster(cluster.clone())
            .service_account(ObjectRef::new("tenant-a", "app"))
            .cluster_address("api.tenant-a.example.com")
            .cache(Arc::new(TokenCache::default()))
            .build();

        let config = get_rest_config(&provider, &opts).await.unwrap();
        assert_eq!(config.host, "https://api.tenant-a.example.com:443");
        assert!(!config.bearer_token.is_empty());

        // A second call is served from the cache.
        let again = get_rest_config(&provider, &opts).await.unwrap();
        assert_eq!(config, again);
        assert_eq!(cluster.issued_tokens(), 1);
    }
}
