//! Access token orchestration.
//!
//! Selects between the controller flow and the service account
//! impersonation flow, and consults the token cache when configured.

use crate::error::AuthError;
use crate::options::AuthOptions;
use crate::provider::Provider;
use crate::token::{AccessToken, Credential};
use capstan_core::ServiceAccount;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Resolved service account details for an impersonation flow.
pub(crate) struct ServiceAccountContext {
    pub service_account: ServiceAccount,
    pub audiences: Vec<String>,
    pub identity: String,
}

pub(crate) async fn service_account_context<P: Provider + ?Sized>(
    provider: &P,
    opts: &AuthOptions,
) -> Result<Option<ServiceAccountContext>, AuthError> {
    let Some(sa_ref) = &opts.service_account else {
        return Ok(None);
    };
    let cluster = opts.cluster.as_ref().ok_or_else(|| {
        AuthError::InvalidConfig(
            "a cluster client is required for service account impersonation".to_string(),
        )
    })?;

    let service_account = cluster.get_service_account(sa_ref).await?;

    let mut audiences = provider.audiences(&service_account)?;
    if audiences.is_empty() {
        audiences = opts.audiences.clone();
    }

    let identity = provider.identity(&service_account).map_err(|e| {
        AuthError::context(
            format!("get provider identity from service account '{sa_ref}' annotations"),
            e,
        )
    })?;

    Ok(Some(ServiceAccountContext {
        service_account,
        audiences,
        identity,
    }))
}

pub(crate) async fn fetch_access_token<P: Provider + ?Sized>(
    provider: &P,
    sa_ctx: Option<&ServiceAccountContext>,
    opts: &AuthOptions,
) -> Result<AccessToken, AuthError> {
    let Some(ctx) = sa_ctx else {
        return provider.new_controller_token(opts).await.map_err(|e| {
            AuthError::context("create provider access token for the controller", e)
        });
    };

    let sa_ref = ctx.service_account.object_ref();
    let cluster = opts.cluster.as_ref().ok_or_else(|| {
        AuthError::InvalidConfig(
            "a cluster client is required for service account impersonation".to_string(),
        )
    })?;

    let oidc_token = cluster
        .create_service_account_token(&sa_ref, &ctx.audiences, None)
        .await
        .map_err(|e| {
            AuthError::context(
                format!("create kubernetes token for service account '{sa_ref}'"),
                e.into(),
            )
        })?;

    provider
        .new_token_for_service_account(&oidc_token, &ctx.service_account, opts)
        .await
        .map_err(|e| {
            AuthError::context(
                format!("create provider access token for service account '{sa_ref}'"),
                e,
            )
        })
}

/// Hash cache key parts into an opaque cache key.
pub(crate) fn hash_key(parts: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join(",").as_bytes());
    hex::encode(hasher.finalize())
}

/// Cache key parts covering every input that affects an access token's
/// identity.
pub(crate) fn access_token_cache_key_parts<P: Provider + ?Sized>(
    provider: &P,
    sa_ctx: Option<&ServiceAccountContext>,
    opts: &AuthOptions,
) -> Vec<String> {
    let mut parts = vec![format!("provider={}", provider.name())];

    if let Some(ctx) = sa_ctx {
        parts.push(format!("serviceAccountName={}", ctx.service_account.metadata.name));
        parts.push(format!(
            "serviceAccountNamespace={}",
            ctx.service_account.metadata.namespace
        ));
        parts.push(format!("serviceAccountTokenAudiences={}", ctx.audiences.join(",")));
        parts.push(format!("providerIdentity={}", ctx.identity));
    }

    if !opts.scopes.is_empty() {
        parts.push(format!("scopes={}", opts.scopes.join(",")));
    }
    if let Some(proxy_url) = &opts.proxy_url {
        parts.push(format!("proxyURL={proxy_url}"));
    }
    if let Some(ca_data) = &opts.ca_data {
        parts.push(format!("caData={ca_data}"));
    }

    parts
}

/// Get an access token for the given provider.
///
/// When a service account is configured, a Kubernetes OIDC token is issued
/// for it and exchanged through the provider; otherwise the controller's
/// own credentials are used. With a cache configured, concurrent callers
/// for the same logical credential share a single fetch.
pub async fn get_access_token<P: Provider + ?Sized>(
    provider: &P,
    opts: &AuthOptions,
) -> Result<AccessToken, AuthError> {
    let sa_ctx = service_account_context(provider, opts).await?;

    let Some(cache) = &opts.cache else {
        return fetch_access_token(provider, sa_ctx.as_ref(), opts).await;
    };

    let key = hash_key(&access_token_cache_key_parts(provider, sa_ctx.as_ref(), opts));
    let sa_ctx = sa_ctx.as_ref();
    let (credential, cached) = cache
        .get_or_set(&key, move || async move {
            fetch_access_token(provider, sa_ctx, opts).await.map(Credential::Access)
        })
        .await?;
    debug!(provider = provider.name(), cached, "Resolved access token");

    credential
        .into_access_token()
        .ok_or_else(|| AuthError::Internal("cached credential is not an access token".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ServiceAccountTokenProvider;
    use capstan_cache::TokenCache;
    use capstan_core::ObjectRef;
    use capstan_core::mock::MockCluster;
    use std::sync::Arc;

    fn generic_opts(cluster: Arc<MockCluster>) -> AuthOptions {
        AuthOptions::builder()
            .cluster(cluster)
            .service_account(ObjectRef::new("tenant-a", "app"))
            .build()
    }

    #[tokio::test]
    async fn test_service_account_flow_issues_and_wraps_token() {
        let cluster = Arc::new(MockCluster::new());
        cluster.add_service_account(ServiceAccount::new("app", "tenant-a")).await;
        let provider = ServiceAccountTokenProvider::new();

        let token = get_access_token(&provider, &generic_opts(cluster.clone())).await.unwrap();
        assert!(token.token.contains('.'));
        assert_eq!(cluster.issued_tokens(), 1);
    }

    #[tokio::test]
    async fn test_missing_service_account_is_wrapped() {
        let cluster = Arc::new(MockCluster::new());
        let provider = ServiceAccountTokenProvider::new();

        let err = get_access_token(&provider, &generic_opts(cluster)).await.unwrap_err();
        assert_eq!(err.to_string(), "serviceaccount 'tenant-a/app' not found");
    }

    #[tokio::test]
    async fn test_cached_token_skips_second_issue() {
        let cluster = Arc::new(MockCluster::new());
        cluster.add_service_account(ServiceAccount::new("app", "tenant-a")).await;
        let provider = ServiceAccountTokenProvider::new();

        let cache = Arc::new(TokenCache::default());
        let mut opts = generic_opts(cluster.clone());
        opts.cache = Some(cache);

        let first = get_access_token(&provider, &opts).await.unwrap();
        let second = get_access_token(&provider, &opts).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(cluster.issued_tokens(), 1);
    }

    #[tokio::test]
    async fn test_cache_keys_differ_per_service_account() {
        let cluster = Arc::new(MockCluster::new());
        cluster.add_service_account(ServiceAccount::new("app", "tenant-a")).await;
        cluster.add_service_account(ServiceAccount::new("app", "tenant-b")).await;
        let provider = ServiceAccountTokenProvider::new();

        let cache: Arc<TokenCache<Credential>> = Arc::new(TokenCache::default());
        let mut opts_a = generic_opts(cluster.clone());
        opts_a.cache = Some(cache.clone());
        let mut opts_b = opts_a.clone();
        opts_b.service_account = Some(ObjectRef::new("tenant-b", "app"));

        get_access_token(&provider, &opts_a).await.unwrap();
        get_access_token(&provider, &opts_b).await.unwrap();
        assert_eq!(cluster.issued_tokens(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_key_parts_include_scopes_and_proxy() {
        let provider = ServiceAccountTokenProvider::new();
        let opts = AuthOptions::builder()
            .scope("https://www.googleapis.com/auth/cloud-platform")
            .proxy_url(url::Url::parse("http://proxy:8080").unwrap())
            .build();
        let parts = access_token_cache_key_parts(&provider, None, &opts);
        assert!(parts.contains(&"provider=generic".to_string()));
        assert!(parts.iter().any(|p| p.starts_with("scopes=")));
        assert!(parts.iter().any(|p| p.starts_with("proxyURL=")));
    }

    #[test]
    fn test_hash_key_is_deterministic() {
        let parts = vec!["provider=generic".to_string()];
        assert_eq!(hash_key(&parts), hash_key(&parts));
        assert_ne!(hash_key(&parts), hash_key(&["provider=azure".to_string()]));
    }
}
