//! Generic Kubernetes ServiceAccount token provider.
//!
//! Instead of exchanging for a cloud token, this provider issues plain
//! Kubernetes ServiceAccount tokens. The controller identity is discovered
//! from the token mounted into the pod.

use crate::error::AuthError;
use crate::jwt;
use crate::options::AuthOptions;
use crate::provider::{Provider, RestConfigProvider};
use crate::restconfig::parse_cluster_address;
use crate::token::{AccessToken, ArtifactRegistryCredentials, RestConfig};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use capstan_core::{Cluster, ObjectRef, ServiceAccount};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Name of the generic ServiceAccount token provider.
pub const PROVIDER_NAME: &str = "generic";

const DEFAULT_TOKEN_MOUNT_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Provider issuing Kubernetes ServiceAccount tokens.
pub struct ServiceAccountTokenProvider {
    token_mount_path: PathBuf,
}

impl Default for ServiceAccountTokenProvider {
    fn default() -> Self {
        Self {
            token_mount_path: PathBuf::from(DEFAULT_TOKEN_MOUNT_PATH),
        }
    }
}

impl ServiceAccountTokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the directory holding the mounted pod credentials.
    pub fn with_token_mount_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.token_mount_path = path.into();
        self
    }

    /// Identify the pod's own service account by parsing the subject of
    /// the mounted token.
    async fn pod_service_account(&self) -> Result<ObjectRef, AuthError> {
        let token_path = self.token_mount_path.join("token");
        let token = tokio::fs::read_to_string(&token_path).await.map_err(|e| {
            AuthError::InvalidConfig(format!(
                "failed to read service account token from '{}': {e}",
                token_path.display()
            ))
        })?;

        let subject = jwt::subject_from_jwt(token.trim())?;
        let mut parts = subject.splitn(4, ':');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some("system"), Some("serviceaccount"), Some(namespace), Some(name))
                if !namespace.is_empty() && !name.is_empty() =>
            {
                Ok(ObjectRef::new(namespace, name))
            }
            _ => Err(AuthError::InvalidJwt(format!(
                "subject '{subject}' is not a service account"
            ))),
        }
    }

    fn cluster<'a>(&self, opts: &'a AuthOptions) -> Result<&'a Arc<dyn Cluster>, AuthError> {
        opts.cluster.as_ref().ok_or_else(|| {
            AuthError::InvalidConfig(
                "a cluster client is required to issue service account tokens".to_string(),
            )
        })
    }
}

#[async_trait]
impl Provider for ServiceAccountTokenProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn audiences(&self, _service_account: &ServiceAccount) -> Result<Vec<String>, AuthError> {
        // Empty keeps the API server's default audiences.
        Ok(Vec::new())
    }

    fn identity(&self, service_account: &ServiceAccount) -> Result<String, AuthError> {
        Ok(format!(
            "system:serviceaccount:{}:{}",
            service_account.metadata.namespace, service_account.metadata.name
        ))
    }

    async fn new_controller_token(&self, opts: &AuthOptions) -> Result<AccessToken, AuthError> {
        let cluster = self.cluster(opts)?;
        let sa_ref = self.pod_service_account().await?;

        debug!(service_account = %sa_ref, "Issuing token for controller service account");
        let token = cluster
            .create_service_account_token(&sa_ref, &opts.audiences, None)
            .await?;
        let expires_at = jwt::expiration_from_jwt(&token)?;
        Ok(AccessToken::new(token, expires_at))
    }

    async fn new_token_for_service_account(
        &self,
        oidc_token: &str,
        _service_account: &ServiceAccount,
        _opts: &AuthOptions,
    ) -> Result<AccessToken, AuthError> {
        // The Kubernetes token is the credential; no exchange happens.
        let expires_at = jwt::expiration_from_jwt(oidc_token)?;
        Ok(AccessToken::new(oidc_token, expires_at))
    }

    fn parse_artifact_repository(&self, _artifact_repository: &str) -> Result<String, AuthError> {
        Err(AuthError::Unsupported {
            provider: PROVIDER_NAME,
            operation: "artifact registry credentials",
        })
    }

    async fn new_artifact_registry_credentials(
        &self,
        _registry: &str,
        _access_token: AccessToken,
        _opts: &AuthOptions,
    ) -> Result<ArtifactRegistryCredentials, AuthError> {
        Err(AuthError::Unsupported {
            provider: PROVIDER_NAME,
            operation: "artifact registry credentials",
        })
    }
}

#[async_trait]
impl RestConfigProvider for ServiceAccountTokenProvider {
    fn access_token_scopes_for_cluster(
        &self,
        _opts: &AuthOptions,
    ) -> Result<Vec<Vec<String>>, AuthError> {
        Ok(vec![Vec::new()])
    }

    async fn new_rest_config(
        &self,
        access_tokens: Vec<AccessToken>,
        opts: &AuthOptions,
    ) -> Result<RestConfig, AuthError> {
        let [token] = access_tokens.as_slice() else {
            return Err(AuthError::Internal(
                "expected one access token for a REST config".to_string(),
            ));
        };

        let address = opts.cluster_address.as_ref().ok_or_else(|| {
            AuthError::InvalidConfig(
                "a cluster address is required to build a REST config".to_string(),
            )
        })?;
        let ca_data = match &opts.ca_data {
            Some(ca) => Some(
                STANDARD
                    .decode(ca)
                    .map_err(|e| AuthError::InvalidConfig(format!("invalid CA data: {e}")))?,
            ),
            None => None,
        };

        Ok(RestConfig {
            host: parse_cluster_address(address)?,
            bearer_token: token.token.clone(),
            ca_data,
            expires_at: token.expires_at,
        })
    }
}
