//! Azure AD Workload Identity provider.
//!
//! Controller tokens come from the workload identity environment
//! (federated token file + client assertion exchange); tenant tokens from
//! exchanging a Kubernetes OIDC token as a client assertion. Registry
//! credentials are obtained through the ACR `oauth2/exchange` endpoint,
//! and REST configs for AKS clusters through the Azure Resource Manager.

use crate::error::AuthError;
use crate::jwt;
use crate::options::AuthOptions;
use crate::provider::{Provider, RestConfigProvider};
use crate::restconfig::parse_cluster_address;
use crate::token::{AccessToken, ArtifactRegistryCredentials, RestConfig};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use capstan_core::ServiceAccount;
use serde::Deserialize;
use tracing::debug;

/// Name of the Azure authentication provider.
pub const PROVIDER_NAME: &str = "azure";

/// Annotation carrying the client ID of the identity to impersonate.
pub const CLIENT_ID_ANNOTATION: &str = "azure.workload.identity/client-id";
/// Annotation carrying the tenant ID of the identity to impersonate.
pub const TENANT_ID_ANNOTATION: &str = "azure.workload.identity/tenant-id";

const OIDC_AUDIENCE: &str = "api://AzureADTokenExchange";
const ARM_SCOPE: &str = "https://management.azure.com/.default";
// Well-known application ID of the AKS AAD server.
const AKS_SERVER_SCOPE: &str = "6dae42f8-4368-4678-94ff-3960e28e3630/.default";
// Username Azure expects alongside an ACR refresh token.
const ACR_TOKEN_USERNAME: &str = "00000000-0000-0000-0000-000000000000";

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";

/// Azure AD Workload Identity token provider.
pub struct AzureProvider {
    authority_host: String,
    arm_endpoint: String,
}

impl Default for AzureProvider {
    fn default() -> Self {
        Self {
            authority_host: "https://login.microsoftonline.com".to_string(),
            arm_endpoint: "https://management.azure.com".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AzureTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct AcrExchangeResponse {
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct CredentialResult {
    value: String,
}

#[derive(Debug, Deserialize)]
struct CredentialResults {
    kubeconfigs: Vec<CredentialResult>,
}

impl AzureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the AAD authority host.
    pub fn with_authority_host(mut self, host: impl Into<String>) -> Self {
        self.authority_host = host.into();
        self
    }

    /// Override the Azure Resource Manager endpoint.
    pub fn with_arm_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.arm_endpoint = endpoint.into();
        self
    }

    fn token_endpoint(&self, tenant_id: &str) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_host, tenant_id)
    }

    fn scopes(&self, opts: &AuthOptions) -> Vec<String> {
        if opts.scopes.is_empty() {
            vec![ARM_SCOPE.to_string()]
        } else {
            opts.scopes.clone()
        }
    }

    async fn exchange_client_assertion(
        &self,
        tenant_id: &str,
        client_id: &str,
        assertion: &str,
        scopes: &[String],
        opts: &AuthOptions,
    ) -> Result<AccessToken, AuthError> {
        debug!(tenant_id, client_id, "Exchanging client assertion for Azure access token");

        let params = [
            ("client_id", client_id),
            ("scope", &scopes.join(" ")),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", assertion),
            ("grant_type", "client_credentials"),
        ];

        let response = opts
            .http_client()?
            .post(self.token_endpoint(tenant_id))
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Exchange {
                operation: "Azure AD token request",
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let token: AzureTokenResponse = response.json().await?;
        Ok(AccessToken::with_expires_in(token.access_token, token.expires_in))
    }

    fn registry_exchange_url(&self, registry: &str) -> String {
        if registry.starts_with("http://") || registry.starts_with("https://") {
            format!("{}/oauth2/exchange", registry.trim_end_matches('/'))
        } else {
            format!("https://{registry}/oauth2/exchange")
        }
    }
}

#[async_trait]
impl Provider for AzureProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn audiences(&self, _service_account: &ServiceAccount) -> Result<Vec<String>, AuthError> {
        Ok(vec![OIDC_AUDIENCE.to_string()])
    }

    fn identity(&self, service_account: &ServiceAccount) -> Result<String, AuthError> {
        let tenant_id = service_account.annotation(TENANT_ID_ANNOTATION).ok_or_else(|| {
            AuthError::MissingAnnotation {
                key: TENANT_ID_ANNOTATION,
                service_account: service_account.object_ref(),
            }
        })?;
        let client_id = service_account.annotation(CLIENT_ID_ANNOTATION).ok_or_else(|| {
            AuthError::MissingAnnotation {
                key: CLIENT_ID_ANNOTATION,
                service_account: service_account.object_ref(),
            }
        })?;
        Ok(format!("{tenant_id}/{client_id}"))
    }

    async fn new_controller_token(&self, opts: &AuthOptions) -> Result<AccessToken, AuthError> {
        let client_id = std::env::var("AZURE_CLIENT_ID")
            .map_err(|_| AuthError::InvalidConfig("AZURE_CLIENT_ID is not set".to_string()))?;
        let tenant_id = std::env::var("AZURE_TENANT_ID")
            .map_err(|_| AuthError::InvalidConfig("AZURE_TENANT_ID is not set".to_string()))?;
        let token_file = std::env::var("AZURE_FEDERATED_TOKEN_FILE").map_err(|_| {
            AuthError::InvalidConfig("AZURE_FEDERATED_TOKEN_FILE is not set".to_string())
        })?;
        let assertion = tokio::fs::read_to_string(&token_file)
            .await
            .map_err(|e| AuthError::InvalidConfig(format!("failed to read federated token file '{token_file}': {e}")))?;

        self.exchange_client_assertion(&tenant_id, &client_id, assertion.trim(), &self.scopes(opts), opts)
            .await
    }

    async fn new_token_for_service_account(
        &self,
        oidc_token: &str,
        service_account: &ServiceAccount,
        opts: &AuthOptions,
    ) -> Result<AccessToken, AuthError> {
        let identity = self.identity(service_account)?;
        let (tenant_id, client_id) = identity
            .split_once('/')
            .ok_or_else(|| AuthError::Internal(format!("invalid Azure identity '{identity}'")))?;

        self.exchange_client_assertion(tenant_id, client_id, oidc_token, &self.scopes(opts), opts)
            .await
    }

    fn parse_artifact_repository(&self, artifact_repository: &str) -> Result<String, AuthError> {
        let repository = artifact_repository
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        let host = repository.split('/').next().unwrap_or_default();
        if host.is_empty() {
            return Err(AuthError::InvalidConfig(format!(
                "invalid artifact repository '{artifact_repository}'"
            )));
        }
        Ok(host.to_string())
    }

    async fn new_artifact_registry_credentials(
        &self,
        registry: &str,
        access_token: AccessToken,
        opts: &AuthOptions,
    ) -> Result<ArtifactRegistryCredentials, AuthError> {
        let exchange_url = self.registry_exchange_url(registry);
        let service = url::Url::parse(&exchange_url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
            .ok_or_else(|| AuthError::InvalidConfig(format!("invalid registry '{registry}'")))?;

        debug!(registry = %service, "Exchanging access token for ACR refresh token");

        let params = [
            ("grant_type", "access_token"),
            ("service", &service),
            ("access_token", &access_token.token),
        ];
        let response = opts.http_client()?.post(&exchange_url).form(&params).send().await?;

        if !response.status().is_success() {
            return Err(AuthError::Exchange {
                operation: "ACR token exchange",
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let exchange: AcrExchangeResponse = response.json().await?;
        let expires_at = jwt::expiration_from_jwt(&exchange.refresh_token)?;

        Ok(ArtifactRegistryCredentials {
            username: ACR_TOKEN_USERNAME.to_string(),
            password: exchange.refresh_token,
            expires_at,
        })
    }
}

#[async_trait]
impl RestConfigProvider for AzureProvider {
    fn access_token_scopes_for_cluster(
        &self,
        _opts: &AuthOptions,
    ) -> Result<Vec<Vec<String>>, AuthError> {
        // One token for the Resource Manager, one for the AKS server.
        Ok(vec![
            vec![ARM_SCOPE.to_string()],
            vec![AKS_SERVER_SCOPE.to_string()],
        ])
    }

    async fn new_rest_config(
        &self,
        access_tokens: Vec<AccessToken>,
        opts: &AuthOptions,
    ) -> Result<RestConfig, AuthError> {
        let [arm_token, aks_token] = access_tokens.as_slice() else {
            return Err(AuthError::Internal(
                "expected two access tokens for an AKS REST config".to_string(),
            ));
        };

        if let Some(address) = &opts.cluster_address {
            let host = parse_cluster_address(address)?;
            let ca_data = match &opts.ca_data {
                Some(ca) => Some(STANDARD.decode(ca).map_err(|e| {
                    AuthError::InvalidConfig(format!("invalid CA data: {e}"))
                })?),
                None => None,
            };
            return Ok(RestConfig {
                host,
                bearer_token: aks_token.token.clone(),
                ca_data,
                expires_at: aks_token.expires_at,
            });
        }

        let cluster_resource = opts.cluster_resource.as_ref().ok_or_else(|| {
            AuthError::InvalidConfig(
                "a cluster resource or address is required to build a REST config".to_string(),
            )
        })?;

        debug!(cluster = %cluster_resource, "Describing AKS cluster");
        let url = format!(
            "{}{}/listClusterUserCredential?api-version=2024-09-01",
            self.arm_endpoint, cluster_resource
        );
        let response = opts
            .http_client()?
            .post(&url)
            .bearer_auth(&arm_token.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AuthError::Exchange {
                operation: "AKS cluster credential listing",
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let credentials: CredentialResults = response.json().await?;
        let kubeconfig_b64 = credentials
            .kubeconfigs
            .first()
            .map(|k| k.value.as_str())
            .ok_or_else(|| AuthError::Internal("no kubeconfig returned for AKS cluster".to_string()))?;
        let kubeconfig_bytes = STANDARD
            .decode(kubeconfig_b64)
            .map_err(|e| AuthError::Internal(format!("invalid kubeconfig encoding: {e}")))?;
        let kubeconfig: serde_yaml::Value = serde_yaml::from_slice(&kubeconfig_bytes)
            .map_err(|e| AuthError::Internal(format!("invalid kubeconfig: {e}")))?;

        let cluster = &kubeconfig["clusters"][0]["cluster"];
        let server = cluster["server"]
            .as_str()
            .ok_or_else(|| AuthError::Internal("kubeconfig has no cluster server".to_string()))?;
        let ca_data = match cluster["certificate-authority-data"].as_str() {
            Some(ca) => Some(STANDARD.decode(ca).map_err(|e| {
                AuthError::Internal(format!("invalid kubeconfig CA encoding: {e}"))
            })?),
            None => None,
        };

        Ok(RestConfig {
            host: parse_cluster_address(server)?,
            bearer_token: aks_token.token.clone(),
            ca_data,
            expires_at: aks_token.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service_account(annotations: &[(&str, &str)]) -> ServiceAccount {
        let mut sa = ServiceAccount::new("app", "tenant-a");
        for (k, v) in annotations {
            sa.metadata.annotations.insert(k.to_string(), v.to_string());
        }
        sa
    }

    #[test]
    fn test_token_endpoint_contains_tenant() {
        let provider = AzureProvider::new();
        assert_eq!(
            provider.token_endpoint("my-tenant"),
            "https://login.microsoftonline.com/my-tenant/oauth2/v2.0/token"
        );
    }

    #[test]
    fn test_identity_requires_both_annotations() {
        let provider = AzureProvider::new();
        let sa = service_account(&[(CLIENT_ID_ANNOTATION, "client")]);
        let err = provider.identity(&sa).unwrap_err();
        assert!(err.to_string().contains(TENANT_ID_ANNOTATION));

        let sa = service_account(&[(TENANT_ID_ANNOTATION, "tenant"), (CLIENT_ID_ANNOTATION, "client")]);
        assert_eq!(provider.identity(&sa).unwrap(), "tenant/client");
    }

    #[test]
    fn test_parse_artifact_repository_extracts_host() {
        let provider = AzureProvider::new();
        assert_eq!(
            provider.parse_artifact_repository("myregistry.azurecr.io/team/app:latest").unwrap(),
            "myregistry.azurecr.io"
        );
        assert_eq!(
            provider.parse_artifact_repository("https://myregistry.azurecr.io").unwrap(),
            "myregistry.azurecr.io"
        );
        assert!(provider.parse_artifact_repository("").is_err());
    }

    #[test]
    fn test_default_scope_is_resource_manager() {
        let provider = AzureProvider::new();
        assert_eq!(provider.scopes(&AuthOptions::default()), vec![ARM_SCOPE.to_string()]);

        let opts = AuthOptions::builder().scope("custom/.default").build();
        assert_eq!(provider.scopes(&opts), vec!["custom/.default".to_string()]);
    }

    #[test]
    fn test_registry_exchange_url_prepends_https() {
        let provider = AzureProvider::new();
        assert_eq!(
            provider.registry_exchange_url("myregistry.azurecr.io"),
            "https://myregistry.azurecr.io/oauth2/exchange"
        );
        assert_eq!(
            provider.registry_exchange_url("http://127.0.0.1:8080"),
            "http://127.0.0.1:8080/oauth2/exchange"
        );
    }
}
