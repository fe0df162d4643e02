//! GCP Workload Identity provider.
//!
//! Controller tokens come from the GKE metadata server. Tenant tokens are
//! obtained by exchanging a Kubernetes OIDC token at the STS endpoint and,
//! when the service account names a GCP service account, impersonating it
//! through the IAM credentials API. Registry credentials for GAR/GCR reuse
//! the access token directly; REST configs describe GKE clusters through
//! the container API.

use crate::error::AuthError;
use crate::options::AuthOptions;
use crate::provider::{Provider, RestConfigProvider};
use crate::restconfig::parse_cluster_address;
use crate::token::{AccessToken, ArtifactRegistryCredentials, RestConfig};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use capstan_core::ServiceAccount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Name of the GCP authentication provider.
pub const PROVIDER_NAME: &str = "gcp";

/// Annotation naming the GCP service account to impersonate.
pub const SERVICE_ACCOUNT_ANNOTATION: &str = "iam.gke.io/gcp-service-account";
/// Annotation naming the workload identity provider resource used as the
/// OIDC exchange audience.
pub const WORKLOAD_IDENTITY_PROVIDER_ANNOTATION: &str =
    "gcp.auth.capstan.dev/workload-identity-provider";

/// Identity value used when no GCP service account is impersonated and
/// the federated identity accesses resources directly.
pub const DIRECT_ACCESS_IDENTITY: &str = "default";

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
// Username Google expects alongside an OAuth2 access token.
const GAR_TOKEN_USERNAME: &str = "oauth2accesstoken";

/// GCP Workload Identity token provider.
pub struct GcpProvider {
    metadata_endpoint: String,
    sts_endpoint: String,
    iam_endpoint: String,
    container_endpoint: String,
}

impl Default for GcpProvider {
    fn default() -> Self {
        Self {
            metadata_endpoint: "http://metadata.google.internal".to_string(),
            sts_endpoint: "https://sts.googleapis.com".to_string(),
            iam_endpoint: "https://iamcredentials.googleapis.com".to_string(),
            container_endpoint: "https://container.googleapis.com".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct StsTokenRequest {
    grant_type: String,
    audience: String,
    scope: String,
    requested_token_type: String,
    subject_token: String,
    subject_token_type: String,
}

#[derive(Debug, Deserialize)]
struct StsTokenResponse {
    access_token: String,
    expires_in: Option<i64>,
}

#[derive(Debug, Serialize)]
struct ImpersonateRequest {
    scope: Vec<String>,
    lifetime: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImpersonateResponse {
    access_token: String,
    expire_time: String,
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MasterAuth {
    cluster_ca_certificate: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GkeCluster {
    endpoint: String,
    master_auth: Option<MasterAuth>,
}

impl GcpProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.metadata_endpoint = endpoint.into();
        self
    }

    pub fn with_sts_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.sts_endpoint = endpoint.into();
        self
    }

    pub fn with_iam_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.iam_endpoint = endpoint.into();
        self
    }

    pub fn with_container_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.container_endpoint = endpoint.into();
        self
    }

    fn scopes(&self, opts: &AuthOptions) -> Vec<String> {
        if opts.scopes.is_empty() {
            vec![CLOUD_PLATFORM_SCOPE.to_string()]
        } else {
            opts.scopes.clone()
        }
    }

    /// Email of the default service account, from the metadata server.
    pub async fn service_account_email(&self, opts: &AuthOptions) -> Result<String, AuthError> {
        let url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/email",
            self.metadata_endpoint
        );
        let response = opts
            .http_client()?
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AuthError::Exchange {
                operation: "metadata server email lookup",
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.text().await?.trim().to_string())
    }

    async fn impersonate(
        &self,
        sts_token: &str,
        email: &str,
        opts: &AuthOptions,
    ) -> Result<AccessToken, AuthError> {
        debug!(service_account = email, "Impersonating GCP service account");

        let url = format!(
            "{}/v1/projects/-/serviceAccounts/{}:generateAccessToken",
            self.iam_endpoint, email
        );
        let request = ImpersonateRequest {
            scope: self.scopes(opts),
            lifetime: "3600s".to_string(),
        };
        let response = opts
            .http_client()?
            .post(&url)
            .bearer_auth(sts_token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Exchange {
                operation: "GCP service account impersonation",
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let token: ImpersonateResponse = response.json().await?;
        let expires_at = DateTime::parse_from_rfc3339(&token.expire_time)?.with_timezone(&Utc);
        Ok(AccessToken::new(token.access_token, expires_at))
    }

    fn workload_identity_audience(&self, service_account: &ServiceAccount) -> Result<String, AuthError> {
        let provider = service_account
            .annotation(WORKLOAD_IDENTITY_PROVIDER_ANNOTATION)
            .ok_or_else(|| AuthError::MissingAnnotation {
                key: WORKLOAD_IDENTITY_PROVIDER_ANNOTATION,
                service_account: service_account.object_ref(),
            })?;
        Ok(format!("//iam.googleapis.com/{provider}"))
    }
}

#[async_trait]
impl Provider for GcpProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    fn audiences(&self, service_account: &ServiceAccount) -> Result<Vec<String>, AuthError> {
        Ok(vec![self.workload_identity_audience(service_account)?])
    }

    /// The impersonated GCP service account email, or
    /// [`DIRECT_ACCESS_IDENTITY`] when the federated identity is used
    /// directly.
    fn identity(&self, service_account: &ServiceAccount) -> Result<String, AuthError> {
        match service_account.annotation(SERVICE_ACCOUNT_ANNOTATION) {
            None => Ok(DIRECT_ACCESS_IDENTITY.to_string()),
            Some(email) if email.contains('@') => Ok(email.to_string()),
            Some(email) => Err(AuthError::InvalidConfig(format!(
                "invalid GCP service account email '{email}'"
            ))),
        }
    }

    async fn new_controller_token(&self, opts: &AuthOptions) -> Result<AccessToken, AuthError> {
        let mut url = format!(
            "{}/computeMetadata/v1/instance/service-accounts/default/token",
            self.metadata_endpoint
        );
        if !opts.scopes.is_empty() {
            url.push_str(&format!("?scopes={}", opts.scopes.join(",")));
        }

        debug!("Fetching controller token from metadata server");
        let response = opts
            .http_client()?
            .get(&url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AuthError::Exchange {
                operation: "metadata server token request",
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let token: MetadataTokenResponse = response.json().await?;
        Ok(AccessToken::with_expires_in(token.access_token, token.expires_in))
    }

    async fn new_token_for_service_account(
        &self,
        oidc_token: &str,
        service_account: &ServiceAccount,
        opts: &AuthOptions,
    ) -> Result<AccessToken, AuthError> {
        let audience = self.workload_identity_audience(service_account)?;
        debug!(audience = %audience, "Exchanging OIDC token at GCP STS");

        let request = StsTokenRequest {
            grant_type: "urn:ietf:params:oauth:grant-type:token-exchange".to_string(),
            audience,
            scope: CLOUD_PLATFORM_SCOPE.to_string(),
            requested_token_type: "urn:ietf:params:oauth:token-type:access_token".to_string(),
            subject_token: oidc_token.to_string(),
            subject_token_type: "urn:ietf:params:oauth:token-type:jwt".to_string(),
        };
        let response = opts
            .http_client()?
            .post(format!("{}/v1/token", self.sts_endpoint))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AuthError::Exchange {
                operation: "GCP STS token exchange",
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let sts_token: StsTokenResponse = response.json().await?;
        let federated = AccessToken::with_expires_in(
            sts_token.access_token,
            sts_token.expires_in.unwrap_or(3600),
        );

        match self.identity(service_account)?.as_str() {
            DIRECT_ACCESS_IDENTITY => Ok(federated),
            email => self.impersonate(&federated.token, email, opts).await,
        }
    }

    fn parse_artifact_repository(&self, artifact_repository: &str) -> Result<String, AuthError> {
        let repository = artifact_repository
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        let host = repository.split('/').next().unwrap_or_default();
        let is_gar_or_gcr =
            host == "gcr.io" || host.ends_with(".gcr.io") || host.ends_with("-docker.pkg.dev");
        if !is_gar_or_gcr {
            return Err(AuthError::InvalidConfig(format!(
                "'{artifact_repository}' is not a GAR or GCR repository"
            )));
        }
        Ok(host.to_string())
    }

    async fn new_artifact_registry_credentials(
        &self,
        _registry: &str,
        access_token: AccessToken,
        _opts: &AuthOptions,
    ) -> Result<ArtifactRegistryCredentials, AuthError> {
        // GAR and GCR accept the access token itself as the password.
        Ok(ArtifactRegistryCredentials {
            username: GAR_TOKEN_USERNAME.to_string(),
            password: access_token.token,
            expires_at: access_token.expires_at,
        })
    }
}

#[async_trait]
impl RestConfigProvider for GcpProvider {
    fn access_token_scopes_for_cluster(
        &self,
        _opts: &AuthOptions,
    ) -> Result<Vec<Vec<String>>, AuthError> {
        Ok(vec![vec![CLOUD_PLATFORM_SCOPE.to_string()]])
    }

    async fn new_rest_config(
        &self,
        access_tokens: Vec<AccessToken>,
        opts: &AuthOptions,
    ) -> Result<RestConfig, AuthError> {
        let [token] = access_tokens.as_slice() else {
            return Err(AuthError::Internal(
                "expected one access token for a GKE REST config".to_string(),
            ));
        };

        if let Some(address) = &opts.cluster_address {
            let ca_data = match &opts.ca_data {
                Some(ca) => Some(STANDARD.decode(ca).map_err(|e| {
                    AuthError::InvalidConfig(format!("invalid CA data: {e}"))
                })?),
                None => None,
            };
            return Ok(RestConfig {
                host: parse_cluster_address(address)?,
                bearer_token: token.token.clone(),
                ca_data,
                expires_at: token.expires_at,
            });
        }

        let cluster_resource = opts.cluster_resource.as_ref().ok_or_else(|| {
            AuthError::InvalidConfig(
                "a cluster resource or address is required to build a REST config".to_string(),
            )
        })?;

        debug!(cluster = %cluster_resource, "Describing GKE cluster");
        let url = format!("{}/v1/{}", self.container_endpoint, cluster_resource);
        let response = opts
            .http_client()?
            .get(&url)
            .bearer_auth(&token.token)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AuthError::Exchange {
                operation: "GKE cluster describe",
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let cluster: GkeCluster = response.json().await?;
        let ca_data = match cluster.master_auth.and_then(|a| a.cluster_ca_certificate) {
            Some(ca) => Some(STANDARD.decode(&ca).map_err(|e| {
                AuthError::Internal(format!("invalid cluster CA encoding: {e}"))
            })?),
            None => None,
        };

        Ok(RestConfig {
            host: parse_cluster_address(&cluster.endpoint)?,
            bearer_token: token.token.clone(),
            ca_data,
            expires_at: token.expires_at,
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
    fn test_identity_defaults_to_direct_access() {
        let provider = GcpProvider::new();
        let sa = service_account(&[]);
        assert_eq!(provider.identity(&sa).unwrap(), DIRECT_ACCESS_IDENTITY);
    }

    #[test]
    fn test_identity_validates_email_shape() {
        let provider = GcpProvider::new();
        let sa = service_account(&[(SERVICE_ACCOUNT_ANNOTATION, "not-an-email")]);
        assert!(provider.identity(&sa).is_err());

        let sa = service_account(&[(SERVICE_ACCOUNT_ANNOTATION, "sa@proj.iam.gserviceaccount.com")]);
        assert_eq!(provider.identity(&sa).unwrap(), "sa@proj.iam.gserviceaccount.com");
    }

    #[test]
    fn test_audience_requires_workload_identity_provider() {
        let provider = GcpProvider::new();
        let sa = service_account(&[]);
        assert!(provider.audiences(&sa).is_err());

        let sa = service_account(&[(
            WORKLOAD_IDENTITY_PROVIDER_ANNOTATION,
            "projects/1/locations/global/workloadIdentityPools/pool/providers/k8s",
        )]);
        assert_eq!(
            provider.audiences(&sa).unwrap(),
            vec![
                "//iam.googleapis.com/projects/1/locations/global/workloadIdentityPools/pool/providers/k8s"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_parse_artifact_repository_accepts_gar_and_gcr() {
        let provider = GcpProvider::new();
        assert_eq!(
            provider.parse_artifact_repository("us-docker.pkg.dev/proj/repo/app").unwrap(),
            "us-docker.pkg.dev"
        );
        assert_eq!(provider.parse_artifact_repository("eu.gcr.io/proj/app").unwrap(), "eu.gcr.io");
        assert!(provider.parse_artifact_repository("registry.example.com/app").is_err());
    }
}
