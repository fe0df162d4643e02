//! Cluster API trait and the HTTP implementation.
//!
//! The [`Cluster`] trait is the seam between the credential providers and
//! the Kubernetes API server. Production code uses [`HttpCluster`]; tests
//! inject the in-memory implementation from the `mock` module.

use crate::error::{Error, Result};
use crate::object::{ObjectRef, Secret, ServiceAccount};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

/// Access to the Kubernetes objects Capstan reads and writes.
#[async_trait]
pub trait Cluster: Send + Sync {
    /// Fetch a secret by namespaced name.
    async fn get_secret(&self, secret_ref: &ObjectRef) -> Result<Secret>;

    /// Fetch a service account by namespaced name.
    async fn get_service_account(&self, sa_ref: &ObjectRef) -> Result<ServiceAccount>;

    /// Issue a token for the service account via the TokenRequest
    /// subresource. Empty `audiences` requests the API server defaults.
    async fn create_service_account_token(
        &self,
        sa_ref: &ObjectRef,
        audiences: &[String],
        expiration_seconds: Option<i64>,
    ) -> Result<String>;

    /// Server-side apply of a secret with field ownership.
    async fn apply_secret(&self, secret: &Secret, field_manager: &str, force: bool) -> Result<()>;

    /// Delete a secret. Deleting an absent secret is not an error.
    async fn delete_secret(&self, secret_ref: &ObjectRef) -> Result<()>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequestSpec {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    audiences: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiration_seconds: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest {
    api_version: String,
    kind: String,
    spec: TokenRequestSpec,
}

#[derive(Debug, Deserialize)]
struct TokenRequestStatus {
    token: String,
}

#[derive(Debug, Deserialize)]
struct TokenRequestResponse {
    status: TokenRequestStatus,
}

/// Kubernetes API server client backed by reqwest.
pub struct HttpCluster {
    base_url: Url,
    client: reqwest::Client,
    bearer_token: Option<String>,
}

impl HttpCluster {
    /// Create a client for the API server at `base_url`.
    ///
    /// `ca_pem` adds the cluster CA as a trusted root; `bearer_token` is
    /// attached to every request when set.
    pub fn new(base_url: Url, bearer_token: Option<String>, ca_pem: Option<&[u8]>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().use_rustls_tls();
        if let Some(pem) = ca_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| Error::api("parse cluster CA certificate", e))?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .map_err(|e| Error::api("build cluster HTTP client", e))?;
        Ok(Self {
            base_url,
            client,
            bearer_token,
        })
    }

    fn url(&self, namespace: &str, resource: &str, name: &str, subresource: Option<&str>) -> String {
        let mut url = format!(
            "{}api/v1/namespaces/{}/{}/{}",
            self.base_url, namespace, resource, name
        );
        if let Some(sub) = subresource {
            url.push('/');
            url.push_str(sub);
        }
        url
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.bearer_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }
}

#[async_trait]
impl Cluster for HttpCluster {
    async fn get_secret(&self, secret_ref: &ObjectRef) -> Result<Secret> {
        let url = self.url(&secret_ref.namespace, "secrets", &secret_ref.name, None);
        let operation = format!("get secret '{secret_ref}'");
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| Error::api(operation.clone(), e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::SecretNotFound(secret_ref.clone()));
        }
        if !response.status().is_success() {
            return Err(Error::UnexpectedStatus {
                operation,
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        response.json().await.map_err(|e| Error::api(operation, e))
    }

    async fn get_service_account(&self, sa_ref: &ObjectRef) -> Result<ServiceAccount> {
        let url = self.url(&sa_ref.namespace, "serviceaccounts", &sa_ref.name, None);
        let operation = format!("get serviceaccount '{sa_ref}'");
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .map_err(|e| Error::api(operation.clone(), e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::ServiceAccountNotFound(sa_ref.clone()));
        }
        if !response.status().is_success() {
            return Err(Error::UnexpectedStatus {
                operation,
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        response.json().await.map_err(|e| Error::api(operation, e))
    }

    async fn create_service_account_token(
        &self,
        sa_ref: &ObjectRef,
        audiences: &[String],
        expiration_seconds: Option<i64>,
    ) -> Result<String> {
        let url = self.url(&sa_ref.namespace, "serviceaccounts", &sa_ref.name, Some("token"));
        let operation = format!("create token for serviceaccount '{sa_ref}'");
        let body = TokenRequest {
            api_version: "authentication.k8s.io/v1".to_string(),
            kind: "TokenRequest".to_string(),
            spec: TokenRequestSpec {
                audiences: audiences.to_vec(),
                expiration_seconds,
            },
        };
        debug!(service_account = %sa_ref, audiences = ?audiences, "Requesting service account token");
        let response = self
            .request(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::api(operation.clone(), e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(Error::ServiceAccountNotFound(sa_ref.clone()));
        }
        if !response.status().is_success() {
            return Err(Error::UnexpectedStatus {
                operation,
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let token_response: TokenRequestResponse =
            response.json().await.map_err(|e| Error::api(operation, e))?;
        Ok(token_response.status.token)
    }

    async fn apply_secret(&self, secret: &Secret, field_manager: &str, force: bool) -> Result<()> {
        let secret_ref = secret.object_ref();
        let mut url = format!(
            "{}?fieldManager={}",
            self.url(&secret_ref.namespace, "secrets", &secret_ref.name, None),
            field_manager
        );
        if force {
            url.push_str("&force=true");
        }
        let operation = format!("apply secret '{secret_ref}'");
        let body = serde_json::to_vec(secret).map_err(|e| Error::api(operation.clone(), e))?;
        let response = self
            .request(self.client.patch(&url))
            .header(reqwest::header::CONTENT_TYPE, "application/apply-patch+yaml")
            .body(body)
            .send()
            .await
            .map_err(|e| Error::api(operation.clone(), e))?;
        if !response.status().is_success() {
            return Err(Error::UnexpectedStatus {
                operation,
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    async fn delete_secret(&self, secret_ref: &ObjectRef) -> Result<()> {
        let url = self.url(&secret_ref.namespace, "secrets", &secret_ref.name, None);
        let operation = format!("delete secret '{secret_ref}'");
        let response = self
            .request(self.client.delete(&url))
            .send()
            .await
            .map_err(|e| Error::api(operation.clone(), e))?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        if !response.status().is_success() {
            return Err(Error::UnexpectedStatus {
                operation,
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_construction() {
        let cluster = HttpCluster::new(
            Url::parse("https://kubernetes.default.svc:443/").unwrap(),
            None,
            None,
        )
        .unwrap();
        assert_eq!(
            cluster.url("capstan-system", "secrets", "creds", None),
            "https://kubernetes.default.svc/api/v1/namespaces/capstan-system/secrets/creds"
        );
        assert_eq!(
            cluster.url("capstan-system", "serviceaccounts", "app", Some("token")),
            "https://kubernetes.default.svc/api/v1/namespaces/capstan-system/serviceaccounts/app/token"
        );
    }

    #[test]
    fn test_token_request_body_shape() {
        let body = TokenRequest {
            api_version: "authentication.k8s.io/v1".to_string(),
            kind: "TokenRequest".to_string(),
            spec: TokenRequestSpec {
                audiences: vec!["api://AzureADTokenExchange".to_string()],
                expiration_seconds: Some(600),
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["spec"]["audiences"][0], "api://AzureADTokenExchange");
        assert_eq!(json["spec"]["expirationSeconds"], 600);
    }
}
