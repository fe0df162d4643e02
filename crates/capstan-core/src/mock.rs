//! In-memory [`Cluster`] implementation for tests.

use crate::cluster::Cluster;
use crate::error::{Error, Result};
use crate::object::{ObjectRef, Secret, ServiceAccount};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// In-memory cluster holding secrets and service accounts.
///
/// Issued service account tokens are unsigned JWTs carrying the audiences
/// and an `exp` claim, so code that inspects token expiry works against
/// this implementation unchanged.
#[derive(Default)]
pub struct MockCluster {
    secrets: RwLock<HashMap<ObjectRef, Secret>>,
    service_accounts: RwLock<HashMap<ObjectRef, ServiceAccount>>,
    issued_tokens: AtomicUsize,
    /// Lifetime of issued tokens in seconds. Defaults to one hour.
    pub token_lifetime_secs: i64,
}

impl MockCluster {
    pub fn new() -> Self {
        Self {
            token_lifetime_secs: 3600,
            ..Default::default()
        }
    }

    pub async fn add_secret(&self, secret: Secret) {
        self.secrets.write().await.insert(secret.object_ref(), secret);
    }

    pub async fn add_service_account(&self, sa: ServiceAccount) {
        self.service_accounts.write().await.insert(sa.object_ref(), sa);
    }

    /// Number of tokens issued via the TokenRequest subresource.
    pub fn issued_tokens(&self) -> usize {
        self.issued_tokens.load(Ordering::SeqCst)
    }

    /// Stored copy of a secret, if present.
    pub async fn secret(&self, secret_ref: &ObjectRef) -> Option<Secret> {
        self.secrets.read().await.get(secret_ref).cloned()
    }
}

#[async_trait]
impl Cluster for MockCluster {
    async fn get_secret(&self, secret_ref: &ObjectRef) -> Result<Secret> {
        self.secrets
            .read()
            .await
            .get(secret_ref)
            .cloned()
            .ok_or_else(|| Error::SecretNotFound(secret_ref.clone()))
    }

    async fn get_service_account(&self, sa_ref: &ObjectRef) -> Result<ServiceAccount> {
        self.service_accounts
            .read()
            .await
            .get(sa_ref)
            .cloned()
            .ok_or_else(|| Error::ServiceAccountNotFound(sa_ref.clone()))
    }

    async fn create_service_account_token(
        &self,
        sa_ref: &ObjectRef,
        audiences: &[String],
        expiration_seconds: Option<i64>,
    ) -> Result<String> {
        if !self.service_accounts.read().await.contains_key(sa_ref) {
            return Err(Error::ServiceAccountNotFound(sa_ref.clone()));
        }
        self.issued_tokens.fetch_add(1, Ordering::SeqCst);

        let now = Utc::now().timestamp();
        let lifetime = expiration_seconds.unwrap_or(self.token_lifetime_secs);
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
        let claims = serde_json::json!({
            "iss": "https://kubernetes.default.svc",
            "sub": format!("system:serviceaccount:{}:{}", sa_ref.namespace, sa_ref.name),
            "aud": audiences,
            "iat": now,
            "exp": now + lifetime,
        });
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        Ok(format!("{header}.{payload}."))
    }

    async fn apply_secret(&self, secret: &Secret, _field_manager: &str, _force: bool) -> Result<()> {
        let secret_ref = secret.object_ref();
        let mut secrets = self.secrets.write().await;
        if let Some(existing) = secrets.get(&secret_ref)
            && existing.immutable == Some(true)
            && existing.data != secret.data
        {
            return Err(Error::UnexpectedStatus {
                operation: format!("apply secret '{secret_ref}'"),
                status: 422,
                body: "field is immutable when `immutable` is set".to_string(),
            });
        }
        secrets.insert(secret_ref, secret.clone());
        Ok(())
    }

    async fn delete_secret(&self, secret_ref: &ObjectRef) -> Result<()> {
        self.secrets.write().await.remove(secret_ref);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::secret_type;

    #[tokio::test]
    async fn test_get_secret_not_found() {
        let cluster = MockCluster::new();
        let err = cluster
            .get_secret(&ObjectRef::new("default", "missing"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "secret 'default/missing' not found");
    }

    #[tokio::test]
    async fn test_issued_token_carries_expiry_claim() {
        let cluster = MockCluster::new();
        cluster.add_service_account(ServiceAccount::new("app", "tenant-a")).await;

        let token = cluster
            .create_service_account_token(
                &ObjectRef::new("tenant-a", "app"),
                &["sts.googleapis.com".to_string()],
                Some(600),
            )
            .await
            .unwrap();

        let payload = token.split('.').nth(1).unwrap();
        let claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap();
        assert_eq!(claims["aud"][0], "sts.googleapis.com");
        assert!(claims["exp"].as_i64().unwrap() > claims["iat"].as_i64().unwrap());
        assert_eq!(cluster.issued_tokens(), 1);
    }

    #[tokio::test]
    async fn test_apply_refuses_immutable_data_change() {
        let cluster = MockCluster::new();
        let mut secret = Secret::new("creds", "default", secret_type::OPAQUE);
        secret.insert("token", "old");
        secret.immutable = Some(true);
        cluster.add_secret(secret.clone()).await;

        secret.insert("token", "new");
        let err = cluster.apply_secret(&secret, "capstan", false).await.unwrap_err();
        assert!(err.to_string().contains("immutable"));
    }
}
