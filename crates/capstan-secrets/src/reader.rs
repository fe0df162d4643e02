//! Reading secrets referenced by other objects.

use capstan_core::{Cluster, ObjectRef, Result, Secret};

/// Resolve all image pull secrets referenced by a service account.
///
/// Any referenced secret that cannot be found is an error.
pub async fn pull_secrets_from_service_account(
    cluster: &dyn Cluster,
    sa_ref: &ObjectRef,
) -> Result<Vec<Secret>> {
    let sa = cluster.get_service_account(sa_ref).await?;

    let mut secrets = Vec::with_capacity(sa.image_pull_secrets.len());
    for reference in &sa.image_pull_secrets {
        let secret_ref = ObjectRef::new(&sa_ref.namespace, &reference.name);
        secrets.push(cluster.get_secret(&secret_ref).await?);
    }
    Ok(secrets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use capstan_core::mock::MockCluster;
    use capstan_core::object::{LocalObjectReference, secret_type};
    use capstan_core::{Error, ServiceAccount};

    #[tokio::test]
    async fn test_resolves_referenced_pull_secrets() {
        let cluster = MockCluster::new();
        let mut sa = ServiceAccount::new("app", "tenant-a");
        sa.image_pull_secrets = vec![LocalObjectReference { name: "regcred".to_string() }];
        cluster.add_service_account(sa).await;
        cluster
            .add_secret(Secret::new("regcred", "tenant-a", secret_type::DOCKER_CONFIG_JSON))
            .await;

        let secrets = pull_secrets_from_service_account(&cluster, &ObjectRef::new("tenant-a", "app"))
            .await
            .unwrap();
        assert_eq!(secrets.len(), 1);
        assert_eq!(secrets[0].metadata.name, "regcred");
    }

    #[tokio::test]
    async fn test_missing_referenced_secret_is_an_error() {
        let cluster = MockCluster::new();
        let mut sa = ServiceAccount::new("app", "tenant-a");
        sa.image_pull_secrets = vec![LocalObjectReference { name: "missing".to_string() }];
        cluster.add_service_account(sa).await;

        let err = pull_secrets_from_service_account(&cluster, &ObjectRef::new("tenant-a", "app"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SecretNotFound(_)));
    }
}
