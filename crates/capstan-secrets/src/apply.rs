//! Server-side apply of secrets.

use capstan_core::object::secret_type;
use capstan_core::{Cluster, Error, Result, Secret};
use std::collections::BTreeMap;
use tracing::debug;

/// Options for [`apply`].
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Field manager name for server-side apply ownership.
    pub field_manager: String,
    /// Labels merged into the secret before applying.
    pub labels: BTreeMap<String, String>,
    /// Annotations merged into the secret before applying.
    pub annotations: BTreeMap<String, String>,
    /// Immutable flag set on the secret before applying.
    pub immutable: Option<bool>,
    /// Allow deleting an existing secret that is immutable or has a
    /// conflicting type, so the apply can replace it.
    pub force: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            field_manager: "capstan".to_string(),
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            immutable: None,
            force: false,
        }
    }
}

/// Apply a secret using server-side apply with field ownership.
///
/// If the secret already exists and is immutable, or has a different type,
/// it is deleted first - but only when `force` is set; otherwise the apply
/// is attempted as-is and the API server's conflict is surfaced.
pub async fn apply(cluster: &dyn Cluster, secret: &Secret, options: &ApplyOptions) -> Result<()> {
    let mut secret = secret.clone();

    for (k, v) in &options.labels {
        secret.metadata.labels.insert(k.clone(), v.clone());
    }
    for (k, v) in &options.annotations {
        secret.metadata.annotations.insert(k.clone(), v.clone());
    }
    if options.immutable.is_some() {
        secret.immutable = options.immutable;
    }
    if secret.secret_type.is_empty() {
        secret.secret_type = secret_type::OPAQUE.to_string();
    }

    let secret_ref = secret.object_ref();
    match cluster.get_secret(&secret_ref).await {
        Ok(existing) => {
            let must_delete =
                existing.immutable == Some(true) || existing.secret_type != secret.secret_type;
            if must_delete && options.force {
                debug!(secret = %secret_ref, "Deleting existing secret before apply");
                cluster.delete_secret(&secret_ref).await?;
            }
        }
        Err(Error::SecretNotFound(_)) => {}
        Err(err) => return Err(err),
    }

    cluster.apply_secret(&secret, &options.field_manager, true).await
}
