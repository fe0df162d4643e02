//! Kubernetes object model subset.
//!
//! Capstan only needs secrets and service accounts, so the types here
//! cover exactly the fields the credential providers read and write.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Well-known Kubernetes secret types.
pub mod secret_type {
    pub const OPAQUE: &str = "Opaque";
    pub const TLS: &str = "kubernetes.io/tls";
    pub const BASIC_AUTH: &str = "kubernetes.io/basic-auth";
    pub const DOCKER_CONFIG_JSON: &str = "kubernetes.io/dockerconfigjson";
}

/// A namespaced reference to a Kubernetes object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Object metadata. Only the fields Capstan reads or writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A Kubernetes Secret.
///
/// `data` holds raw bytes; the base64 encoding mandated by the API wire
/// format is applied during (de)serialization only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Secret {
    #[serde(default = "Secret::default_api_version")]
    pub api_version: String,
    #[serde(default = "Secret::default_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(rename = "type", default, skip_serializing_if = "String::is_empty")]
    pub secret_type: String,
    #[serde(default, with = "base64_map", skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Vec<u8>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub immutable: Option<bool>,
}

impl Secret {
    fn default_api_version() -> String {
        "v1".to_string()
    }

    fn default_kind() -> String {
        "Secret".to_string()
    }

    /// Create an empty secret of the given type.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>, secret_type: &str) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
                ..Default::default()
            },
            secret_type: secret_type.to_string(),
            data: BTreeMap::new(),
            immutable: None,
        }
    }

    /// Insert a string value under the given key.
    pub fn insert(&mut self, key: &str, value: impl Into<Vec<u8>>) {
        self.data.insert(key.to_string(), value.into());
    }

    /// The namespaced reference of this secret.
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(&self.metadata.namespace, &self.metadata.name)
    }

    /// Raw bytes stored under `key`, if present.
    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.data.get(key).map(|v| v.as_slice())
    }

    /// UTF-8 string stored under `key`, if present. Invalid UTF-8 is
    /// replaced, matching how the API server treats stringData reads.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.data.get(key).map(|v| String::from_utf8_lossy(v).into_owned())
    }
}

/// A reference to an object in the same namespace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalObjectReference {
    pub name: String,
}

/// A Kubernetes ServiceAccount.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAccount {
    #[serde(default = "ServiceAccount::default_api_version")]
    pub api_version: String,
    #[serde(default = "ServiceAccount::default_kind")]
    pub kind: String,
    pub metadata: ObjectMeta,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub image_pull_secrets: Vec<LocalObjectReference>,
}

impl ServiceAccount {
    fn default_api_version() -> String {
        "v1".to_string()
    }

    fn default_kind() -> String {
        "ServiceAccount".to_string()
    }

    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            api_version: Self::default_api_version(),
            kind: Self::default_kind(),
            metadata: ObjectMeta {
                name: name.into(),
                namespace: namespace.into(),
                ..Default::default()
            },
            image_pull_secrets: Vec::new(),
        }
    }

    /// The namespaced reference of this service account.
    pub fn object_ref(&self) -> ObjectRef {
        ObjectRef::new(&self.metadata.namespace, &self.metadata.name)
    }

    /// Annotation value for `key`, if present.
    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.metadata.annotations.get(key).map(|s| s.as_str())
    }
}

mod base64_map {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        data: &BTreeMap<String, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded: BTreeMap<&str, String> = data
            .iter()
            .map(|(k, v)| (k.as_str(), STANDARD.encode(v)))
            .collect();
        encoded.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        let encoded = BTreeMap::<String, String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(k, v)| {
                STANDARD
                    .decode(&v)
                    .map(|bytes| (k, bytes))
                    .map_err(serde::de::Error::custom)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_ref_display() {
        let r = ObjectRef::new("capstan-system", "creds");
        assert_eq!(r.to_string(), "capstan-system/creds");
    }

    #[test]
    fn test_secret_data_roundtrips_through_base64() {
        let mut secret = Secret::new("creds", "default", secret_type::OPAQUE);
        secret.insert("token", "s3cr3t");

        let json = serde_json::to_value(&secret).unwrap();
        assert_eq!(json["data"]["token"], "czNjcjN0");

        let parsed: Secret = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.get("token"), Some(b"s3cr3t".as_slice()));
    }

    #[test]
    fn test_secret_defaults_fill_in_type_meta() {
        let parsed: Secret = serde_json::from_str(
            r#"{"metadata":{"name":"a","namespace":"b"},"type":"Opaque"}"#,
        )
        .unwrap();
        assert_eq!(parsed.api_version, "v1");
        assert_eq!(parsed.kind, "Secret");
        assert!(parsed.data.is_empty());
    }

    #[test]
    fn test_service_account_annotation_lookup() {
        let mut sa = ServiceAccount::new("app", "tenant-a");
        sa.metadata
            .annotations
            .insert("iam.capstan.dev/gcp-service-account".into(), "sa@proj.iam.gserviceaccount.com".into());
        assert_eq!(
            sa.annotation("iam.capstan.dev/gcp-service-account"),
            Some("sa@proj.iam.gserviceaccount.com")
        );
        assert_eq!(sa.annotation("missing"), None);
    }
}
