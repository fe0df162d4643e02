//! The concrete credential providers.

pub mod azure;
pub mod gcp;
pub mod github;
pub mod serviceaccounttoken;

pub use azure::AzureProvider;
pub use gcp::GcpProvider;
pub use github::{GitHubAppConfig, GitHubProvider};
pub use serviceaccounttoken::ServiceAccountTokenProvider;
