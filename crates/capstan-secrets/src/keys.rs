//! Well-known secret data keys.

/// Key for username data in basic auth and proxy secrets.
pub const USERNAME: &str = "username";
/// Key for password data in basic auth and proxy secrets.
pub const PASSWORD: &str = "password";

/// Key for bearer token data.
pub const BEARER_TOKEN: &str = "bearerToken";
/// Key for generic API token data.
pub const TOKEN: &str = "token";

/// Key for SSH private key data.
pub const SSH_PRIVATE_KEY: &str = "identity";
/// Key for SSH public key data.
pub const SSH_PUBLIC_KEY: &str = "identity.pub";
/// Key for SSH known hosts data.
pub const SSH_KNOWN_HOSTS: &str = "known_hosts";

/// Standard key for TLS certificate data.
pub const TLS_CERT: &str = "tls.crt";
/// Standard key for TLS private key data.
pub const TLS_PRIVATE_KEY: &str = "tls.key";
/// Standard key for CA certificate data.
pub const CA_CERT: &str = "ca.crt";

/// Legacy key for TLS certificate data.
pub const LEGACY_TLS_CERT: &str = "certFile";
/// Legacy key for TLS private key data.
pub const LEGACY_TLS_PRIVATE_KEY: &str = "keyFile";
/// Legacy key for CA certificate data.
pub const LEGACY_CA_CERT: &str = "caFile";

/// Key for proxy address data.
pub const PROXY_ADDRESS: &str = "address";

/// Key for GitHub App ID data.
pub const GITHUB_APP_ID: &str = "githubAppID";
/// Key for GitHub App installation ID data.
pub const GITHUB_APP_INSTALLATION_ID: &str = "githubAppInstallationID";
/// Key for GitHub App private key data.
pub const GITHUB_APP_PRIVATE_KEY: &str = "githubAppPrivateKey";
/// Key for GitHub App base URL data.
pub const GITHUB_APP_BASE_URL: &str = "githubAppBaseURL";

/// Key for Docker config JSON in registry secrets.
pub const DOCKER_CONFIG_JSON: &str = ".dockerconfigjson";
