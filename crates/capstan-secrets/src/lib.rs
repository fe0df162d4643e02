//! Kubernetes secret handling for Capstan.
//!
//! This crate extracts authentication material from secrets (basic auth,
//! bearer/token auth, SSH, TLS, GitHub App data, proxy configuration),
//! constructs well-formed secrets for each of those shapes, and applies
//! them to a cluster with server-side apply.
//!
//! Extraction distinguishes three outcomes per method: present, absent
//! (the method is simply not configured), and malformed (partial or
//! contradictory data, always a hard error).

pub mod apply;
pub mod error;
pub mod extract;
pub mod factory;
pub mod keys;
pub mod reader;

pub use apply::{ApplyOptions, apply};
pub use error::{SecretError, TlsValidationKind};
pub use extract::{
    AuthMethods, BasicAuth, BearerAuth, Extraction, GitHubAppAuth, LegacyKeyUse, SshAuth, TlsAuth,
    TlsOptions, TokenAuth, auth_methods_from_secret, basic_auth_from_secret,
    bearer_auth_from_secret, github_app_from_secret, proxy_url_from_secret, ssh_auth_from_secret,
    tls_config_from_secret, token_auth_from_secret,
};
pub use factory::{
    basic_auth_secret, bearer_token_secret, github_app_secret, proxy_secret, registry_secret,
    sops_secret, ssh_secret, tls_secret, token_secret,
};
pub use reader::pull_secrets_from_service_account;
