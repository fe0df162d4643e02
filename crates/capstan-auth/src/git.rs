//! Git hosting credentials.

use crate::error::AuthError;
use crate::get_token::get_access_token;
use crate::options::AuthOptions;
use crate::providers::{AzureProvider, GcpProvider, GitHubProvider, azure, gcp, github};
use crate::token::GitCredentials;

/// Get authentication credentials for accessing a Git repository hosted
/// by the given provider.
///
/// An unrecognized provider name returns `Ok(None)`: the repository needs
/// no managed credentials, which is not an error.
pub async fn get_git_credentials(
    provider_name: &str,
    opts: &AuthOptions,
) -> Result<Option<GitCredentials>, AuthError> {
    let credentials = match provider_name {
        azure::PROVIDER_NAME => {
            // Azure DevOps accepts the ARM-audience token as a bearer token.
            let provider = AzureProvider::new();
            let token = get_access_token(&provider, opts).await?;
            GitCredentials {
                bearer_token: Some(token.token),
                expires_at: token.expires_at,
                ..Default::default()
            }
        }
        gcp::PROVIDER_NAME => {
            let provider = GcpProvider::new();
            let token = get_access_token(&provider, opts).await?;
            let username = provider.service_account_email(opts).await?;
            GitCredentials {
                username: Some(username),
                password: Some(token.token),
                expires_at: token.expires_at,
                ..Default::default()
            }
        }
        github::PROVIDER_NAME => {
            let provider = GitHubProvider::from_options(opts)?;
            let token = get_access_token(&provider, opts).await?;
            GitCredentials {
                username: Some(github::ACCESS_TOKEN_USERNAME.to_string()),
                password: Some(token.token),
                expires_at: token.expires_at,
                ..Default::default()
            }
        }
        _ => return Ok(None),
    };

    Ok(Some(credentials))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_provider_yields_no_credentials_and_no_error() {
        let result = get_git_credentials("bitbucket", &AuthOptions::default()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_github_requires_app_secret() {
        let err = get_git_credentials("github", &AuthOptions::default()).await.unwrap_err();
        assert!(err.to_string().contains("GitHub App data is required"));
    }
}
