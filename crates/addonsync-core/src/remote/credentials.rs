//! Credential provider boundary
//!
//! How a token is obtained (OAuth consent, a token file, an environment
//! variable) is the provider's business. The core only asks for one and
//! bounds how long it is willing to wait.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;

use crate::error::{Error, Result};

/// Longest wait for an interactive authorization to complete
pub const AUTH_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Bearer token for the remote store
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessToken(***)")
    }
}

/// Supplies authorized access to the remote store.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Whether any credentials are configured at all
    fn is_configured(&self) -> bool;

    /// Obtain a token, possibly waiting on the user.
    async fn authorize(&self) -> Result<AccessToken>;
}

/// Run a provider's authorization, giving up after `timeout`.
pub async fn authorize(provider: &dyn CredentialProvider, timeout: Duration) -> Result<AccessToken> {
    if !provider.is_configured() {
        return Err(Error::NotConfigured);
    }

    match tokio::time::timeout(timeout, provider.authorize()).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("Authorization not completed within {:?}", timeout);
            Err(Error::AuthorizationTimeout)
        }
    }
}

/// Provider backed by a token taken from configuration or the environment
#[derive(Debug, Clone, Default)]
pub struct StaticTokenProvider {
    token: Option<AccessToken>,
}

impl StaticTokenProvider {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: token.filter(|t| !t.trim().is_empty()).map(AccessToken::new),
        }
    }
}

#[async_trait]
impl CredentialProvider for StaticTokenProvider {
    fn is_configured(&self) -> bool {
        self.token.is_some()
    }

    async fn authorize(&self) -> Result<AccessToken> {
        self.token.clone().ok_or(Error::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NeverAuthorizes;

    #[async_trait]
    impl CredentialProvider for NeverAuthorizes {
        fn is_configured(&self) -> bool {
            true
        }

        async fn authorize(&self) -> Result<AccessToken> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_static_provider() {
        let provider = StaticTokenProvider::new(Some("abc".to_string()));
        let token = authorize(&provider, AUTH_TIMEOUT).await.unwrap();
        assert_eq!(token.secret(), "abc");
        assert_eq!(format!("{:?}", token), "AccessToken(***)");
    }

    #[tokio::test]
    async fn test_unconfigured_provider() {
        let provider = StaticTokenProvider::new(Some("  ".to_string()));
        assert!(!provider.is_configured());
        assert!(matches!(
            authorize(&provider, AUTH_TIMEOUT).await,
            Err(Error::NotConfigured)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_authorization_times_out() {
        let result = authorize(&NeverAuthorizes, AUTH_TIMEOUT).await;
        assert!(matches!(result, Err(Error::AuthorizationTimeout)));
    }
}
