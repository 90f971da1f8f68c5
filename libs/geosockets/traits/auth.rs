use crate::error::{Result, SocketError};
use url::Url;

/// Trait for providing authentication/authorization logic
///
/// Called on every connection attempt (including reconnections) to attach
/// credentials to the endpoint URL before the socket is opened.
pub trait AuthProvider: Send + Sync {
    /// Add credentials to the connection URL
    ///
    /// # Returns
    /// * `Ok(())` - URL is ready to use
    /// * `Err(SocketError)` - Credentials are missing or unusable
    fn authorize(&self, url: &mut Url) -> Result<()>;
}

/// Credentials passed as a query-string parameter
///
/// A bearer token takes precedence over an API key when both are present:
/// only one parameter is ever placed on the URL.
#[derive(Clone, Default)]
pub struct QueryCredentials {
    api_key: Option<String>,
    token: Option<String>,
}

impl QueryCredentials {
    pub const TOKEN_PARAM: &'static str = "token";
    pub const API_KEY_PARAM: &'static str = "apiKey";

    pub fn new(api_key: Option<String>, token: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|k| !k.is_empty()),
            token: token.filter(|t| !t.is_empty()),
        }
    }

    pub fn api_key(key: impl Into<String>) -> Self {
        Self::new(Some(key.into()), None)
    }

    pub fn token(token: impl Into<String>) -> Self {
        Self::new(None, Some(token.into()))
    }

    /// The single (name, value) pair that will be sent
    pub fn query_pair(&self) -> Option<(&'static str, &str)> {
        if let Some(token) = &self.token {
            Some((Self::TOKEN_PARAM, token))
        } else {
            self.api_key
                .as_deref()
                .map(|key| (Self::API_KEY_PARAM, key))
        }
    }
}

impl std::fmt::Debug for QueryCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCredentials")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl AuthProvider for QueryCredentials {
    fn authorize(&self, url: &mut Url) -> Result<()> {
        let (name, value) = self.query_pair().ok_or_else(|| {
            SocketError::Configuration("either an API key or a token is required".into())
        })?;
        url.query_pairs_mut().append_pair(name, value);
        Ok(())
    }
}

/// A no-op auth provider that doesn't require authentication
pub struct NoAuth;

impl AuthProvider for NoAuth {
    fn authorize(&self, _url: &mut Url) -> Result<()> {
        Ok(())
    }
}
