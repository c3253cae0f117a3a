//! Session credential resolution.
//!
//! SoundCloud's web session keeps the OAuth token inside the raw cookie
//! string (`...; oauth_token=2-123-abc; ...`). Every authenticated call needs
//! both the token and the full cookie, so resolution failure is fatal.

use tracing::debug;

use crate::error::{AuthError, Result};

/// Cookie segment that carries the OAuth token.
pub const TOKEN_MARKER: &str = "oauth_token=";

/// Credentials attached to every authenticated request.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthCredentials {
    token: String,
    session_cookie: String,
}

impl AuthCredentials {
    /// Build credentials from an already-extracted token and raw cookie.
    pub fn new(token: impl Into<String>, session_cookie: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            session_cookie: session_cookie.into(),
        }
    }

    /// The OAuth token.
    #[must_use]
    pub fn token(&self) -> &str {
        &self.token
    }

    /// The raw session cookie.
    #[must_use]
    pub fn session_cookie(&self) -> &str {
        &self.session_cookie
    }

    /// Value for the `Authorization` header.
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("OAuth {}", self.token)
    }
}

impl std::fmt::Debug for AuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthCredentials")
            .field("token", &"<redacted>")
            .field("session_cookie", &"<redacted>")
            .finish()
    }
}

/// Resolves [`AuthCredentials`] from a raw session cookie.
#[derive(Debug, Clone, Default)]
pub struct AuthProvider {
    cookie: Option<String>,
}

impl AuthProvider {
    /// Create a provider for the given raw cookie, if any was configured.
    #[must_use]
    pub const fn new(cookie: Option<String>) -> Self {
        Self { cookie }
    }

    /// Extract the token from the cookie.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::MissingCookie`] when no cookie is configured and
    /// [`AuthError::MissingToken`] when the cookie has no non-empty token segment.
    pub fn resolve(&self) -> Result<AuthCredentials> {
        let cookie = self
            .cookie
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or(AuthError::MissingCookie)?;

        let token = extract_token(cookie).ok_or_else(|| AuthError::MissingToken {
            marker: TOKEN_MARKER.to_string(),
        })?;

        debug!("Resolved OAuth token from session cookie");
        Ok(AuthCredentials::new(token, cookie))
    }
}

fn extract_token(cookie: &str) -> Option<&str> {
    let (_, rest) = cookie.split_once(TOKEN_MARKER)?;
    let token = rest.split(';').next().unwrap_or_default().trim();
    (!token.is_empty()).then_some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_resolve_token_in_middle() {
        let provider = AuthProvider::new(Some(
            "sc_anonymous_id=abc; oauth_token=2-290-123-XyZ; connect_session=1".to_string(),
        ));
        let creds = provider.resolve().unwrap();
        assert_eq!(creds.token(), "2-290-123-XyZ");
        assert_eq!(creds.authorization_header(), "OAuth 2-290-123-XyZ");
        assert!(creds.session_cookie().starts_with("sc_anonymous_id=abc"));
    }

    #[test]
    fn test_resolve_token_at_end() {
        let provider = AuthProvider::new(Some("a=1; oauth_token=tok".to_string()));
        assert_eq!(provider.resolve().unwrap().token(), "tok");
    }

    #[test]
    fn test_missing_cookie() {
        let err = AuthProvider::new(None).resolve().unwrap_err();
        assert_eq!(err, Error::Auth(AuthError::MissingCookie));

        let err = AuthProvider::new(Some("   ".to_string())).resolve().unwrap_err();
        assert_eq!(err, Error::Auth(AuthError::MissingCookie));
    }

    #[test]
    fn test_missing_marker() {
        let err = AuthProvider::new(Some("a=1; b=2".to_string()))
            .resolve()
            .unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::MissingToken { .. })));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_empty_token_segment() {
        let err = AuthProvider::new(Some("oauth_token=; a=1".to_string()))
            .resolve()
            .unwrap_err();
        assert!(matches!(err, Error::Auth(AuthError::MissingToken { .. })));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let creds = AuthCredentials::new("secret-token", "oauth_token=secret-token");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("<redacted>"));
    }
}
