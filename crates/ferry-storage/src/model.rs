//! Access tokens and the account scopes they unlock.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use url::Url;

use crate::error::{StorageError, StorageResult, redact_url};

/// Time-limited credential suffix appended to account URLs.
///
/// Immutable once issued; a refresh produces a new value.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    expires_on: Option<DateTime<Utc>>,
}

impl AccessToken {
    /// Wrap a token value and its expiry.
    #[must_use]
    pub fn new(value: impl Into<String>, expires_on: Option<DateTime<Utc>>) -> Self {
        Self {
            value: value.into(),
            expires_on,
        }
    }

    /// Raw token text.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Expiry, when the vault recorded one.
    #[must_use]
    pub const fn expires_on(&self) -> Option<DateTime<Utc>> {
        self.expires_on
    }

    /// Whether the token stays valid for at least `margin` past `now`.
    ///
    /// Tokens without a recorded expiry never go stale. A margin reaching
    /// past the representable range is never satisfied.
    #[must_use]
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
        self.expires_on.is_none_or(|expires_on| {
            now.checked_add_signed(margin)
                .is_some_and(|deadline| expires_on >= deadline)
        })
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Secret as returned by the vault.
#[derive(Clone, PartialEq, Eq)]
pub struct VaultSecret {
    /// Secret value.
    pub value: String,
    /// Expiry recorded on the secret.
    pub expires_on: Option<DateTime<Utc>>,
}

impl VaultSecret {
    /// Reinterpret the secret as an access token.
    #[must_use]
    pub fn into_token(self) -> AccessToken {
        AccessToken::new(self.value, self.expires_on)
    }
}

impl fmt::Debug for VaultSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultSecret")
            .field("value", &"<redacted>")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

/// Connection scope for one storage account: its endpoint plus the token
/// that authorizes requests against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountScope {
    url: String,
    token: AccessToken,
}

impl AccountScope {
    /// Scope an account endpoint to a token.
    #[must_use]
    pub fn new(url: impl Into<String>, token: AccessToken) -> Self {
        let url = url.into();
        Self {
            url: url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Account endpoint without a trailing slash.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Token authorizing this scope.
    #[must_use]
    pub const fn token(&self) -> &AccessToken {
        &self.token
    }

    /// Build an authorized URL for `path` within the account, with extra
    /// query pairs appended after the token.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidUrl`] when the combined URL does not parse.
    pub fn resource_url(
        &self,
        operation: &'static str,
        path: &str,
        query: &[(&str, &str)],
    ) -> StorageResult<Url> {
        let base = format!("{}/{}", self.url, path.trim_start_matches('/'));
        let raw = append_sas(&base, self.token.value());
        let mut url = Url::parse(&raw).map_err(|_| StorageError::InvalidUrl {
            operation,
            value: redact_url(&base),
        })?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

/// Append an access token suffix to a URL, with or without its leading `?`.
#[must_use]
pub fn append_sas(url: &str, token: &str) -> String {
    let token = token.trim_start_matches(['?', '&']);
    if token.is_empty() {
        url.to_string()
    } else if url.contains('?') {
        format!("{url}&{token}")
    } else {
        format!("{url}?{token}")
    }
}
