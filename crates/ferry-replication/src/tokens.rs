//! Vault-backed access token cache with single-flight refresh.
//!
//! # Design
//! - The managed tokens are held as one immutable [`TokenSet`]; a refresh
//!   builds a complete replacement and swaps it in only when every fetch succeeded.
//! - Refreshes are serialised by an async gate. A generation counter lets
//!   callers that queued behind an in-flight refresh reuse its result instead
//!   of starting another one.
//! - A failed refresh, or one that returns already expired tokens, keeps the
//!   previous set while it is still unexpired.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use ferry_storage::{AccessToken, SecretSource, within};
use ferry_telemetry::Metrics;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};

use crate::error::{ReplicationError, ReplicationResult};

const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Vault secret names of the managed tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedSecrets {
    /// Destination file-share account token.
    pub destination: String,
    /// Source object-storage account token.
    pub source: String,
    /// Processing queue token.
    pub queue: String,
}

/// One consistent generation of managed tokens.
#[derive(Debug, Clone)]
pub struct TokenSet {
    /// Destination file-share account token.
    pub destination: AccessToken,
    /// Source object-storage account token.
    pub source: AccessToken,
    /// Processing queue token.
    pub queue: AccessToken,
    /// When the set was fetched.
    pub issued_at: DateTime<Utc>,
}

impl TokenSet {
    fn tokens(&self) -> [&AccessToken; 3] {
        [&self.destination, &self.source, &self.queue]
    }

    /// Whether every token stays valid for at least `margin` past `now`.
    #[must_use]
    pub fn is_fresh_at(&self, now: DateTime<Utc>, margin: TimeDelta) -> bool {
        self.tokens()
            .iter()
            .all(|token| token.is_fresh_at(now, margin))
    }

    fn earliest_expiry(&self) -> Option<DateTime<Utc>> {
        self.tokens()
            .iter()
            .filter_map(|token| token.expires_on())
            .min()
    }
}

/// Process-wide cache of the managed access tokens.
pub struct AccessTokenCache {
    vault: Arc<dyn SecretSource>,
    secrets: ManagedSecrets,
    margin: TimeDelta,
    call_timeout: Duration,
    metrics: Metrics,
    current: RwLock<Option<Arc<TokenSet>>>,
    refresh_gate: Mutex<()>,
    generation: AtomicU64,
}

impl AccessTokenCache {
    /// Build an empty cache; the first [`AccessTokenCache::fresh_tokens`]
    /// call loads the tokens.
    #[must_use]
    pub fn new(
        vault: Arc<dyn SecretSource>,
        secrets: ManagedSecrets,
        margin: Duration,
        metrics: Metrics,
    ) -> Self {
        Self {
            vault,
            secrets,
            margin: TimeDelta::from_std(margin).unwrap_or(TimeDelta::MAX),
            call_timeout: DEFAULT_CALL_TIMEOUT,
            metrics,
            current: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Bound each vault fetch by `timeout`.
    #[must_use]
    pub const fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Whether `token` keeps at least the configured margin of validity.
    #[must_use]
    pub fn freshness_check(&self, token: &AccessToken) -> bool {
        token.is_fresh_at(Utc::now(), self.margin)
    }

    /// Current token set without triggering a refresh.
    pub async fn snapshot(&self) -> Option<Arc<TokenSet>> {
        self.current.read().await.clone()
    }

    /// Return a token set with at least the configured margin of validity,
    /// refreshing from the vault first when needed.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::TokensUnavailable`] when the refresh fails
    /// and no unexpired set is cached.
    pub async fn fresh_tokens(&self) -> ReplicationResult<Arc<TokenSet>> {
        let observed = self.generation.load(Ordering::Acquire);
        if let Some(set) = self.snapshot().await
            && set.is_fresh_at(Utc::now(), self.margin)
        {
            return Ok(set);
        }

        let _gate = self.refresh_gate.lock().await;
        if self.generation.load(Ordering::Acquire) != observed {
            return self.usable_snapshot().await;
        }
        let outcome = self.refresh().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        outcome
    }

    /// Memoized token for a managed secret.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::UnknownSecret`] for names outside the
    /// managed set, or any error from [`AccessTokenCache::fresh_tokens`].
    pub async fn get(&self, secret_name: &str) -> ReplicationResult<AccessToken> {
        let pick: fn(&TokenSet) -> &AccessToken = if secret_name == self.secrets.destination {
            |set| &set.destination
        } else if secret_name == self.secrets.source {
            |set| &set.source
        } else if secret_name == self.secrets.queue {
            |set| &set.queue
        } else {
            return Err(ReplicationError::UnknownSecret {
                name: secret_name.to_string(),
            });
        };
        let set = self.fresh_tokens().await?;
        Ok(pick(&set).clone())
    }

    async fn usable_snapshot(&self) -> ReplicationResult<Arc<TokenSet>> {
        self.snapshot()
            .await
            .filter(|set| set.is_fresh_at(Utc::now(), TimeDelta::zero()))
            .ok_or(ReplicationError::TokensUnavailable)
    }

    async fn refresh(&self) -> ReplicationResult<Arc<TokenSet>> {
        let fetched = tokio::try_join!(
            self.fetch(&self.secrets.destination),
            self.fetch(&self.secrets.source),
            self.fetch(&self.secrets.queue),
        );
        let set = match fetched {
            Ok((destination, source, queue)) => TokenSet {
                destination,
                source,
                queue,
                issued_at: Utc::now(),
            },
            Err(err) => return self.fall_back(&err).await,
        };
        if !set.is_fresh_at(Utc::now(), TimeDelta::zero()) {
            let err = ReplicationError::ExpiredTokens {
                expired_at: set.earliest_expiry(),
            };
            return self.fall_back(&err).await;
        }

        let set = Arc::new(set);
        *self.current.write().await = Some(Arc::clone(&set));
        self.metrics.inc_token_refresh("succeeded");
        info!(expires_on = ?set.earliest_expiry(), "access tokens refreshed");
        Ok(set)
    }

    async fn fall_back(&self, err: &ReplicationError) -> ReplicationResult<Arc<TokenSet>> {
        self.metrics.inc_token_refresh("failed");
        let previous = self.usable_snapshot().await;
        if previous.is_ok() {
            warn!(error = %err, code = err.error_code(), "token refresh failed; keeping previous tokens");
        } else {
            error!(error = %err, code = err.error_code(), "token refresh failed with no usable tokens");
        }
        previous
    }

    async fn fetch(&self, name: &str) -> ReplicationResult<AccessToken> {
        within("get_secret", self.call_timeout, self.vault.get_secret(name))
            .await
            .map(ferry_storage::VaultSecret::into_token)
            .map_err(|source| ReplicationError::storage("token_refresh", source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_test_support::fixtures::expiring_in_hours;
    use ferry_test_support::mocks::FakeVault;

    const MARGIN: Duration = Duration::from_secs(4 * 60 * 60);

    fn secrets() -> ManagedSecrets {
        ManagedSecrets {
            destination: "internal-sas".into(),
            source: "external-sas".into(),
            queue: "queue-sas".into(),
        }
    }

    fn seed(vault: &FakeVault, hours: i64) {
        vault.set_secret("internal-sas", "?sig=dst", expiring_in_hours(hours));
        vault.set_secret("external-sas", "?sig=src", expiring_in_hours(hours));
        vault.set_secret("queue-sas", "?sig=q", expiring_in_hours(hours));
    }

    fn cache(vault: Arc<FakeVault>) -> anyhow::Result<(AccessTokenCache, Metrics)> {
        let metrics = Metrics::new()?;
        let cache = AccessTokenCache::new(vault, secrets(), MARGIN, metrics.clone());
        Ok((cache, metrics))
    }

    #[tokio::test]
    async fn fresh_tokens_are_not_refetched() -> anyhow::Result<()> {
        let vault = Arc::new(FakeVault::new());
        seed(&vault, 24);
        let (cache, metrics) = cache(Arc::clone(&vault))?;

        cache.fresh_tokens().await?;
        cache.fresh_tokens().await?;
        let token = cache.get("queue-sas").await?;

        assert_eq!(token.value(), "?sig=q");
        assert_eq!(vault.total_fetches(), 3);
        assert_eq!(metrics.snapshot().token_refreshes, 1);
        Ok(())
    }

    #[tokio::test]
    async fn stale_tokens_trigger_a_single_refresh() -> anyhow::Result<()> {
        let vault = Arc::new(FakeVault::new());
        seed(&vault, 1);
        let (cache, _) = cache(Arc::clone(&vault))?;
        cache.fresh_tokens().await?;
        assert_eq!(vault.total_fetches(), 3);

        seed(&vault, 24);
        let set = cache.fresh_tokens().await?;
        assert!(cache.freshness_check(&set.destination));
        assert_eq!(vault.total_fetches(), 6);

        cache.fresh_tokens().await?;
        assert_eq!(vault.total_fetches(), 6);
        Ok(())
    }

    #[tokio::test]
    async fn any_stale_token_refreshes_the_whole_set() -> anyhow::Result<()> {
        let vault = Arc::new(FakeVault::new());
        seed(&vault, 24);
        vault.set_secret("queue-sas", "?sig=q", expiring_in_hours(2));
        let (cache, _) = cache(Arc::clone(&vault))?;

        cache.fresh_tokens().await?;
        cache.fresh_tokens().await?;
        assert_eq!(vault.fetch_count("internal-sas"), 2);
        assert_eq!(vault.fetch_count("queue-sas"), 2);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() -> anyhow::Result<()> {
        let vault = Arc::new(FakeVault::new().with_latency(Duration::from_millis(50)));
        seed(&vault, 24);
        let (cache, metrics) = cache(Arc::clone(&vault))?;
        let cache = Arc::new(cache);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let cache = Arc::clone(&cache);
            tasks.spawn(async move { cache.fresh_tokens().await.map(|set| set.issued_at) });
        }
        let mut issued = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            issued.push(joined??);
        }

        assert_eq!(issued.len(), 16);
        assert!(issued.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(vault.fetch_count("internal-sas"), 1);
        assert_eq!(vault.fetch_count("external-sas"), 1);
        assert_eq!(vault.fetch_count("queue-sas"), 1);
        assert_eq!(metrics.snapshot().token_refreshes, 1);
        Ok(())
    }

    #[tokio::test]
    async fn failed_refresh_keeps_previous_tokens() -> anyhow::Result<()> {
        let vault = Arc::new(FakeVault::new());
        seed(&vault, 1);
        let (cache, metrics) = cache(Arc::clone(&vault))?;
        let first = cache.fresh_tokens().await?;

        vault.set_failing(true);
        let kept = cache.fresh_tokens().await?;

        assert_eq!(kept.issued_at, first.issued_at);
        assert_eq!(kept.source.value(), "?sig=src");
        assert_eq!(metrics.snapshot().token_refresh_failures, 1);
        Ok(())
    }

    #[tokio::test]
    async fn expired_tokens_from_the_vault_are_never_handed_out() -> anyhow::Result<()> {
        let vault = Arc::new(FakeVault::new());
        seed(&vault, -1);
        let (cache, metrics) = cache(Arc::clone(&vault))?;

        let result = cache.fresh_tokens().await;

        assert!(matches!(result, Err(ReplicationError::TokensUnavailable)));
        assert!(cache.snapshot().await.is_none());
        assert_eq!(metrics.snapshot().token_refresh_failures, 1);
        assert_eq!(metrics.snapshot().token_refreshes, 0);
        Ok(())
    }

    #[tokio::test]
    async fn expired_refresh_keeps_previous_unexpired_tokens() -> anyhow::Result<()> {
        let vault = Arc::new(FakeVault::new());
        seed(&vault, 1);
        let (cache, _) = cache(Arc::clone(&vault))?;
        let first = cache.fresh_tokens().await?;

        seed(&vault, -1);
        let kept = cache.fresh_tokens().await?;

        assert_eq!(kept.issued_at, first.issued_at);
        assert!(kept.is_fresh_at(Utc::now(), TimeDelta::zero()));
        Ok(())
    }

    #[tokio::test]
    async fn failed_refresh_does_not_reuse_expired_tokens() -> anyhow::Result<()> {
        let vault = Arc::new(FakeVault::new());
        let expiry = Some(Utc::now() + TimeDelta::milliseconds(300));
        vault.set_secret("internal-sas", "?sig=dst", expiry);
        vault.set_secret("external-sas", "?sig=src", expiry);
        vault.set_secret("queue-sas", "?sig=q", expiry);
        let (cache, metrics) = cache(Arc::clone(&vault))?;
        cache.fresh_tokens().await?;

        tokio::time::sleep(Duration::from_millis(400)).await;
        vault.set_failing(true);
        let result = cache.fresh_tokens().await;

        assert!(matches!(result, Err(ReplicationError::TokensUnavailable)));
        assert_eq!(metrics.snapshot().token_refresh_failures, 1);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_failed_refresh() -> anyhow::Result<()> {
        let vault = Arc::new(FakeVault::new().with_latency(Duration::from_millis(50)));
        vault.set_failing(true);
        let (cache, metrics) = cache(Arc::clone(&vault))?;
        let cache = Arc::new(cache);

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            tasks.spawn(async move { cache.fresh_tokens().await });
        }
        while let Some(joined) = tasks.join_next().await {
            assert!(matches!(joined?, Err(ReplicationError::TokensUnavailable)));
        }

        assert_eq!(vault.fetch_count("internal-sas"), 1);
        assert_eq!(vault.fetch_count("external-sas"), 1);
        assert_eq!(vault.fetch_count("queue-sas"), 1);
        assert_eq!(metrics.snapshot().token_refresh_failures, 1);
        Ok(())
    }

    #[tokio::test]
    async fn first_load_failure_reports_unavailable_tokens() -> anyhow::Result<()> {
        let vault = Arc::new(FakeVault::new());
        vault.set_secret("internal-sas", "?sig=dst", expiring_in_hours(24));
        let (cache, _) = cache(Arc::clone(&vault))?;

        let result = cache.fresh_tokens().await;
        assert!(matches!(result, Err(ReplicationError::TokensUnavailable)));
        assert!(cache.snapshot().await.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn unmanaged_secrets_are_rejected() -> anyhow::Result<()> {
        let vault = Arc::new(FakeVault::new());
        let (cache, _) = cache(Arc::clone(&vault))?;
        let result = cache.get("other-secret").await;
        assert!(matches!(result, Err(ReplicationError::UnknownSecret { .. })));
        assert_eq!(vault.total_fetches(), 0);
        Ok(())
    }
}
