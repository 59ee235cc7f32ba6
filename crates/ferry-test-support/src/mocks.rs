//! In-memory stand-ins for the vault, file share and queue collaborators.
//!
//! The fakes answer with the same provider error codes as the real services
//! so retry and recovery paths run unchanged against them.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ferry_storage::{
    AccountScope, FileShareApi, QueueApi, SecretSource, StorageError, StorageResult, VaultSecret,
    codes,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn delay(latency: Option<Duration>) {
    if let Some(latency) = latency {
        tokio::time::sleep(latency).await;
    }
}

#[derive(Default)]
struct VaultState {
    secrets: HashMap<String, VaultSecret>,
    fetches: HashMap<String, usize>,
    failing: bool,
}

/// Scripted vault that counts every fetch.
#[derive(Default)]
pub struct FakeVault {
    state: Mutex<VaultState>,
    latency: Option<Duration>,
}

impl FakeVault {
    /// Empty vault.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every fetch by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Store or replace a secret.
    pub fn set_secret(&self, name: &str, value: &str, expires_on: Option<DateTime<Utc>>) {
        lock(&self.state).secrets.insert(
            name.to_string(),
            VaultSecret {
                value: value.to_string(),
                expires_on,
            },
        );
    }

    /// Make every subsequent fetch fail.
    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    /// Fetches issued for `name`.
    #[must_use]
    pub fn fetch_count(&self, name: &str) -> usize {
        lock(&self.state).fetches.get(name).copied().unwrap_or(0)
    }

    /// Fetches issued across all secrets.
    #[must_use]
    pub fn total_fetches(&self) -> usize {
        lock(&self.state).fetches.values().sum()
    }
}

#[async_trait]
impl SecretSource for FakeVault {
    async fn get_secret(&self, name: &str) -> StorageResult<VaultSecret> {
        *lock(&self.state)
            .fetches
            .entry(name.to_string())
            .or_default() += 1;
        delay(self.latency).await;
        let state = lock(&self.state);
        if state.failing {
            return Err(StorageError::service("get_secret", 503, None));
        }
        state
            .secrets
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::service("get_secret", 404, Some("SecretNotFound")))
    }
}

/// Copy request observed by [`FakeFileShare`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyRequest {
    /// Destination share.
    pub share: String,
    /// Destination file path within the share.
    pub file_path: String,
    /// Source URL including its token.
    pub source_url: String,
    /// Token the destination scope carried.
    pub destination_token: String,
}

#[derive(Default)]
struct ShareState {
    shares: HashSet<String>,
    directories: HashSet<(String, String)>,
    files: HashSet<(String, String)>,
    racing: HashSet<(String, String)>,
    copy_failures: VecDeque<(u16, String)>,
    share_failure: Option<(u16, String)>,
    share_lag: bool,
    copy_requests: Vec<CopyRequest>,
    share_creations: Vec<String>,
    directory_creations: Vec<String>,
    existence_checks: Vec<String>,
}

impl ShareState {
    fn parent_missing(&self, share: &str, path: &str) -> bool {
        path.rsplit_once('/').is_some_and(|(parent, _)| {
            !self
                .directories
                .contains(&(share.to_string(), parent.to_string()))
        })
    }
}

/// In-memory file share account.
#[derive(Default)]
pub struct FakeFileShare {
    state: Mutex<ShareState>,
    latency: Option<Duration>,
}

impl FakeFileShare {
    /// Account with no shares.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency`.
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Create a share up front.
    pub fn add_share(&self, share: &str) {
        lock(&self.state).shares.insert(share.to_string());
    }

    /// Create a directory up front; ancestors are not implied.
    pub fn add_directory(&self, share: &str, path: &str) {
        lock(&self.state)
            .directories
            .insert((share.to_string(), path.to_string()));
    }

    /// Create a file up front.
    pub fn add_file(&self, share: &str, path: &str) {
        lock(&self.state)
            .files
            .insert((share.to_string(), path.to_string()));
    }

    /// Let a concurrent creator win the race for `path`: the next create
    /// reports `ResourceAlreadyExists` and the directory then exists.
    pub fn race_directory(&self, share: &str, path: &str) {
        lock(&self.state)
            .racing
            .insert((share.to_string(), path.to_string()));
    }

    /// Fail the next copy request with `status` and provider `code`.
    pub fn fail_next_copy(&self, status: u16, code: &str) {
        lock(&self.state)
            .copy_failures
            .push_back((status, code.to_string()));
    }

    /// Fail every share creation with `status` and provider `code`.
    pub fn fail_share_creation(&self, status: u16, code: &str) {
        lock(&self.state).share_failure = Some((status, code.to_string()));
    }

    /// Accept share creation without the share becoming visible.
    pub fn set_share_propagation_lag(&self, lag: bool) {
        lock(&self.state).share_lag = lag;
    }

    /// Whether `share` exists.
    #[must_use]
    pub fn has_share(&self, share: &str) -> bool {
        lock(&self.state).shares.contains(share)
    }

    /// Whether `path` exists as a directory in `share`.
    #[must_use]
    pub fn has_directory(&self, share: &str, path: &str) -> bool {
        lock(&self.state)
            .directories
            .contains(&(share.to_string(), path.to_string()))
    }

    /// Whether `path` exists as a file in `share`.
    #[must_use]
    pub fn has_file(&self, share: &str, path: &str) -> bool {
        lock(&self.state)
            .files
            .contains(&(share.to_string(), path.to_string()))
    }

    /// Every directory in `share`, sorted.
    #[must_use]
    pub fn directories(&self, share: &str) -> BTreeSet<String> {
        lock(&self.state)
            .directories
            .iter()
            .filter(|(owner, _)| owner == share)
            .map(|(_, path)| path.clone())
            .collect()
    }

    /// Copy requests in arrival order.
    #[must_use]
    pub fn copy_requests(&self) -> Vec<CopyRequest> {
        lock(&self.state).copy_requests.clone()
    }

    /// Share creation requests in arrival order.
    #[must_use]
    pub fn share_creations(&self) -> Vec<String> {
        lock(&self.state).share_creations.clone()
    }

    /// Directory creation requests in arrival order.
    #[must_use]
    pub fn directory_creations(&self) -> Vec<String> {
        lock(&self.state).directory_creations.clone()
    }

    /// Directory existence checks in arrival order.
    #[must_use]
    pub fn existence_checks(&self) -> Vec<String> {
        lock(&self.state).existence_checks.clone()
    }
}

fn not_found(operation: &'static str, code: &str) -> StorageError {
    StorageError::service(operation, 404, Some(code))
}

fn conflict(operation: &'static str, code: &str) -> StorageError {
    StorageError::service(operation, 409, Some(code))
}

#[async_trait]
impl FileShareApi for FakeFileShare {
    async fn create_share(&self, _account: &AccountScope, share: &str) -> StorageResult<()> {
        const OPERATION: &str = "create_share";
        delay(self.latency).await;
        let mut state = lock(&self.state);
        state.share_creations.push(share.to_string());
        if let Some((status, code)) = &state.share_failure {
            return Err(StorageError::service(OPERATION, *status, Some(code.as_str())));
        }
        if state.shares.contains(share) {
            return Err(conflict(OPERATION, codes::SHARE_ALREADY_EXISTS));
        }
        if !state.share_lag {
            state.shares.insert(share.to_string());
        }
        Ok(())
    }

    async fn create_directory(
        &self,
        _account: &AccountScope,
        share: &str,
        path: &str,
    ) -> StorageResult<()> {
        const OPERATION: &str = "create_directory";
        delay(self.latency).await;
        let mut state = lock(&self.state);
        state.directory_creations.push(path.to_string());
        let key = (share.to_string(), path.to_string());
        if !state.shares.contains(share) {
            return Err(not_found(OPERATION, codes::SHARE_NOT_FOUND));
        }
        if state.racing.remove(&key) {
            state.directories.insert(key);
            return Err(conflict(OPERATION, codes::RESOURCE_ALREADY_EXISTS));
        }
        if state.directories.contains(&key) || state.files.contains(&key) {
            return Err(conflict(OPERATION, codes::RESOURCE_ALREADY_EXISTS));
        }
        if state.parent_missing(share, path) {
            return Err(not_found(OPERATION, codes::PARENT_NOT_FOUND));
        }
        state.directories.insert(key);
        Ok(())
    }

    async fn directory_exists(
        &self,
        _account: &AccountScope,
        share: &str,
        path: &str,
    ) -> StorageResult<bool> {
        delay(self.latency).await;
        let mut state = lock(&self.state);
        state.existence_checks.push(path.to_string());
        if !state.shares.contains(share) {
            return Err(not_found("directory_exists", codes::SHARE_NOT_FOUND));
        }
        Ok(state
            .directories
            .contains(&(share.to_string(), path.to_string())))
    }

    async fn start_copy_from_url(
        &self,
        account: &AccountScope,
        share: &str,
        file_path: &str,
        source_url: &str,
    ) -> StorageResult<()> {
        const OPERATION: &str = "start_copy";
        delay(self.latency).await;
        let mut state = lock(&self.state);
        state.copy_requests.push(CopyRequest {
            share: share.to_string(),
            file_path: file_path.to_string(),
            source_url: source_url.to_string(),
            destination_token: account.token().value().to_string(),
        });
        if let Some((status, code)) = state.copy_failures.pop_front() {
            return Err(StorageError::service(OPERATION, status, Some(code.as_str())));
        }
        if !state.shares.contains(share) {
            return Err(not_found(OPERATION, codes::SHARE_NOT_FOUND));
        }
        if state.parent_missing(share, file_path) {
            return Err(not_found(OPERATION, codes::PARENT_NOT_FOUND));
        }
        state
            .files
            .insert((share.to_string(), file_path.to_string()));
        Ok(())
    }
}

/// Message observed by [`RecordingQueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    /// Queue name.
    pub queue: String,
    /// Message text.
    pub text: String,
    /// Token the queue scope carried.
    pub token: String,
}

#[derive(Default)]
struct QueueState {
    messages: Vec<QueuedMessage>,
    attempts: usize,
    failing: bool,
}

/// Queue that records every message it accepts.
#[derive(Default)]
pub struct RecordingQueue {
    state: Mutex<QueueState>,
}

impl RecordingQueue {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every subsequent message.
    pub fn set_failing(&self, failing: bool) {
        lock(&self.state).failing = failing;
    }

    /// Accepted messages in arrival order.
    #[must_use]
    pub fn messages(&self) -> Vec<QueuedMessage> {
        lock(&self.state).messages.clone()
    }

    /// Send attempts, accepted or not.
    #[must_use]
    pub fn attempts(&self) -> usize {
        lock(&self.state).attempts
    }
}

#[async_trait]
impl QueueApi for RecordingQueue {
    async fn send_message(
        &self,
        account: &AccountScope,
        queue: &str,
        text: &str,
    ) -> StorageResult<()> {
        let mut state = lock(&self.state);
        state.attempts += 1;
        if state.failing {
            return Err(StorageError::service("send_message", 503, Some("ServerBusy")));
        }
        state.messages.push(QueuedMessage {
            queue: queue.to_string(),
            text: text.to_string(),
            token: account.token().value().to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::scope;

    #[tokio::test]
    async fn file_share_reports_provider_codes() -> StorageResult<()> {
        let files = FakeFileShare::new();
        let account = scope("https://internal.file.core.windows.net", "?sig=d");

        let missing_share = files.create_directory(&account, "c", "a").await;
        assert!(missing_share.is_err_and(|err| err.has_code(codes::SHARE_NOT_FOUND)));

        files.create_share(&account, "c").await?;
        let orphan = files.create_directory(&account, "c", "a/b").await;
        assert!(orphan.is_err_and(|err| err.has_code(codes::PARENT_NOT_FOUND)));

        files.create_directory(&account, "c", "a").await?;
        let repeat = files.create_directory(&account, "c", "a").await;
        assert!(repeat.is_err_and(|err| err.has_code(codes::RESOURCE_ALREADY_EXISTS)));
        assert!(files.directory_exists(&account, "c", "a").await?);
        Ok(())
    }

    #[tokio::test]
    async fn vault_counts_fetches() -> StorageResult<()> {
        let vault = FakeVault::new();
        vault.set_secret("s", "v", None);
        assert_eq!(vault.get_secret("s").await?.value, "v");
        assert!(vault.get_secret("missing").await.is_err());
        assert_eq!(vault.fetch_count("s"), 1);
        assert_eq!(vault.total_fetches(), 2);
        Ok(())
    }
}
