//! Segment-by-segment creation of a destination directory chain.

use std::sync::Arc;
use std::time::Duration;

use ferry_storage::{AccountScope, FileShareApi, codes, within};
use tracing::debug;

use crate::error::{ReplicationError, ReplicationResult};

/// Directories touched by one [`DirectoryEnsurer::ensure`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnsureReport {
    /// Directories this call created.
    pub created: Vec<String>,
    /// Directories that were already present, possibly created concurrently.
    pub existing: Vec<String>,
}

/// Creates every parent directory of an object path, tolerating concurrent creators.
pub struct DirectoryEnsurer {
    files: Arc<dyn FileShareApi>,
    call_timeout: Duration,
}

impl DirectoryEnsurer {
    /// Build an ensurer that bounds each call by `call_timeout`.
    #[must_use]
    pub fn new(files: Arc<dyn FileShareApi>, call_timeout: Duration) -> Self {
        Self {
            files,
            call_timeout,
        }
    }

    /// Make sure every parent directory of `segments` exists in `share`.
    ///
    /// The last segment names the object and is never created. Each
    /// cumulative prefix is created without recursion; a prefix reported as
    /// already existing is confirmed with an existence check on that same
    /// prefix before the walk moves on.
    ///
    /// # Errors
    ///
    /// Returns [`ReplicationError::NotADirectory`] when a prefix exists but is
    /// not a directory, and [`ReplicationError::Storage`] for any other failure.
    pub async fn ensure(
        &self,
        account: &AccountScope,
        share: &str,
        segments: &[String],
    ) -> ReplicationResult<EnsureReport> {
        let mut report = EnsureReport::default();
        let Some((_, parents)) = segments.split_last() else {
            return Ok(report);
        };

        let mut path = String::new();
        for segment in parents {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(segment);

            let created = within(
                "create_directory",
                self.call_timeout,
                self.files.create_directory(account, share, &path),
            )
            .await;
            match created {
                Ok(()) => {
                    debug!(share, path = %path, "created directory");
                    report.created.push(path.clone());
                }
                Err(err) if err.has_code(codes::RESOURCE_ALREADY_EXISTS) => {
                    let present = within(
                        "directory_exists",
                        self.call_timeout,
                        self.files.directory_exists(account, share, &path),
                    )
                    .await
                    .map_err(|source| ReplicationError::storage("ensure_directories", source))?;
                    if !present {
                        return Err(ReplicationError::NotADirectory { path });
                    }
                    debug!(share, path = %path, "directory already present");
                    report.existing.push(path.clone());
                }
                Err(source) => {
                    return Err(ReplicationError::storage("ensure_directories", source));
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_test_support::fixtures::scope;
    use ferry_test_support::mocks::FakeFileShare;

    const SHARE: &str = "containerA";

    fn segments(path: &str) -> Vec<String> {
        path.split('/').map(str::to_string).collect()
    }

    fn setup() -> (Arc<FakeFileShare>, DirectoryEnsurer, AccountScope) {
        let files = Arc::new(FakeFileShare::new());
        files.add_share(SHARE);
        let ensurer = DirectoryEnsurer::new(files.clone(), Duration::from_secs(5));
        let account = scope("https://internal.file.core.windows.net", "?sig=dst");
        (files, ensurer, account)
    }

    #[tokio::test]
    async fn creates_every_parent_but_not_the_object() -> ReplicationResult<()> {
        let (files, ensurer, account) = setup();
        let report = ensurer
            .ensure(&account, SHARE, &segments("Surge/sub/deep/file.zip"))
            .await?;

        assert_eq!(report.created, ["Surge", "Surge/sub", "Surge/sub/deep"]);
        assert!(report.existing.is_empty());
        assert!(!files.has_directory(SHARE, "Surge/sub/deep/file.zip"));
        Ok(())
    }

    #[tokio::test]
    async fn repeated_calls_leave_the_same_directories() -> ReplicationResult<()> {
        let (files, ensurer, account) = setup();
        let path = segments("a/b/c.bin");

        ensurer.ensure(&account, SHARE, &path).await?;
        let after_first = files.directories(SHARE);
        let second = ensurer.ensure(&account, SHARE, &path).await?;

        assert_eq!(files.directories(SHARE), after_first);
        assert!(second.created.is_empty());
        assert_eq!(second.existing, ["a", "a/b"]);
        Ok(())
    }

    #[tokio::test]
    async fn concurrent_creator_does_not_stop_the_walk() -> ReplicationResult<()> {
        let (files, ensurer, account) = setup();
        files.add_directory(SHARE, "a");
        files.race_directory(SHARE, "a/b");

        let report = ensurer.ensure(&account, SHARE, &segments("a/b/c/d.zip")).await?;

        assert_eq!(report.existing, ["a", "a/b"]);
        assert_eq!(report.created, ["a/b/c"]);
        assert_eq!(files.existence_checks(), ["a", "a/b"]);
        assert!(files.has_directory(SHARE, "a/b/c"));
        Ok(())
    }

    #[tokio::test]
    async fn file_in_the_way_is_reported() {
        let (files, ensurer, account) = setup();
        files.add_directory(SHARE, "a");
        files.add_file(SHARE, "a/b");

        let result = ensurer.ensure(&account, SHARE, &segments("a/b/c.zip")).await;
        assert!(matches!(
            result,
            Err(ReplicationError::NotADirectory { ref path }) if path == "a/b"
        ));
    }

    #[tokio::test]
    async fn other_failures_propagate_with_their_code() {
        let files = Arc::new(FakeFileShare::new());
        let ensurer = DirectoryEnsurer::new(files, Duration::from_secs(5));
        let account = scope("https://internal.file.core.windows.net", "?sig=dst");

        let result = ensurer.ensure(&account, SHARE, &segments("a/b.zip")).await;
        assert!(result.is_err_and(|err| err.error_code() == Some(codes::SHARE_NOT_FOUND)));
    }

    #[tokio::test]
    async fn objects_at_the_share_root_need_no_directories() -> ReplicationResult<()> {
        let (files, ensurer, account) = setup();
        let report = ensurer.ensure(&account, SHARE, &segments("file.zip")).await?;
        assert_eq!(report, EnsureReport::default());
        assert!(files.directory_creations().is_empty());
        Ok(())
    }
}
