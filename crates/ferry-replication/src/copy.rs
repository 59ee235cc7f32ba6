//! Cross-account copy driven by an explicit, bounded state machine.
//!
//! # Design
//! - `Start` issues the server-side copy. A missing share moves to
//!   `CreateContainer`, a missing parent moves to `EnsureDirectories`, and
//!   both return to `Start` afterwards.
//! - The share is created at most once per task; a second `ShareNotFound`
//!   is terminal.
//! - Copy requests are capped at `max_attempts`; every call is bounded by the
//!   call timeout and an elapsed call is terminal.

use std::sync::Arc;
use std::time::Duration;

use ferry_events::ObjectReference;
use ferry_storage::{AccessToken, AccountScope, FileShareApi, append_sas, codes, within};
use tracing::{debug, info};

use crate::directories::{DirectoryEnsurer, EnsureReport};
use crate::error::{ReplicationError, ReplicationResult};

/// One object's copy from the source account to the destination share.
#[derive(Debug, Clone)]
pub struct CopyTask {
    /// Source object URL without a token.
    pub source_url: String,
    /// Token authorizing reads of the source object.
    pub source_token: AccessToken,
    /// Decomposed object path; the container names the destination share.
    pub object: ObjectReference,
    /// Destination account scope.
    pub destination: AccountScope,
}

impl CopyTask {
    /// Source URL with its token appended.
    #[must_use]
    pub fn authorized_source(&self) -> String {
        append_sas(&self.source_url, self.source_token.value())
    }
}

/// Non-terminal states of the copy loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyState {
    /// Issue the copy request.
    Start,
    /// Create the destination share, then retry.
    CreateContainer,
    /// Create the destination parent directories, then retry.
    EnsureDirectories,
}

impl CopyState {
    /// Stable label for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::CreateContainer => "create_container",
            Self::EnsureDirectories => "ensure_directories",
        }
    }
}

/// Summary of an accepted copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CopyReport {
    /// Copy requests issued, including the accepted one.
    pub attempts: u32,
    /// Whether share creation ran for this task.
    pub share_ensured: bool,
    /// Directories handled while recovering from missing parents.
    pub directories: EnsureReport,
}

/// Drives [`CopyTask`]s to acceptance or terminal failure.
pub struct CopyOrchestrator {
    files: Arc<dyn FileShareApi>,
    directories: DirectoryEnsurer,
    max_attempts: u32,
    call_timeout: Duration,
}

impl CopyOrchestrator {
    /// Build an orchestrator; `max_attempts` is raised to at least one.
    #[must_use]
    pub fn new(files: Arc<dyn FileShareApi>, max_attempts: u32, call_timeout: Duration) -> Self {
        Self {
            directories: DirectoryEnsurer::new(Arc::clone(&files), call_timeout),
            files,
            max_attempts: max_attempts.max(1),
            call_timeout,
        }
    }

    /// Copy one object, recovering from a missing share or missing parents.
    ///
    /// Repeating a copy after a recovered failure is safe; the service treats
    /// it as an overwrite.
    ///
    /// # Errors
    ///
    /// - [`ReplicationError::ShareStillMissing`] if the share is reported
    ///   missing again after it was created.
    /// - [`ReplicationError::AttemptsExhausted`] when recoverable failures
    ///   persist past the attempt ceiling.
    /// - [`ReplicationError::NotADirectory`] or [`ReplicationError::Storage`]
    ///   for failures that cannot be recovered.
    pub async fn copy(&self, task: &CopyTask) -> ReplicationResult<CopyReport> {
        let share = task.object.container();
        let file_path = task.object.object_path();
        let source = task.authorized_source();
        let mut report = CopyReport::default();
        let mut state = CopyState::Start;

        loop {
            state = match state {
                CopyState::Start => {
                    report.attempts += 1;
                    let outcome = within(
                        "start_copy",
                        self.call_timeout,
                        self.files
                            .start_copy_from_url(&task.destination, share, &file_path, &source),
                    )
                    .await;
                    let err = match outcome {
                        Ok(()) => {
                            info!(share, path = %file_path, attempts = report.attempts, "copy accepted");
                            return Ok(report);
                        }
                        Err(err) => err,
                    };
                    let next = if err.has_code(codes::SHARE_NOT_FOUND) {
                        if report.share_ensured {
                            return Err(ReplicationError::ShareStillMissing {
                                share: share.to_string(),
                            });
                        }
                        CopyState::CreateContainer
                    } else if err.has_code(codes::PARENT_NOT_FOUND) {
                        CopyState::EnsureDirectories
                    } else {
                        return Err(ReplicationError::storage("copy", err));
                    };
                    if report.attempts >= self.max_attempts {
                        return Err(ReplicationError::AttemptsExhausted {
                            attempts: report.attempts,
                            last_code: err.error_code().map(str::to_string),
                        });
                    }
                    debug!(
                        share,
                        path = %file_path,
                        code = err.error_code(),
                        next = next.as_str(),
                        "copy needs recovery"
                    );
                    next
                }
                CopyState::CreateContainer => {
                    report.share_ensured = true;
                    let created = within(
                        "create_share",
                        self.call_timeout,
                        self.files.create_share(&task.destination, share),
                    )
                    .await;
                    match created {
                        Ok(()) => info!(share, "created destination share"),
                        Err(err) if err.has_code(codes::SHARE_ALREADY_EXISTS) => {
                            debug!(share, "destination share already present");
                        }
                        Err(err) => return Err(ReplicationError::storage("create_share", err)),
                    }
                    CopyState::Start
                }
                CopyState::EnsureDirectories => {
                    let ensured = self
                        .directories
                        .ensure(&task.destination, share, task.object.segments())
                        .await?;
                    report.directories.created.extend(ensured.created);
                    report.directories.existing.extend(ensured.existing);
                    CopyState::Start
                }
            };
        }
    }
}
