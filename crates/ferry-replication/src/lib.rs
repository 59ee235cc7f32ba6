#![forbid(unsafe_code)]
#![deny(
    dead_code,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]

//! Replication core: token freshness, cross-account copy with on-demand
//! share and directory creation, and processing-queue dispatch.
//!
//! Layout: `tokens.rs` (single-flight token cache), `directories.rs`
//! (directory chain creation), `copy.rs` (copy state machine), `dispatch.rs`
//! (queue routing policy), `handler.rs` (per-notification entry point),
//! `error.rs`.

pub mod copy;
pub mod directories;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod tokens;

pub use copy::{CopyOrchestrator, CopyReport, CopyState, CopyTask};
pub use directories::{DirectoryEnsurer, EnsureReport};
pub use dispatch::{DispatchFilter, DispatchOutcome, Dispatcher, first_dot_extension};
pub use error::{ReplicationError, ReplicationResult};
pub use handler::{CopyStatus, Endpoints, EventHandler, HandleOutcome};
pub use tokens::{AccessTokenCache, ManagedSecrets, TokenSet};
