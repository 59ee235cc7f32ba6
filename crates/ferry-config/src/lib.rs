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

//! Environment-backed configuration for the ferry replicator.
//!
//! Layout: `model.rs` (typed configuration), `loader.rs` (environment parsing
//! and validation), `defaults.rs` (fallback values), `error.rs`.

pub mod defaults;
pub mod error;
pub mod loader;
pub mod model;

pub use error::{ConfigError, ConfigResult};
pub use model::{
    AccountConfig, CopyConfig, DispatchConfig, ListenerConfig, LogSettings, QueueConfig,
    ReplicationConfig, VaultConfig,
};
