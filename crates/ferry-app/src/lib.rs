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

//! Ferry application wiring.
//!
//! Layout: `bootstrap.rs` (dependency construction and server start),
//! `routes.rs` (notification, health and metrics endpoints), `error.rs`.

/// Application bootstrap and environment loading.
pub mod bootstrap;
/// Application-level errors.
pub mod error;
/// HTTP surface receiving storage notifications.
pub mod routes;

pub use bootstrap::run_app;
pub use error::{AppError, AppResult};
