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

//! Binary entrypoint for the ferry replicator.

use ferry_app::{AppResult, run_app};

/// Loads configuration from the environment and serves notifications until shutdown.
#[tokio::main]
async fn main() -> AppResult<()> {
    run_app().await
}
