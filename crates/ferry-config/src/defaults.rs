//! Fallback values applied when optional settings are absent.
//!
//! # Design
//! - Centralize defaults so loader and documentation stay consistent.
//! - Keep time-based defaults explicit in seconds for auditability.

/// Queue that receives dispatched processing tasks.
pub const QUEUE_NAME: &str = "processing-tasks";
/// Top-level folder whose archives are routed to the processing queue.
pub const DISPATCH_FOLDER: &str = "surge";
/// Extension routed to the processing queue.
pub const DISPATCH_EXTENSION: &str = "zip";
/// Minimum remaining token validity before a refresh is forced (4 hours).
pub const REFRESH_MARGIN_SECS: u64 = 4 * 60 * 60;
/// Largest accepted refresh margin (7 days).
pub const MAX_REFRESH_MARGIN_SECS: u64 = 7 * 24 * 60 * 60;
/// Copy attempts per object before giving up.
pub const COPY_MAX_ATTEMPTS: u32 = 3;
/// Upper bound for any single vault, storage or queue call.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Listener address for the notification endpoint.
pub const BIND_ADDR: &str = "0.0.0.0";
/// Listener port when the host does not assign one.
pub const HTTP_PORT: u16 = 8080;
/// Log level when neither `RUST_LOG` nor `FERRY_LOG_LEVEL` is set.
pub const LOG_LEVEL: &str = "info";
