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

//! Inbound storage notifications for the ferry replicator.
//!
//! Notifications arrive as Event Grid style JSON documents. This crate keeps the
//! typed view of those documents (`payloads.rs`) and the decomposition of the
//! object URL they carry (`object.rs`). The raw document is never rewritten;
//! callers that forward it downstream serialise the original value.

pub mod error;
pub mod object;
pub mod payloads;

pub use error::{EventError, EventResult};
pub use object::ObjectReference;
pub use payloads::{
    BLOB_CREATED_EVENT, EventData, EventKind, StorageEvent, SUBSCRIPTION_VALIDATION_EVENT,
};
