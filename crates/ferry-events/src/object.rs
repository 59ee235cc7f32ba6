//! Decomposition of a notification URL into container and object path.

use crate::error::{EventError, EventResult};

/// Index of the container name once the URL is split on `/`
/// (`scheme:`, empty, host, container, path...).
const CONTAINER_INDEX: usize = 3;

/// Object addressed by a notification, split into the parts the replicator
/// needs to rebuild the destination location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectReference {
    account: String,
    container: String,
    segments: Vec<String>,
}

impl ObjectReference {
    /// Split an object URL of the form `https://{host}/{container}/{path...}`.
    ///
    /// Any query string is dropped before splitting. Every path segment must be
    /// non-empty, so the destination never receives a blank directory name.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::InvalidUrl`] when the container or object path is
    /// missing, or when the path contains an empty segment.
    pub fn parse(url: &str) -> EventResult<Self> {
        let base = url.split_once('?').map_or(url, |(base, _)| base);
        let invalid = |reason: &'static str| EventError::InvalidUrl {
            reason,
            value: base.to_string(),
        };

        let parts: Vec<&str> = base.split('/').collect();
        let account = parts
            .get(CONTAINER_INDEX - 1)
            .filter(|host| !host.is_empty())
            .ok_or_else(|| invalid("missing_account"))?;
        let container = parts
            .get(CONTAINER_INDEX)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| invalid("missing_container"))?;
        let segments = &parts[CONTAINER_INDEX + 1..];
        if segments.is_empty() {
            return Err(invalid("missing_object_path"));
        }
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(invalid("empty_path_segment"));
        }

        Ok(Self {
            account: (*account).to_string(),
            container: (*container).to_string(),
            segments: segments.iter().map(|segment| (*segment).to_string()).collect(),
        })
    }

    /// Host segment of the source account.
    #[must_use]
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Container (or share) name; the 4th segment of the URL.
    #[must_use]
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Ordered path segments below the container; never empty.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Path below the container joined with `/`.
    #[must_use]
    pub fn object_path(&self) -> String {
        self.segments.join("/")
    }

    /// Final path segment.
    #[must_use]
    pub fn file_name(&self) -> &str {
        self.segments.last().map_or("", String::as_str)
    }

    /// First path segment below the container.
    #[must_use]
    pub fn top_level_folder(&self) -> &str {
        self.segments.first().map_or("", String::as_str)
    }
}
