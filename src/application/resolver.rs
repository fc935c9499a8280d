//! Identifier-to-path resolution against the storage metadata index.

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use thiserror::Error;
use tracing::{info, warn};

const METRIC_RESOLUTION_TOTAL: &str = "purgeman_identifier_resolution_total";

/// Attribute the storage backend stamps with each object's UUID.
pub const DEFAULT_UUID_ATTRIBUTE: &str = "ipc_UUID";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataEntry {
    pub path: String,
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("storage session is closed")]
    SessionClosed,
    #[error("value `{0}` cannot be expressed in a metadata query")]
    UnsupportedValue(String),
    #[error("metadata request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("metadata endpoint url is invalid: {0}")]
    Endpoint(String),
    #[error("storage backend returned status {code}: {message}")]
    Backend { code: i64, message: String },
}

/// Metadata search capability exposed by the storage backend.
#[async_trait]
pub trait MetadataIndex: Send + Sync {
    async fn search_by_attribute(
        &self,
        attribute: &str,
        value: &str,
    ) -> Result<Vec<MetadataEntry>, IndexError>;
}

#[derive(Debug)]
pub enum Resolution {
    Resolved(String),
    NotFound,
    Ambiguous { matches: usize },
    Failed(IndexError),
}

impl Resolution {
    fn from_entries(mut entries: Vec<MetadataEntry>) -> Self {
        match entries.len() {
            0 => Resolution::NotFound,
            1 => Resolution::Resolved(entries.remove(0).path),
            matches => Resolution::Ambiguous { matches },
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Resolution::Resolved(_) => "resolved",
            Resolution::NotFound => "not_found",
            Resolution::Ambiguous { .. } => "ambiguous",
            Resolution::Failed(_) => "failed",
        }
    }

    /// Collapse to the path used for dispatch; empty when resolution failed.
    pub fn into_path(self) -> String {
        match self {
            Resolution::Resolved(path) => path,
            _ => String::new(),
        }
    }
}

/// Maps opaque identifiers to canonical paths. Never caches: objects can be
/// renamed between events.
#[derive(Clone)]
pub struct IdentifierResolver {
    index: Arc<dyn MetadataIndex>,
    attribute: String,
}

impl IdentifierResolver {
    pub fn new(index: Arc<dyn MetadataIndex>, attribute: impl Into<String>) -> Self {
        Self {
            index,
            attribute: attribute.into(),
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub async fn resolve(&self, identifier: &str) -> Resolution {
        let resolution = match self
            .index
            .search_by_attribute(&self.attribute, identifier)
            .await
        {
            Ok(entries) => Resolution::from_entries(entries),
            Err(err) => Resolution::Failed(err),
        };

        match &resolution {
            Resolution::Resolved(path) => {
                info!(identifier, path = %path, "Resolved identifier");
            }
            Resolution::NotFound => {
                warn!(identifier, attribute = %self.attribute, "No entry carries identifier");
            }
            Resolution::Ambiguous { matches } => {
                warn!(
                    identifier,
                    matches = *matches,
                    "Identifier matches several entries; not resolving"
                );
            }
            Resolution::Failed(err) => {
                warn!(identifier, error = %err, "Metadata query failed");
            }
        }

        counter!(METRIC_RESOLUTION_TOTAL, "result" => resolution.label()).increment(1);
        resolution
    }
}
