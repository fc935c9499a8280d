//! Filesystem change events as delivered by the storage backend.

use serde::Deserialize;
use time::OffsetDateTime;
use uuid::Uuid;

/// A single change notification.
///
/// Empty strings mean "absent". An event is usable when it carries either a
/// path or an identifier that can be resolved to one.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Local correlation id for logs; never sent anywhere.
    pub id: Uuid,
    pub kind: String,
    pub path: String,
    pub identifier: String,
    pub received_at: OffsetDateTime,
}

impl ChangeEvent {
    pub fn new(
        kind: impl Into<String>,
        path: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            path: path.into(),
            identifier: identifier.into(),
            received_at: OffsetDateTime::now_utc(),
        }
    }

    /// Both path and identifier are empty, so there is nothing to purge.
    pub fn is_unusable(&self) -> bool {
        self.path.is_empty() && self.identifier.is_empty()
    }

    /// The path has to be looked up through the metadata index.
    pub fn needs_resolution(&self) -> bool {
        self.path.is_empty() && !self.identifier.is_empty()
    }
}

/// Wire shape of a change notification pushed to the ingest endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChangeMessage {
    #[serde(alias = "event_type")]
    pub kind: String,
    pub path: String,
    #[serde(alias = "identifier")]
    pub uuid: String,
}

impl From<ChangeMessage> for ChangeEvent {
    fn from(message: ChangeMessage) -> Self {
        ChangeEvent::new(message.kind, message.path, message.uuid)
    }
}
