//! Per-event entry point shared by every event source.

use metrics::counter;
use tracing::{debug, info};

use crate::domain::event::ChangeEvent;

use super::dispatcher::{PurgeDispatcher, PurgeReport};
use super::resolver::IdentifierResolver;

const METRIC_EVENTS_RECEIVED_TOTAL: &str = "purgeman_events_received_total";

/// Resolves an event to a path (when needed) and purges it everywhere.
///
/// Holds only read-only state, so concurrent calls to [`EventHandler::handle`]
/// are independent of each other.
#[derive(Clone)]
pub struct EventHandler {
    resolver: IdentifierResolver,
    dispatcher: PurgeDispatcher,
}

impl EventHandler {
    pub fn new(resolver: IdentifierResolver, dispatcher: PurgeDispatcher) -> Self {
        Self {
            resolver,
            dispatcher,
        }
    }

    pub fn dispatcher(&self) -> &PurgeDispatcher {
        &self.dispatcher
    }

    /// Returns `None` when the event carried neither a path nor an identifier.
    pub async fn handle(&self, event: ChangeEvent) -> Option<PurgeReport> {
        if event.is_unusable() {
            debug!(
                event_id = %event.id,
                event_kind = %event.kind,
                "Dropping event without path or identifier"
            );
            counter!(METRIC_EVENTS_RECEIVED_TOTAL, "outcome" => "dropped").increment(1);
            return None;
        }

        let path = if event.needs_resolution() {
            self.resolver.resolve(&event.identifier).await.into_path()
        } else {
            event.path.clone()
        };

        info!(
            event_id = %event.id,
            event_kind = %event.kind,
            path = %path,
            "Received change event"
        );
        counter!(METRIC_EVENTS_RECEIVED_TOTAL, "outcome" => "dispatched").increment(1);

        Some(self.dispatcher.purge(&path).await)
    }

    /// Raw-field form of [`EventHandler::handle`], as delivered by a subscription.
    pub async fn handle_raw(
        &self,
        kind: &str,
        path: &str,
        identifier: &str,
    ) -> Option<PurgeReport> {
        self.handle(ChangeEvent::new(kind, path, identifier)).await
    }
}
