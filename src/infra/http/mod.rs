//! Push endpoint through which the storage backend delivers change events.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{get, post},
};
use tracing::warn;

use crate::application::handler::EventHandler;
use crate::domain::event::{ChangeEvent, ChangeMessage};

#[derive(Clone)]
pub struct IngestState {
    pub handler: Arc<EventHandler>,
}

pub fn build_router(state: IngestState) -> Router {
    Router::new()
        .route("/events", post(receive_event))
        .route("/health", get(health))
        .with_state(state)
}

/// Always `202 Accepted` once the fan-out has finished; per-target failures
/// only show up in logs.
async fn receive_event(
    State(state): State<IngestState>,
    Json(message): Json<ChangeMessage>,
) -> StatusCode {
    let event = ChangeEvent::from(message);
    let event_id = event.id;

    if let Some(report) = state.handler.handle(event).await {
        if !report.is_complete_success() {
            warn!(
                event_id = %event_id,
                path = %report.path,
                failed = report.failed(),
                total = report.outcomes.len(),
                "Purge incomplete"
            );
        }
    }

    StatusCode::ACCEPTED
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
