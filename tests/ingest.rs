mod support;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use purgeman::application::{
    handler::EventHandler,
    resolver::{IdentifierResolver, MetadataIndex},
};
use purgeman::infra::http::{IngestState, build_router};
use tower::ServiceExt;

use support::{CacheNode, StaticIndex, dispatcher};

fn router(node: &CacheNode) -> axum::Router {
    let index: Arc<dyn MetadataIndex> =
        StaticIndex::new(vec![("3f1c2d1e-0000-4000-8000-000000000001", "/zone/x")]);
    let handler = EventHandler::new(
        IdentifierResolver::new(index, "ipc_UUID"),
        dispatcher(vec![node.target()]),
    );
    build_router(IngestState {
        handler: Arc::new(handler),
    })
}

fn event_request(body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/events")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

#[tokio::test]
async fn accepted_event_is_purged() {
    let node = CacheNode::start(StatusCode::OK).await;

    let response = router(&node)
        .oneshot(event_request(
            r#"{"event_type":"data-object.mod","path":"/zone/home/alice/a.txt"}"#,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let requests = node.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/zone/home/alice/a.txt");
}

#[tokio::test]
async fn identifier_only_event_is_resolved() {
    let node = CacheNode::start(StatusCode::OK).await;

    let response = router(&node)
        .oneshot(event_request(
            r#"{"kind":"data-object.add","uuid":"3f1c2d1e-0000-4000-8000-000000000001"}"#,
        ))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(node.requests()[0].path, "/zone/x");
}

#[tokio::test]
async fn failed_purge_is_still_accepted() {
    let node = CacheNode::start(StatusCode::SERVICE_UNAVAILABLE).await;

    let response = router(&node)
        .oneshot(event_request(r#"{"kind":"data-object.mod","path":"/zone/b"}"#))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(node.requests().len(), 1);
}

#[tokio::test]
async fn empty_event_is_accepted_and_dropped() {
    let node = CacheNode::start(StatusCode::OK).await;

    let response = router(&node)
        .oneshot(event_request("{}"))
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(node.requests().is_empty());
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let node = CacheNode::start(StatusCode::OK).await;

    let response = router(&node)
        .oneshot(event_request("not json"))
        .await
        .expect("response");

    assert!(response.status().is_client_error());
    assert!(node.requests().is_empty());
}

#[tokio::test]
async fn health_reports_no_content() {
    let node = CacheNode::start(StatusCode::OK).await;

    let response = router(&node)
        .oneshot(
            Request::builder()
                .uri("/health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}
