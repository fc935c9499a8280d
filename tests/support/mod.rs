#![allow(dead_code)]

use std::{
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    extract::State,
    http::{HeaderMap, Method, StatusCode, Uri, header},
};
use purgeman::application::{
    dispatcher::{BasicCredentials, PurgeDispatcher},
    resolver::{IndexError, MetadataEntry, MetadataIndex},
};
use purgeman::domain::target::CacheTarget;
use purgeman::infra::client::build_http_client;
use tokio::net::TcpListener;

/// `rods:secret`
pub const BASIC_AUTH: &str = "Basic cm9kczpzZWNyZXQ=";

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub host: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Clone)]
struct CacheNodeState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    status: StatusCode,
    delay: Duration,
}

/// Fake cache node that answers every request with a fixed status and keeps
/// a log of what it received.
pub struct CacheNode {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl CacheNode {
    pub async fn start(status: StatusCode) -> Self {
        Self::start_with_delay(status, Duration::ZERO).await
    }

    pub async fn start_with_delay(status: StatusCode, delay: Duration) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = CacheNodeState {
            requests: requests.clone(),
            status,
            delay,
        };
        let app = Router::new().fallback(record).with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind cache node");
        let addr = listener.local_addr().expect("cache node addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("cache node serve");
        });

        Self { addr, requests }
    }

    pub fn url_prefix(&self) -> String {
        format!("http://{}/", self.addr)
    }

    pub fn target(&self) -> CacheTarget {
        CacheTarget::new(self.url_prefix())
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

async fn record(
    State(state): State<CacheNodeState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> StatusCode {
    let header_value = |name: header::HeaderName| {
        headers
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
    };

    state
        .requests
        .lock()
        .expect("requests lock")
        .push(RecordedRequest {
            method: method.to_string(),
            path: uri.path().to_string(),
            host: header_value(header::HOST),
            authorization: header_value(header::AUTHORIZATION),
        });

    if !state.delay.is_zero() {
        tokio::time::sleep(state.delay).await;
    }
    state.status
}

/// A URL prefix nothing is listening on.
pub async fn unreachable_prefix() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind probe");
    let addr = listener.local_addr().expect("probe addr");
    drop(listener);
    format!("http://{addr}/")
}

pub fn dispatcher(targets: Vec<CacheTarget>) -> PurgeDispatcher {
    dispatcher_with_timeout(targets, None)
}

pub fn dispatcher_with_timeout(
    targets: Vec<CacheTarget>,
    timeout: Option<Duration>,
) -> PurgeDispatcher {
    let client = build_http_client(timeout).expect("http client");
    PurgeDispatcher::new(client, targets, BasicCredentials::new("rods", "secret"))
}

/// In-memory metadata index keyed by identifier.
#[derive(Default)]
pub struct StaticIndex {
    entries: Vec<(&'static str, &'static str)>,
    queries: Mutex<Vec<String>>,
}

impl StaticIndex {
    pub fn new(entries: Vec<(&'static str, &'static str)>) -> Arc<Self> {
        Arc::new(Self {
            entries,
            queries: Mutex::new(Vec::new()),
        })
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().expect("queries lock").clone()
    }
}

#[async_trait]
impl MetadataIndex for StaticIndex {
    async fn search_by_attribute(
        &self,
        _attribute: &str,
        value: &str,
    ) -> Result<Vec<MetadataEntry>, IndexError> {
        self.queries
            .lock()
            .expect("queries lock")
            .push(value.to_string());
        Ok(self
            .entries
            .iter()
            .filter(|(identifier, _)| *identifier == value)
            .map(|(_, path)| MetadataEntry {
                path: path.to_string(),
            })
            .collect())
    }
}
