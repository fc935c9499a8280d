//! Concurrent PURGE fan-out to every configured cache node.
//!
//! Each target gets its own task. A failure on one target (bad URL, transport
//! error, non-2xx answer, cancelled task) is logged and recorded in that
//! target's [`PurgeOutcome`]; it never delays or cancels the others.

use std::{
    fmt,
    sync::{Arc, LazyLock},
    time::Instant,
};

use futures::future::join_all;
use metrics::{counter, histogram};
use reqwest::{Client, Method, StatusCode, header::HOST};
use thiserror::Error;
use tracing::{error, info, instrument};

use crate::domain::target::{CacheTarget, PurgeRequest, TargetError};

const METRIC_PURGE_REQUESTS_TOTAL: &str = "purgeman_purge_requests_total";
const METRIC_PURGE_MS: &str = "purgeman_purge_ms";

static PURGE: LazyLock<Method> =
    LazyLock::new(|| Method::from_bytes(b"PURGE").expect("PURGE is a valid method token"));

/// Storage account credentials, presented to cache nodes as HTTP Basic auth.
#[derive(Clone, Default)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for BasicCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum PurgeFailure {
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error("failed to build PURGE request: {0}")]
    Build(#[source] reqwest::Error),
    #[error("PURGE request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("unexpected response status {0}")]
    UnexpectedStatus(StatusCode),
    #[error("purge task did not complete: {0}")]
    Task(String),
}

impl PurgeFailure {
    pub fn is_timeout(&self) -> bool {
        matches!(self, PurgeFailure::Transport(err) if err.is_timeout())
    }
}

/// Result of one PURGE against one cache node.
#[derive(Debug)]
pub struct PurgeOutcome {
    pub target_url: String,
    /// `None` when the host could not be determined.
    pub host: Option<String>,
    pub result: Result<StatusCode, PurgeFailure>,
}

impl PurgeOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Outcomes of one dispatch, in target order.
#[derive(Debug)]
pub struct PurgeReport {
    pub path: String,
    pub outcomes: Vec<PurgeOutcome>,
}

impl PurgeReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed() == 0
    }
}

#[derive(Clone)]
pub struct PurgeDispatcher {
    client: Client,
    targets: Arc<[CacheTarget]>,
    credentials: Arc<BasicCredentials>,
}

impl PurgeDispatcher {
    pub fn new(client: Client, targets: Vec<CacheTarget>, credentials: BasicCredentials) -> Self {
        Self {
            client,
            targets: targets.into(),
            credentials: Arc::new(credentials),
        }
    }

    pub fn targets(&self) -> &[CacheTarget] {
        &self.targets
    }

    /// Send PURGE for `path` to every target concurrently and wait for all of
    /// them. An empty `path` purges each prefix root.
    #[instrument(skip(self), fields(targets = self.targets.len()))]
    pub async fn purge(&self, path: &str) -> PurgeReport {
        let started_at = Instant::now();
        info!(path, "Purging cache");

        let handles: Vec<_> = self
            .targets
            .iter()
            .cloned()
            .map(|target| {
                let client = self.client.clone();
                let credentials = self.credentials.clone();
                let path = path.to_string();
                tokio::spawn(async move { purge_target(&client, &credentials, &target, &path).await })
            })
            .collect();

        let outcomes = join_all(handles)
            .await
            .into_iter()
            .zip(self.targets.iter())
            .map(|(joined, target)| {
                joined.unwrap_or_else(|err| {
                    let target_url = target.request_url(path);
                    error!(target_url = %target_url, error = %err, "Purge task aborted");
                    counter!(METRIC_PURGE_REQUESTS_TOTAL, "outcome" => "failure").increment(1);
                    PurgeOutcome {
                        target_url,
                        host: None,
                        result: Err(PurgeFailure::Task(err.to_string())),
                    }
                })
            })
            .collect();

        histogram!(METRIC_PURGE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);

        PurgeReport {
            path: path.to_string(),
            outcomes,
        }
    }
}

async fn purge_target(
    client: &Client,
    credentials: &BasicCredentials,
    target: &CacheTarget,
    path: &str,
) -> PurgeOutcome {
    let request = match PurgeRequest::for_target(target, path) {
        Ok(request) => request,
        Err(err) => {
            let target_url = target.request_url(path);
            error!(target_url = %target_url, error = %err, "Failed to address PURGE request");
            counter!(METRIC_PURGE_REQUESTS_TOTAL, "outcome" => "failure").increment(1);
            return PurgeOutcome {
                target_url,
                host: None,
                result: Err(err.into()),
            };
        }
    };

    info!(
        target_url = %request.target_url,
        host = %request.host,
        "Sending PURGE request"
    );

    let result = send(client, credentials, &request).await;
    match &result {
        Ok(status) => {
            info!(
                target_url = %request.target_url,
                host = %request.host,
                status = status.as_u16(),
                "PURGE request accepted"
            );
            counter!(METRIC_PURGE_REQUESTS_TOTAL, "outcome" => "success").increment(1);
        }
        Err(err) => {
            error!(
                target_url = %request.target_url,
                host = %request.host,
                error = %err,
                "PURGE request failed"
            );
            counter!(METRIC_PURGE_REQUESTS_TOTAL, "outcome" => "failure").increment(1);
        }
    }

    PurgeOutcome {
        target_url: request.target_url,
        host: Some(request.host),
        result,
    }
}

async fn send(
    client: &Client,
    credentials: &BasicCredentials,
    request: &PurgeRequest,
) -> Result<StatusCode, PurgeFailure> {
    let mut builder = client
        .request(PURGE.clone(), request.target_url.as_str())
        .basic_auth(&credentials.username, Some(&credentials.password));
    if request.host_override {
        builder = builder.header(HOST, request.host.as_str());
    }

    let outbound = builder.build().map_err(PurgeFailure::Build)?;
    let response = client
        .execute(outbound)
        .await
        .map_err(PurgeFailure::Transport)?;

    let status = response.status();
    if !status.is_success() {
        return Err(PurgeFailure::UnexpectedStatus(status));
    }
    Ok(status)
}
