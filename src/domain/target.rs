//! Cache targets and the per-target request addressing rules.

use thiserror::Error;
use url::Url;

/// One reverse-proxy cache node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheTarget {
    pub url_prefix: String,
    /// Sent verbatim as the `Host` header when present.
    pub host_override: Option<String>,
}

impl CacheTarget {
    pub fn new(url_prefix: impl Into<String>) -> Self {
        Self {
            url_prefix: url_prefix.into(),
            host_override: None,
        }
    }

    pub fn with_host_override(mut self, host: impl Into<String>) -> Self {
        let host = host.into();
        self.host_override = (!host.is_empty()).then_some(host);
        self
    }

    /// Prefix with every trailing `/` removed, joined to `path` as-is.
    pub fn request_url(&self, path: &str) -> String {
        format!("{}{path}", self.url_prefix.trim_end_matches('/'))
    }
}

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("failed to parse request url `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request url `{url}` has no host component")]
    MissingHost { url: String },
}

/// Host to present for `request_url`: the override when configured, else the
/// URL's own authority (`host` or `host:port`).
pub fn resolve_host(target: &CacheTarget, request_url: &str) -> Result<String, TargetError> {
    if let Some(host) = target.host_override.as_ref() {
        return Ok(host.clone());
    }

    let url = Url::parse(request_url).map_err(|source| TargetError::InvalidUrl {
        url: request_url.to_string(),
        source,
    })?;
    let host = url.host_str().ok_or_else(|| TargetError::MissingHost {
        url: request_url.to_string(),
    })?;

    Ok(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

/// A fully addressed PURGE, alive for one outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeRequest {
    pub target_url: String,
    pub host: String,
    /// Whether `host` must be written into the `Host` header.
    pub host_override: bool,
}

impl PurgeRequest {
    pub fn for_target(target: &CacheTarget, path: &str) -> Result<Self, TargetError> {
        let target_url = target.request_url(path);
        let host = resolve_host(target, &target_url)?;
        Ok(Self {
            target_url,
            host,
            host_override: target.host_override.is_some(),
        })
    }
}
