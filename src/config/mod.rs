//! Configuration layer: typed settings with layered precedence (file → env → CLI).

mod cli;

use std::{fmt, net::SocketAddr, str::FromStr, time::Duration};

use clap::Parser;
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::{level_filters::LevelFilter, warn};

use crate::application::resolver::DEFAULT_UUID_ATTRIBUTE;
use crate::domain::target::CacheTarget;

pub use cli::{
    CacheOverrides, CliArgs, Command, LoggingOverrides, PurgeArgs, ResolveArgs, ServeArgs,
    ServeOverrides, StorageOverrides,
};

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "purgeman";
const ENV_PREFIX: &str = "PURGEMAN";
const DEFAULT_INGEST_HOST: &str = "127.0.0.1";
const DEFAULT_INGEST_PORT: u16 = 8080;

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub logging: LoggingSettings,
    pub ingest: IngestSettings,
    pub storage: StorageSettings,
    pub cache: CacheSettings,
    pub purge: PurgeSettings,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct IngestSettings {
    pub addr: SocketAddr,
}

#[derive(Clone)]
pub struct StorageSettings {
    pub api_url: Option<String>,
    pub username: String,
    pub password: String,
    pub uuid_attribute: String,
}

impl fmt::Debug for StorageSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageSettings")
            .field("api_url", &self.api_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("uuid_attribute", &self.uuid_attribute)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CacheSettings {
    pub targets: Vec<CacheTarget>,
}

#[derive(Debug, Clone)]
pub struct PurgeSettings {
    /// Unset means no deadline beyond the transport's own.
    pub request_timeout: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("cache.url_prefixes")
            .with_list_parse_key("cache.host_overrides"),
    );

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;

    match cli.command.as_ref() {
        Some(Command::Serve(args)) => raw.apply_serve_overrides(&args.overrides),
        Some(Command::Purge(args)) => {
            raw.apply_logging_overrides(&args.logging);
            raw.apply_storage_overrides(&args.storage);
            raw.apply_cache_overrides(&args.cache);
        }
        Some(Command::Resolve(args)) => {
            raw.apply_logging_overrides(&args.logging);
            raw.apply_storage_overrides(&args.storage);
        }
        None => raw.apply_serve_overrides(&ServeOverrides::default()),
    }

    Settings::from_raw(raw)
}

/// Resolve configuration using the supplied CLI arguments, returning both for downstream use.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let args = CliArgs::parse();
    let settings = load(&args)?;
    Ok((args, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    logging: RawLoggingSettings,
    ingest: RawIngestSettings,
    storage: RawStorageSettings,
    cache: RawCacheSettings,
    purge: RawPurgeSettings,
}

impl RawSettings {
    fn apply_serve_overrides(&mut self, overrides: &ServeOverrides) {
        if let Some(host) = overrides.ingest_host.as_ref() {
            self.ingest.host = Some(host.clone());
        }
        if let Some(port) = overrides.ingest_port {
            self.ingest.port = Some(port);
        }

        self.apply_logging_overrides(&overrides.logging);
        self.apply_storage_overrides(&overrides.storage);
        self.apply_cache_overrides(&overrides.cache);
    }

    fn apply_logging_overrides(&mut self, overrides: &LoggingOverrides) {
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
    }

    fn apply_storage_overrides(&mut self, overrides: &StorageOverrides) {
        if let Some(url) = overrides.storage_api_url.as_ref() {
            self.storage.api_url = Some(url.clone());
        }
        if let Some(username) = overrides.storage_username.as_ref() {
            self.storage.username = Some(username.clone());
        }
        if let Some(password) = overrides.storage_password.as_ref() {
            self.storage.password = Some(password.clone());
        }
        if let Some(attribute) = overrides.storage_uuid_attribute.as_ref() {
            self.storage.uuid_attribute = Some(attribute.clone());
        }
    }

    fn apply_cache_overrides(&mut self, overrides: &CacheOverrides) {
        if !overrides.cache_url_prefixes.is_empty() {
            self.cache.targets.clear();
            self.cache.url_prefixes = overrides.cache_url_prefixes.clone();
            self.cache.host_overrides.clear();
        }
        if !overrides.cache_host_overrides.is_empty() {
            self.cache.host_overrides = overrides.cache_host_overrides.clone();
        }
        if let Some(seconds) = overrides.purge_timeout_seconds {
            self.purge.request_timeout_seconds = Some(seconds);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            logging,
            ingest,
            storage,
            cache,
            purge,
        } = raw;

        Ok(Self {
            logging: build_logging_settings(logging)?,
            ingest: build_ingest_settings(ingest)?,
            storage: build_storage_settings(storage)?,
            cache: build_cache_settings(cache)?,
            purge: build_purge_settings(purge)?,
        })
    }
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_ingest_settings(ingest: RawIngestSettings) -> Result<IngestSettings, LoadError> {
    let host = ingest
        .host
        .unwrap_or_else(|| DEFAULT_INGEST_HOST.to_string());

    let port = ingest.port.unwrap_or(DEFAULT_INGEST_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "ingest.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("ingest.addr", reason))?;

    Ok(IngestSettings { addr })
}

fn build_storage_settings(storage: RawStorageSettings) -> Result<StorageSettings, LoadError> {
    let api_url = storage.api_url.and_then(|value| {
        let trimmed = value.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    });

    let uuid_attribute = storage
        .uuid_attribute
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| DEFAULT_UUID_ATTRIBUTE.to_string());
    if uuid_attribute.is_empty() {
        return Err(LoadError::invalid(
            "storage.uuid_attribute",
            "attribute name must not be empty",
        ));
    }

    Ok(StorageSettings {
        api_url,
        username: storage.username.unwrap_or_default(),
        password: storage.password.unwrap_or_default(),
        uuid_attribute,
    })
}

/// Explicit `cache.targets` come first, followed by the positional
/// `cache.url_prefixes` / `cache.host_overrides` pair zipped by index.
/// Overrides past the last prefix are dropped.
fn build_cache_settings(cache: RawCacheSettings) -> Result<CacheSettings, LoadError> {
    let RawCacheSettings {
        targets: raw_targets,
        url_prefixes,
        host_overrides,
    } = cache;

    if host_overrides.len() > url_prefixes.len() {
        warn!(
            overrides = host_overrides.len(),
            url_prefixes = url_prefixes.len(),
            "Ignoring cache host overrides without a matching url prefix"
        );
    }

    let mut targets = Vec::with_capacity(raw_targets.len() + url_prefixes.len());

    for raw in raw_targets {
        let prefix = raw.url_prefix.unwrap_or_default();
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(LoadError::invalid(
                "cache.targets",
                "url_prefix must not be empty",
            ));
        }
        targets.push(
            CacheTarget::new(prefix)
                .with_host_override(raw.host_override.unwrap_or_default().trim()),
        );
    }

    for (index, prefix) in url_prefixes.iter().enumerate() {
        let prefix = prefix.trim();
        if prefix.is_empty() {
            return Err(LoadError::invalid(
                "cache.url_prefixes",
                format!("entry {index} must not be empty"),
            ));
        }
        let host = host_overrides.get(index).map(|h| h.trim()).unwrap_or("");
        targets.push(CacheTarget::new(prefix).with_host_override(host));
    }

    Ok(CacheSettings { targets })
}

fn build_purge_settings(purge: RawPurgeSettings) -> Result<PurgeSettings, LoadError> {
    let request_timeout = match purge.request_timeout_seconds {
        Some(0) => {
            return Err(LoadError::invalid(
                "purge.request_timeout_seconds",
                "must be greater than zero",
            ));
        }
        Some(seconds) => Some(Duration::from_secs(seconds)),
        None => None,
    };

    Ok(PurgeSettings { request_timeout })
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawIngestSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawStorageSettings {
    api_url: Option<String>,
    username: Option<String>,
    password: Option<String>,
    uuid_attribute: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheSettings {
    targets: Vec<RawCacheTarget>,
    url_prefixes: Vec<String>,
    host_overrides: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawCacheTarget {
    url_prefix: Option<String>,
    host_override: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawPurgeSettings {
    request_timeout_seconds: Option<u64>,
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    let candidate = format!("{host}:{port}");
    candidate
        .parse()
        .map_err(|err| format!("invalid address `{candidate}`: {err}"))
}
