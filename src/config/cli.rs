use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the purgeman binary.
#[derive(Debug, Parser)]
#[command(
    name = "purgeman",
    version,
    about = "Purge Varnish caches when iRODS content changes"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "PURGEMAN_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Listen for change events and purge every cache target.
    Serve(Box<ServeArgs>),
    /// Purge one path on every cache target and report per-target outcomes.
    Purge(PurgeArgs),
    /// Resolve an identifier to its storage path.
    Resolve(ResolveArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub storage: StorageOverrides,

    #[command(flatten)]
    pub cache: CacheOverrides,

    /// Override the ingest listener host.
    #[arg(long = "ingest-host", value_name = "HOST")]
    pub ingest_host: Option<String>,

    /// Override the ingest listener port.
    #[arg(long = "ingest-port", value_name = "PORT")]
    pub ingest_port: Option<u16>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct LoggingOverrides {
    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct StorageOverrides {
    /// Override the iRODS HTTP API base URL.
    #[arg(long = "storage-api-url", value_name = "URL")]
    pub storage_api_url: Option<String>,

    /// Override the iRODS username.
    #[arg(long = "storage-username", value_name = "USER")]
    pub storage_username: Option<String>,

    /// Override the iRODS password.
    #[arg(long = "storage-password", value_name = "PASSWORD")]
    pub storage_password: Option<String>,

    /// Override the metadata attribute holding object UUIDs.
    #[arg(long = "storage-uuid-attribute", value_name = "NAME")]
    pub storage_uuid_attribute: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct CacheOverrides {
    /// Cache target URL prefix; repeat for several targets. Replaces configured targets.
    #[arg(long = "cache-url-prefix", value_name = "URL")]
    pub cache_url_prefixes: Vec<String>,

    /// Host override for the target at the same position; repeat as needed.
    #[arg(long = "cache-host-override", value_name = "HOST")]
    pub cache_host_overrides: Vec<String>,

    /// Transport timeout for each PURGE request.
    #[arg(long = "purge-timeout-seconds", value_name = "SECONDS")]
    pub purge_timeout_seconds: Option<u64>,
}

#[derive(Debug, Args, Clone)]
pub struct PurgeArgs {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub storage: StorageOverrides,

    #[command(flatten)]
    pub cache: CacheOverrides,

    /// Storage path to purge, appended verbatim to every URL prefix.
    #[arg(value_name = "PATH", allow_hyphen_values = true)]
    pub path: String,
}

#[derive(Debug, Args, Clone)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub logging: LoggingOverrides,

    #[command(flatten)]
    pub storage: StorageOverrides,

    /// Identifier to look up.
    #[arg(value_name = "IDENTIFIER")]
    pub identifier: String,
}
