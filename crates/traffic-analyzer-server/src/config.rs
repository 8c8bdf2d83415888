//! Process configuration: environment variables first, command-line flags
//! override. Mirrors the validated-non-empty-fields contract from the
//! design: a missing required field is a startup-fatal error, never a
//! silently-defaulted one.

use std::env;

use clap::Parser;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration value: {0}")]
    Missing(&'static str),
    #[error("invalid value for {field}: {value}")]
    Invalid { field: &'static str, value: String },
}

/// Command-line overrides layered on top of environment configuration.
/// A long-running service is configured from its environment by default;
/// these flags exist for local/batch invocations, the same narrow role
/// `clap` plays in the project's prior one-shot command-line tool.
#[derive(Debug, Parser)]
#[command(name = "traffic-analyzer")]
#[command(
    version = concat!(
        env!("CARGO_PKG_VERSION"),
        " (commit ",
        env!("TRAFFIC_ANALYZER_BUILD_COMMIT"),
        ", built ",
        env!("TRAFFIC_ANALYZER_BUILD_DATE"),
        ")"
    )
)]
#[command(about = "Capture ingestion and operation reconciliation service")]
pub struct Cli {
    /// Run migrations then exit, without starting the HTTP listener.
    #[arg(long)]
    pub migrate_only: bool,

    /// Ingest a single capture id from WORK_DIR then exit.
    #[arg(long)]
    pub capture_id: Option<String>,

    #[arg(long)]
    pub work_dir: Option<String>,

    #[arg(long)]
    pub base_dir: Option<String>,

    #[arg(long)]
    pub db_host: Option<String>,
    #[arg(long)]
    pub db_port: Option<u16>,
    #[arg(long)]
    pub db_user: Option<String>,
    #[arg(long)]
    pub db_password: Option<String>,
    #[arg(long)]
    pub db_name: Option<String>,
    #[arg(long)]
    pub db_schema: Option<String>,
    #[arg(long)]
    pub db_ssl_mode: Option<String>,

    #[arg(long)]
    pub report_name: Option<String>,
    #[arg(long)]
    pub service_name: Option<String>,
    #[arg(long)]
    pub service_version: Option<String>,

    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub schema: String,
    pub ssl_mode: String,
}

impl DbConfig {
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.database, self.ssl_mode
        )
    }
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub active: bool,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub access_token: String,
    pub namespace: String,
    pub workspace: String,
    pub agent: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub base_path: String,
    pub work_dir: String,
    pub log_level: String,
    pub production_mode: bool,
    pub listen_address: String,
    pub origin_allowed: Option<String>,
    pub api_key: Option<String>,
    pub db: DbConfig,
    pub storage: StorageConfig,
    pub catalog: CatalogConfig,
    pub batch_capture_id: Option<String>,
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn require(name: &'static str, value: Option<String>) -> Result<String, ConfigError> {
    value.ok_or(ConfigError::Missing(name))
}

impl Config {
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        let base_path = require("BASE_PATH", env_var("BASE_PATH"))?;
        let work_dir = cli
            .work_dir
            .clone()
            .or_else(|| env_var("WORK_DIR"))
            .map(Ok)
            .unwrap_or_else(|| require("WORK_DIR", None))?;

        let log_level = cli
            .log_level
            .clone()
            .or_else(|| env_var("LOG_LEVEL"))
            .unwrap_or_else(|| "info".to_string());

        let production_mode = env_var("PRODUCTION_MODE")
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let listen_address = env_var("LISTEN_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let origin_allowed = env_var("ORIGIN_ALLOWED");
        let api_key = env_var("TRAFFIC_API_KEY");

        if production_mode && api_key.is_none() {
            return Err(ConfigError::Missing("TRAFFIC_API_KEY"));
        }

        let db_port: u16 = match cli.db_port.or_else(|| env_var("APIHUB_TRAFFIC_POSTGRESQL_PORT").and_then(|v| v.parse().ok())) {
            Some(p) if p > 0 => p,
            Some(p) => return Err(ConfigError::Invalid { field: "db_port", value: p.to_string() }),
            None => return Err(ConfigError::Missing("APIHUB_TRAFFIC_POSTGRESQL_PORT")),
        };

        let db = DbConfig {
            host: require("APIHUB_TRAFFIC_POSTGRESQL_HOST", cli.db_host.clone().or_else(|| env_var("APIHUB_TRAFFIC_POSTGRESQL_HOST")))?,
            port: db_port,
            user: require("APIHUB_TRAFFIC_POSTGRESQL_USER", cli.db_user.clone().or_else(|| env_var("APIHUB_TRAFFIC_POSTGRESQL_USER")))?,
            password: require("APIHUB_TRAFFIC_POSTGRESQL_PASSWORD", cli.db_password.clone().or_else(|| env_var("APIHUB_TRAFFIC_POSTGRESQL_PASSWORD")))?,
            database: require("APIHUB_TRAFFIC_POSTGRESQL_DB", cli.db_name.clone().or_else(|| env_var("APIHUB_TRAFFIC_POSTGRESQL_DB")))?,
            schema: cli.db_schema.clone().or_else(|| env_var("APIHUB_TRAFFIC_POSTGRESQL_SCHEMA")).unwrap_or_else(|| "public".to_string()),
            ssl_mode: cli.db_ssl_mode.clone().or_else(|| env_var("APIHUB_TRAFFIC_POSTGRESQL_SSL_MODE")).unwrap_or_else(|| "disable".to_string()),
        };

        let storage = StorageConfig {
            endpoint: require("STORAGE_SERVER_ENDPOINT", env_var("STORAGE_SERVER_ENDPOINT"))?,
            bucket: require("STORAGE_SERVER_BUCKET", env_var("STORAGE_SERVER_BUCKET"))?,
            access_key: env_var("STORAGE_SERVER_ACCESS_KEY"),
            secret_key: env_var("STORAGE_SERVER_SECRET_KEY"),
            active: env_var("MINIO_STORAGE_ACTIVE").map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(true),
        };

        let catalog = CatalogConfig {
            base_url: require("APIHUB_URL", env_var("APIHUB_URL"))?,
            access_token: require("APIHUB_ACCESS_TOKEN", env_var("APIHUB_ACCESS_TOKEN"))?,
            namespace: require("NAMESPACE", env_var("NAMESPACE"))?,
            workspace: require("WORKSPACE", env_var("WORKSPACE"))?,
            agent: env_var("API_HUB_AGENT").unwrap_or_else(|| "traffic-analyzer".to_string()),
        };

        Ok(Config {
            base_path,
            work_dir,
            log_level,
            production_mode,
            listen_address,
            origin_allowed,
            api_key,
            db,
            storage,
            catalog,
            batch_capture_id: cli.capture_id.clone().or_else(|| env_var("CAPTURE_ID")),
        })
    }
}
