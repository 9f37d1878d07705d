//! Application configuration.
//!
//! Configuration merges three layers: built-in defaults, an optional TOML
//! file, and environment variables. The nested tree is addressable as
//! `BASIN_DATABASE__URL`-style variables; the handful of flat names the
//! broker has always documented (`DATABASE_URL`, `PORT`, `NAME_PREFIX`,
//! `AWS_REGION`, `AWS_ACCOUNT_ID`, `RETRY_WEBHOOKS`) are mapped onto the
//! same tree.

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// HTTP listener configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (without port).
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Listener port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerConfig {
    /// Full socket address to bind.
    pub fn addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.bind, self.port).parse()
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

/// Relational store configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL. Required.
    #[serde(default)]
    pub url: String,
    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    10
}

/// AWS account settings shared by all aws-* providers.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AwsConfig {
    /// Region buckets and IAM users are created in. Required for aws-s3.
    #[serde(default)]
    pub region: String,
    /// Account id, used to scope generated ARNs.
    #[serde(default)]
    pub account_id: String,
}

/// Broker behaviour settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Prefix for generated bucket and IAM user names.
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,
    /// Retry webhook deliveries that return a non-2xx/3xx status instead of
    /// failing them immediately.
    #[serde(default)]
    pub retry_webhooks: bool,
}

fn default_name_prefix() -> String {
    "basin".to_string()
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            name_prefix: default_name_prefix(),
            retry_webhooks: false,
        }
    }
}

/// Background loop cadence.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Seconds between task-worker ticks.
    #[serde(default = "default_worker_interval_secs")]
    pub worker_interval_secs: u64,
    /// Seconds between preprovision reconciliation passes.
    #[serde(default = "default_preprovision_interval_secs")]
    pub preprovision_interval_secs: u64,
    /// Seconds to wait between consecutive preprovision bucket creations.
    /// Spacing throttles cloud API pressure.
    #[serde(default = "default_preprovision_wait_secs")]
    pub preprovision_wait_secs: u64,
}

fn default_worker_interval_secs() -> u64 {
    60
}

fn default_preprovision_interval_secs() -> u64 {
    300
}

fn default_preprovision_wait_secs() -> u64 {
    60
}

impl TasksConfig {
    pub fn worker_interval(&self) -> Duration {
        Duration::from_secs(self.worker_interval_secs)
    }

    pub fn preprovision_interval(&self) -> Duration {
        Duration::from_secs(self.preprovision_interval_secs)
    }

    pub fn preprovision_wait(&self) -> Duration {
        Duration::from_secs(self.preprovision_wait_secs)
    }
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            worker_interval_secs: default_worker_interval_secs(),
            preprovision_interval_secs: default_preprovision_interval_secs(),
            preprovision_wait_secs: default_preprovision_wait_secs(),
        }
    }
}

/// Top-level application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub aws: AwsConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub tasks: TasksConfig,
}

impl AppConfig {
    /// Load configuration from defaults, an optional TOML file, and the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let mut config: AppConfig = figment
            .merge(Env::prefixed("BASIN_").split("__"))
            .merge(
                Env::raw()
                    .only(&[
                        "DATABASE_URL",
                        "PORT",
                        "NAME_PREFIX",
                        "AWS_REGION",
                        "AWS_ACCOUNT_ID",
                    ])
                    .map(|key| {
                        let key = key.as_str().to_ascii_uppercase();
                        match key.as_str() {
                            "DATABASE_URL" => "database.url".into(),
                            "PORT" => "server.port".into(),
                            "NAME_PREFIX" => "broker.name_prefix".into(),
                            "AWS_REGION" => "aws.region".into(),
                            "AWS_ACCOUNT_ID" => "aws.account_id".into(),
                            _ => key.into(),
                        }
                    })
                    .split("."),
            )
            .extract()?;

        // RETRY_WEBHOOKS is presence-based: any non-empty value enables it.
        if std::env::var("RETRY_WEBHOOKS").map(|v| !v.is_empty()) == Ok(true) {
            config.broker.retry_webhooks = true;
        }

        Ok(config)
    }

    /// Fail fast on configuration the process cannot run without.
    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.is_empty() {
            return Err(
                "no database configured; set DATABASE_URL or [database] url".to_string(),
            );
        }
        Ok(())
    }

    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** No database URL is set; tests run against
    /// in-memory stores.
    pub fn for_testing() -> Self {
        Self {
            broker: BrokerConfig {
                name_prefix: "basin-test".to_string(),
                retry_webhooks: false,
            },
            ..Self::default()
        }
    }
}
