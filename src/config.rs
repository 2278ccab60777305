//! Service configuration.
//!
//! Sources, later overriding earlier:
//! 1. `config.yaml` in the working directory (if present)
//! 2. The file passed as `--config`, or named by `ORDER_SERVICE_CONFIG`
//! 3. Environment variables prefixed `ORDER_SERVICE__`, nested with `__`
//!    (e.g. `ORDER_SERVICE__KAFKA__BROKERS`)

use crate::application::service::OrderSettings;
use crate::error::{OrderError, Result};
use crate::resilience::circuit_breaker::CircuitBreakerConfig;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

pub const CONFIG_ENV_VAR: &str = "ORDER_SERVICE_CONFIG";
pub const CONFIG_ENV_PREFIX: &str = "ORDER_SERVICE";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Sent as `x-service-name` and mixed into the API key.
    pub app_name: String,
    pub database: DatabaseConfig,
    pub kafka: KafkaConfig,
    pub circuit_breaker: CircuitBreakerSettings,
    pub installment: InstallmentConfig,
    pub internal_service: InternalServices,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "order-service".to_string(),
            database: DatabaseConfig::default(),
            kafka: KafkaConfig::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            installment: InstallmentConfig::default(),
            internal_service: InternalServices::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Postgres URL. Unset means the in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KafkaConfig {
    pub brokers: String,
    pub group_id: String,
    pub topics: Vec<String>,
    /// Attempts per message, including the first.
    pub max_retry: u32,
    pub retry_backoff_ms: u64,
    pub session_timeout_ms: u64,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            group_id: "order-service".to_string(),
            topics: vec![crate::interfaces::events::PAYMENT_TOPIC.to_string()],
            max_retry: 3,
            retry_backoff_ms: 500,
            session_timeout_ms: 6000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerSettings {
    pub max_requests: u32,
    pub interval_secs: u64,
    pub timeout_secs: u64,
    pub failure_threshold: u32,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            max_requests: 1,
            interval_secs: 60,
            timeout_secs: 60,
            failure_threshold: 5,
        }
    }
}

impl CircuitBreakerSettings {
    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            max_requests: self.max_requests.max(1),
            interval: Duration::from_secs(self.interval_secs),
            timeout: Duration::from_secs(self.timeout_secs),
            failure_threshold: self.failure_threshold.max(1),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstallmentConfig {
    pub payment_link_ttl_hours: i64,
    pub invoice_template_id: String,
}

impl Default for InstallmentConfig {
    fn default() -> Self {
        Self {
            payment_link_ttl_hours: 24,
            invoice_template_id: String::new(),
        }
    }
}

impl InstallmentConfig {
    pub fn order_settings(&self) -> OrderSettings {
        OrderSettings {
            payment_link_ttl: chrono::Duration::hours(self.payment_link_ttl_hours),
            invoice_template_id: self.invoice_template_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct InternalServices {
    pub payment: ServiceEndpoint,
    pub rbac: ServiceEndpoint,
    pub package: ServiceEndpoint,
    pub invoice: ServiceEndpoint,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceEndpoint {
    pub host: String,
    pub secret_key: String,
    pub timeout_secs: u64,
}

impl Default for ServiceEndpoint {
    fn default() -> Self {
        Self {
            host: "http://localhost".to_string(),
            secret_key: String::new(),
            timeout_secs: 10,
        }
    }
}

impl AppConfig {
    /// Load configuration from file and environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        use ::config::{Config, Environment, File, FileFormat};

        let mut builder =
            Config::builder().add_source(File::new("config", FileFormat::Yaml).required(false));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
        } else if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            builder =
                builder.add_source(File::new(&path, FileFormat::Yaml).required(true));
        }

        builder
            .add_source(
                Environment::with_prefix(CONFIG_ENV_PREFIX)
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("kafka.topics")
                    .try_parsing(true),
            )
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|err| OrderError::Config(err.to_string()))
    }
}
