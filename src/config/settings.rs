use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::GatewayError;

/// Root configuration, loaded from `GATEWAY_*` environment variables and
/// optional `config/` files.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Gateway instance identifier
    #[serde(default = "default_id")]
    pub id: String,
    /// Gateway instance index
    #[serde(default)]
    pub index: i64,
    /// Emit structured lines on registration, removal and auth rejection
    #[serde(default)]
    pub trace: bool,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default, rename = "pub")]
    pub publisher: PublisherConfig,
    #[serde(default)]
    pub hub: HubSettings,
    #[serde(default)]
    pub otel: OtelConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Path of the upgrade endpoint
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Shared secret for `simple` authentication
    #[serde(default)]
    pub token: String,
    /// One of `none`, `simple`, `signed` (`jwt` is accepted as an alias)
    #[serde(default = "default_auth_method", rename = "authmethod")]
    pub auth_method: String,
    /// Public key retrieval endpoint for `signed` authentication
    #[serde(default, rename = "devicekeysuri")]
    pub device_keys_uri: String,
    /// Maximum credential age in seconds for `signed` authentication
    #[serde(default = "default_tolerable_age", rename = "tolerablejwtage")]
    pub tolerable_jwt_age: i64,
    /// How long fetched public keys stay cached, in seconds
    #[serde(default = "default_key_cache_ttl", rename = "keycachettl")]
    pub key_cache_ttl: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PublisherConfig {
    /// `memory` or `redis`
    #[serde(default = "default_publisher_backend")]
    pub backend: String,
    /// Broker addresses
    #[serde(default = "default_publisher_uri")]
    pub uri: Vec<String>,
    #[serde(default = "default_topic")]
    pub topic: String,
    /// Wait for the broker to acknowledge every record
    #[serde(default)]
    pub ack: bool,
    #[serde(default = "default_true")]
    pub compress: bool,
    /// Flush interval in seconds for buffered records
    #[serde(default = "default_flush_freq", rename = "flushfreq")]
    pub flush_freq: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubSettings {
    /// Capacity of the add channel (admission control)
    #[serde(default = "default_add_capacity", rename = "addcapacity")]
    pub add_capacity: usize,
    /// Seconds to wait for connections to unregister during shutdown
    #[serde(default = "default_drain_timeout", rename = "draintimeout")]
    pub drain_timeout: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OtelConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_otel_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_service_name", rename = "servicename")]
    pub service_name: String,
    #[serde(default = "default_sampling_ratio", rename = "samplingratio")]
    pub sampling_ratio: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Authentication strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    None,
    Simple,
    Signed,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::Simple => "simple",
            AuthMethod::Signed => "signed",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthMethod {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(AuthMethod::None),
            "simple" => Ok(AuthMethod::Simple),
            "signed" | "jwt" => Ok(AuthMethod::Signed),
            other => Err(GatewayError::Configuration(format!(
                "Invalid gateway authentication method: {}",
                other
            ))),
        }
    }
}

/// Validated authentication configuration; each variant carries exactly what
/// its strategy needs.
#[derive(Debug, Clone)]
pub enum AuthSettings {
    None,
    Simple {
        token: String,
    },
    Signed {
        keys_uri: String,
        tolerable_age: Duration,
        key_cache_ttl: Duration,
    },
}

impl AuthSettings {
    pub fn method(&self) -> AuthMethod {
        match self {
            AuthSettings::None => AuthMethod::None,
            AuthSettings::Simple { .. } => AuthMethod::Simple,
            AuthSettings::Signed { .. } => AuthMethod::Signed,
        }
    }
}

/// Routes served next to the stream endpoint
const RESERVED_PATHS: [&str; 2] = ["/health", "/metrics"];

fn default_id() -> String {
    "g1".to_string()
}

fn default_root() -> String {
    "/ws".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_auth_method() -> String {
    "none".to_string()
}

fn default_tolerable_age() -> i64 {
    5
}

fn default_key_cache_ttl() -> u64 {
    300 // 5 minutes
}

fn default_publisher_backend() -> String {
    "memory".to_string()
}

fn default_publisher_uri() -> Vec<String> {
    vec!["docker:9091".to_string(), "docker:9092".to_string()]
}

fn default_topic() -> String {
    "messages".to_string()
}

fn default_true() -> bool {
    true
}

fn default_flush_freq() -> u64 {
    1
}

fn default_add_capacity() -> usize {
    5
}

fn default_drain_timeout() -> u64 {
    10
}

fn default_otel_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "stream-gateway".to_string()
}

fn default_sampling_ratio() -> f64 {
    1.0
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // GATEWAY_SERVER_ROOT, GATEWAY_SERVER_AUTHMETHOD, GATEWAY_PUB_URI, etc.
            .add_source(
                Environment::with_prefix("GATEWAY")
                    .separator("_")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("pub.uri"),
            );

        builder.build()?.try_deserialize()
    }

    /// Check every contract the process relies on before it serves.
    pub fn validate(&self) -> Result<AuthSettings, GatewayError> {
        if !self.server.root.starts_with('/') {
            return Err(GatewayError::Configuration(format!(
                "Server root must start with '/': {}",
                self.server.root
            )));
        }
        if RESERVED_PATHS.contains(&self.server.root.as_str()) {
            return Err(GatewayError::Configuration(format!(
                "Server root {} collides with a built-in endpoint",
                self.server.root
            )));
        }
        if self.hub.add_capacity == 0 {
            return Err(GatewayError::Configuration(
                "Hub add capacity must be positive".to_string(),
            ));
        }
        self.publisher.validate()?;
        self.server.auth_settings()
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ServerConfig {
    pub fn auth_method(&self) -> Result<AuthMethod, GatewayError> {
        self.auth_method.parse()
    }

    pub fn auth_settings(&self) -> Result<AuthSettings, GatewayError> {
        match self.auth_method()? {
            AuthMethod::None => Ok(AuthSettings::None),
            AuthMethod::Simple => {
                if self.token.is_empty() {
                    return Err(GatewayError::Configuration(
                        "Simple auth requires a token".to_string(),
                    ));
                }
                Ok(AuthSettings::Simple {
                    token: self.token.clone(),
                })
            }
            AuthMethod::Signed => {
                if self.device_keys_uri.is_empty() {
                    return Err(GatewayError::Configuration(
                        "Signed auth requires an API URI for public key retrieval".to_string(),
                    ));
                }
                if self.tolerable_jwt_age <= 0 {
                    return Err(GatewayError::Configuration(format!(
                        "Signed auth requires a positive tolerable age, got {}",
                        self.tolerable_jwt_age
                    )));
                }
                Ok(AuthSettings::Signed {
                    keys_uri: self.device_keys_uri.clone(),
                    tolerable_age: Duration::from_secs(self.tolerable_jwt_age as u64),
                    key_cache_ttl: Duration::from_secs(self.key_cache_ttl),
                })
            }
        }
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> Result<(), GatewayError> {
        match self.backend.as_str() {
            "memory" => Ok(()),
            "redis" => {
                if self.uri.iter().all(|u| u.trim().is_empty()) {
                    return Err(GatewayError::Configuration(
                        "Redis publisher requires at least one broker address".to_string(),
                    ));
                }
                if self.topic.is_empty() {
                    return Err(GatewayError::Configuration(
                        "Redis publisher requires a topic".to_string(),
                    ));
                }
                Ok(())
            }
            other => Err(GatewayError::Configuration(format!(
                "Unknown publisher backend: {}",
                other
            ))),
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_freq.max(1))
    }
}

impl HubSettings {
    pub fn drain_timeout(&self) -> Duration {
        Duration::from_secs(self.drain_timeout)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            id: default_id(),
            index: 0,
            trace: false,
            server: ServerConfig::default(),
            publisher: PublisherConfig::default(),
            hub: HubSettings::default(),
            otel: OtelConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            host: default_host(),
            port: default_port(),
            token: String::new(),
            auth_method: default_auth_method(),
            device_keys_uri: String::new(),
            tolerable_jwt_age: default_tolerable_age(),
            key_cache_ttl: default_key_cache_ttl(),
        }
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            backend: default_publisher_backend(),
            uri: default_publisher_uri(),
            topic: default_topic(),
            ack: false,
            compress: true,
            flush_freq: default_flush_freq(),
        }
    }
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            add_capacity: default_add_capacity(),
            drain_timeout: default_drain_timeout(),
        }
    }
}

impl Default for OtelConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_otel_endpoint(),
            service_name: default_service_name(),
            sampling_ratio: default_sampling_ratio(),
        }
    }
}
