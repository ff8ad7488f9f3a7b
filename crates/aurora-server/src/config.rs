//! Server configuration.
//!
//! Settings come from a properties file (`aurora.conf`). Each key is
//! declared once as a [`ConfigEntry`] carrying its documentation, the
//! release it appeared in, a default and a validation check.
//! [`ServerConfig::from_properties`] reads every entry and validates the
//! combination.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use aurora_iceberg::IcebergConfig;
use aurora_iceberg::backend::{CatalogBackendKind, SqliteLocation};
use aurora_iceberg::metrics_manager::{MetricsManagerConfig, MetricsStoreKind};
use thiserror::Error;
use tokio::sync::Semaphore;

/// Default configuration file name.
pub const CONF_FILE: &str = "aurora.conf";

/// Directory holding `aurora.conf`; overrides `AURORA_HOME`.
pub const CONF_DIR_ENV: &str = "AURORA_CONF_DIR";

/// Installation root; the file is read from `$AURORA_HOME/conf`.
pub const HOME_ENV: &str = "AURORA_HOME";

/// Release that introduced the current set of keys.
pub const VERSION_0_1_0: &str = "0.1.0";

const NOT_BLANK_ERROR_MSG: &str = "The value can't be blank";
const POSITIVE_NUMBER_ERROR_MSG: &str = "The value must be a positive number";

/// Prefix of pass-through JDBC connection properties.
const JDBC_PROPERTY_PREFIX: &str = "jdbc.";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A value failed to parse or did not pass its check.
    #[error("invalid value for '{key}': {message}")]
    Invalid {
        /// Offending key.
        key: String,
        /// What is wrong with the value.
        message: String,
    },

    /// A key required by another setting is absent.
    #[error("'{key}' is required when {context}")]
    Missing {
        /// Missing key.
        key: &'static str,
        /// Setting that requires it.
        context: &'static str,
    },

    /// The backend is recognized but cannot be served.
    #[error("catalog backend {0} is not supported")]
    UnsupportedBackend(String),

    /// Wraps any of the above with the file being loaded.
    #[error("Failed to load conf from file {}", path.display())]
    Load {
        /// File that was loaded.
        path: PathBuf,
        /// What went wrong.
        #[source]
        source: Box<ConfigError>,
    },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

// ============================================================================
// Properties
// ============================================================================

/// Key/value pairs parsed from a properties file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    entries: BTreeMap<String, String>,
}

impl Properties {
    /// Parses properties text.
    ///
    /// Accepts `key=value`, `key: value` and `key value`. Lines starting
    /// with `#` or `!` are comments. A line ending in an unescaped `\`
    /// continues on the next line. Keys and values are trimmed. Later
    /// duplicates win.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let mut entries = BTreeMap::new();
        let mut lines = input.lines();
        while let Some(line) = lines.next() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                continue;
            }

            let mut logical = trimmed.to_string();
            while ends_with_continuation(&logical) {
                logical.pop();
                match lines.next() {
                    Some(next) => logical.push_str(next.trim_start()),
                    None => break,
                }
            }

            let (key, value) = split_entry(&logical);
            entries.insert(unescape(key), unescape(value));
        }
        Self { entries }
    }

    /// Reads and parses a properties file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Returns the value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Sets `key` to `value`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Returns entries whose key starts with `prefix`, with the prefix removed.
    #[must_use]
    pub fn with_prefix(&self, prefix: &str) -> Self {
        let entries = self
            .entries
            .iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(prefix)
                    .filter(|stripped| !stripped.is_empty())
                    .map(|stripped| (stripped.to_string(), value.clone()))
            })
            .collect();
        Self { entries }
    }

    /// Iterates over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn ends_with_continuation(line: &str) -> bool {
    line.chars().rev().take_while(|c| *c == '\\').count() % 2 == 1
}

/// Splits a logical line at the first unescaped `=`, `:` or whitespace.
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    for (idx, ch) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '=' | ':' => return (&line[..idx], line[idx + 1..].trim()),
            c if c.is_whitespace() => {
                let rest = line[idx..].trim_start();
                let rest = rest
                    .strip_prefix(|c: char| c == '=' || c == ':')
                    .unwrap_or(rest);
                return (&line[..idx], rest.trim());
            }
            _ => {}
        }
    }
    (line, "")
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

// ============================================================================
// Typed entries
// ============================================================================

/// A configuration key with its type, default and check.
#[derive(Debug)]
pub struct ConfigEntry<T> {
    /// Property key.
    pub key: &'static str,
    /// What the key controls.
    pub doc: &'static str,
    /// Release that introduced the key.
    pub version: &'static str,
    parse: fn(&str) -> Result<T, String>,
    default: fn() -> Option<T>,
    check: Option<(fn(&T) -> bool, &'static str)>,
}

impl<T> ConfigEntry<T> {
    /// Reads the entry. Absent keys yield the default, which may be `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the value does not parse or
    /// fails its check.
    pub fn read(&self, props: &Properties) -> Result<Option<T>, ConfigError> {
        let Some(raw) = props.get(self.key) else {
            return Ok((self.default)());
        };
        let value = (self.parse)(raw).map_err(|message| ConfigError::invalid(self.key, message))?;
        if let Some((check, message)) = self.check {
            if !check(&value) {
                return Err(ConfigError::invalid(self.key, message));
            }
        }
        Ok(Some(value))
    }

    /// Reads the entry, failing when it has neither a value nor a default.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] or [`ConfigError::Invalid`].
    pub fn require(&self, props: &Properties, context: &'static str) -> Result<T, ConfigError> {
        self.read(props)?.ok_or(ConfigError::Missing {
            key: self.key,
            context,
        })
    }
}

fn parse_string(value: &str) -> Result<String, String> {
    Ok(value.to_string())
}

fn parse_number<T>(value: &str) -> Result<T, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse::<T>()
        .map_err(|e| format!("'{value}' is not a valid number: {e}"))
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => Ok(true),
        "false" | "0" | "no" | "n" => Ok(false),
        _ => Err(format!("'{value}' is not a boolean (true/false)")),
    }
}

fn parse_backend(value: &str) -> Result<CatalogBackendKind, String> {
    value.parse()
}

fn parse_metrics_store(value: &str) -> Result<MetricsStoreKind, String> {
    value.parse().map_err(|e: aurora_iceberg::metrics_manager::MetricsError| e.to_string())
}

#[allow(clippy::ptr_arg)]
fn not_blank(value: &String) -> bool {
    !value.trim().is_empty()
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn positive_i64(value: &i64) -> bool {
    *value > 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn positive_i32(value: &i32) -> bool {
    *value > 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn positive_usize(value: &usize) -> bool {
    *value > 0
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn positive_u16(value: &u16) -> bool {
    *value > 0
}

fn no_default<T>() -> Option<T> {
    None
}

#[allow(clippy::unnecessary_wraps)]
fn default_shutdown_timeout() -> Option<i64> {
    Some(3_000)
}

#[allow(clippy::unnecessary_wraps)]
fn default_backend() -> Option<CatalogBackendKind> {
    Some(CatalogBackendKind::Memory)
}

#[allow(clippy::unnecessary_wraps)]
fn default_true() -> Option<bool> {
    Some(true)
}

#[allow(clippy::unnecessary_wraps)]
fn default_false() -> Option<bool> {
    Some(false)
}

#[allow(clippy::unnecessary_wraps)]
fn default_retain_days() -> Option<i32> {
    Some(-1)
}

#[allow(clippy::unnecessary_wraps)]
fn default_queue_capacity() -> Option<i32> {
    Some(1_000)
}

#[allow(clippy::unnecessary_wraps)]
fn default_host() -> Option<String> {
    Some("0.0.0.0".to_string())
}

#[allow(clippy::unnecessary_wraps)]
fn default_http_port() -> Option<u16> {
    Some(9001)
}

fn available_cpus() -> usize {
    std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get)
}

#[allow(clippy::unnecessary_wraps)]
fn default_min_threads() -> Option<usize> {
    Some((available_cpus() * 2).min(100).max(24))
}

#[allow(clippy::unnecessary_wraps)]
fn default_max_threads() -> Option<usize> {
    Some((available_cpus() * 4).max(400))
}

#[allow(clippy::unnecessary_wraps)]
fn default_work_queue_size() -> Option<usize> {
    Some(100)
}

#[allow(clippy::unnecessary_wraps)]
fn default_timeout_ms() -> Option<i64> {
    Some(30_000)
}

#[allow(clippy::unnecessary_wraps)]
fn default_request_header_size() -> Option<usize> {
    Some(128 * 1024)
}

/// `server.shutdown.timeout`: wait after a shutdown signal, in milliseconds.
pub const SERVER_SHUTDOWN_TIMEOUT: ConfigEntry<i64> = ConfigEntry {
    key: "server.shutdown.timeout",
    doc: "The stop idle timeout(millis) of the Iceberg REST server",
    version: VERSION_0_1_0,
    parse: parse_number::<i64>,
    default: default_shutdown_timeout,
    check: Some((positive_i64, POSITIVE_NUMBER_ERROR_MSG)),
};

/// `catalog-backend`: `memory`, `jdbc` or `hive`.
pub const CATALOG_BACKEND: ConfigEntry<CatalogBackendKind> = ConfigEntry {
    key: "catalog-backend",
    doc: "Catalog backend of the Iceberg REST catalog",
    version: VERSION_0_1_0,
    parse: parse_backend,
    default: default_backend,
    check: None,
};

/// `warehouse`: root location for new tables.
pub const CATALOG_WAREHOUSE: ConfigEntry<String> = ConfigEntry {
    key: "warehouse",
    doc: "Warehouse directory of catalog",
    version: VERSION_0_1_0,
    parse: parse_string,
    default: no_default::<String>,
    check: Some((not_blank, NOT_BLANK_ERROR_MSG)),
};

/// `uri`: JDBC URI of the catalog database.
pub const CATALOG_URI: ConfigEntry<String> = ConfigEntry {
    key: "uri",
    doc: "The uri config of the Iceberg catalog",
    version: VERSION_0_1_0,
    parse: parse_string,
    default: no_default::<String>,
    check: Some((not_blank, NOT_BLANK_ERROR_MSG)),
};

/// `jdbc-user`.
pub const JDBC_USER: ConfigEntry<String> = ConfigEntry {
    key: "jdbc-user",
    doc: "The username of the Jdbc connection",
    version: VERSION_0_1_0,
    parse: parse_string,
    default: no_default::<String>,
    check: Some((not_blank, NOT_BLANK_ERROR_MSG)),
};

/// `jdbc-passwd`.
pub const JDBC_PASSWORD: ConfigEntry<String> = ConfigEntry {
    key: "jdbc-passwd",
    doc: "The password of the Jdbc connection",
    version: VERSION_0_1_0,
    parse: parse_string,
    default: no_default::<String>,
    check: Some((not_blank, NOT_BLANK_ERROR_MSG)),
};

/// `jdbc-driver`.
pub const JDBC_DRIVER: ConfigEntry<String> = ConfigEntry {
    key: "jdbc-driver",
    doc: "The driver of the Jdbc connection",
    version: VERSION_0_1_0,
    parse: parse_string,
    default: no_default::<String>,
    check: Some((not_blank, NOT_BLANK_ERROR_MSG)),
};

/// `initial`: create catalog tables on startup.
pub const JDBC_INIT_TABLES: ConfigEntry<bool> = ConfigEntry {
    key: "initial",
    doc: "Whether to initialize meta tables when create Jdbc catalog",
    version: VERSION_0_1_0,
    parse: parse_bool,
    default: default_true,
    check: None,
};

/// `prefix`: catalog prefix advertised by `/v1/config`.
pub const CATALOG_PREFIX: ConfigEntry<String> = ConfigEntry {
    key: "prefix",
    doc: "The catalog prefix returned to clients and required on every request",
    version: VERSION_0_1_0,
    parse: parse_string,
    default: no_default::<String>,
    check: Some((not_blank, NOT_BLANK_ERROR_MSG)),
};

/// `metricsStore`.
pub const ICEBERG_METRICS_STORE: ConfigEntry<MetricsStoreKind> = ConfigEntry {
    key: "metricsStore",
    doc: "The store to save Iceberg metrics",
    version: VERSION_0_1_0,
    parse: parse_metrics_store,
    default: no_default::<MetricsStoreKind>,
    check: None,
};

/// `metricsStoreRetainDays`.
pub const ICEBERG_METRICS_STORE_RETAIN_DAYS: ConfigEntry<i32> = ConfigEntry {
    key: "metricsStoreRetainDays",
    doc: "The retain days of Iceberg metrics, the value not greater than 0 means retain forever",
    version: VERSION_0_1_0,
    parse: parse_number::<i32>,
    default: default_retain_days,
    check: None,
};

/// `metricsQueueCapacity`.
pub const ICEBERG_METRICS_QUEUE_CAPACITY: ConfigEntry<i32> = ConfigEntry {
    key: "metricsQueueCapacity",
    doc: "The capacity for Iceberg metrics queues, should greater than 0",
    version: VERSION_0_1_0,
    parse: parse_number::<i32>,
    default: default_queue_capacity,
    check: Some((positive_i32, POSITIVE_NUMBER_ERROR_MSG)),
};

/// `host`: address to bind.
pub const WEBSERVER_HOST: ConfigEntry<String> = ConfigEntry {
    key: "host",
    doc: "The host name of the built-in web server",
    version: VERSION_0_1_0,
    parse: parse_string,
    default: default_host,
    check: Some((not_blank, NOT_BLANK_ERROR_MSG)),
};

/// `httpPort`.
pub const WEBSERVER_HTTP_PORT: ConfigEntry<u16> = ConfigEntry {
    key: "httpPort",
    doc: "The http port number of the built-in web server",
    version: VERSION_0_1_0,
    parse: parse_number::<u16>,
    default: default_http_port,
    check: Some((positive_u16, POSITIVE_NUMBER_ERROR_MSG)),
};

/// `minThreads`: runtime worker threads.
pub const WEBSERVER_MIN_THREADS: ConfigEntry<usize> = ConfigEntry {
    key: "minThreads",
    doc: "The minimum number of threads in the thread pool used by the web server",
    version: VERSION_0_1_0,
    parse: parse_number::<usize>,
    default: default_min_threads,
    check: Some((positive_usize, POSITIVE_NUMBER_ERROR_MSG)),
};

/// `maxThreads`: concurrent request limit.
pub const WEBSERVER_MAX_THREADS: ConfigEntry<usize> = ConfigEntry {
    key: "maxThreads",
    doc: "The maximum number of threads in the thread pool used by the web server",
    version: VERSION_0_1_0,
    parse: parse_number::<usize>,
    default: default_max_threads,
    check: Some((positive_usize, POSITIVE_NUMBER_ERROR_MSG)),
};

/// `threadPoolWorkQueueSize`: requests allowed to wait for a slot.
pub const WEBSERVER_THREAD_POOL_WORK_QUEUE_SIZE: ConfigEntry<usize> = ConfigEntry {
    key: "threadPoolWorkQueueSize",
    doc: "The executor thread pool work queue size of the web server",
    version: VERSION_0_1_0,
    parse: parse_number::<usize>,
    default: default_work_queue_size,
    check: Some((positive_usize, POSITIVE_NUMBER_ERROR_MSG)),
};

/// `stopTimeout`: drain limit on stop, in milliseconds.
pub const WEBSERVER_STOP_TIMEOUT: ConfigEntry<i64> = ConfigEntry {
    key: "stopTimeout",
    doc: "Time in milliseconds to gracefully shutdown the web server",
    version: VERSION_0_1_0,
    parse: parse_number::<i64>,
    default: default_timeout_ms,
    check: Some((positive_i64, POSITIVE_NUMBER_ERROR_MSG)),
};

/// `idleTimeout`: per-request limit, in milliseconds.
pub const WEBSERVER_IDLE_TIMEOUT: ConfigEntry<i64> = ConfigEntry {
    key: "idleTimeout",
    doc: "The timeout in milliseconds of idle connections",
    version: VERSION_0_1_0,
    parse: parse_number::<i64>,
    default: default_timeout_ms,
    check: Some((positive_i64, POSITIVE_NUMBER_ERROR_MSG)),
};

/// `requestHeaderSize`: header limit in bytes.
pub const WEBSERVER_REQUEST_HEADER_SIZE: ConfigEntry<usize> = ConfigEntry {
    key: "requestHeaderSize",
    doc: "Maximum size of HTTP requests",
    version: VERSION_0_1_0,
    parse: parse_number::<usize>,
    default: default_request_header_size,
    check: Some((positive_usize, POSITIVE_NUMBER_ERROR_MSG)),
};

/// `enableHttps`: TLS inside the process is not available.
pub const ENABLE_HTTPS: ConfigEntry<bool> = ConfigEntry {
    key: "enableHttps",
    doc: "Enables https",
    version: VERSION_0_1_0,
    parse: parse_bool,
    default: default_false,
    check: None,
};

/// Every key the server reads.
pub const KNOWN_KEYS: &[&str] = &[
    SERVER_SHUTDOWN_TIMEOUT.key,
    CATALOG_BACKEND.key,
    CATALOG_WAREHOUSE.key,
    CATALOG_URI.key,
    JDBC_USER.key,
    JDBC_PASSWORD.key,
    JDBC_DRIVER.key,
    JDBC_INIT_TABLES.key,
    CATALOG_PREFIX.key,
    ICEBERG_METRICS_STORE.key,
    ICEBERG_METRICS_STORE_RETAIN_DAYS.key,
    ICEBERG_METRICS_QUEUE_CAPACITY.key,
    WEBSERVER_HOST.key,
    WEBSERVER_HTTP_PORT.key,
    WEBSERVER_MIN_THREADS.key,
    WEBSERVER_MAX_THREADS.key,
    WEBSERVER_THREAD_POOL_WORK_QUEUE_SIZE.key,
    WEBSERVER_STOP_TIMEOUT.key,
    WEBSERVER_IDLE_TIMEOUT.key,
    WEBSERVER_REQUEST_HEADER_SIZE.key,
    ENABLE_HTTPS.key,
];

// ============================================================================
// Server configuration
// ============================================================================

/// Settings for the JDBC (SQLite) backend.
#[derive(Clone, PartialEq, Eq)]
pub struct JdbcSettings {
    /// `jdbc:sqlite:` URI.
    pub uri: String,
    /// Warehouse root.
    pub warehouse: String,
    /// Create catalog tables on startup.
    pub initialize: bool,
    /// Accepted for compatibility; SQLite ignores it.
    pub user: Option<String>,
    /// Accepted for compatibility; SQLite ignores it.
    pub password: Option<String>,
    /// Accepted for compatibility; SQLite ignores it.
    pub driver: Option<String>,
    /// `jdbc.*` connection properties with the prefix removed.
    pub connection_properties: Properties,
}

impl std::fmt::Debug for JdbcSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JdbcSettings")
            .field("uri", &self.uri)
            .field("warehouse", &self.warehouse)
            .field("initialize", &self.initialize)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("driver", &self.driver)
            .field(
                "connection_properties",
                &self.connection_properties.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Which catalog backend to run, with its settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogSettings {
    /// Process-local catalog.
    Memory {
        /// Warehouse root.
        warehouse: String,
    },
    /// JDBC catalog schema in SQLite.
    Jdbc(JdbcSettings),
}

impl CatalogSettings {
    /// Backend name.
    #[must_use]
    pub const fn kind(&self) -> CatalogBackendKind {
        match self {
            Self::Memory { .. } => CatalogBackendKind::Memory,
            Self::Jdbc(_) => CatalogBackendKind::Jdbc,
        }
    }

    /// Warehouse root for new tables.
    #[must_use]
    pub fn warehouse(&self) -> &str {
        match self {
            Self::Memory { warehouse } => warehouse,
            Self::Jdbc(jdbc) => &jdbc.warehouse,
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpServerConfig {
    /// Address to bind.
    pub host: String,
    /// Port to bind. Loaded configs require a positive port; a config built
    /// in code may use 0 to bind any free port.
    pub port: u16,
    /// Runtime worker threads.
    pub min_threads: usize,
    /// Requests executing at once, and the blocking pool size.
    pub max_threads: usize,
    /// Requests allowed to wait for a slot before 503.
    pub work_queue_size: usize,
    /// Drain limit on stop.
    pub stop_timeout: Duration,
    /// Per-request time limit.
    pub idle_timeout: Duration,
    /// Header limit in bytes.
    pub request_header_size: usize,
}

/// Fully validated server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Wait between a shutdown signal and stopping the server.
    pub shutdown_timeout: Duration,
    /// Catalog backend.
    pub catalog: CatalogSettings,
    /// Catalog prefix, if any.
    pub prefix: Option<String>,
    /// Metrics report pipeline.
    pub metrics: MetricsManagerConfig,
    /// HTTP server.
    pub http: HttpServerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        // An empty file only uses defaults, all of which pass their checks.
        Self::from_properties(&Properties::default()).unwrap_or_else(|_| Self {
            shutdown_timeout: Duration::from_millis(3_000),
            catalog: CatalogSettings::Memory {
                warehouse: "memory://warehouse".to_string(),
            },
            prefix: None,
            metrics: MetricsManagerConfig::default(),
            http: HttpServerConfig {
                host: "0.0.0.0".to_string(),
                port: 9001,
                min_threads: 24,
                max_threads: 400,
                work_queue_size: 100,
                stop_timeout: Duration::from_millis(30_000),
                idle_timeout: Duration::from_millis(30_000),
                request_header_size: 128 * 1024,
            },
        })
    }
}

impl ServerConfig {
    /// Builds and validates configuration from properties.
    ///
    /// # Errors
    ///
    /// Returns the first invalid or missing value, an unsupported backend,
    /// or an invalid combination of HTTP settings.
    pub fn from_properties(props: &Properties) -> Result<Self, ConfigError> {
        for (key, _) in props.iter() {
            if !KNOWN_KEYS.contains(&key) && !key.starts_with(JDBC_PROPERTY_PREFIX) {
                tracing::warn!(key, "Ignoring unknown configuration key");
            }
        }

        let shutdown_timeout = millis(SERVER_SHUTDOWN_TIMEOUT.require(props, "the server starts")?);
        let catalog = catalog_settings(props)?;
        let prefix = CATALOG_PREFIX.read(props)?.map(|p| p.trim().to_string());

        let queue_capacity = ICEBERG_METRICS_QUEUE_CAPACITY.require(props, "the server starts")?;
        let metrics = MetricsManagerConfig {
            store: ICEBERG_METRICS_STORE.read(props)?.unwrap_or_default(),
            retain_days: ICEBERG_METRICS_STORE_RETAIN_DAYS.require(props, "the server starts")?,
            queue_capacity: usize::try_from(queue_capacity)
                .map_err(|e| ConfigError::invalid(ICEBERG_METRICS_QUEUE_CAPACITY.key, e.to_string()))?,
        };

        let http = http_config(props)?;

        Ok(Self {
            shutdown_timeout,
            catalog,
            prefix,
            metrics,
            http,
        })
    }

    /// Loads configuration from `path`, or from the default location when
    /// `path` is `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Load`] naming the file when it cannot be read
    /// or a value is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map_or_else(default_conf_path, Path::to_path_buf);
        tracing::info!(path = %path.display(), "Loading configuration");
        Properties::load(&path)
            .and_then(|props| Self::from_properties(&props))
            .map_err(|source| ConfigError::Load {
                path,
                source: Box::new(source),
            })
    }

    /// Settings for the Iceberg REST handlers.
    #[must_use]
    pub fn iceberg_config(&self) -> IcebergConfig {
        IcebergConfig {
            prefix: self.prefix.clone(),
            ..IcebergConfig::default()
        }
    }
}

fn millis(ms: i64) -> Duration {
    Duration::from_millis(ms.unsigned_abs())
}

fn catalog_settings(props: &Properties) -> Result<CatalogSettings, ConfigError> {
    let kind = CATALOG_BACKEND.require(props, "the server starts")?;
    let warehouse = CATALOG_WAREHOUSE.read(props)?;
    if let Some(warehouse) = &warehouse {
        validate_warehouse(warehouse)?;
    }

    match kind {
        CatalogBackendKind::Memory => Ok(CatalogSettings::Memory {
            warehouse: warehouse.unwrap_or_else(|| "memory://warehouse".to_string()),
        }),
        CatalogBackendKind::Jdbc => {
            const CONTEXT: &str = "catalog-backend is jdbc";
            let uri = CATALOG_URI.require(props, CONTEXT)?;
            SqliteLocation::parse(&uri)
                .map_err(|e| ConfigError::invalid(CATALOG_URI.key, e.to_string()))?;
            let warehouse = warehouse.ok_or(ConfigError::Missing {
                key: CATALOG_WAREHOUSE.key,
                context: CONTEXT,
            })?;
            Ok(CatalogSettings::Jdbc(JdbcSettings {
                uri,
                warehouse,
                initialize: JDBC_INIT_TABLES.require(props, CONTEXT)?,
                user: JDBC_USER.read(props)?,
                password: JDBC_PASSWORD.read(props)?,
                driver: JDBC_DRIVER.read(props)?,
                connection_properties: props.with_prefix(JDBC_PROPERTY_PREFIX),
            }))
        }
        CatalogBackendKind::Hive => Err(ConfigError::UnsupportedBackend(
            kind.as_str().to_ascii_uppercase(),
        )),
    }
}

fn validate_warehouse(warehouse: &str) -> Result<(), ConfigError> {
    let warehouse = warehouse.trim();
    if warehouse.starts_with("memory://")
        || warehouse.starts_with("file://")
        || Path::new(warehouse).is_absolute()
    {
        return Ok(());
    }
    Err(ConfigError::invalid(
        CATALOG_WAREHOUSE.key,
        format!("'{warehouse}' must be a memory:// or file:// location, or an absolute path"),
    ))
}

fn http_config(props: &Properties) -> Result<HttpServerConfig, ConfigError> {
    const CONTEXT: &str = "the web server starts";

    if ENABLE_HTTPS.require(props, CONTEXT)? {
        return Err(ConfigError::invalid(
            ENABLE_HTTPS.key,
            "HTTPS is not supported; terminate TLS in a reverse proxy",
        ));
    }

    let min_threads = WEBSERVER_MIN_THREADS.require(props, CONTEXT)?;
    let max_threads = WEBSERVER_MAX_THREADS.require(props, CONTEXT)?;
    if max_threads < min_threads {
        return Err(ConfigError::invalid(
            WEBSERVER_MAX_THREADS.key,
            format!("maxThreads ({max_threads}) must be >= minThreads ({min_threads})"),
        ));
    }
    if max_threads > Semaphore::MAX_PERMITS {
        return Err(ConfigError::invalid(
            WEBSERVER_MAX_THREADS.key,
            format!(
                "maxThreads ({max_threads}) must be <= {}",
                Semaphore::MAX_PERMITS
            ),
        ));
    }

    Ok(HttpServerConfig {
        host: WEBSERVER_HOST.require(props, CONTEXT)?.trim().to_string(),
        port: WEBSERVER_HTTP_PORT.require(props, CONTEXT)?,
        min_threads,
        max_threads,
        work_queue_size: WEBSERVER_THREAD_POOL_WORK_QUEUE_SIZE.require(props, CONTEXT)?,
        stop_timeout: millis(WEBSERVER_STOP_TIMEOUT.require(props, CONTEXT)?),
        idle_timeout: millis(WEBSERVER_IDLE_TIMEOUT.require(props, CONTEXT)?),
        request_header_size: WEBSERVER_REQUEST_HEADER_SIZE.require(props, CONTEXT)?,
    })
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Resolves the default configuration file.
#[must_use]
pub fn default_conf_path() -> PathBuf {
    resolve_conf_path(env_string(CONF_DIR_ENV), env_string(HOME_ENV))
}

fn resolve_conf_path(conf_dir: Option<String>, home: Option<String>) -> PathBuf {
    match (conf_dir, home) {
        (Some(dir), _) => PathBuf::from(dir).join(CONF_FILE),
        (None, Some(home)) => PathBuf::from(home).join("conf").join(CONF_FILE),
        (None, None) => PathBuf::from("conf").join(CONF_FILE),
    }
}
