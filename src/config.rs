//! Process configuration.
//!
//! Values come from the environment (after an optional `.env` file, which
//! never overrides variables that are already set). Blank values and numbers
//! that do not parse fall back to defaults; everything else is validated and
//! all problems are reported at once so a bad deployment fails on startup
//! with one readable message.
//!
//! | Variable | Default |
//! |---|---|
//! | `APP_NAME` | `spike-server` |
//! | `APP_ENV` | `dev` (`dev`, `test`, `prod`) |
//! | `APP_PORT` | `8080` |
//! | `APP_VERSION` | `0.1.0` |
//! | `REQUEST_TIMEOUT_MS` | `5000` |
//! | `SHUTDOWN_TIMEOUT_MS` | `5000` |
//! | `LOG_LEVEL` | `info` (`debug`, `info`, `warn`, `error`) |
//! | `LOG_ENCODING` | `json` (`json`, `console`) |
//! | `CORS_ALLOWED_ORIGINS` | `*` |
//! | `CORS_ALLOWED_METHODS` | `GET, POST, PUT, DELETE, OPTIONS` |
//! | `CORS_ALLOWED_HEADERS` | `Authorization, Content-Type` |
//! | `DATABASE_URL` | unset: in-memory store |
//! | `DATABASE_MAX_CONNECTIONS` | `25` |
//! | `MIGRATIONS_DIR` | `migrations` |

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use config::{Config, Environment};
use serde::Deserialize;
use thiserror::Error;

use crate::middleware::{CorsConfig, PipelineConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read configuration: {0}")]
    Source(#[from] config::ConfigError),

    #[error("{}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Validated settings for the whole process.
#[derive(Clone, Debug)]
pub struct Settings {
    pub app: AppSettings,
    pub log: LogSettings,
    pub cors: CorsConfig,
    pub database: DatabaseSettings,
}

#[derive(Clone, Debug)]
pub struct AppSettings {
    pub name: String,
    pub env: AppEnv,
    pub port: u16,
    pub version: String,
    pub request_timeout: Duration,
    pub shutdown_timeout: Duration,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppEnv {
    Dev,
    Test,
    Prod,
}

impl AppEnv {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Test => "test",
            Self::Prod => "prod",
        }
    }
}

impl FromStr for AppEnv {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dev" => Ok(Self::Dev),
            "test" => Ok(Self::Test),
            "prod" => Ok(Self::Prod),
            _ => Err(()),
        }
    }
}

impl fmt::Display for AppEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogEncoding {
    Json,
    Console,
}

#[derive(Clone, Debug)]
pub struct LogSettings {
    pub level: tracing::Level,
    pub encoding: LogEncoding,
}

#[derive(Clone, Debug)]
pub struct DatabaseSettings {
    /// `None` selects the in-memory user store.
    pub url: Option<String>,
    pub max_connections: u32,
    pub migrations_dir: PathBuf,
}

/// Everything as the environment spells it; parsed in [`Settings::from_config`].
#[derive(Debug, Default, Deserialize)]
struct RawSettings {
    app_name: Option<String>,
    app_env: Option<String>,
    app_port: Option<String>,
    app_version: Option<String>,
    request_timeout_ms: Option<String>,
    shutdown_timeout_ms: Option<String>,
    log_level: Option<String>,
    log_encoding: Option<String>,
    cors_allowed_origins: Option<String>,
    cors_allowed_methods: Option<String>,
    cors_allowed_headers: Option<String>,
    database_url: Option<String>,
    database_max_connections: Option<String>,
    migrations_dir: Option<String>,
}

impl Settings {
    /// Loads `.env` if present, then reads and validates the environment.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let source = Config::builder()
            .add_source(Environment::default())
            .build()?;
        Self::from_config(&source)
    }

    /// Builds settings from an already assembled `config` source. Keys are the
    /// lower-cased variable names (`app_port`, `log_level`, ...).
    pub fn from_config(source: &Config) -> Result<Self, ConfigError> {
        let raw: RawSettings = source.clone().try_deserialize()?;
        let mut errors = Vec::new();

        let env_raw = text(&raw.app_env, "dev").to_lowercase();
        let env = env_raw.parse::<AppEnv>().unwrap_or_else(|()| {
            errors.push(format!("APP_ENV must be one of dev|test|prod, got {env_raw:?}"));
            AppEnv::Dev
        });

        let port_raw = number(&raw.app_port, 8080);
        let port = u16::try_from(port_raw).ok().filter(|p| *p != 0).unwrap_or_else(|| {
            errors.push(format!("APP_PORT must be in range 1..65535, got {port_raw}"));
            8080
        });

        let request_timeout = millis(&raw.request_timeout_ms, "REQUEST_TIMEOUT_MS", &mut errors);
        let shutdown_timeout = millis(&raw.shutdown_timeout_ms, "SHUTDOWN_TIMEOUT_MS", &mut errors);

        let level_raw = text(&raw.log_level, "info").to_lowercase();
        let level = match level_raw.as_str() {
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => {
                errors.push(format!(
                    "LOG_LEVEL must be one of debug|info|warn|error, got {level_raw:?}"
                ));
                tracing::Level::INFO
            }
        };

        let encoding_raw = text(&raw.log_encoding, "json").to_lowercase();
        let encoding = match encoding_raw.as_str() {
            "json" => LogEncoding::Json,
            "console" => LogEncoding::Console,
            _ => {
                errors.push(format!("LOG_ENCODING must be one of json|console, got {encoding_raw:?}"));
                LogEncoding::Json
            }
        };

        let max_connections = number(&raw.database_max_connections, 25);
        let max_connections = u32::try_from(max_connections).ok().filter(|n| *n > 0).unwrap_or_else(|| {
            errors.push(format!("DATABASE_MAX_CONNECTIONS must be > 0, got {max_connections}"));
            25
        });

        if !errors.is_empty() {
            return Err(ConfigError::Invalid(errors));
        }

        Ok(Self {
            app: AppSettings {
                name: text(&raw.app_name, "spike-server").to_owned(),
                env,
                port,
                version: text(&raw.app_version, "0.1.0").to_owned(),
                request_timeout,
                shutdown_timeout,
            },
            log: LogSettings { level, encoding },
            cors: CorsConfig {
                allowed_origins: csv(&raw.cors_allowed_origins, &["*"]),
                allowed_methods: csv(&raw.cors_allowed_methods, &["GET", "POST", "PUT", "DELETE", "OPTIONS"]),
                allowed_headers: csv(&raw.cors_allowed_headers, &["Authorization", "Content-Type"]),
            },
            database: DatabaseSettings {
                url: raw.database_url.filter(|url| !url.trim().is_empty()),
                max_connections,
                migrations_dir: PathBuf::from(text(&raw.migrations_dir, "migrations")),
            },
        })
    }

    /// Address the server listens on: all interfaces, configured port.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.app.port))
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            request_timeout: self.app.request_timeout,
            cors: self.cors.clone(),
        }
    }
}

fn text<'a>(value: &'a Option<String>, default: &'a str) -> &'a str {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty()).unwrap_or(default)
}

fn number(value: &Option<String>, default: i64) -> i64 {
    value.as_deref().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn millis(value: &Option<String>, name: &str, errors: &mut Vec<String>) -> Duration {
    let ms = number(value, 5000);
    match u64::try_from(ms) {
        Ok(ms) if ms > 0 => Duration::from_millis(ms),
        _ => {
            errors.push(format!("{name} must be > 0, got {ms}ms"));
            Duration::from_millis(5000)
        }
    }
}

fn csv(value: &Option<String>, default: &[&str]) -> Vec<String> {
    let parsed: Vec<String> = value
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .collect();
    if parsed.is_empty() {
        default.iter().map(|v| (*v).to_owned()).collect()
    } else {
        parsed
    }
}
