use std::{env, fmt, fs, path::PathBuf, time::Duration};

use caruna_client::api::{
    session::{DEFAULT_AUTH_URL, DEFAULT_PORTAL_URL},
    token::DEFAULT_API_URL,
    Credentials,
};
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "caruna-ingest.toml";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("unknown API variant '{0}' (expected 'session' or 'token')")]
    InvalidVariant(String),
}

/// Which upstream protocol to speak.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiVariant {
    /// Portal login, one bulk series query, logout.
    #[default]
    Session,
    /// Token login, one query per day.
    Token,
}

impl std::str::FromStr for ApiVariant {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(Self::Session),
            "token" => Ok(Self::Token),
            other => Err(ConfigError::InvalidVariant(other.to_string())),
        }
    }
}

impl fmt::Display for ApiVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Session => f.write_str("session"),
            Self::Token => f.write_str("token"),
        }
    }
}

#[derive(Clone)]
pub struct CarunaConfig {
    pub customer_number: String,
    pub metering_point: String,
    pub username: String,
    pub password: String,
}

impl CarunaConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials::new(&self.username, &self.password)
    }
}

impl fmt::Debug for CarunaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CarunaConfig")
            .field("customer_number", &self.customer_number)
            .field("metering_point", &self.metering_point)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone)]
pub struct InfluxConfig {
    pub url: String,
    pub token: String,
    pub bucket: String,
    pub org: String,
}

impl fmt::Debug for InfluxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InfluxConfig")
            .field("url", &self.url)
            .field("token", &"<redacted>")
            .field("bucket", &self.bucket)
            .field("org", &self.org)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamSettings {
    pub variant: ApiVariant,
    pub portal_url: String,
    pub auth_url: String,
    pub api_url: String,
    pub timeout_secs: u64,
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            variant: ApiVariant::default(),
            portal_url: DEFAULT_PORTAL_URL.to_string(),
            auth_url: DEFAULT_AUTH_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 60,
        }
    }
}

impl UpstreamSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WriterSettings {
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub timeout_secs: u64,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_backoff_ms: 500,
            timeout_secs: 30,
        }
    }
}

/// Non-secret tunables, read from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub upstream: UpstreamSettings,
    pub writer: WriterSettings,
}

impl FileConfig {
    /// Read the file named by `INGESTION_CONFIG`, or `caruna-ingest.toml` when
    /// unset. Only the default path may be missing.
    pub fn load() -> Result<Self, ConfigError> {
        let (path, explicit) = match env::var("INGESTION_CONFIG") {
            Ok(p) => (PathBuf::from(p), true),
            Err(_) => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };

        match fs::read_to_string(&path) {
            Ok(contents) => Ok(toml::from_str(&contents)?),
            Err(e) if !explicit && e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(ConfigError::Io { path, source }),
        }
    }
}

/// Everything one run needs, built once in `main` and passed by reference.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub caruna: CarunaConfig,
    pub influx: InfluxConfig,
    pub upstream: UpstreamSettings,
    pub writer: WriterSettings,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let file = FileConfig::load()?;
        Self::from_lookup(|name| env::var(name).ok(), file)
    }

    /// Build from an arbitrary variable lookup on top of file tunables.
    pub fn from_lookup<F>(lookup: F, file: FileConfig) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

        let caruna = CarunaConfig {
            customer_number: required("CARUNA_CUSTOMER_NUM")?,
            metering_point: required("CARUNA_METERING_POINT_NUM")?,
            username: required("CARUNA_USERNAME")?,
            password: required("CARUNA_PASSWORD")?,
        };
        let influx = InfluxConfig {
            url: required("INFLUX_URL")?,
            token: required("INFLUX_TOKEN")?,
            bucket: required("INFLUX_BUCKET")?,
            org: required("INFLUX_ORG")?,
        };

        let mut upstream = file.upstream;
        if let Some(v) = lookup("CARUNA_API_VARIANT") {
            upstream.variant = v.parse()?;
        }

        Ok(Self {
            caruna,
            influx,
            upstream,
            writer: file.writer,
        })
    }
}
