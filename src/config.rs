//! Process configuration, loaded once at startup.
//!
//! Sources, later ones winning: built-in defaults, an optional TOML file
//! (`WEATHER_CONFIG`, or `weather.toml` in the working directory), then
//! individual environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

const DEFAULT_CONFIG_FILE: &str = "weather.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub port: u16,
    /// The single origin allowed to make cross-origin calls.
    pub cors_origin: String,
    /// Gate POST/PUT/DELETE behind the `X-User-Role=admin` cookie.
    pub require_admin_role: bool,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            cors_origin: "http://localhost:3000".to_string(),
            require_admin_role: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

impl FromStr for StoreBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub sqlite_path: PathBuf,
    /// Upper bound for a single database call.
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            sqlite_path: PathBuf::from("weather.db"),
            timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Config {
    /// Reads the config file (if any) and applies environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os("WEATHER_CONFIG") {
            Some(path) => Self::from_toml_file(Path::new(&path))?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_toml_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        if config.store.timeout_ms == 0 {
            return Err(ConfigError::Invalid { key: "store.timeout_ms", value: "0".into() });
        }
        Ok(config)
    }

    /// Applies overrides looked up through `var`, typically the process env.
    pub fn apply_overrides<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = var("REST_SERVER_PORT") {
            self.http.port = parse("REST_SERVER_PORT", value)?;
        }
        if let Some(value) = var("CORS_ORIGIN") {
            self.http.cors_origin = value;
        }
        if let Some(value) = var("REQUIRE_ADMIN_ROLE") {
            self.http.require_admin_role = parse("REQUIRE_ADMIN_ROLE", value)?;
        }
        if let Some(value) = var("STORE_BACKEND") {
            self.store.backend = parse("STORE_BACKEND", value)?;
        }
        if let Some(value) = var("SQLITE_PATH") {
            self.store.sqlite_path = PathBuf::from(value);
        }
        if let Some(value) = var("STORE_TIMEOUT_MS") {
            self.store.timeout_ms = parse_timeout_ms("STORE_TIMEOUT_MS", value)?;
        }
        Ok(())
    }
}

fn parse<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    let parsed = value.trim().parse::<T>();
    match parsed {
        Ok(parsed) => Ok(parsed),
        Err(_) => Err(ConfigError::Invalid { key, value }),
    }
}

// a zero timeout would cancel every store call before it runs
fn parse_timeout_ms(key: &'static str, value: String) -> Result<u64, ConfigError> {
    match parse::<u64>(key, value.clone())? {
        0 => Err(ConfigError::Invalid { key, value }),
        ms => Ok(ms),
    }
}
