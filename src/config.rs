// Process configuration read from the environment at startup

use std::net::SocketAddr;
use std::path::PathBuf;

use crate::error::ConfigError;

pub const URL_VAR: &str = "DATA_SERVICE_URL";
pub const KEY_VAR: &str = "DATA_SERVICE_KEY";
pub const PORT_VAR: &str = "PORT";

pub const DEFAULT_PORT: u16 = 3001;

/// Request body ceiling; large enough for attachment-bearing payloads
pub const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// `https://…` for the REST backend, `sqlite://<path>` or `sqlite::memory:` for SQLite
    pub data_service_url: String,
    pub data_service_key: String,
    pub port: u16,
}

/// Data service backend picked from the URL scheme
#[derive(Debug, Clone, PartialEq)]
pub enum Backend {
    /// `None` = in-memory database
    Sqlite(Option<PathBuf>),
    /// Base URL without trailing slash
    Rest(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `from_env` uses the process environment
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or(ConfigError::Missing { name })
        };

        let data_service_url = required(URL_VAR)?;
        let data_service_key = required(KEY_VAR)?;

        let port = match lookup(PORT_VAR).map(|v| v.trim().to_string()) {
            Some(raw) if !raw.is_empty() => raw.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: PORT_VAR,
                reason: e.to_string(),
            })?,
            _ => DEFAULT_PORT,
        };

        Ok(Config {
            data_service_url,
            data_service_key,
            port,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from(([0, 0, 0, 0], self.port))
    }

    pub fn backend(&self) -> Result<Backend, ConfigError> {
        let url = self.data_service_url.as_str();

        if url == "sqlite::memory:" {
            return Ok(Backend::Sqlite(None));
        }
        if let Some(path) = url.strip_prefix("sqlite://") {
            if path.is_empty() {
                return Err(ConfigError::UnsupportedUrl {
                    url: url.to_string(),
                });
            }
            return Ok(Backend::Sqlite(Some(PathBuf::from(path))));
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            return Ok(Backend::Rest(url.trim_end_matches('/').to_string()));
        }

        Err(ConfigError::UnsupportedUrl {
            url: url.to_string(),
        })
    }
}
