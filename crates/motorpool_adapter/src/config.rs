#![forbid(unsafe_code)]

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const ENV_HTTP_BIND: &str = "MOTORPOOL_HTTP_BIND";
pub const ENV_STORE_PATH: &str = "MOTORPOOL_STORE_PATH";
pub const ENV_LOG_JSON: &str = "MOTORPOOL_LOG_JSON";

pub const DEFAULT_HTTP_BIND: &str = "127.0.0.1:3001";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{key}={value} is not a socket address: {reason}")]
    InvalidBind {
        key: &'static str,
        value: String,
        reason: String,
    },
    #[error("{key}={value} is not a boolean (use 1/0, true/false, yes/no, on/off)")]
    InvalidBool { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    pub bind: SocketAddr,
    /// Journal file; `None` keeps every request in memory only.
    pub store_path: Option<PathBuf>,
    pub log_json: bool,
}

impl AdapterConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_var_map(|key| env::var(key).ok())
    }

    pub fn from_env_var_map<F>(mut env_getter: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let bind_raw = non_blank(env_getter(ENV_HTTP_BIND))
            .unwrap_or_else(|| DEFAULT_HTTP_BIND.to_string());
        let bind = bind_raw
            .parse::<SocketAddr>()
            .map_err(|err| ConfigError::InvalidBind {
                key: ENV_HTTP_BIND,
                value: bind_raw.clone(),
                reason: err.to_string(),
            })?;

        let store_path = non_blank(env_getter(ENV_STORE_PATH)).map(PathBuf::from);

        let log_json = match non_blank(env_getter(ENV_LOG_JSON)) {
            Some(v) => parse_bool(ENV_LOG_JSON, &v)?,
            None => false,
        };

        Ok(Self {
            bind,
            store_path,
            log_json,
        })
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: value.to_string(),
        }),
    }
}
