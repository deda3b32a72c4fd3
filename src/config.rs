//! Runtime configuration.
//!
//! Values are layered: built-in defaults, then the TOML file named by
//! `FILMORATE_CONFIG`, then the `FILMORATE_BIND`, `FILMORATE_DB_PATH` and
//! `FILMORATE_LOG` environment variables.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

pub const CONFIG_ENV: &str = "FILMORATE_CONFIG";
pub const BIND_ENV: &str = "FILMORATE_BIND";
pub const DB_PATH_ENV: &str = "FILMORATE_DB_PATH";
pub const LOG_ENV: &str = "FILMORATE_LOG";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Address the HTTP server listens on.
    pub bind: String,
    /// Directory of the sled database. Without one the database is temporary.
    pub db_path: Option<PathBuf>,
    pub flush_every_ms: Option<u64>,
    /// Default logger filter, `RUST_LOG` still takes precedence.
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: "127.0.0.1:8080".to_owned(),
            db_path: None,
            flush_every_ms: Some(500),
            log_filter: "filmorate=debug,actix_web=info".to_owned(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Config> {
        Config::from_sources(|name| std::env::var(name).ok())
    }

    pub fn from_sources<F: Fn(&str) -> Option<String>>(env: F) -> Result<Config> {
        let mut config = match env(CONFIG_ENV) {
            Some(path) => {
                let content = std::fs::read_to_string(&path)
                    .map_err(|e| Error::Config(format!("cannot read {}: {}", path, e)))?;
                Config::from_toml(&content)?
            }
            None => Config::default(),
        };
        if let Some(bind) = env(BIND_ENV) {
            config.bind = bind;
        }
        if let Some(path) = env(DB_PATH_ENV) {
            config.db_path = Some(PathBuf::from(path));
        }
        if let Some(filter) = env(LOG_ENV) {
            config.log_filter = filter;
        }
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Config> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }
}
