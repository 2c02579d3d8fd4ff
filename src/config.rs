//! Layered service configuration.
//!
//! Sources, later ones winning:
//! - built-in defaults (`Config::default()`)
//! - `config.toml` in the working directory, when present
//! - environment variables prefixed `BANQUETTE_`, sections split by `__`
//!   (e.g. `BANQUETTE_STORE__SECRET_KEY`)

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config.toml";
pub const ENV_PREFIX: &str = "BANQUETTE_";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub basic: BasicConfig,
    pub store: StoreConfig,
    pub target: TargetConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    pub listen_addr: String,
    pub loglevel: String,
    /// When set, every route requires this key.
    pub api_key: Option<String>,
    /// Budget for one whole create/drop flow.
    pub request_timeout_secs: u64,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8000".to_string(),
            loglevel: "info".to_string(),
            api_key: None,
            request_timeout_secs: 30,
        }
    }
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Process-wide passphrase the stored secrets are encrypted under.
    /// Changing it makes every previously stored secret unreadable.
    pub secret_key: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:banquette.sqlite".to_string(),
            max_connections: 5,
            secret_key: String::new(),
        }
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("database_url", &self.database_url)
            .field("max_connections", &self.max_connections)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    pub kind: String,
    pub default_port: u16,
    pub connect_timeout_secs: u64,
    /// Directory on the target host under which each account's tablespace is created.
    pub tablespace_root: String,
    pub granted_role: String,
    /// Connection limit applied to every new login; `-1` is unlimited.
    pub connection_limit: i32,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            kind: "postgres".to_string(),
            default_port: 5432,
            connect_timeout_secs: 10,
            tablespace_root: "/var/lib/postgresql/tablespaces".to_string(),
            granted_role: "app_users".to_string(),
            connection_limit: -1,
        }
    }
}

impl Config {
    pub fn figment() -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn load() -> Result<Self, figment::Error> {
        Self::figment().extract()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.basic.request_timeout_secs)
    }
}

impl TargetConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}
