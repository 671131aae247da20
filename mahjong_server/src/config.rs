// Server configuration.
//
// `ServerConfig` is loaded from an optional JSON file (`--config`) and then
// overridden by command-line flags in `main.rs`. Every field has a default,
// so an empty object or a partial file is valid: omitted fields keep the
// values from `ServerConfig::default()`, including the nested point rules.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ServerError;
use crate::scoring::Rules;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 1246;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to listen on.
    pub host: String,
    /// TCP port; 0 lets the OS pick one (used by tests).
    pub port: u16,
    pub rules: Rules,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.into(),
            port: DEFAULT_PORT,
            rules: Rules::default(),
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ServerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `host:port`, suitable for `TcpListener::bind`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
