//! Server configuration
//!
//! Loaded in three steps: a TOML file (optional), then `DS_`-prefixed
//! environment variables on top, then validation. Environment keys map onto
//! dotted config keys: `DS_SERVER_ROOT_KEY` sets `server.root_key`.

use datastore_auth::{AccountKeys, AuthError, RootSecret};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::info;

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "DS_";

/// Minimum root key length in bytes
pub const MIN_ROOT_KEY_LEN: usize = 32;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading a file failed
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that could not be read
        path: PathBuf,
        /// Underlying error
        source: std::io::Error,
    },

    /// The config file is not valid TOML for this schema
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is missing or out of range
    #[error("Invalid value for {key}: {message}")]
    Invalid {
        /// Dotted config key
        key: String,
        /// What is wrong with it
        message: String,
    },

    /// Key material could not be decoded
    #[error(transparent)]
    Key(#[from] AuthError),
}

impl ConfigError {
    fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}

/// `[server]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address to bind
    pub bind_address: String,
    /// Port to listen on
    pub port: u16,
    /// Location tag written into minted tokens
    pub endpoint: String,
    /// Trace every HTTP request
    pub tracing: bool,
    /// Hex-encoded root secret
    pub root_key: String,
    /// Hex-encoded 32-byte seed of the server account
    pub account_seed: String,
    /// File listing identities allowed to register, one per line
    pub participant_file: Option<PathBuf>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            endpoint: "localhost".to_string(),
            tracing: false,
            root_key: String::new(),
            account_seed: String::new(),
            participant_file: None,
        }
    }
}

/// `[log]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// Filter directive for the subscriber, e.g. `info` or `datastore_auth=debug`
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Complete server configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP and key material settings
    pub server: ServerSection,
    /// Logging settings
    pub log: LogSection,
}

impl ServerConfig {
    /// Load from `path` if it exists, overlay the environment, and validate
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) if path.exists() => Self::load_from_file(path)?,
            _ => {
                info!("No config file, reading configuration from environment");
                Self::default()
            }
        };
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Overlay `DS_*` process environment variables
    pub fn merge_with_env(&mut self) -> Result<(), ConfigError> {
        self.merge_vars(std::env::vars())
    }

    /// Overlay `DS_*` variables from an arbitrary source
    pub fn merge_vars<I>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(stripped) = name.strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let lowered = stripped.to_ascii_lowercase();
            let Some((section, field)) = lowered.split_once('_') else {
                continue;
            };
            self.set_from_string(&format!("{section}.{field}"), &value)?;
        }
        Ok(())
    }

    /// Set one dotted key from its string form
    pub fn set_from_string(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "server.bind_address" => self.server.bind_address = value.to_string(),
            "server.port" => {
                self.server.port = value
                    .parse()
                    .map_err(|e| ConfigError::invalid(key, format!("{e}")))?;
            }
            "server.endpoint" => self.server.endpoint = value.to_string(),
            "server.tracing" => {
                self.server.tracing = value
                    .parse()
                    .map_err(|e| ConfigError::invalid(key, format!("{e}")))?;
            }
            "server.root_key" => self.server.root_key = value.to_string(),
            "server.account_seed" => self.server.account_seed = value.to_string(),
            "server.participant_file" => {
                self.server.participant_file =
                    (!value.is_empty()).then(|| PathBuf::from(value));
            }
            "log.level" => self.log.level = value.to_string(),
            // Unknown DS_* variables belong to other components
            _ => {}
        }
        Ok(())
    }

    /// Check that the configuration can start a server
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.endpoint.trim().is_empty() {
            return Err(ConfigError::invalid("server.endpoint", "must not be empty"));
        }
        let secret = self.root_secret()?;
        if secret.len() < MIN_ROOT_KEY_LEN {
            return Err(ConfigError::invalid(
                "server.root_key",
                format!(
                    "expected at least {MIN_ROOT_KEY_LEN} bytes, got {}",
                    secret.len()
                ),
            ));
        }
        self.account_keys()?;
        self.socket_addr()?;
        Ok(())
    }

    /// Root secret for the minter and the gate
    pub fn root_secret(&self) -> Result<RootSecret, ConfigError> {
        Ok(RootSecret::from_hex(&self.server.root_key)?)
    }

    /// Server account keys
    pub fn account_keys(&self) -> Result<AccountKeys, ConfigError> {
        Ok(AccountKeys::from_hex_seed(&self.server.account_seed)?)
    }

    /// Listen address
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .server
            .bind_address
            .parse()
            .map_err(|e| ConfigError::invalid("server.bind_address", format!("{e}")))?;
        Ok(SocketAddr::new(ip, self.server.port))
    }

    /// Identities allowed to register, if restricted
    ///
    /// Blank lines and lines starting with `#` are ignored.
    pub fn participants(&self) -> Result<Option<HashSet<String>>, ConfigError> {
        let Some(path) = &self.server.participant_file else {
            return Ok(None);
        };
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Some(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(str::to_string)
                .collect(),
        ))
    }
}
