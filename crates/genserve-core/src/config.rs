use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming a TOML config file.
pub const CONFIG_ENV: &str = "GENSERVE_CONFIG";
pub const PORT_ENV: &str = "GENSERVE_PORT";
pub const CODE_PATH_ENV: &str = "GENSERVE_CODE_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {var}: {value}")]
    Env { var: &'static str, value: String },
    #[error("invalid listen address {0}")]
    Address(String),
}

/// What happens when a loaded entry point has an unrecognized shape.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BadShapePolicy {
    /// Fail the specialization attempt; the container stays generic.
    #[default]
    Reject,
    /// Terminate the process so the orchestrator replaces the container.
    Abort,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub threads: usize,
    /// Pre-provisioned location read by `/specialize`.
    pub code_path: PathBuf,
    /// Entry point used when a request names none.
    pub entry_point: String,
    pub bad_shape_policy: BadShapePolicy,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8888,
            threads: num_cpus::get(),
            code_path: PathBuf::from("/userfunc/user"),
            entry_point: "Handler".to_string(),
            bad_shape_policy: BadShapePolicy::Reject,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    /// Loads `$GENSERVE_CONFIG` (or defaults) and applies per-field overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_overrides(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    /// Applies overrides from `lookup`, which maps a variable name to its value.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        if let Some(port) = lookup(PORT_ENV) {
            self.port = port
                .parse()
                .map_err(|_| ConfigError::Env { var: PORT_ENV, value: port })?;
        }
        if let Some(path) = lookup(CODE_PATH_ENV) {
            self.code_path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|_| ConfigError::Address(self.host.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }
}
