//! Configuration file management for certprobe.
//!
//! Settings can come from three places, merged with clear precedence:
//!
//! 1. Default values (lowest priority)
//! 2. Configuration file (given with `--config`)
//! 3. Command-line arguments (highest priority)
//!
//! # Example Configuration File
//!
//! ```toml
//! names = ["example.com", "example.org"]
//! domain_file = "domains.txt"
//! output = "script"
//! timeout = 5
//! port = 443
//! concurrency = 32
//! exit_code = 2
//!
//! [prometheus]
//! enabled = true
//! address = "http://localhost:9091"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::report::OutputFormat;
use crate::{ProbeConfig, DEFAULT_PORT, DEFAULT_TIMEOUT};

/// Raw configuration, every field optional so layers can be merged.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Server names to check
    pub names: Option<Vec<String>>,
    /// Domain list read before `names`
    pub domain_file: Option<PathBuf>,
    /// Output format: verbose, script, json, table
    pub output: Option<String>,
    /// Dial timeout in seconds
    pub timeout: Option<u64>,
    /// Port dialed on every server
    pub port: Option<u16>,
    /// Extra PEM roots to trust
    pub ca_file: Option<PathBuf>,
    /// Maximum number of concurrent probes, 0 for unbounded
    pub concurrency: Option<usize>,
    /// Exit code used when any server is not valid
    pub exit_code: Option<i32>,
    /// Prometheus configuration
    pub prometheus: Option<PrometheusConfig>,
}

/// Prometheus Push Gateway settings.
#[derive(Debug, Default, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Enable pushing metrics
    pub enabled: Option<bool>,
    /// Push gateway address (e.g., "http://localhost:9091")
    pub address: Option<String>,
}

/// Fully resolved settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub names: Vec<String>,
    pub domain_file: Option<PathBuf>,
    pub output: OutputFormat,
    pub probe: ProbeConfig,
    pub exit_code: i32,
    /// Push gateway address when metrics are enabled
    pub prometheus: Option<String>,
}

impl Config {
    /// Loads configuration from a TOML file.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use certprobe::config::Config;
    /// let config = Config::from_file("certprobe.toml")?;
    /// # Ok::<(), certprobe::config::ConfigError>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;

        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        Ok(config)
    }

    /// Built-in defaults: verbose output, 5 second timeout, port 443,
    /// unbounded concurrency, exit code 0 and metrics disabled.
    pub fn defaults() -> Self {
        Config {
            names: None,
            domain_file: None,
            output: Some(OutputFormat::Verbose.to_string()),
            timeout: Some(DEFAULT_TIMEOUT.as_secs()),
            port: Some(DEFAULT_PORT),
            ca_file: None,
            concurrency: Some(0),
            exit_code: Some(0),
            prometheus: Some(PrometheusConfig {
                enabled: Some(false),
                address: Some("http://localhost:9091".to_string()),
            }),
        }
    }

    /// Merges this configuration with another, prioritizing the other's
    /// values wherever they are set.
    pub fn merge_with(mut self, other: Config) -> Self {
        if other.names.is_some() {
            self.names = other.names;
        }
        if other.domain_file.is_some() {
            self.domain_file = other.domain_file;
        }
        if other.output.is_some() {
            self.output = other.output;
        }
        if other.timeout.is_some() {
            self.timeout = other.timeout;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
        if other.ca_file.is_some() {
            self.ca_file = other.ca_file;
        }
        if other.concurrency.is_some() {
            self.concurrency = other.concurrency;
        }
        if other.exit_code.is_some() {
            self.exit_code = other.exit_code;
        }
        if let Some(other_prom) = other.prometheus {
            if let Some(ref mut self_prom) = self.prometheus {
                if other_prom.enabled.is_some() {
                    self_prom.enabled = other_prom.enabled;
                }
                if other_prom.address.is_some() {
                    self_prom.address = other_prom.address;
                }
            } else {
                self.prometheus = Some(other_prom);
            }
        }
        self
    }

    /// Validates the merged configuration and turns it into [`Settings`].
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let output = match self.output {
            Some(output) => OutputFormat::from_str(&output).map_err(|_| {
                ConfigError::Validation(format!(
                    "unknown output format '{}', expected verbose, script, json or table",
                    output
                ))
            })?,
            None => OutputFormat::default(),
        };

        let timeout = match self.timeout {
            Some(0) => {
                return Err(ConfigError::Validation(
                    "timeout must be at least 1 second".to_string(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_TIMEOUT,
        };

        let port = match self.port {
            Some(0) => return Err(ConfigError::Validation("port cannot be 0".to_string())),
            Some(port) => port,
            None => DEFAULT_PORT,
        };

        let prometheus = match self.prometheus {
            Some(PrometheusConfig {
                enabled: Some(true),
                address,
            }) => Some(address.ok_or_else(|| {
                ConfigError::Validation(
                    "prometheus is enabled but no address is configured".to_string(),
                )
            })?),
            _ => None,
        };

        Ok(Settings {
            names: self.names.unwrap_or_default(),
            domain_file: self.domain_file,
            output,
            probe: ProbeConfig {
                timeout,
                port,
                ca_file: self.ca_file,
                concurrency: self.concurrency.filter(|limit| *limit > 0),
            },
            exit_code: self.exit_code.unwrap_or(0),
            prometheus,
        })
    }

    /// Sample configuration with every option set, in TOML.
    pub fn example_toml() -> String {
        let example = Config {
            names: Some(vec!["example.com".to_string(), "example.org".to_string()]),
            domain_file: Some(PathBuf::from("domains.txt")),
            output: Some("script".to_string()),
            timeout: Some(5),
            port: Some(443),
            ca_file: Some(PathBuf::from("/etc/ssl/private-ca.pem")),
            concurrency: Some(32),
            exit_code: Some(2),
            prometheus: Some(PrometheusConfig {
                enabled: Some(true),
                address: Some("http://localhost:9091".to_string()),
            }),
        };

        toml::to_string_pretty(&example)
            .unwrap_or_else(|_| "# Error generating example".to_string())
    }
}

/// Errors that can occur during configuration loading and parsing.
#[derive(Debug)]
pub enum ConfigError {
    /// I/O error (file not found, permission denied, etc.)
    Io(String),
    /// TOML parsing error (invalid syntax, type mismatch, etc.)
    Parse(String),
    /// Validation error (invalid values)
    Validation(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "IO Error: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Parse Error: {}", msg),
            ConfigError::Validation(msg) => write!(f, "Validation Error: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
