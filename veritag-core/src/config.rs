//! Configuration system for Veritag.
//!
//! Uses `figment` for layered configuration: defaults -> config file ->
//! environment. Environment variables are prefixed with `VERITAG_` and
//! nested with `__` (e.g. `VERITAG_SERVER__PORT=9090`).

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::ConfigError;

/// Top-level configuration for the Veritag service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VeritagConfig {
    pub server: ServerConfig,
    pub codec: CodecConfig,
    pub anomaly: AnomalyConfig,
    pub alerting: AlertingConfig,
}

/// HTTP server binding configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// QR codec key material.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodecConfig {
    /// Base64-encoded 32-byte AES-256-GCM secret. When unset, the server
    /// generates an ephemeral key at startup (codes issued under it do not
    /// survive a restart).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,
}

/// Bounds for the scan-history anomaly window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnomalyConfig {
    /// How many recent scans to fetch for anomaly detection.
    pub history_window: usize,
    /// Hard upper bound on the window regardless of configuration.
    pub max_history_window: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        // The window must exceed the daily scan limit of the frequency
        // check, or scans above that limit are never fetched and the
        // daily rule cannot fire.
        Self {
            history_window: 100,
            max_history_window: 100,
        }
    }
}

impl AnomalyConfig {
    /// The effective window size after applying the hard cap.
    pub fn effective_window(&self) -> usize {
        self.history_window.min(self.max_history_window)
    }
}

/// Thresholds for the supplier alerting agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertingConfig {
    /// Minimum verifications observed before a supplier can alert.
    pub min_sample: usize,
    /// Suspicious-or-worse rate above which an alert fires.
    pub suspicious_rate_threshold: f64,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            min_sample: 20,
            suspicious_rate_threshold: 0.25,
        }
    }
}

/// Load configuration from defaults, an optional TOML file, and the
/// environment, in increasing precedence.
pub fn load_config(config_path: Option<&Path>) -> Result<VeritagConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(VeritagConfig::default()));

    if let Some(path) = config_path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("VERITAG_").split("__"));

    let config: VeritagConfig = figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &VeritagConfig) -> Result<(), ConfigError> {
    if config.anomaly.history_window == 0 {
        return Err(ConfigError::Invalid {
            message: "anomaly.history_window must be at least 1".into(),
        });
    }
    if !(0.0..=1.0).contains(&config.alerting.suspicious_rate_threshold) {
        return Err(ConfigError::Invalid {
            message: "alerting.suspicious_rate_threshold must be within [0, 1]".into(),
        });
    }
    Ok(())
}
