// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/seismoscan-rs

//! Configuration module

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Application name
    pub app_name: String,

    /// Application version
    pub version: String,

    /// Data directory
    pub data_dir: PathBuf,

    /// Log level
    pub log_level: String,

    /// Enable demo mode (synthesized station-day)
    pub demo_mode: bool,

    /// Station configuration
    pub station: StationConfig,

    /// Scan configuration
    pub scan: ScanConfig,

    /// Metric configuration
    pub metrics: MetricsConfig,

    /// Database configuration
    pub database: DatabaseConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_name: "SeismoScan".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            demo_mode: true,
            station: StationConfig::default(),
            scan: ScanConfig::default(),
            metrics: MetricsConfig::default(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Load or create default configuration
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();

            // Create parent directories
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            config.save(path)?;
            Ok(config)
        }
    }

    /// Get configuration directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("seismoscan"))
            .unwrap_or_else(|| PathBuf::from("./config"))
    }

    /// Get default configuration path
    pub fn default_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

/// Station under scan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationConfig {
    /// Network code, e.g. "IU"
    pub network: String,

    /// Station code, e.g. "ANMO"
    pub name: String,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            network: "IU".to_string(),
            name: "ANMO".to_string(),
        }
    }
}

/// Scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Recompute metrics even when input digests are unchanged
    pub force_update: bool,

    /// RNG seed for demo-mode data synthesis
    pub demo_seed: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            force_update: false,
            demo_seed: 2026,
        }
    }
}

/// Metric configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Noise-model deviation metric
    pub nlnm_deviation: NlnmDeviationConfig,

    /// Coherence metric
    pub coherence: CoherenceConfig,
}

/// Noise-model deviation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NlnmDeviationConfig {
    /// Enable the metric
    pub enabled: bool,

    /// Path to the low-noise model table
    pub nlnm_model: PathBuf,

    /// Optional path to the high-noise model table
    pub nhnm_model: Option<PathBuf>,

    /// Power bands in seconds, one metric instance per band
    pub bands: Vec<[f64; 2]>,
}

impl Default for NlnmDeviationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            nlnm_model: PathBuf::from("models/nlnm.asc"),
            nhnm_model: Some(PathBuf::from("models/nhnm.asc")),
            bands: vec![[20.0, 50.0], [50.0, 100.0], [100.0, 200.0]],
        }
    }
}

/// Coherence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoherenceConfig {
    /// Enable the metric
    pub enabled: bool,

    /// Power bands in seconds, one metric instance per band and pair
    pub bands: Vec<[f64; 2]>,

    /// Channel pairs as `"LOC,CODE"` ids
    pub pairs: Vec<[String; 2]>,
}

impl Default for CoherenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bands: vec![[20.0, 50.0]],
            pairs: vec![["00,LHZ".to_string(), "10,LHZ".to_string()]],
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database path
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/seismoscan.db"),
        }
    }
}
