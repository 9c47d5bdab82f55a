use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use tractor::pip::{BatchOptions, Kernel, RegionSource, DEFAULT_EPSILON};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub regions: RegionSource,
    #[serde(default)]
    pub kernel: KernelConfig,
    #[serde(default)]
    pub batch: BatchOptions,
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KernelConfig {
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    #[serde(default = "default_record_id_field")]
    pub id_field: String,
    #[serde(default = "default_latitude_field")]
    pub latitude_field: String,
    #[serde(default = "default_longitude_field")]
    pub longitude_field: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    #[serde(default = "default_output_field")]
    pub field: String,
    #[serde(default)]
    pub match_count_field: Option<String>,
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_record_id_field() -> String {
    "id".to_string()
}

fn default_latitude_field() -> String {
    "latitude".to_string()
}

fn default_longitude_field() -> String {
    "longitude".to_string()
}

fn default_output_field() -> String {
    "census_tract".to_string()
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            id_field: default_record_id_field(),
            latitude_field: default_latitude_field(),
            longitude_field: default_longitude_field(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            field: default_output_field(),
            match_count_field: None,
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path).context("Failed to read config file")?;
        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Defaults for everything except the region file
    pub fn for_regions(path: PathBuf) -> Self {
        Self {
            regions: RegionSource::new(path),
            kernel: KernelConfig::default(),
            batch: BatchOptions::default(),
            input: InputConfig::default(),
            output: OutputConfig::default(),
        }
    }

    pub fn kernel(&self) -> Result<Kernel> {
        Kernel::with_epsilon(self.kernel.epsilon).with_context(|| {
            format!(
                "epsilon must be finite and non-negative, got {}",
                self.kernel.epsilon
            )
        })
    }
}
