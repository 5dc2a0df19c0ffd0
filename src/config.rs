use crate::error::{PipelineError, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    pub data_root: PathBuf,
    pub http: HttpConfig,
    pub sources: SourcesConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_seconds: u64,
}

/// URLs for the four raw permit CSVs published by the city's data portal.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub set1_active: String,
    pub set1_closed: String,
    pub set2_active: String,
    pub set2_closed: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            data_root: PathBuf::from("data"),
            http: HttpConfig::default(),
            sources: SourcesConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            timeout_seconds: 300,
        }
    }
}

impl Default for SourcesConfig {
    fn default() -> Self {
        SourcesConfig {
            set1_active: "https://seshat.datasd.org/development_permits_set1/permits_set1_active_datasd.csv".to_string(),
            set1_closed: "https://seshat.datasd.org/development_permits_set1/permits_set1_closed_datasd.csv".to_string(),
            set2_active: "https://seshat.datasd.org/development_permits_set2/permits_set2_active_datasd.csv".to_string(),
            set2_closed: "https://seshat.datasd.org/development_permits_set2/permits_set2_closed_datasd.csv".to_string(),
        }
    }
}

impl Config {
    /// Load `config.toml` from the working directory, falling back to the
    /// compiled-in defaults when the file is absent.
    pub fn load() -> Result<Self> {
        let config_path = "config.toml";
        if !Path::new(config_path).exists() {
            return Ok(Config::default());
        }
        let config_content = fs::read_to_string(config_path).map_err(|e| {
            PipelineError::Config(format!(
                "Failed to read config file '{config_path}': {e}"
            ))
        })?;

        let config: Config = toml::from_str(&config_content)?;
        Ok(config)
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.data_root.join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_root.join("processed")
    }

    pub fn aggregated_dir(&self) -> PathBuf {
        self.data_root.join("aggregated")
    }

    /// (source name, url) pairs in load order.
    pub fn source_urls(&self) -> Vec<(&'static str, &str)> {
        vec![
            (crate::constants::SET1_ACTIVE, self.sources.set1_active.as_str()),
            (crate::constants::SET1_CLOSED, self.sources.set1_closed.as_str()),
            (crate::constants::SET2_ACTIVE, self.sources.set2_active.as_str()),
            (crate::constants::SET2_CLOSED, self.sources.set2_closed.as_str()),
        ]
    }
}
