//! Configuration management for imgderive

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::error::{Result, DerivativeError};

pub mod profiles;
pub use profiles::*;

/// Main configuration structure
///
/// Built once at startup and shared read-only with the batch runner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Source and output locations
    pub paths: PathConfig,

    /// Sizing tables per profile
    pub profiles: ProfileTables,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Filesystem layout consumed by the profiles
///
/// The output subdirectories must exist before a run; they are emptied,
/// never created.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Root that source arguments are resolved against
    pub source_root: PathBuf,

    /// Root of the per-profile output directories
    pub output_root: PathBuf,

    pub lifestyle: String,
    pub slide: String,
    pub product: String,
    pub swatch: String,
    pub resize: String,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            source_root: PathBuf::from("./src-images"),
            output_root: PathBuf::from("./output-images"),
            lifestyle: "lifestyle".to_string(),
            slide: "slide".to_string(),
            product: "product".to_string(),
            swatch: "swatch".to_string(),
            resize: "resize".to_string(),
        }
    }
}

impl PathConfig {
    /// Layout rooted at the given source and output directories
    pub fn rooted<S: Into<PathBuf>, O: Into<PathBuf>>(source_root: S, output_root: O) -> Self {
        Self {
            source_root: source_root.into(),
            output_root: output_root.into(),
            ..Default::default()
        }
    }

    pub fn lifestyle_dir(&self) -> PathBuf {
        self.output_root.join(&self.lifestyle)
    }

    /// Shared by `slide` and `slide3`
    pub fn slide_dir(&self) -> PathBuf {
        self.output_root.join(&self.slide)
    }

    pub fn product_dir(&self, width: u32) -> PathBuf {
        self.output_root.join(&self.product).join(width.to_string())
    }

    pub fn swatch_dir(&self) -> PathBuf {
        self.output_root.join(&self.swatch)
    }

    pub fn resize_dir(&self) -> PathBuf {
        self.output_root.join(&self.resize)
    }

    fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("lifestyle", &self.lifestyle),
            ("slide", &self.slide),
            ("product", &self.product),
            ("swatch", &self.swatch),
            ("resize", &self.resize),
        ] {
            if value.is_empty() || Path::new(value).is_absolute() || value.contains("..") {
                return Err(DerivativeError::config(format!(
                    "paths.{} must be a relative directory name, got {:?}",
                    key, value
                )));
            }
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// Enable JSON logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .map_err(|e| DerivativeError::config(
                format!("Failed to read config file {:?}: {}", path.as_ref(), e)
            ))?;

        let extension = path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        match extension.to_lowercase().as_str() {
            "toml" => toml::from_str(&content).map_err(Into::into),
            "yaml" | "yml" => serde_yaml::from_str(&content).map_err(Into::into),
            _ => Err(DerivativeError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        }
    }

    /// Save configuration to file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let extension = path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        let content = match extension.to_lowercase().as_str() {
            "toml" => toml::to_string_pretty(self)
                .map_err(|e| DerivativeError::config(format!("TOML serialization failed: {}", e)))?,
            "yaml" | "yml" => serde_yaml::to_string(self)
                .map_err(|e| DerivativeError::config(format!("YAML serialization failed: {}", e)))?,
            _ => return Err(DerivativeError::config(
                "Unsupported config file format. Use .toml or .yaml"
            )),
        };

        std::fs::write(&path, content)
            .map_err(|e| DerivativeError::config(
                format!("Failed to write config file {:?}: {}", path.as_ref(), e)
            ))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.paths.validate()?;
        self.profiles.validate()
    }
}
