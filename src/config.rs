use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PipelineError, Result};

/// Tag for the loader registry. Unknown tags fail at deserialization, which
/// surfaces as a configuration error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoaderType {
    Csv,
    Parquet,
    Sqlite,
}

impl LoaderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoaderType::Csv => "csv",
            LoaderType::Parquet => "parquet",
            LoaderType::Sqlite => "sqlite",
        }
    }
}

/// Tag for the source-parser registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetType {
    TennisMatch,
}

impl DatasetType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetType::TennisMatch => "tennis_match",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_encoding")]
    pub encoding: String,
    /// Explicit column names for headerless files. When set, every data row
    /// is read as data and these names become the header.
    #[serde(default)]
    pub header: Option<Vec<String>>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            encoding: default_encoding(),
            header: None,
        }
    }
}

fn default_delimiter() -> char {
    ','
}

fn default_encoding() -> String {
    "utf-8".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub loader_type: LoaderType,
    pub dataset_type: DatasetType,
    pub dataset_path: PathBuf,
    /// Output location for the processed feature table.
    pub path: PathBuf,
    #[serde(default)]
    pub required_columns: Vec<String>,
    #[serde(default)]
    pub file_config: FileConfig,
    #[serde(default)]
    pub column_mapping: HashMap<String, String>,
    /// Randomizer seed. Absent means seed from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_true")]
    pub use_cache: bool,
}

fn default_true() -> bool {
    true
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|err| {
            PipelineError::Config(format!("cannot read config {}: {err}", path.display()))
        })?;
        let mut config: PipelineConfig = serde_json::from_str(&raw)
            .map_err(|err| PipelineError::Config(format!("invalid config: {err}")))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Environment overrides, applied after file parsing.
    pub fn apply_env(&mut self) {
        if let Some(seed) = std::env::var("APP_SEED")
            .ok()
            .and_then(|raw| raw.trim().parse::<u64>().ok())
        {
            self.seed = Some(seed);
        }
        if std::env::var("APP_NO_CACHE").is_ok_and(|raw| raw.trim() == "1") {
            self.use_cache = false;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.dataset_path.as_os_str().is_empty() {
            return Err(PipelineError::Config("dataset_path is empty".to_string()));
        }
        if self.path.as_os_str().is_empty() {
            return Err(PipelineError::Config("output path is empty".to_string()));
        }
        let encoding = self.file_config.encoding.to_ascii_lowercase();
        if encoding != "utf-8" && encoding != "utf8" {
            return Err(PipelineError::Config(format!(
                "unsupported encoding: {}",
                self.file_config.encoding
            )));
        }
        Ok(())
    }
}
