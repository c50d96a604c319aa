use crate::adapter::formats::OutputFormat;
use crate::adapter::mapping::ClassMapping;
use crate::compare::DEFAULT_LINE_TOLERANCE;
use crate::error::{Error, Result};
use crate::taxonomy::VulnerabilityClass;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Looked up in the corpus root when no `--config` is given.
pub const DEFAULT_CONFIG_NAME: &str = "harness.toml";

#[derive(Debug, Default, Deserialize)]
pub struct HarnessConfig {
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub adapter: AdapterConfig,
    #[serde(default)]
    pub mapping: MappingConfig,
}

#[derive(Debug, Deserialize)]
pub struct RunConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Per adapter invocation.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_line_tolerance")]
    pub line_tolerance: u32,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_secs: default_timeout_secs(),
            line_tolerance: default_line_tolerance(),
        }
    }
}

impl RunConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkingDir {
    #[default]
    Corpus,
    Fixture,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdapterConfig {
    pub command: Option<String>,
    #[serde(default = "default_args")]
    pub args: Vec<String>,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default = "default_success_exit_codes")]
    pub success_exit_codes: Vec<i32>,
    #[serde(default)]
    pub working_dir: WorkingDir,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: default_args(),
            format: OutputFormat::default(),
            success_exit_codes: default_success_exit_codes(),
            working_dir: WorkingDir::default(),
        }
    }
}

/// Extra entries layered over the built-in class mapping table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MappingConfig {
    #[serde(default)]
    pub classes: BTreeMap<String, VulnerabilityClass>,
    #[serde(default)]
    pub patterns: Vec<PatternRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatternRule {
    pub pattern: String,
    pub class: VulnerabilityClass,
}

// Defaults
fn default_workers() -> usize {
    4
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_line_tolerance() -> u32 {
    DEFAULT_LINE_TOLERANCE
}
fn default_args() -> Vec<String> {
    vec!["{path}".into()]
}
fn default_success_exit_codes() -> Vec<i32> {
    vec![0]
}

impl HarnessConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config {}: {e}", path.display())))?;
        toml::from_str(&content)
            .map_err(|e| Error::config(format!("Failed to parse config {}: {e}", path.display())))
    }

    /// An explicit path must exist; otherwise `<corpus>/harness.toml` is used
    /// when present, else defaults.
    pub fn resolve(explicit: Option<&Path>, corpus_root: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let implicit: PathBuf = corpus_root.join(DEFAULT_CONFIG_NAME);
        if implicit.is_file() {
            Self::load(&implicit)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.run.workers == 0 {
            return Err(Error::config("workers must be at least 1"));
        }
        if self.run.timeout_secs == 0 {
            return Err(Error::config("timeout must be at least 1 second"));
        }
        if self.adapter.success_exit_codes.is_empty() {
            return Err(Error::config("adapter.success_exit_codes must not be empty"));
        }
        ClassMapping::from_config(&self.mapping)?;
        Ok(())
    }
}
