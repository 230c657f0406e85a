//! Startup configuration.
//!
//! The converter receives a resolved set of filesystem directories once at
//! startup and treats them as opaque paths: where the report logs live,
//! where replay and ORBAT artifacts go, and optionally where staging files
//! are kept while a conversion runs. Field names match the deployed
//! `config.json` the viewer tooling already ships with.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{ReportError, Result};

/// Resolved directory set for one conversion run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    /// Directory scanned for report log files.
    #[serde(rename = "RptDirectory")]
    pub report_dir: PathBuf,

    /// Destination root for replay artifacts and the viewer list file.
    #[serde(rename = "AARDirectory")]
    pub replay_dir: PathBuf,

    /// Destination for ORBAT artifacts.
    #[serde(rename = "ORBATDirectory")]
    pub orbat_dir: PathBuf,

    /// Where staging files live while a conversion runs. Defaults to the
    /// system temp directory.
    #[serde(default, rename = "StagingDirectory")]
    pub staging_dir: Option<PathBuf>,
}

impl Config {
    /// Load the configuration from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| ReportError::config_error(path, e.to_string()))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| ReportError::config_error(path, e.to_string()))
    }

    /// The staging directory to use for this run.
    pub fn resolve_staging_dir(&self) -> PathBuf {
        self.staging_dir.clone().unwrap_or_else(std::env::temp_dir)
    }
}
