//! Chart package metadata extraction.
//!
//! Packages are gzip-compressed tarballs with a single top-level directory
//! holding `Chart.yaml`. Only the metadata is read; templates and values are
//! left to the installer.

use std::io::Read;
use std::path::Component;

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;
use crate::version::parse_lenient;

const CHART_FILE: &str = "Chart.yaml";

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("unreadable chart archive: {0}")]
    Archive(String),

    #[error("chart archive has no top-level Chart.yaml")]
    MissingChartFile,

    #[error("invalid Chart.yaml: {0}")]
    Invalid(String),
}

impl ChartError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Internal
    }
}

/// Metadata extracted from a chart package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChartMetadata {
    pub name: String,
    pub version: String,
    #[serde(default, rename = "appVersion")]
    pub app_version: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub home: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Turns a package blob into chart metadata.
pub trait ChartParser: Send + Sync {
    fn parse(&self, package: &[u8]) -> Result<ChartMetadata, ChartError>;
}

/// Parser for `.tgz` chart packages.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarballChartParser;

impl ChartParser for TarballChartParser {
    fn parse(&self, package: &[u8]) -> Result<ChartMetadata, ChartError> {
        let mut archive = tar::Archive::new(GzDecoder::new(package));
        let entries = archive
            .entries()
            .map_err(|e| ChartError::Archive(e.to_string()))?;

        for entry in entries {
            let mut entry = entry.map_err(|e| ChartError::Archive(e.to_string()))?;
            let path = entry
                .path()
                .map_err(|e| ChartError::Archive(e.to_string()))?
                .into_owned();
            let parts: Vec<Component<'_>> = path
                .components()
                .filter(|c| !matches!(c, Component::CurDir))
                .collect();
            let is_chart_file = parts.len() == 2
                && matches!(parts[1], Component::Normal(name) if name == CHART_FILE);
            if !is_chart_file {
                continue;
            }

            let mut raw = String::new();
            entry
                .read_to_string(&mut raw)
                .map_err(|e| ChartError::Archive(e.to_string()))?;
            return parse_chart_file(&raw);
        }

        Err(ChartError::MissingChartFile)
    }
}

/// Parse and validate the contents of a `Chart.yaml`.
pub fn parse_chart_file(raw: &str) -> Result<ChartMetadata, ChartError> {
    let meta: ChartMetadata =
        serde_yaml::from_str(raw).map_err(|e| ChartError::Invalid(e.to_string()))?;
    if meta.name.trim().is_empty() {
        return Err(ChartError::Invalid("name is required".into()));
    }
    if parse_lenient(&meta.version).is_none() {
        return Err(ChartError::Invalid(format!(
            "version {:?} is not a semantic version",
            meta.version
        )));
    }
    Ok(meta)
}
