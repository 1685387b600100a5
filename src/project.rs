// src/project.rs

//! Project descriptor
//!
//! A `metapack.json` at the project root declares the package directories
//! and which of them is the default root for resolution and conversion
//! targets.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Descriptor file name at the project root
pub const PROJECT_FILE: &str = "metapack.json";

/// One declared package directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageDirectory {
    pub path: PathBuf,
    #[serde(default)]
    pub default: bool,
}

/// Parsed project descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    pub package_directories: Vec<PackageDirectory>,
    /// Overrides the registry's api version for generated manifests
    #[serde(default)]
    pub source_api_version: Option<String>,
}

impl ProjectConfig {
    /// Load the descriptor from a project root directory
    pub fn from_root(root: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(root.join(PROJECT_FILE))?;
        Self::parse(&content)
    }

    /// Parse descriptor JSON
    pub fn parse(content: &str) -> Result<Self> {
        let config: ProjectConfig = serde_json::from_str(content)
            .map_err(|e| Error::ManifestParse(format!("{PROJECT_FILE}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.package_directories.is_empty() {
            return Err(Error::ManifestParse(format!(
                "{PROJECT_FILE}: no package directories declared"
            )));
        }
        Ok(())
    }

    /// The default package directory: the one flagged `default`, or the
    /// only one declared
    pub fn default_package_directory(&self) -> &PackageDirectory {
        self.package_directories
            .iter()
            .find(|d| d.default)
            .unwrap_or(&self.package_directories[0])
    }
}
