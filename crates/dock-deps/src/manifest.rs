//! Plugin and environment manifest handling
//!
//! Plugins declare themselves in a `pyproject.toml` carrying a
//! `[plugin-metadata]` table plus the standard `[project]` section whose
//! `dependencies` array feeds the collector. Environments get a
//! generated manifest that pins the resolved dependency set.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::{Error, Result};

/// Manifest file name inside both plugin and environment directories.
pub const MANIFEST_FILE: &str = "pyproject.toml";

/// `[plugin-metadata]` table of a plugin manifest.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PluginMetadata {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default = "default_icon")]
    pub icon: String,
    #[serde(default = "default_entry_point")]
    pub entry_point: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_icon() -> String {
    "\u{1F4E6}".to_string()
}

fn default_entry_point() -> String {
    "main.py".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProjectSection {
    #[serde(default)]
    description: String,
    #[serde(default)]
    dependencies: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    #[serde(rename = "plugin-metadata")]
    plugin_metadata: Option<PluginMetadata>,
    #[serde(default)]
    project: Option<ProjectSection>,
}

/// Parsed plugin manifest.
///
/// `metadata` is `None` for manifests without a `[plugin-metadata]`
/// table; the dependency collector accepts those, the registry does not.
#[derive(Debug, Clone)]
pub struct PluginManifest {
    pub metadata: Option<PluginMetadata>,
    pub description: String,
    pub dependencies: Vec<String>,
}

impl PluginManifest {
    /// Load the manifest from a plugin directory.
    ///
    /// A missing file is reported as `ManifestInvalid` with a "missing"
    /// message only by callers that require it; here it is an error the
    /// caller can branch on via `exists`.
    pub fn load(plugin_dir: &Path) -> Result<Self> {
        let path = plugin_dir.join(MANIFEST_FILE);
        let content = dock_fs::read_text(&path)?;
        let raw: RawManifest = toml::from_str(&content).map_err(|e| Error::ManifestInvalid {
            path: path.clone(),
            message: e.to_string(),
        })?;

        let project = raw.project.unwrap_or_default();
        Ok(Self {
            metadata: raw.plugin_metadata,
            description: project.description,
            dependencies: project.dependencies,
        })
    }

    /// Whether a plugin directory carries a manifest file at all.
    pub fn exists(plugin_dir: &Path) -> bool {
        plugin_dir.join(MANIFEST_FILE).is_file()
    }
}

/// Generate the environment manifest content for a resolved dependency
/// set. Ordering is the map's (sorted) ordering, so output is
/// deterministic for a given set.
pub fn environment_manifest(resolved: &BTreeMap<String, String>) -> String {
    let mut dependencies = String::new();
    for (package, specifier) in resolved {
        dependencies.push_str(&format!("    \"{package}{specifier}\",\n"));
    }

    format!(
        r#"[build-system]
requires = ["hatchling"]
build-backend = "hatchling.build"

[project]
name = "resolved-dependencies"
version = "1.0.0"
description = "Resolved dependencies for plugin environment"
requires-python = ">=3.11"
dependencies = [
{dependencies}]

[tool.hatch.build.targets.wheel]
packages = ["."]
"#
    )
}
