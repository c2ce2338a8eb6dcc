//! Plugin registry
//!
//! Discovers plugin bundles by scanning the plugins directory and tracks
//! per-plugin runtime status. Directories without a valid manifest are
//! skipped with a warning; a scan never fails as a whole because one
//! bundle is broken.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use dock_config::PluginRecord;
use dock_deps::PluginManifest;
use tracing::{info, warn};

use crate::descriptor::{PluginDescriptor, PluginStatus};

/// Scan a plugins directory into descriptors.
///
/// Each immediate subdirectory must carry a manifest with a
/// `[plugin-metadata]` table declaring at least a name. Duplicate names
/// are rejected after the first occurrence.
pub fn scan_plugins(plugins_root: &Path) -> Vec<PluginDescriptor> {
    let mut descriptors = Vec::new();
    let mut seen_names: HashSet<String> = HashSet::new();

    let Ok(entries) = std::fs::read_dir(plugins_root) else {
        warn!(dir = %plugins_root.display(), "plugins directory not readable");
        return descriptors;
    };

    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .map(|e| e.path())
        .collect();
    dirs.sort();

    for dir in dirs {
        let dir_name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !PluginManifest::exists(&dir) {
            warn!(plugin = %dir_name, "skipping: no manifest file");
            continue;
        }

        let manifest = match PluginManifest::load(&dir) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(plugin = %dir_name, error = %e, "skipping: unreadable manifest");
                continue;
            }
        };

        let Some(metadata) = manifest.metadata else {
            warn!(plugin = %dir_name, "skipping: manifest has no plugin metadata");
            continue;
        };

        if !seen_names.insert(metadata.name.clone()) {
            warn!(
                plugin = %metadata.name,
                dir = %dir_name,
                "skipping: duplicate plugin name"
            );
            continue;
        }

        descriptors.push(PluginDescriptor {
            name: metadata.name,
            version: metadata.version,
            author: metadata.author,
            icon: metadata.icon,
            entry_point: metadata.entry_point,
            path: dir,
            status: PluginStatus::Stopped,
            description: manifest.description,
        });
    }

    info!(count = descriptors.len(), "plugin scan complete");
    descriptors
}

/// In-memory descriptor table, keyed by plugin name.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<PluginDescriptor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the table with a fresh scan, preserving the status of
    /// plugins that survive the rescan.
    pub fn rescan(&mut self, plugins_root: &Path) -> Vec<PluginDescriptor> {
        let mut scanned = scan_plugins(plugins_root);
        for descriptor in &mut scanned {
            if let Some(existing) = self.get(&descriptor.name) {
                descriptor.status = existing.status;
            }
        }
        self.plugins = scanned;
        self.descriptors()
    }

    pub fn get(&self, name: &str) -> Option<&PluginDescriptor> {
        self.plugins.iter().find(|p| p.name == name)
    }

    pub fn descriptors(&self) -> Vec<PluginDescriptor> {
        self.plugins.clone()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Reflect a status transition onto the descriptor.
    pub fn update_status(&mut self, name: &str, status: PluginStatus) -> bool {
        match self.plugins.iter_mut().find(|p| p.name == name) {
            Some(plugin) => {
                let old = plugin.status;
                plugin.status = status;
                info!(plugin = name, from = %old, to = %status, "plugin status changed");
                true
            }
            None => {
                warn!(plugin = name, to = %status, "status update for unknown plugin");
                false
            }
        }
    }

    pub fn status(&self, name: &str) -> Option<PluginStatus> {
        self.get(name).map(|p| p.status)
    }

    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.plugins.len();
        self.plugins.retain(|p| p.name != name);
        self.plugins.len() != before
    }

    /// Persisted form for the config store.
    pub fn to_records(&self) -> Vec<PluginRecord> {
        self.plugins
            .iter()
            .map(|p| PluginRecord {
                name: p.name.clone(),
                version: p.version.clone(),
                path: p.path.to_string_lossy().into_owned(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn add_plugin_dir(root: &Path, dir: &str, manifest: Option<&str>) {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).unwrap();
        if let Some(content) = manifest {
            std::fs::write(path.join("pyproject.toml"), content).unwrap();
        }
    }

    fn valid_manifest(name: &str) -> String {
        format!(
            "[plugin-metadata]\nname = \"{name}\"\nversion = \"2.0.0\"\nauthor = \"someone\"\n\n[project]\ndescription = \"demo plugin\"\n"
        )
    }

    #[test]
    fn scan_skips_invalid_directories() {
        let temp = TempDir::new().unwrap();
        add_plugin_dir(temp.path(), "good", Some(&valid_manifest("good")));
        add_plugin_dir(temp.path(), "no-manifest", None);
        add_plugin_dir(temp.path(), "broken-toml", Some("[plugin-metadata\nname="));
        add_plugin_dir(
            temp.path(),
            "no-metadata",
            Some("[project]\ndescription = \"x\"\n"),
        );

        let descriptors = scan_plugins(temp.path());
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "good");
        assert_eq!(descriptors[0].version, "2.0.0");
        assert_eq!(descriptors[0].status, PluginStatus::Stopped);
        assert_eq!(descriptors[0].description, "demo plugin");
    }

    #[test]
    fn scan_rejects_duplicate_names_after_first() {
        let temp = TempDir::new().unwrap();
        add_plugin_dir(temp.path(), "a-dir", Some(&valid_manifest("dup")));
        add_plugin_dir(temp.path(), "b-dir", Some(&valid_manifest("dup")));

        let descriptors = scan_plugins(temp.path());
        assert_eq!(descriptors.len(), 1);
        assert!(descriptors[0].path.ends_with("a-dir"));
    }

    #[test]
    fn rescan_preserves_known_status() {
        let temp = TempDir::new().unwrap();
        add_plugin_dir(temp.path(), "keeper", Some(&valid_manifest("keeper")));

        let mut registry = PluginRegistry::new();
        registry.rescan(temp.path());
        registry.update_status("keeper", PluginStatus::Running);

        registry.rescan(temp.path());
        assert_eq!(registry.status("keeper"), Some(PluginStatus::Running));
    }

    #[test]
    fn update_status_for_unknown_plugin_is_false() {
        let mut registry = PluginRegistry::new();
        assert!(!registry.update_status("ghost", PluginStatus::Error));
    }

    #[test]
    fn remove_reports_whether_anything_was_removed() {
        let temp = TempDir::new().unwrap();
        add_plugin_dir(temp.path(), "p", Some(&valid_manifest("p")));

        let mut registry = PluginRegistry::new();
        registry.rescan(temp.path());
        assert!(registry.remove("p"));
        assert!(!registry.remove("p"));
        assert!(registry.is_empty());
    }
}
