//! Dependency collection across plugin bundles

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::constraint::DependencyConstraint;
use crate::manifest::PluginManifest;

/// Reads per-plugin manifests and aggregates constraints per package.
#[derive(Debug, Clone)]
pub struct DependencyCollector {
    plugins_dir: PathBuf,
}

impl DependencyCollector {
    pub fn new(plugins_dir: impl Into<PathBuf>) -> Self {
        Self {
            plugins_dir: plugins_dir.into(),
        }
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// Read the dependency constraints declared by one plugin.
    ///
    /// A missing or unreadable manifest yields an empty list; that is a
    /// per-plugin condition, never fatal.
    pub fn read_plugin_dependencies(&self, plugin_dir: &Path) -> Vec<DependencyConstraint> {
        let plugin_name = plugin_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if !PluginManifest::exists(plugin_dir) {
            warn!(plugin = %plugin_name, "plugin has no manifest, assuming no dependencies");
            return Vec::new();
        }

        let manifest = match PluginManifest::load(plugin_dir) {
            Ok(manifest) => manifest,
            Err(e) => {
                warn!(plugin = %plugin_name, error = %e, "unreadable manifest, assuming no dependencies");
                return Vec::new();
            }
        };

        let constraints: Vec<DependencyConstraint> = manifest
            .dependencies
            .iter()
            .map(|dep| DependencyConstraint::parse(dep, &plugin_name))
            .filter(|c| !c.package.is_empty())
            .collect();

        info!(
            plugin = %plugin_name,
            count = constraints.len(),
            "collected plugin dependencies"
        );
        constraints
    }

    /// Aggregate constraints from every plugin directory, keyed by
    /// package. Each package maps to one constraint per contributing
    /// plugin, in directory iteration order.
    pub fn collect_all_dependencies(&self) -> BTreeMap<String, Vec<DependencyConstraint>> {
        let mut aggregated: BTreeMap<String, Vec<DependencyConstraint>> = BTreeMap::new();

        let Ok(entries) = std::fs::read_dir(&self.plugins_dir) else {
            warn!(dir = %self.plugins_dir.display(), "plugins directory not readable");
            return aggregated;
        };

        let mut dirs: Vec<PathBuf> = entries
            .flatten()
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .collect();
        dirs.sort();

        for dir in dirs {
            for constraint in self.read_plugin_dependencies(&dir) {
                aggregated
                    .entry(constraint.package.clone())
                    .or_default()
                    .push(constraint);
            }
        }

        aggregated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn add_plugin(root: &Path, name: &str, dependencies: &[&str]) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        let deps = dependencies
            .iter()
            .map(|d| format!("\"{d}\""))
            .collect::<Vec<_>>()
            .join(", ");
        std::fs::write(
            dir.join("pyproject.toml"),
            format!(
                "[plugin-metadata]\nname = \"{name}\"\n\n[project]\ndependencies = [{deps}]\n"
            ),
        )
        .unwrap();
    }

    #[test]
    fn missing_manifest_reads_as_no_dependencies() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("bare");
        std::fs::create_dir_all(&dir).unwrap();

        let collector = DependencyCollector::new(temp.path());
        assert!(collector.read_plugin_dependencies(&dir).is_empty());
    }

    #[test]
    fn constraints_carry_their_source_plugin() {
        let temp = TempDir::new().unwrap();
        add_plugin(temp.path(), "monitor", &["psutil>=7.1.0"]);

        let collector = DependencyCollector::new(temp.path());
        let constraints = collector.read_plugin_dependencies(&temp.path().join("monitor"));

        assert_eq!(constraints.len(), 1);
        assert_eq!(constraints[0].package, "psutil");
        assert_eq!(constraints[0].specifier, ">=7.1.0");
        assert_eq!(constraints[0].source_plugin, "monitor");
    }

    #[test]
    fn collect_aggregates_per_package_across_plugins() {
        let temp = TempDir::new().unwrap();
        add_plugin(temp.path(), "alpha", &["pkg>=1.0.0", "rich"]);
        add_plugin(temp.path(), "beta", &["pkg>=2.5.0"]);
        std::fs::create_dir(temp.path().join("no-manifest")).unwrap();
        std::fs::write(temp.path().join("stray-file.txt"), "ignored").unwrap();

        let collector = DependencyCollector::new(temp.path());
        let aggregated = collector.collect_all_dependencies();

        assert_eq!(aggregated.len(), 2);
        assert_eq!(aggregated["pkg"].len(), 2);
        assert_eq!(aggregated["pkg"][0].source_plugin, "alpha");
        assert_eq!(aggregated["pkg"][1].source_plugin, "beta");
        assert_eq!(aggregated["rich"].len(), 1);
    }
}
