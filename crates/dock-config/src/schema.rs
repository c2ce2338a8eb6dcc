//! Configuration schema
//!
//! One typed struct per config section, with serde defaults so that a
//! partial file on disk merges cleanly over the built-in defaults. The
//! config file is the source of truth for the known-environment list and
//! the current environment selection across restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Top-level application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub plugins: PluginsSection,
    pub environments: EnvironmentsSection,
    pub mirrors: MirrorsSection,
    pub process: ProcessSection,
    pub dependencies: DependenciesSection,
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    pub version: String,
    pub log_level: String,
    pub debug_mode: bool,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "plugdock".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            debug_mode: false,
        }
    }
}

/// Plugin discovery settings and persisted plugin records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginsSection {
    /// Directory scanned for plugin bundles, relative to the project root
    pub directory: String,
    pub auto_scan: bool,
    pub timeout_seconds: u64,
    pub installed: Vec<PluginRecord>,
}

impl Default for PluginsSection {
    fn default() -> Self {
        Self {
            directory: "plugins".to_string(),
            auto_scan: true,
            timeout_seconds: 30,
            installed: Vec::new(),
        }
    }
}

/// A plugin known to the config store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginRecord {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub path: String,
}

/// Environment settings and persisted environment records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentsSection {
    /// Directory holding all managed environments, relative to the project root
    pub root_dir: String,
    /// Name of the active environment; empty when none selected
    pub current: String,
    /// Full path of the active environment; takes precedence over `current`
    pub current_path: String,
    pub default_python: String,
    pub create_timeout_seconds: u64,
    pub known: Vec<EnvironmentRecord>,
}

impl Default for EnvironmentsSection {
    fn default() -> Self {
        Self {
            root_dir: "envs".to_string(),
            current: String::new(),
            current_path: String::new(),
            default_python: "3.11".to_string(),
            create_timeout_seconds: 60,
            known: Vec::new(),
        }
    }
}

/// Persisted snapshot of a managed environment.
///
/// Rehydrated into the in-memory cache at startup before any live rescan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub python_version: String,
    #[serde(default)]
    pub packages_count: usize,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: bool,
}

/// Package index mirror settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorsSection {
    pub enabled: bool,
    pub default_source: String,
    pub timeout_seconds: u64,
    pub retry_count: u32,
    pub verify_ssl: bool,
    pub sources: Vec<MirrorSource>,
}

impl Default for MirrorsSection {
    fn default() -> Self {
        Self {
            enabled: true,
            default_source: "pypi".to_string(),
            timeout_seconds: 30,
            retry_count: 3,
            verify_ssl: true,
            sources: vec![MirrorSource {
                name: "pypi".to_string(),
                url: "https://pypi.org/simple/".to_string(),
                priority: 1,
                enabled: true,
            }],
        }
    }
}

/// A single package index mirror
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorSource {
    pub name: String,
    pub url: String,
    /// Lower number wins among enabled sources
    pub priority: u32,
    #[serde(default)]
    pub enabled: bool,
}

/// Process supervision settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessSection {
    /// Non-zero exit codes still classified as a normal exit.
    /// Empirically observed per platform/tool, hence configurable.
    pub normal_exit_codes: Vec<i32>,
    pub startup_grace_ms: u64,
    pub stop_grace_seconds: u64,
    pub kill_grace_seconds: u64,
}

impl Default for ProcessSection {
    fn default() -> Self {
        Self {
            normal_exit_codes: vec![1, 62097],
            startup_grace_ms: 1000,
            stop_grace_seconds: 5,
            kill_grace_seconds: 1,
        }
    }
}

/// Dependency synchronization settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DependenciesSection {
    pub sync_timeout_seconds: u64,
    pub probe_timeout_seconds: u64,
}

impl Default for DependenciesSection {
    fn default() -> Self {
        Self {
            sync_timeout_seconds: 300,
            probe_timeout_seconds: 30,
        }
    }
}

impl AppConfig {
    /// Validate cross-field constraints that serde cannot express.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.app.name.trim().is_empty() {
            return Err("app.name must not be empty".to_string());
        }
        if !LOG_LEVELS.contains(&self.app.log_level.to_lowercase().as_str()) {
            return Err(format!("unknown log level: {}", self.app.log_level));
        }
        for source in &self.mirrors.sources {
            if source.name.trim().is_empty() || source.url.trim().is_empty() {
                return Err("mirror sources need a name and a url".to_string());
            }
            if source.priority < 1 {
                return Err(format!(
                    "mirror {} has priority {}, minimum is 1",
                    source.name, source.priority
                ));
            }
        }
        if self.dependencies.sync_timeout_seconds == 0 {
            return Err("dependencies.sync_timeout_seconds must be positive".to_string());
        }
        if self.environments.create_timeout_seconds == 0 {
            return Err("environments.create_timeout_seconds must be positive".to_string());
        }
        Ok(())
    }

    /// The index URL to pass to the package manager, if mirrors are enabled.
    ///
    /// Among enabled sources the lowest priority number wins.
    pub fn effective_index_url(&self) -> Option<String> {
        if !self.mirrors.enabled {
            return None;
        }
        self.mirrors
            .sources
            .iter()
            .filter(|s| s.enabled)
            .min_by_key(|s| s.priority)
            .map(|s| s.url.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_validate() {
        AppConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_file_merges_over_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [app]
            log_level = "debug"

            [environments]
            current = "main"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.app.log_level, "debug");
        assert_eq!(cfg.app.name, "plugdock");
        assert_eq!(cfg.environments.current, "main");
        assert_eq!(cfg.environments.root_dir, "envs");
        assert_eq!(cfg.process.normal_exit_codes, vec![1, 62097]);
    }

    #[test]
    fn bad_log_level_fails_validation() {
        let mut cfg = AppConfig::default();
        cfg.app.log_level = "loud".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn mirror_priority_zero_fails_validation() {
        let mut cfg = AppConfig::default();
        cfg.mirrors.sources[0].priority = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn effective_index_url_prefers_lowest_priority_enabled() {
        let mut cfg = AppConfig::default();
        cfg.mirrors.sources = vec![
            MirrorSource {
                name: "slow".into(),
                url: "https://slow.example/simple/".into(),
                priority: 5,
                enabled: true,
            },
            MirrorSource {
                name: "fast".into(),
                url: "https://fast.example/simple/".into(),
                priority: 2,
                enabled: true,
            },
            MirrorSource {
                name: "disabled".into(),
                url: "https://off.example/simple/".into(),
                priority: 1,
                enabled: false,
            },
        ];

        assert_eq!(
            cfg.effective_index_url().as_deref(),
            Some("https://fast.example/simple/")
        );
    }

    #[test]
    fn effective_index_url_none_when_mirrors_disabled() {
        let mut cfg = AppConfig::default();
        cfg.mirrors.enabled = false;
        assert_eq!(cfg.effective_index_url(), None);
    }
}
