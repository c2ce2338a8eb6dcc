//! TOML-backed configuration store
//!
//! Loads `config.toml`, merging over defaults; saves atomically with a
//! `.backup` copy of the previous file so a bad write never destroys the
//! last good configuration.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::schema::{AppConfig, MirrorSource};
use crate::{Error, Result};

/// Owns the on-disk configuration file and the in-memory copy.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: AppConfig,
    /// Snapshot taken at the last successful load or save
    baseline: AppConfig,
}

impl ConfigStore {
    /// Load the store from `path`, writing a default file if none exists.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = if path.exists() {
            let content = dock_fs::read_text(&path)?;
            let config: AppConfig = toml::from_str(&content).map_err(|e| Error::Parse {
                path: path.clone(),
                message: e.to_string(),
            })?;
            config
        } else {
            info!(path = %path.display(), "no config file found, writing defaults");
            let config = AppConfig::default();
            write_config(&path, &config)?;
            config
        };

        config
            .validate()
            .map_err(|message| Error::Validation { message })?;

        Ok(Self {
            baseline: config.clone(),
            config,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut AppConfig {
        &mut self.config
    }

    /// True when the in-memory config differs from the last saved state.
    pub fn has_changes(&self) -> bool {
        self.config != self.baseline
    }

    /// Validate and persist the current config.
    ///
    /// The previous file content is kept at `<path>.backup` before the
    /// atomic write.
    pub fn save(&mut self) -> Result<()> {
        self.config
            .validate()
            .map_err(|message| Error::Validation { message })?;

        if self.path.exists() {
            dock_fs::copy_file(&self.path, &self.backup_path())?;
        }
        write_config(&self.path, &self.config)?;
        self.baseline = self.config.clone();
        Ok(())
    }

    /// Discard unsaved in-memory changes, returning to the last saved state.
    pub fn revert(&mut self) {
        self.config = self.baseline.clone();
    }

    /// Replace the current config with built-in defaults (not yet saved).
    pub fn reset_to_default(&mut self) {
        self.config = AppConfig::default();
    }

    /// Restore the config from the on-disk `.backup` file.
    pub fn restore_backup(&mut self) -> Result<()> {
        let backup = self.backup_path();
        if !backup.exists() {
            return Err(Error::NoBackup { path: backup });
        }
        let content = dock_fs::read_text(&backup)?;
        let config: AppConfig = toml::from_str(&content).map_err(|e| Error::Parse {
            path: backup,
            message: e.to_string(),
        })?;
        config
            .validate()
            .map_err(|message| Error::Validation { message })?;
        write_config(&self.path, &config)?;
        self.baseline = config.clone();
        self.config = config;
        Ok(())
    }

    fn backup_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "config.toml".to_string());
        name.push_str(".backup");
        self.path.with_file_name(name)
    }

    // --- mirror source management ---

    pub fn add_mirror_source(
        &mut self,
        name: &str,
        url: &str,
        priority: u32,
    ) -> Result<()> {
        if self.find_mirror(name).is_some() {
            return Err(Error::MirrorExists {
                name: name.to_string(),
            });
        }
        self.config.mirrors.sources.push(MirrorSource {
            name: name.to_string(),
            url: url.to_string(),
            priority,
            enabled: true,
        });
        Ok(())
    }

    pub fn remove_mirror_source(&mut self, name: &str) -> Result<()> {
        let before = self.config.mirrors.sources.len();
        self.config.mirrors.sources.retain(|s| s.name != name);
        if self.config.mirrors.sources.len() == before {
            return Err(Error::MirrorNotFound {
                name: name.to_string(),
            });
        }
        if self.config.mirrors.default_source == name {
            warn!(%name, "removed the default mirror source");
            self.config.mirrors.default_source = String::new();
        }
        Ok(())
    }

    pub fn set_mirror_enabled(&mut self, name: &str, enabled: bool) -> Result<()> {
        match self.find_mirror_mut(name) {
            Some(source) => {
                source.enabled = enabled;
                Ok(())
            }
            None => Err(Error::MirrorNotFound {
                name: name.to_string(),
            }),
        }
    }

    pub fn update_mirror_source(
        &mut self,
        name: &str,
        url: Option<&str>,
        priority: Option<u32>,
    ) -> Result<()> {
        match self.find_mirror_mut(name) {
            Some(source) => {
                if let Some(url) = url {
                    source.url = url.to_string();
                }
                if let Some(priority) = priority {
                    source.priority = priority;
                }
                Ok(())
            }
            None => Err(Error::MirrorNotFound {
                name: name.to_string(),
            }),
        }
    }

    pub fn set_default_mirror_source(&mut self, name: &str) -> Result<()> {
        if self.find_mirror(name).is_none() {
            return Err(Error::MirrorNotFound {
                name: name.to_string(),
            });
        }
        self.config.mirrors.default_source = name.to_string();
        Ok(())
    }

    fn find_mirror(&self, name: &str) -> Option<&MirrorSource> {
        self.config.mirrors.sources.iter().find(|s| s.name == name)
    }

    fn find_mirror_mut(&mut self, name: &str) -> Option<&mut MirrorSource> {
        self.config
            .mirrors
            .sources
            .iter_mut()
            .find(|s| s.name == name)
    }
}

fn write_config(path: &Path, config: &AppConfig) -> Result<()> {
    let content = toml::to_string_pretty(config).map_err(|e| Error::Serialize {
        message: e.to_string(),
    })?;
    dock_fs::write_text(path, &content)?;
    Ok(())
}
