//! Crash-safe dependency synchronization
//!
//! The live environment manifest is the one shared mutable file in the
//! system. Its protection is the backup/staging/rename protocol: the
//! generated manifest is written to a staging directory, the external
//! sync runs against that staging copy, and only a successful sync
//! promotes it over the live file. A reader therefore observes either
//! the pre-sync manifest or the new one, never a torn state.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dock_pm::PackageManager;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::collector::DependencyCollector;
use crate::event::DependencyEvent;
use crate::manifest::{self, MANIFEST_FILE};
use crate::resolver;
use crate::{Error, Result};

const STAGING_DIR: &str = ".sync-staging";
const BACKUP_SUFFIX: &str = ".backup";

/// Resolves and synchronizes the merged dependency set of all plugins
/// into a target environment.
pub struct DependencySynchronizer {
    envs_dir: PathBuf,
    collector: DependencyCollector,
    pm: Arc<dyn PackageManager>,
    events: mpsc::UnboundedSender<DependencyEvent>,
    sync_timeout: Duration,
    probe_timeout: Duration,
    install_timeout: Duration,
    /// One async mutex per environment: a second sync against the same
    /// environment queues behind the in-flight one.
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl DependencySynchronizer {
    pub fn new(
        envs_dir: impl Into<PathBuf>,
        plugins_dir: impl Into<PathBuf>,
        pm: Arc<dyn PackageManager>,
    ) -> (Self, mpsc::UnboundedReceiver<DependencyEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        (
            Self {
                envs_dir: envs_dir.into(),
                collector: DependencyCollector::new(plugins_dir),
                pm,
                events,
                sync_timeout: Duration::from_secs(300),
                probe_timeout: Duration::from_secs(30),
                install_timeout: Duration::from_secs(300),
                locks: Mutex::new(HashMap::new()),
            },
            receiver,
        )
    }

    pub fn with_timeouts(mut self, sync: Duration, probe: Duration) -> Self {
        self.sync_timeout = sync;
        self.probe_timeout = probe;
        self
    }

    pub fn collector(&self) -> &DependencyCollector {
        &self.collector
    }

    fn environment_path(&self, env_name: &str) -> PathBuf {
        self.envs_dir.join(env_name)
    }

    fn interpreter_for(&self, env_name: &str) -> Result<PathBuf> {
        let interpreter = dock_envs::interpreter_path(&self.environment_path(env_name));
        if interpreter.exists() {
            Ok(interpreter)
        } else {
            Err(Error::EnvironmentNotFound {
                name: env_name.to_string(),
            })
        }
    }

    fn env_lock(&self, env_name: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(env_name.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn emit(&self, event: DependencyEvent) {
        // Receiver gone just means nobody is listening anymore
        let _ = self.events.send(event);
    }

    /// Resolve one negotiated specifier per package across all plugins.
    ///
    /// Packages whose constraints cannot be parsed are reported and
    /// omitted; everything else resolves.
    pub fn resolve_dependencies(&self) -> BTreeMap<String, String> {
        let aggregated = self.collector.collect_all_dependencies();
        let mut resolved = BTreeMap::new();

        for (package, constraints) in aggregated {
            match resolver::resolve(&constraints) {
                Ok(Some(specifier)) => {
                    if constraints.len() > 1 {
                        let candidates: Vec<String> =
                            constraints.iter().map(|c| c.specifier.clone()).collect();
                        info!(
                            %package,
                            ?candidates,
                            chosen = %specifier,
                            "version conflict resolved"
                        );
                        self.emit(DependencyEvent::ConflictResolved {
                            package: package.clone(),
                            candidates,
                            chosen: specifier.clone(),
                        });
                    }
                    resolved.insert(package, specifier);
                }
                Ok(None) => {}
                Err(e) => {
                    error!(%package, error = %e, "cannot negotiate a version, omitting package");
                    self.emit(DependencyEvent::ResolutionFailed {
                        package: package.clone(),
                    });
                }
            }
        }

        resolved
    }

    /// Resolve and sync on behalf of one plugin about to start.
    ///
    /// A plugin with no declared dependencies skips the sync entirely.
    /// Otherwise the *whole* merged set for the environment is re-synced,
    /// since the environment is shared by every plugin.
    pub async fn sync_for_plugin(&self, env_name: &str, plugin_dir: &Path) -> Result<()> {
        let plugin_deps = self.collector.read_plugin_dependencies(plugin_dir);
        if plugin_deps.is_empty() {
            info!(plugin = %plugin_dir.display(), "no dependencies declared, skipping sync");
            return Ok(());
        }

        let resolved = self.resolve_dependencies();
        self.sync_environment(env_name, &resolved).await?;
        self.emit(DependencyEvent::EnvironmentUpdated {
            env: env_name.to_string(),
        });
        Ok(())
    }

    /// Synchronize an environment's installed packages with `resolved`.
    ///
    /// The six-step protocol:
    /// 1. fail fast if the environment interpreter is missing
    /// 2. back up the live manifest (when one exists)
    /// 3. write the generated manifest into the staging directory
    /// 4. run the external sync against the staged manifest, bounded
    /// 5. on success, delete-then-rename the staged file over the live one
    ///    and drop the backup
    /// 6. on failure, restore the live manifest from the backup and drop
    ///    all staging artifacts
    pub async fn sync_environment(
        &self,
        env_name: &str,
        resolved: &BTreeMap<String, String>,
    ) -> Result<()> {
        let lock = self.env_lock(env_name);
        let _guard = lock.lock().await;

        let interpreter = self.interpreter_for(env_name)?;
        let env_path = self.environment_path(env_name);

        let live = env_path.join(MANIFEST_FILE);
        let backup = env_path.join(format!("{MANIFEST_FILE}{BACKUP_SUFFIX}"));
        let staging_dir = env_path.join(STAGING_DIR);
        let staged = staging_dir.join(MANIFEST_FILE);

        let had_live = live.exists();
        if had_live {
            dock_fs::copy_file(&live, &backup)?;
            info!(env = env_name, "backed up live manifest");
        }

        if staging_dir.exists() {
            std::fs::remove_dir_all(&staging_dir).map_err(|e| Error::io(&staging_dir, e))?;
        }
        std::fs::create_dir_all(&staging_dir).map_err(|e| Error::io(&staging_dir, e))?;
        dock_fs::write_text(&staged, &manifest::environment_manifest(resolved))?;

        info!(env = env_name, packages = resolved.len(), "starting dependency sync");
        self.emit(DependencyEvent::SyncStarted {
            env: env_name.to_string(),
        });

        let outcome = self
            .pm
            .sync(&interpreter, &staged, self.sync_timeout)
            .await;

        match outcome {
            Ok(invocation) if invocation.success() => {
                // Delete-then-rename: renaming over an existing file is
                // not portable.
                dock_fs::remove_if_exists(&live)?;
                std::fs::rename(&staged, &live).map_err(|e| Error::io(&live, e))?;
                cleanup_artifacts(&staging_dir, &backup);

                info!(env = env_name, "dependency sync succeeded");
                self.emit(DependencyEvent::SyncCompleted {
                    env: env_name.to_string(),
                    success: true,
                    message: "dependency sync succeeded".to_string(),
                });
                Ok(())
            }
            Ok(invocation) => {
                let message = invocation.failure_text();
                error!(
                    env = env_name,
                    code = invocation.exit_code,
                    %message,
                    "dependency sync failed"
                );
                self.rollback(had_live, &live, &backup, &staging_dir);
                self.emit(DependencyEvent::SyncCompleted {
                    env: env_name.to_string(),
                    success: false,
                    message: format!("sync failed: {message}"),
                });
                Err(Error::SyncFailed {
                    env: env_name.to_string(),
                    message,
                })
            }
            Err(dock_pm::Error::Timeout { seconds, .. }) => {
                error!(env = env_name, seconds, "dependency sync timed out");
                self.rollback(had_live, &live, &backup, &staging_dir);
                self.emit(DependencyEvent::SyncCompleted {
                    env: env_name.to_string(),
                    success: false,
                    message: format!("sync timed out after {seconds}s"),
                });
                Err(Error::SyncTimeout {
                    env: env_name.to_string(),
                    seconds,
                })
            }
            Err(e) => {
                error!(env = env_name, error = %e, "dependency sync errored");
                self.rollback(had_live, &live, &backup, &staging_dir);
                self.emit(DependencyEvent::SyncCompleted {
                    env: env_name.to_string(),
                    success: false,
                    message: format!("sync error: {e}"),
                });
                Err(Error::Pm(e))
            }
        }
    }

    /// Restore the pre-sync state after a failed invocation. Best effort:
    /// the backup copy is authoritative, leftover staging files are only
    /// cosmetic.
    fn rollback(&self, had_live: bool, live: &Path, backup: &Path, staging_dir: &Path) {
        if had_live && backup.exists() {
            if let Err(e) = dock_fs::copy_file(backup, live) {
                error!(error = %e, "failed to restore manifest from backup");
            } else {
                info!("restored live manifest from backup");
            }
        }
        cleanup_artifacts(staging_dir, backup);
    }

    /// Check whether a package is installed in an environment.
    pub async fn is_package_installed(&self, env_name: &str, package: &str) -> Result<bool> {
        let interpreter = self.interpreter_for(env_name)?;
        let packages = self
            .pm
            .list_installed(&interpreter, self.probe_timeout)
            .await?;
        Ok(packages
            .iter()
            .any(|p| p.name.eq_ignore_ascii_case(package)))
    }

    /// List the packages installed in an environment.
    pub async fn installed_packages(
        &self,
        env_name: &str,
    ) -> Result<Vec<dock_pm::InstalledPackage>> {
        let interpreter = self.interpreter_for(env_name)?;
        Ok(self
            .pm
            .list_installed(&interpreter, self.probe_timeout)
            .await?)
    }

    /// Install a single package into an environment, outside the sync
    /// protocol.
    pub async fn install_package(
        &self,
        env_name: &str,
        package: &str,
        specifier: &str,
        index_url: Option<&str>,
    ) -> Result<()> {
        let interpreter = self.interpreter_for(env_name)?;
        let spec = format!("{package}{specifier}");

        let result = self
            .pm
            .install(&interpreter, &spec, index_url, self.install_timeout)
            .await;

        match &result {
            Ok(()) => {
                info!(env = env_name, %spec, "package installed");
                self.emit(DependencyEvent::PackageInstalled {
                    env: env_name.to_string(),
                    package: package.to_string(),
                    success: true,
                    message: format!("installed {spec}"),
                });
            }
            Err(e) => {
                error!(env = env_name, %spec, error = %e, "package install failed");
                self.emit(DependencyEvent::PackageInstalled {
                    env: env_name.to_string(),
                    package: package.to_string(),
                    success: false,
                    message: format!("install failed: {e}"),
                });
            }
        }

        result.map_err(Error::Pm)
    }
}

fn cleanup_artifacts(staging_dir: &Path, backup: &Path) {
    if staging_dir.exists()
        && let Err(e) = std::fs::remove_dir_all(staging_dir)
    {
        warn!(error = %e, "could not remove staging directory");
    }
    if backup.exists()
        && let Err(e) = std::fs::remove_file(backup)
    {
        warn!(error = %e, "could not remove manifest backup");
    }
}
