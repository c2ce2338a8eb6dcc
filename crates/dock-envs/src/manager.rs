//! Environment manager
//!
//! Creation, deletion, and inspection of managed environments. All
//! operations here invoke external tools and are expected to run off the
//! interactive loop; each probe carries its own bound.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dock_pm::PackageManager;
use tokio::process::Command;
use tracing::{info, warn};

use crate::descriptor::EnvironmentDescriptor;
use crate::layout;
use crate::{Error, Result};

/// Manages the `envs/` directory and its environments.
pub struct EnvironmentManager {
    envs_dir: PathBuf,
    pm: Arc<dyn PackageManager>,
    create_timeout: Duration,
    probe_timeout: Duration,
}

impl EnvironmentManager {
    pub fn new(envs_dir: impl Into<PathBuf>, pm: Arc<dyn PackageManager>) -> Self {
        Self {
            envs_dir: envs_dir.into(),
            pm,
            create_timeout: Duration::from_secs(60),
            probe_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeouts(mut self, create: Duration, probe: Duration) -> Self {
        self.create_timeout = create;
        self.probe_timeout = probe;
        self
    }

    pub fn envs_dir(&self) -> &Path {
        &self.envs_dir
    }

    pub fn environment_path(&self, name: &str) -> PathBuf {
        self.envs_dir.join(name)
    }

    pub fn interpreter_path(&self, name: &str) -> PathBuf {
        layout::interpreter_path(&self.environment_path(name))
    }

    /// Create a new environment.
    ///
    /// An existing directory fails the request up front, before any
    /// filesystem mutation. Any later failure removes the partially
    /// created directory so a retry starts clean.
    pub async fn create_environment(
        &self,
        name: &str,
        python_version: &str,
        active_name: &str,
    ) -> Result<EnvironmentDescriptor> {
        let env_path = self.environment_path(name);
        if env_path.exists() {
            return Err(Error::AlreadyExists {
                name: name.to_string(),
            });
        }

        if let Err(e) = self.create_inner(name, &env_path, python_version).await {
            if env_path.exists() {
                if let Err(cleanup) = tokio::fs::remove_dir_all(&env_path).await {
                    warn!(env = name, error = %cleanup, "failed to clean up after create failure");
                }
            }
            return Err(e);
        }

        info!(env = name, "environment created");
        self.environment_info(name, active_name).await
    }

    async fn create_inner(&self, name: &str, env_path: &Path, python_version: &str) -> Result<()> {
        // The tool must answer a version probe before anything is written.
        let tool = self.pm.tool_version().await?;
        info!(env = name, %tool, "creating environment");

        tokio::fs::create_dir_all(env_path)
            .await
            .map_err(|e| Error::io(env_path, e))?;

        dock_fs::write_text(
            &env_path.join("pyproject.toml"),
            &layout::seed_manifest(name, python_version),
        )?;

        self.pm
            .create_venv(env_path, python_version, self.create_timeout)
            .await?;

        let interpreter = layout::interpreter_path(env_path);
        if !interpreter.exists() {
            return Err(Error::CreationFailed {
                name: name.to_string(),
                message: format!("interpreter missing at {}", interpreter.display()),
            });
        }

        Ok(())
    }

    /// Delete an environment and everything under it.
    pub async fn delete_environment(&self, name: &str) -> Result<()> {
        let env_path = self.environment_path(name);
        if !env_path.exists() {
            return Err(Error::NotFound {
                name: name.to_string(),
            });
        }
        tokio::fs::remove_dir_all(&env_path)
            .await
            .map_err(|e| Error::io(&env_path, e))?;
        info!(env = name, "environment deleted");
        Ok(())
    }

    /// Scan the environments directory, building a descriptor per valid
    /// environment. Broken environments are skipped with a warning, never
    /// fatal to the scan.
    pub async fn refresh_environments(&self, active_name: &str) -> Vec<EnvironmentDescriptor> {
        let mut descriptors = Vec::new();

        let Ok(mut entries) = tokio::fs::read_dir(&self.envs_dir).await else {
            warn!(dir = %self.envs_dir.display(), "environments directory not readable");
            return descriptors;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(file_type) = entry.file_type().await else {
                continue;
            };
            if !file_type.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            match self.environment_info(&name, active_name).await {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(e) => warn!(env = %name, error = %e, "skipping environment"),
            }
        }

        descriptors.sort_by(|a, b| a.name.cmp(&b.name));
        descriptors
    }

    /// Build the full descriptor for one environment.
    pub async fn environment_info(
        &self,
        name: &str,
        active_name: &str,
    ) -> Result<EnvironmentDescriptor> {
        let env_path = self.environment_path(name);
        if !env_path.exists() {
            return Err(Error::NotFound {
                name: name.to_string(),
            });
        }

        let interpreter = layout::interpreter_path(&env_path);
        if !interpreter.exists() {
            return Err(Error::InterpreterMissing { path: interpreter });
        }

        let python_version = match probe_python_version(&interpreter, self.probe_timeout).await {
            Some(version) => version,
            None => {
                warn!(env = name, "python version probe failed");
                "unknown".to_string()
            }
        };

        let packages_count = match self.pm.list_installed(&interpreter, self.probe_timeout).await {
            Ok(packages) => packages.len(),
            Err(e) => {
                warn!(env = name, error = %e, "package listing failed");
                0
            }
        };

        let size_path = env_path.clone();
        let size_bytes = tokio::task::spawn_blocking(move || dock_fs::dir_size(&size_path))
            .await
            .ok()
            .and_then(|r| r.ok())
            .unwrap_or(0);

        let created_at = std::fs::metadata(&env_path)
            .ok()
            .and_then(|meta| meta.created().ok())
            .map(DateTime::<Utc>::from);

        Ok(EnvironmentDescriptor {
            name: name.to_string(),
            path: env_path,
            interpreter_path: interpreter,
            python_version,
            packages_count,
            size_bytes,
            created_at,
            is_active: name == active_name,
        })
    }
}

/// Ask an interpreter for its version string, bounded by `timeout`.
async fn probe_python_version(interpreter: &Path, timeout: Duration) -> Option<String> {
    let mut cmd = Command::new(interpreter);
    cmd.arg("--version")
        .stdin(Stdio::null())
        .kill_on_drop(true);

    let output = tokio::time::timeout(timeout, cmd.output()).await.ok()?.ok()?;
    if !output.status.success() {
        return None;
    }
    // Some interpreters print the banner on stderr
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.is_empty() { None } else { Some(stderr) }
    } else {
        Some(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dock_pm::{InstalledPackage, SyncInvocation};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted package manager: creates the interpreter layout on
    /// `create_venv` and records calls.
    struct FakePm {
        fail_venv: bool,
        calls: Mutex<Vec<String>>,
    }

    impl FakePm {
        fn new(fail_venv: bool) -> Self {
            Self {
                fail_venv,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PackageManager for FakePm {
        async fn tool_version(&self) -> dock_pm::Result<String> {
            self.calls.lock().unwrap().push("version".into());
            Ok("uv 0.5.0".into())
        }

        async fn create_venv(
            &self,
            project_dir: &Path,
            _python_version: &str,
            _timeout: Duration,
        ) -> dock_pm::Result<()> {
            self.calls.lock().unwrap().push("venv".into());
            if self.fail_venv {
                return Err(dock_pm::Error::CommandFailed {
                    command: "uv venv".into(),
                    code: 2,
                    stderr: "no such python".into(),
                });
            }
            let bin = if cfg!(windows) {
                project_dir.join(".venv").join("Scripts")
            } else {
                project_dir.join(".venv").join("bin")
            };
            std::fs::create_dir_all(&bin).unwrap();
            let python = if cfg!(windows) { "python.exe" } else { "python" };
            std::fs::write(bin.join(python), "").unwrap();
            Ok(())
        }

        async fn list_installed(
            &self,
            _interpreter: &Path,
            _timeout: Duration,
        ) -> dock_pm::Result<Vec<InstalledPackage>> {
            Ok(vec![InstalledPackage {
                name: "psutil".into(),
                version: "7.1.0".into(),
            }])
        }

        async fn install(
            &self,
            _interpreter: &Path,
            _package_spec: &str,
            _index_url: Option<&str>,
            _timeout: Duration,
        ) -> dock_pm::Result<()> {
            Ok(())
        }

        async fn sync(
            &self,
            _interpreter: &Path,
            _manifest_path: &Path,
            _timeout: Duration,
        ) -> dock_pm::Result<SyncInvocation> {
            Ok(SyncInvocation {
                exit_code: 0,
                stdout: String::new(),
                stderr: String::new(),
            })
        }
    }

    fn manager(temp: &TempDir, fail_venv: bool) -> EnvironmentManager {
        EnvironmentManager::new(temp.path().join("envs"), Arc::new(FakePm::new(fail_venv)))
    }

    #[tokio::test]
    async fn create_existing_environment_fails_without_mutation() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(&temp, false);
        let env_path = mgr.environment_path("main");
        std::fs::create_dir_all(&env_path).unwrap();
        std::fs::write(env_path.join("marker"), "untouched").unwrap();

        let err = mgr.create_environment("main", "3.12", "").await.unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { .. }));
        assert_eq!(
            std::fs::read_to_string(env_path.join("marker")).unwrap(),
            "untouched"
        );
    }

    #[tokio::test]
    async fn create_builds_descriptor_and_seed_manifest() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(&temp, false);

        let descriptor = mgr.create_environment("main", "3.12", "main").await.unwrap();

        assert_eq!(descriptor.name, "main");
        assert!(descriptor.is_active);
        assert_eq!(descriptor.packages_count, 1);
        assert!(descriptor.interpreter_path.exists());

        let seed =
            std::fs::read_to_string(mgr.environment_path("main").join("pyproject.toml")).unwrap();
        assert!(seed.contains("requires-python = \">=3.12\""));
    }

    #[tokio::test]
    async fn failed_create_removes_partial_directory() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(&temp, true);

        let err = mgr.create_environment("main", "3.12", "").await.unwrap_err();
        assert!(matches!(err, Error::Pm(_)));
        assert!(!mgr.environment_path("main").exists());
    }

    #[tokio::test]
    async fn delete_missing_environment_fails() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(&temp, false);
        assert!(matches!(
            mgr.delete_environment("ghost").await,
            Err(Error::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn refresh_skips_directories_without_interpreter() {
        let temp = TempDir::new().unwrap();
        let mgr = manager(&temp, false);
        mgr.create_environment("good", "3.12", "good").await.unwrap();
        std::fs::create_dir_all(mgr.environment_path("broken")).unwrap();

        let descriptors = mgr.refresh_environments("good").await;
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].name, "good");
        assert!(descriptors[0].is_active);
    }
}
