//! The package-manager seam
//!
//! Everything above this crate talks to the external package manager
//! through `PackageManager`, so the synchronizer and environment manager
//! can be exercised against a scripted implementation in tests.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::Result;

/// One installed package as reported by the environment
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
}

/// Captured result of a sync invocation.
///
/// The caller decides what a non-zero exit means; timeouts surface as
/// `Error::Timeout` instead.
#[derive(Debug, Clone)]
pub struct SyncInvocation {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl SyncInvocation {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Best human-readable failure text: stderr, else stdout, else a stub.
    pub fn failure_text(&self) -> String {
        if !self.stderr.trim().is_empty() {
            self.stderr.trim().to_string()
        } else if !self.stdout.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            "unknown error".to_string()
        }
    }
}

/// Operations plugdock needs from a versioned package manager.
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// Probe the tool itself, returning its version string.
    async fn tool_version(&self) -> Result<String>;

    /// Create a virtual environment inside `project_dir`.
    async fn create_venv(
        &self,
        project_dir: &Path,
        python_version: &str,
        timeout: Duration,
    ) -> Result<()>;

    /// List packages installed in the environment behind `interpreter`.
    async fn list_installed(
        &self,
        interpreter: &Path,
        timeout: Duration,
    ) -> Result<Vec<InstalledPackage>>;

    /// Install a single package spec (`name` or `name>=1.2.3`).
    async fn install(
        &self,
        interpreter: &Path,
        package_spec: &str,
        index_url: Option<&str>,
        timeout: Duration,
    ) -> Result<()>;

    /// Run the sync operation against the project containing `manifest_path`.
    ///
    /// Returns the captured invocation regardless of exit code.
    async fn sync(
        &self,
        interpreter: &Path,
        manifest_path: &Path,
        timeout: Duration,
    ) -> Result<SyncInvocation>;
}
