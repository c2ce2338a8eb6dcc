//! uv-backed implementation of the package-manager seam
//!
//! Drives the `uv` binary (https://docs.astral.sh/uv/) as a subprocess,
//! with a pip fallback for package listing on environments uv cannot
//! introspect.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::manager::{InstalledPackage, PackageManager, SyncInvocation};
use crate::{Error, Result};

/// The uv CLI as a `PackageManager`.
#[derive(Debug, Default)]
pub struct UvCli;

impl UvCli {
    pub fn new() -> Self {
        Self
    }

    async fn run(
        mut cmd: Command,
        command_label: &str,
        timeout: Duration,
    ) -> Result<std::process::Output> {
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| Error::Timeout {
                command: command_label.to_string(),
                seconds: timeout.as_secs(),
            })?
            .map_err(|_| Error::ToolNotFound {
                tool: command_label
                    .split_whitespace()
                    .next()
                    .unwrap_or("uv")
                    .to_string(),
            })?;

        Ok(output)
    }

    fn expect_success(command_label: &str, output: &std::process::Output) -> Result<()> {
        if output.status.success() {
            return Ok(());
        }
        Err(Error::CommandFailed {
            command: command_label.to_string(),
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }

    /// Parse `uv pip list` tabular output: two header lines, then
    /// `name version` columns.
    fn parse_uv_list(stdout: &str) -> Vec<InstalledPackage> {
        stdout
            .lines()
            .skip(2)
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let name = parts.next()?;
                let version = parts.next()?;
                Some(InstalledPackage {
                    name: name.to_string(),
                    version: version.to_string(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl PackageManager for UvCli {
    async fn tool_version(&self) -> Result<String> {
        let mut cmd = Command::new("uv");
        cmd.arg("--version");
        let output = Self::run(cmd, "uv --version", Duration::from_secs(10)).await?;
        Self::expect_success("uv --version", &output)?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn create_venv(
        &self,
        project_dir: &Path,
        python_version: &str,
        timeout: Duration,
    ) -> Result<()> {
        let mut cmd = Command::new("uv");
        cmd.arg("venv")
            .args(["--python", python_version])
            .current_dir(project_dir);

        debug!(dir = %project_dir.display(), python = python_version, "uv venv");
        let output = Self::run(cmd, "uv venv", timeout).await?;
        Self::expect_success("uv venv", &output)
    }

    async fn list_installed(
        &self,
        interpreter: &Path,
        timeout: Duration,
    ) -> Result<Vec<InstalledPackage>> {
        let mut cmd = Command::new("uv");
        cmd.args(["pip", "list", "--python"]).arg(interpreter);

        match Self::run(cmd, "uv pip list", timeout).await {
            Ok(output) if output.status.success() => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                return Ok(Self::parse_uv_list(&stdout));
            }
            Ok(output) => {
                warn!(
                    code = output.status.code().unwrap_or(-1),
                    "uv pip list failed, falling back to pip"
                );
            }
            Err(e) => {
                warn!(error = %e, "uv pip list unavailable, falling back to pip");
            }
        }

        // Fallback: the environment's own pip with JSON output
        let mut cmd = Command::new(interpreter);
        cmd.args(["-m", "pip", "list", "--format=json"]);
        let output = Self::run(cmd, "pip list", timeout).await?;
        Self::expect_success("pip list", &output)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str(&stdout).map_err(|e| Error::OutputParse {
            command: "pip list".to_string(),
            message: e.to_string(),
        })
    }

    async fn install(
        &self,
        interpreter: &Path,
        package_spec: &str,
        index_url: Option<&str>,
        timeout: Duration,
    ) -> Result<()> {
        let mut cmd = Command::new("uv");
        cmd.args(["pip", "install", "--python"])
            .arg(interpreter)
            .arg(package_spec);
        if let Some(url) = index_url {
            cmd.args(["--index-url", url]);
        }

        debug!(spec = package_spec, "uv pip install");
        let output = Self::run(cmd, "uv pip install", timeout).await?;
        Self::expect_success("uv pip install", &output)
    }

    async fn sync(
        &self,
        interpreter: &Path,
        manifest_path: &Path,
        timeout: Duration,
    ) -> Result<SyncInvocation> {
        let project_dir = manifest_path.parent().unwrap_or(Path::new("."));

        let mut cmd = Command::new("uv");
        cmd.arg("sync")
            .arg("--python")
            .arg(interpreter)
            .arg("--project")
            .arg(project_dir)
            .current_dir(project_dir);

        debug!(project = %project_dir.display(), "uv sync");
        let output = Self::run(cmd, "uv sync", timeout).await?;

        Ok(SyncInvocation {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_uv_list_skips_header() {
        let stdout = "Package    Version\n---------- -------\npsutil     7.1.0\nrequests   2.32.3\n";
        let packages = UvCli::parse_uv_list(stdout);
        assert_eq!(
            packages,
            vec![
                InstalledPackage {
                    name: "psutil".into(),
                    version: "7.1.0".into()
                },
                InstalledPackage {
                    name: "requests".into(),
                    version: "2.32.3".into()
                },
            ]
        );
    }

    #[test]
    fn parse_uv_list_empty_output() {
        assert!(UvCli::parse_uv_list("").is_empty());
    }

    #[test]
    fn failure_text_prefers_stderr() {
        let inv = SyncInvocation {
            exit_code: 2,
            stdout: "progress".into(),
            stderr: "No solution found".into(),
        };
        assert_eq!(inv.failure_text(), "No solution found");

        let inv = SyncInvocation {
            exit_code: 2,
            stdout: "only stdout".into(),
            stderr: "  ".into(),
        };
        assert_eq!(inv.failure_text(), "only stdout");

        let inv = SyncInvocation {
            exit_code: 2,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(inv.failure_text(), "unknown error");
    }
}
