//! Full plugin lifecycle through the application context: discovery,
//! dependency sync, spawn, status propagation, stop, uninstall.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dock_core::{AppContext, PluginStatus};
use dock_pm::{InstalledPackage, PackageManager, SyncInvocation};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

struct QuietPm;

#[async_trait]
impl PackageManager for QuietPm {
    async fn tool_version(&self) -> dock_pm::Result<String> {
        Ok("uv 0.5.0".into())
    }

    async fn create_venv(
        &self,
        project_dir: &Path,
        _python_version: &str,
        _timeout: Duration,
    ) -> dock_pm::Result<()> {
        install_fake_interpreter(&project_dir.join(".venv"));
        Ok(())
    }

    async fn list_installed(
        &self,
        _interpreter: &Path,
        _timeout: Duration,
    ) -> dock_pm::Result<Vec<InstalledPackage>> {
        Ok(Vec::new())
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

/// Stand-in interpreter: runs the entry point as a shell script.
fn install_fake_interpreter(venv_dir: &Path) {
    let bin = venv_dir.join("bin");
    std::fs::create_dir_all(&bin).unwrap();
    let python = bin.join("python");
    std::fs::write(&python, "#!/bin/sh\nif [ -n \"$1\" ]; then exec /bin/sh \"$1\"; fi\n").unwrap();
    let mut perms = std::fs::metadata(&python).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&python, perms).unwrap();
}

fn add_plugin(root: &Path, name: &str, entry_body: &str, dependencies: &[&str]) {
    let dir = root.join("plugins").join(name);
    std::fs::create_dir_all(&dir).unwrap();
    let deps = dependencies
        .iter()
        .map(|d| format!("\"{d}\""))
        .collect::<Vec<_>>()
        .join(", ");
    std::fs::write(
        dir.join("pyproject.toml"),
        format!("[plugin-metadata]\nname = \"{name}\"\n\n[project]\ndependencies = [{deps}]\n"),
    )
    .unwrap();
    std::fs::write(dir.join("main.py"), entry_body).unwrap();
}

fn setup(temp: &TempDir) -> Arc<AppContext> {
    std::fs::write(
        temp.path().join("config.toml"),
        "[process]\nstartup_grace_ms = 100\nstop_grace_seconds = 2\nkill_grace_seconds = 1\n\n[environments]\ncurrent = \"default\"\n",
    )
    .unwrap();
    install_fake_interpreter(&temp.path().join("envs").join("default").join(".venv"));
    let (ctx, _notifications) = AppContext::new(temp.path(), Arc::new(QuietPm)).unwrap();
    ctx
}

async fn wait_for_status(ctx: &AppContext, plugin: &str, expected: PluginStatus) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if ctx.plugin(plugin).map(|p| p.status) == Some(expected) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {plugin} to reach {expected}"
        );
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
}

#[tokio::test]
async fn discovery_start_run_stop_roundtrip() {
    let temp = TempDir::new().unwrap();
    add_plugin(temp.path(), "worker", "sleep 30", &["psutil>=7.1.0"]);
    let ctx = setup(&temp);

    let plugins = ctx.plugins();
    assert_eq!(plugins.len(), 1);
    assert_eq!(plugins[0].status, PluginStatus::Stopped);

    assert!(ctx.start_plugin("worker").await.unwrap());
    wait_for_status(&ctx, "worker", PluginStatus::Running).await;

    // Dependency sync ran before the spawn: the environment manifest
    // now pins the plugin's constraint.
    let manifest = std::fs::read_to_string(
        temp.path().join("envs").join("default").join("pyproject.toml"),
    )
    .unwrap();
    assert!(manifest.contains("\"psutil>=7.1.0\","));

    assert!(ctx.stop_plugin("worker").await.unwrap());
    wait_for_status(&ctx, "worker", PluginStatus::Stopped).await;
}

#[tokio::test]
async fn second_start_is_rejected_while_running() {
    let temp = TempDir::new().unwrap();
    add_plugin(temp.path(), "single", "sleep 30", &[]);
    let ctx = setup(&temp);

    assert!(ctx.start_plugin("single").await.unwrap());
    wait_for_status(&ctx, "single", PluginStatus::Running).await;

    assert!(!ctx.start_plugin("single").await.unwrap());
    ctx.stop_plugin("single").await.unwrap();
}

#[tokio::test]
async fn scan_skips_bundles_without_valid_manifests() {
    let temp = TempDir::new().unwrap();
    add_plugin(temp.path(), "valid", "exit 0", &[]);
    std::fs::create_dir_all(temp.path().join("plugins").join("invalid")).unwrap();
    std::fs::write(
        temp.path().join("plugins").join("invalid").join("pyproject.toml"),
        "not toml at [all",
    )
    .unwrap();
    let ctx = setup(&temp);

    let names: Vec<String> = ctx.plugins().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["valid"]);
}

#[tokio::test]
async fn creating_an_environment_over_an_existing_one_fails_cleanly() {
    let temp = TempDir::new().unwrap();
    let ctx = setup(&temp);

    // "default" already exists on disk
    let err = ctx.create_environment("default", None).await.unwrap_err();
    assert!(err.to_string().contains("already exists"));

    // The existing environment was not touched
    assert!(
        temp.path()
            .join("envs")
            .join("default")
            .join(".venv")
            .join("bin")
            .join("python")
            .exists()
    );
}

#[tokio::test]
async fn uninstall_stops_then_removes() {
    let temp = TempDir::new().unwrap();
    add_plugin(temp.path(), "doomed", "sleep 30", &[]);
    let ctx = setup(&temp);

    assert!(ctx.start_plugin("doomed").await.unwrap());
    wait_for_status(&ctx, "doomed", PluginStatus::Running).await;

    assert!(ctx.uninstall_plugin("doomed").await.unwrap());
    assert!(ctx.plugin("doomed").is_none());
    assert!(!temp.path().join("plugins").join("doomed").exists());
}
