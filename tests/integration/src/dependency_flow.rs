//! End-to-end dependency flow: collection across plugin bundles,
//! version negotiation, and the crash-safe sync protocol.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dock_deps::{DependencySynchronizer, environment_manifest};
use dock_pm::{InstalledPackage, PackageManager, SyncInvocation};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

/// Package manager that records the manifest content it was asked to
/// sync and returns a scripted exit code.
struct RecordingPm {
    exit_code: i32,
    synced_manifest: std::sync::Mutex<Option<String>>,
}

impl RecordingPm {
    fn with_exit(exit_code: i32) -> Self {
        Self {
            exit_code,
            synced_manifest: std::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl PackageManager for RecordingPm {
    async fn tool_version(&self) -> dock_pm::Result<String> {
        Ok("uv 0.5.0".into())
    }

    async fn create_venv(
        &self,
        _project_dir: &Path,
        _python_version: &str,
        _timeout: Duration,
    ) -> dock_pm::Result<()> {
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
        manifest_path: &Path,
        _timeout: Duration,
    ) -> dock_pm::Result<SyncInvocation> {
        let content = std::fs::read_to_string(manifest_path).unwrap();
        *self.synced_manifest.lock().unwrap() = Some(content);
        Ok(SyncInvocation {
            exit_code: self.exit_code,
            stdout: String::new(),
            stderr: if self.exit_code == 0 {
                String::new()
            } else {
                "No solution found".to_string()
            },
        })
    }
}

struct Workspace {
    _temp: TempDir,
    envs_dir: PathBuf,
    plugins_dir: PathBuf,
}

fn workspace() -> Workspace {
    let temp = TempDir::new().unwrap();
    let envs_dir = temp.path().join("envs");
    let plugins_dir = temp.path().join("plugins");

    let bin = if cfg!(windows) {
        envs_dir.join("main").join(".venv").join("Scripts")
    } else {
        envs_dir.join("main").join(".venv").join("bin")
    };
    std::fs::create_dir_all(&bin).unwrap();
    let python = if cfg!(windows) { "python.exe" } else { "python" };
    std::fs::write(bin.join(python), "").unwrap();
    std::fs::create_dir_all(&plugins_dir).unwrap();

    Workspace {
        _temp: temp,
        envs_dir,
        plugins_dir,
    }
}

fn add_plugin(ws: &Workspace, name: &str, dependencies: &[&str]) {
    let dir = ws.plugins_dir.join(name);
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
}

fn live_manifest(ws: &Workspace) -> PathBuf {
    ws.envs_dir.join("main").join("pyproject.toml")
}

fn env_dir_listing(ws: &Workspace) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(ws.envs_dir.join("main"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn two_plugins_merge_to_the_higher_lower_bound() {
    let ws = workspace();
    add_plugin(&ws, "alpha", &["pkg>=1.0.0"]);
    add_plugin(&ws, "beta", &["pkg>=2.5.0"]);

    let pm = Arc::new(RecordingPm::with_exit(0));
    let (sync, _events) =
        DependencySynchronizer::new(&ws.envs_dir, &ws.plugins_dir, pm.clone() as Arc<dyn PackageManager>);

    let resolved = sync.resolve_dependencies();
    assert_eq!(resolved["pkg"], ">=2.5.0");

    sync.sync_environment("main", &resolved).await.unwrap();

    // The tool saw the merged manifest, and it was promoted verbatim
    let synced = pm.synced_manifest.lock().unwrap().clone().unwrap();
    assert!(synced.contains("\"pkg>=2.5.0\","));
    assert_eq!(std::fs::read_to_string(live_manifest(&ws)).unwrap(), synced);
}

#[tokio::test]
async fn successful_sync_installs_exactly_the_generated_manifest() {
    let ws = workspace();
    std::fs::write(live_manifest(&ws), "# previous generation\n").unwrap();

    let pm = Arc::new(RecordingPm::with_exit(0));
    let (sync, _events) =
        DependencySynchronizer::new(&ws.envs_dir, &ws.plugins_dir, pm as Arc<dyn PackageManager>);

    let mut resolved = BTreeMap::new();
    resolved.insert("psutil".to_string(), ">=7.1.0".to_string());
    sync.sync_environment("main", &resolved).await.unwrap();

    assert_eq!(
        std::fs::read_to_string(live_manifest(&ws)).unwrap(),
        environment_manifest(&resolved)
    );
    assert_eq!(env_dir_listing(&ws), vec![".venv", "pyproject.toml"]);
}

#[tokio::test]
async fn failed_sync_leaves_the_manifest_byte_identical() {
    let ws = workspace();
    let original = "# the exact bytes that were here before\n";
    std::fs::write(live_manifest(&ws), original).unwrap();

    let pm = Arc::new(RecordingPm::with_exit(2));
    let (sync, _events) =
        DependencySynchronizer::new(&ws.envs_dir, &ws.plugins_dir, pm as Arc<dyn PackageManager>);

    let mut resolved = BTreeMap::new();
    resolved.insert("pkg".to_string(), ">=99.0".to_string());
    let err = sync.sync_environment("main", &resolved).await.unwrap_err();

    assert!(matches!(err, dock_deps::Error::SyncFailed { .. }));
    assert_eq!(std::fs::read_to_string(live_manifest(&ws)).unwrap(), original);
    // No temp or backup artifacts anywhere in the environment
    assert_eq!(env_dir_listing(&ws), vec![".venv", "pyproject.toml"]);
}

#[tokio::test]
async fn sync_against_missing_environment_fails_fast() {
    let ws = workspace();
    let pm = Arc::new(RecordingPm::with_exit(0));
    let (sync, _events) =
        DependencySynchronizer::new(&ws.envs_dir, &ws.plugins_dir, pm as Arc<dyn PackageManager>);

    let err = sync
        .sync_environment("missing", &BTreeMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, dock_deps::Error::EnvironmentNotFound { .. }));
}

#[tokio::test]
async fn unparsable_packages_are_omitted_not_fatal() {
    let ws = workspace();
    add_plugin(&ws, "alpha", &["good>=1.0.0", "weird===what==="]);
    add_plugin(&ws, "beta", &["weird=== nope"]);

    let pm = Arc::new(RecordingPm::with_exit(0));
    let (sync, _events) =
        DependencySynchronizer::new(&ws.envs_dir, &ws.plugins_dir, pm as Arc<dyn PackageManager>);

    let resolved = sync.resolve_dependencies();
    assert_eq!(resolved.get("good").map(String::as_str), Some(">=1.0.0"));
    assert!(!resolved.contains_key("weird"));
}
