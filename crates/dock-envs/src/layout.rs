//! Environment directory layout
//!
//! An environment lives at `envs/<name>/` and may nest its interpreter
//! inside a `.venv/` subdirectory (the layout uv creates) or directly in
//! the environment directory (classic venv layout).

use std::path::{Path, PathBuf};

/// Resolve the interpreter path for an environment directory.
///
/// Prefers `<env>/.venv/` when present, then applies the platform binary
/// layout. The returned path is where the interpreter *would* be; callers
/// check existence.
pub fn interpreter_path(env_dir: &Path) -> PathBuf {
    let base = if env_dir.join(".venv").exists() {
        env_dir.join(".venv")
    } else {
        env_dir.to_path_buf()
    };
    if cfg!(windows) {
        base.join("Scripts").join("python.exe")
    } else {
        base.join("bin").join("python")
    }
}

/// Seed manifest written into a freshly created environment directory.
pub fn seed_manifest(env_name: &str, python_version: &str) -> String {
    format!(
        r#"[project]
name = "{env_name}"
version = "0.1.0"
description = "Virtual environment for {env_name}"
requires-python = ">={python_version}"

[tool.uv]
dev-dependencies = []
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn interpreter_path_without_nested_venv() {
        let temp = TempDir::new().unwrap();
        let path = interpreter_path(temp.path());
        if cfg!(windows) {
            assert!(path.ends_with("Scripts/python.exe"));
        } else {
            assert!(path.ends_with("bin/python"));
        }
        assert!(path.starts_with(temp.path()));
    }

    #[test]
    fn interpreter_path_prefers_nested_venv() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir(temp.path().join(".venv")).unwrap();

        let path = interpreter_path(temp.path());
        assert!(path.starts_with(temp.path().join(".venv")));
    }

    #[test]
    fn seed_manifest_pins_requested_python() {
        let manifest = seed_manifest("main", "3.12");
        assert!(manifest.contains("name = \"main\""));
        assert!(manifest.contains("requires-python = \">=3.12\""));
        assert!(manifest.contains("[tool.uv]"));
    }
}
