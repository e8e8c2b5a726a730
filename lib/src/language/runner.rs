//! Adapter runner detection.
//!
//! Adapters are invoked through the ecosystem's package runner
//! (`npx @xschema/zod`, `uv run xschema-pydantic`, ...). Detection inspects
//! project metadata in a fixed precedence order and always returns
//! something; an absent binary is reported later, at invocation time.

use std::path::Path;

use tracing::debug;

/// The command and leading arguments used to invoke an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runner {
    pub command: String,
    pub args: Vec<String>,
}

impl Runner {
    fn new(command: &str, args: &[&str]) -> Self {
        Self {
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Whether `command` resolves to an executable, either as an explicit
    /// path or via `PATH`.
    pub fn available(&self) -> bool {
        binary_available(&self.command)
    }
}

pub(crate) fn binary_available(command: &str) -> bool {
    let as_path = Path::new(command);
    if as_path.components().count() > 1 {
        return as_path.is_file();
    }
    let Some(path_var) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path_var).any(|dir| dir.join(command).is_file())
}

/// Detects the TypeScript adapter runner for a project.
///
/// Precedence: `package.json` `"packageManager"` field, then lockfiles,
/// then whichever runner is on `PATH`, then `npx`.
pub fn detect_ts_runner(project_root: &Path) -> Runner {
    if let Ok(content) = std::fs::read_to_string(project_root.join("package.json")) {
        if let Some(pm) = declared_package_manager(&content) {
            let runner = match pm {
                "bun" => Runner::new("bunx", &[]),
                "pnpm" => Runner::new("pnpm", &["exec"]),
                "yarn" => Runner::new("yarn", &[]),
                _ => Runner::new("npx", &[]),
            };
            if runner.available() {
                debug!(package_manager = pm, "runner from packageManager field");
                return runner;
            }
        }
    }

    let lockfiles: &[(&str, &str, &[&str])] = &[
        ("bun.lock", "bunx", &[]),
        ("bun.lockb", "bunx", &[]),
        ("pnpm-lock.yaml", "pnpm", &["exec"]),
        ("yarn.lock", "yarn", &[]),
        ("package-lock.json", "npx", &[]),
    ];
    for &(lockfile, command, args) in lockfiles {
        if project_root.join(lockfile).is_file() && binary_available(command) {
            debug!(lockfile, command, "runner from lockfile");
            return Runner::new(command, args);
        }
    }

    for command in ["bunx", "pnpm", "yarn", "npx"] {
        if binary_available(command) {
            let args: &[&str] = if command == "pnpm" { &["exec"] } else { &[] };
            return Runner::new(command, args);
        }
    }

    Runner::new("npx", &[])
}

/// Extracts the manager name from a `"packageManager": "pnpm@9.1.0"` field.
fn declared_package_manager(package_json: &str) -> Option<&'static str> {
    for line in package_json.lines() {
        let line = line.trim();
        if !line.contains("\"packageManager\"") {
            continue;
        }
        for pm in ["bun", "pnpm", "yarn", "npm"] {
            if line.contains(&format!("\"{pm}@")) {
                return Some(pm);
            }
        }
    }
    None
}

/// Detects the Python adapter runner for a project.
///
/// Precedence: lockfiles (`uv.lock`, `poetry.lock`, `Pipfile`), then the
/// `pyproject.toml` build backend, then `python -m`.
pub fn detect_python_runner(project_root: &Path) -> Runner {
    let lockfiles: &[(&str, &str, &[&str])] = &[
        ("uv.lock", "uv", &["run"]),
        ("poetry.lock", "poetry", &["run"]),
        ("Pipfile", "pipenv", &["run"]),
    ];
    for &(lockfile, command, args) in lockfiles {
        if project_root.join(lockfile).is_file() && binary_available(command) {
            debug!(lockfile, command, "runner from lockfile");
            return Runner::new(command, args);
        }
    }

    if let Ok(content) = std::fs::read_to_string(project_root.join("pyproject.toml")) {
        if let Some(tool) = declared_build_tool(&content) {
            if binary_available(tool) {
                debug!(tool, "runner from pyproject build backend");
                return Runner::new(tool, &["run"]);
            }
        }
    }

    Runner::new("python", &["-m"])
}

fn declared_build_tool(pyproject: &str) -> Option<&'static str> {
    for line in pyproject.lines() {
        let line = line.trim();
        if line.contains("build-backend") && line.contains("uv") {
            return Some("uv");
        }
        if line.contains("requires") && line.contains("poetry-core") {
            return Some("poetry");
        }
        if line.contains("requires") && line.contains("flit") {
            return Some("flit");
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn package_manager_field_parsing() {
        assert_eq!(
            declared_package_manager(r#"{ "packageManager": "pnpm@9.1.0" }"#),
            Some("pnpm")
        );
        assert_eq!(
            declared_package_manager(r#"{ "packageManager": "bun@1.1.0" }"#),
            Some("bun")
        );
        assert_eq!(declared_package_manager(r#"{ "name": "app" }"#), None);
    }

    #[test]
    fn build_tool_parsing() {
        assert_eq!(
            declared_build_tool("[build-system]\nrequires = [\"poetry-core\"]"),
            Some("poetry")
        );
        assert_eq!(
            declared_build_tool("build-backend = \"uv_build\""),
            Some("uv")
        );
        assert_eq!(declared_build_tool("requires = [\"setuptools\"]"), None);
    }

    #[test]
    fn ts_detection_falls_back_to_npx() {
        let dir = TempDir::new().unwrap();
        let runner = detect_ts_runner(dir.path());
        // Whatever the host has installed, detection must produce a runner.
        assert!(!runner.command.is_empty());
    }

    #[test]
    fn python_detection_defaults_to_python_dash_m() {
        let dir = TempDir::new().unwrap();
        // No lockfiles, no pyproject: the generic module runner.
        let runner = detect_python_runner(dir.path());
        if runner.command == "python" {
            assert_eq!(runner.args, vec!["-m".to_string()]);
        }
    }

    #[test]
    fn lockfile_is_ignored_when_binary_missing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("Pipfile"), "[packages]").unwrap();
        // `pipenv` is almost certainly absent in CI; either way the result
        // must be a usable fallback, never a panic.
        let runner = detect_python_runner(dir.path());
        assert!(!runner.command.is_empty());
    }

    #[test]
    fn explicit_path_availability() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("tool.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        assert!(binary_available(script.to_str().unwrap()));
        assert!(!binary_available(dir.path().join("missing").to_str().unwrap()));
    }
}
