//! Host path resolution
//!
//! Relative inputs (VM template, pinned bin dir) are resolved against the
//! working directory of the invoking process.

use std::path::{Path, PathBuf};

use super::{Error, Result};

/// Name used for the platform config directory
const APP_NAME: &str = "vm-e2e";

/// Resolve `path` against the current working directory
///
/// Absolute paths are returned unchanged. The result is lexically normalized
/// (`.` and `..` collapsed) but symlinks are left alone, so paths that do not
/// exist yet still resolve.
pub fn resolve_from_cwd(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(normalize(path));
    }
    let cwd = std::env::current_dir().map_err(|e| {
        Error::Environment(format!("failed to get the current working directory: {}", e))
    })?;
    Ok(normalize(&cwd.join(path)))
}

fn normalize(path: &Path) -> PathBuf {
    use std::path::Component;

    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Get the configuration directory path
///
/// - Linux: `~/.config/vm-e2e/`
/// - macOS: `~/Library/Application Support/vm-e2e/`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_is_joined_to_cwd() {
        let cwd = std::env::current_dir().unwrap();
        let resolved = resolve_from_cwd(Path::new("./../_output/bin/")).unwrap();
        let expected = normalize(&cwd.join("../_output/bin"));
        assert_eq!(resolved, expected);
        assert!(resolved.is_absolute());
    }

    #[test]
    fn test_absolute_path_unchanged() {
        let resolved = resolve_from_cwd(Path::new("/opt/tools/./bin")).unwrap();
        assert_eq!(resolved, PathBuf::from("/opt/tools/bin"));
    }

    #[test]
    fn test_config_path_is_toml() {
        if let Some(path) = config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }
}
