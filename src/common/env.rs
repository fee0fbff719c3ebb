//! Process-wide environment setup
//!
//! The pinned tool directory must be on `PATH` before the first command is
//! spawned. [`prepend_search_path`] does this once per process; later calls
//! are no-ops that return the directory installed by the first call.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use super::paths::resolve_from_cwd;
use super::{Error, Result};

static PINNED_BIN_DIR: OnceLock<PathBuf> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Prepend `dir` (resolved against the working directory) to `PATH`
///
/// Idempotent: only the first call mutates the environment. A later call with
/// a different directory logs a warning and keeps the first one.
pub fn prepend_search_path(dir: &Path) -> Result<PathBuf> {
    if let Some(existing) = PINNED_BIN_DIR.get() {
        return Ok(already_installed(existing, dir));
    }

    let _guard = INIT_LOCK
        .lock()
        .map_err(|_| Error::Internal("PATH init lock poisoned".to_string()))?;
    if let Some(existing) = PINNED_BIN_DIR.get() {
        return Ok(already_installed(existing, dir));
    }

    let abs = resolve_from_cwd(dir)?;
    let current = std::env::var_os("PATH").unwrap_or_default();
    let new_path = prepend(&abs, &current)?;
    std::env::set_var("PATH", &new_path);
    tracing::info!(dir = %abs.display(), "Prepended pinned binaries to PATH");

    let _ = PINNED_BIN_DIR.set(abs.clone());
    Ok(abs)
}

/// Directory installed by [`prepend_search_path`], if it ran
pub fn pinned_bin_dir() -> Option<&'static Path> {
    PINNED_BIN_DIR.get().map(PathBuf::as_path)
}

fn already_installed(existing: &Path, requested: &Path) -> PathBuf {
    let same = resolve_from_cwd(requested)
        .map(|r| r == existing)
        .unwrap_or(false);
    if !same {
        tracing::warn!(
            installed = %existing.display(),
            requested = %requested.display(),
            "PATH already initialised; ignoring new bin dir"
        );
    }
    existing.to_path_buf()
}

/// Build a search path with `dir` first, dropping any later duplicate of it
pub fn prepend(dir: &Path, current: &OsString) -> Result<OsString> {
    let rest = std::env::split_paths(current).filter(|p| p != dir);
    std::env::join_paths(std::iter::once(dir.to_path_buf()).chain(rest))
        .map_err(|e| Error::Environment(format!("Error setting PATH: {}", e)))
}

/// Read a selector variable, treating empty values as unset
pub fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_puts_dir_first() {
        let current = std::env::join_paths(["/usr/bin", "/bin"]).unwrap();
        let joined = prepend(Path::new("/opt/pinned"), &current).unwrap();
        let parts: Vec<PathBuf> = std::env::split_paths(&joined).collect();
        assert_eq!(
            parts,
            vec![
                PathBuf::from("/opt/pinned"),
                PathBuf::from("/usr/bin"),
                PathBuf::from("/bin")
            ]
        );
    }

    #[test]
    fn test_prepend_is_deterministic_on_repeat() {
        let current = std::env::join_paths(["/opt/pinned", "/usr/bin"]).unwrap();
        let joined = prepend(Path::new("/opt/pinned"), &current).unwrap();
        let parts: Vec<PathBuf> = std::env::split_paths(&joined).collect();
        assert_eq!(parts, vec![PathBuf::from("/opt/pinned"), PathBuf::from("/usr/bin")]);
    }

    #[test]
    fn test_prepend_rejects_separator_in_dir() {
        let sep = if cfg!(windows) { ";" } else { ":" };
        let bad = PathBuf::from(format!("/opt/a{}b", sep));
        let err = prepend(&bad, &OsString::from("/usr/bin")).unwrap_err();
        assert!(matches!(err, Error::Environment(_)));
    }

    #[test]
    fn test_non_empty_var_ignores_blank() {
        std::env::set_var("VM_E2E_TEST_BLANK_SELECTOR", "  ");
        assert_eq!(non_empty_var("VM_E2E_TEST_BLANK_SELECTOR"), None);
        std::env::set_var("VM_E2E_TEST_BLANK_SELECTOR", "qemu");
        assert_eq!(
            non_empty_var("VM_E2E_TEST_BLANK_SELECTOR").as_deref(),
            Some("qemu")
        );
        std::env::remove_var("VM_E2E_TEST_BLANK_SELECTOR");
    }
}
