//! Virtualization backend selection

use std::fmt;
use std::str::FromStr;

use crate::common::env::non_empty_var;
use crate::common::{Error, Result};

/// Backend passed to the lifecycle binary as `--vm-type`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VmBackend {
    /// Apple Virtualization.framework
    #[default]
    Vz,
    Qemu,
    Krunkit,
    Wsl2,
}

impl VmBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            VmBackend::Vz => "vz",
            VmBackend::Qemu => "qemu",
            VmBackend::Krunkit => "krunkit",
            VmBackend::Wsl2 => "wsl2",
        }
    }

    /// Pick the backend: explicit value, then `env_var`, then the default
    pub fn resolve(explicit: Option<&str>, env_var: &str) -> Result<Self> {
        if let Some(value) = explicit.map(str::trim).filter(|v| !v.is_empty()) {
            return value.parse();
        }
        match non_empty_var(env_var) {
            Some(value) => value.parse().map_err(|e| match e {
                Error::Config(msg) => Error::Config(format!("{} (from ${})", msg, env_var)),
                other => other,
            }),
            None => Ok(VmBackend::default()),
        }
    }
}

impl FromStr for VmBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "vz" => Ok(VmBackend::Vz),
            "qemu" => Ok(VmBackend::Qemu),
            "krunkit" => Ok(VmBackend::Krunkit),
            "wsl2" => Ok(VmBackend::Wsl2),
            other => Err(Error::Config(format!(
                "Unknown VM backend '{}'. Supported: vz, qemu, krunkit, wsl2",
                other
            ))),
        }
    }
}

impl fmt::Display for VmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_defaults_to_vz() {
        let backend = VmBackend::resolve(None, "VM_E2E_TEST_BACKEND_UNSET").unwrap();
        assert_eq!(backend, VmBackend::Vz);
    }

    #[test]
    fn test_env_var_selects_backend() {
        std::env::set_var("VM_E2E_TEST_BACKEND_QEMU", "qemu");
        let backend = VmBackend::resolve(None, "VM_E2E_TEST_BACKEND_QEMU").unwrap();
        assert_eq!(backend, VmBackend::Qemu);
        std::env::remove_var("VM_E2E_TEST_BACKEND_QEMU");
    }

    #[test]
    fn test_explicit_beats_env() {
        std::env::set_var("VM_E2E_TEST_BACKEND_BOTH", "qemu");
        let backend = VmBackend::resolve(Some("VZ"), "VM_E2E_TEST_BACKEND_BOTH").unwrap();
        assert_eq!(backend, VmBackend::Vz);
        std::env::remove_var("VM_E2E_TEST_BACKEND_BOTH");
    }

    #[test]
    fn test_unknown_backend_is_config_error() {
        std::env::set_var("VM_E2E_TEST_BACKEND_BAD", "hyperkit");
        let err = VmBackend::resolve(None, "VM_E2E_TEST_BACKEND_BAD").unwrap_err();
        assert!(err.to_string().contains("VM_E2E_TEST_BACKEND_BAD"));
        std::env::remove_var("VM_E2E_TEST_BACKEND_BAD");
    }
}
