//! VM template validation
//!
//! The template is opaque to the harness; it only has to exist and be a YAML
//! mapping before we hand it to `start`.

use std::path::{Path, PathBuf};

use crate::common::paths::resolve_from_cwd;
use crate::common::{Error, Result};

/// A validated template file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmTemplate {
    /// Absolute path
    pub path: PathBuf,
    /// `vmType` declared in the template, if any
    pub declared_vm_type: Option<String>,
}

impl VmTemplate {
    /// Resolve `path` against the working directory and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let path = resolve_from_cwd(path)?;
        let content = std::fs::read_to_string(&path).map_err(|e| {
            Error::Config(format!(
                "Failed to read VM template '{}': {}",
                path.display(),
                e
            ))
        })?;

        let doc: serde_yaml::Value = serde_yaml::from_str(&content).map_err(|e| {
            Error::Config(format!(
                "Failed to parse VM template '{}': {}",
                path.display(),
                e
            ))
        })?;

        let mapping = doc.as_mapping().ok_or_else(|| {
            Error::Config(format!(
                "VM template '{}' must be a YAML mapping",
                path.display()
            ))
        })?;

        let declared_vm_type = mapping
            .get("vmType")
            .and_then(|v| v.as_str())
            .map(str::to_string);

        Ok(Self {
            path,
            declared_vm_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_loads_mapping_and_vm_type() {
        let file = write_temp("vmType: qemu\ncpus: 4\nimages:\n  - location: fedora.qcow2\n");
        let template = VmTemplate::load(file.path()).unwrap();
        assert_eq!(template.path, file.path());
        assert_eq!(template.declared_vm_type.as_deref(), Some("qemu"));
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = VmTemplate::load(Path::new("/nonexistent/fedora.yaml")).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_malformed_yaml_is_config_error() {
        let file = write_temp("vmType: [qemu\ncpus: 4\n");
        let err = VmTemplate::load(file.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)), "{err:?}");
    }

    #[test]
    fn test_non_mapping_rejected() {
        let file = write_temp("- just\n- a list\n");
        let err = VmTemplate::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("mapping"));
    }
}
