//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::{Error, Result};

/// Name of the config file looked up in the working directory
pub const LOCAL_CONFIG_FILE: &str = "vm-e2e.toml";

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct HarnessConfig {
    /// VM lifecycle settings
    #[serde(default)]
    pub vm: VmConfig,

    /// Remote target settings
    #[serde(default)]
    pub target: TargetConfig,

    /// Host paths
    #[serde(default)]
    pub paths: PathsConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Local registry bootstrap
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Suite scheduling and reporting
    #[serde(default)]
    pub suite: SuiteConfig,
}

/// VM lifecycle settings
#[derive(Debug, Deserialize, Clone)]
pub struct VmConfig {
    /// Lifecycle binary (resolved on PATH after the pinned bin dir is prepended)
    #[serde(default = "default_controller")]
    pub controller: String,

    /// Tokens placed right after the controller in every lifecycle command
    #[serde(default)]
    pub controller_args: Vec<String>,

    /// Instance name
    #[serde(default = "default_vm_name")]
    pub name: String,

    /// Template path, relative to the working directory
    #[serde(default = "default_template")]
    pub template: PathBuf,

    /// Explicit backend; takes precedence over `backend_env`
    #[serde(default)]
    pub backend: Option<String>,

    /// Environment variable consulted for the backend
    #[serde(default = "default_backend_env")]
    pub backend_env: String,

    /// Extra arguments appended to `start`
    #[serde(default)]
    pub extra_start_args: Vec<String>,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            controller: default_controller(),
            controller_args: Vec::new(),
            name: default_vm_name(),
            template: default_template(),
            backend: None,
            backend_env: default_backend_env(),
            extra_start_args: Vec::new(),
        }
    }
}

fn default_controller() -> String {
    "limactl".to_string()
}
fn default_vm_name() -> String {
    "fedora".to_string()
}
fn default_template() -> PathBuf {
    PathBuf::from("./../_output/lima-template/fedora.yaml")
}
fn default_backend_env() -> String {
    "E2E_VM_TYPE".to_string()
}

/// How commands reach the engine inside the VM
#[derive(Debug, Deserialize, Clone)]
pub struct TargetConfig {
    /// Tokens between `shell <name>` and the engine binary
    #[serde(default = "default_shell_prefix")]
    pub shell_prefix: Vec<String>,

    /// Engine CLI inside the VM
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Forward the host environment into remote commands
    #[serde(default)]
    pub env_passthrough: bool,

    /// Forward the host environment into local lifecycle commands
    #[serde(default = "default_true")]
    pub controller_env_passthrough: bool,

    /// Variables kept when passthrough is off
    #[serde(default = "default_essential_env")]
    pub essential_env: Vec<String>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            shell_prefix: default_shell_prefix(),
            binary: default_binary(),
            env_passthrough: false,
            controller_env_passthrough: true,
            essential_env: default_essential_env(),
        }
    }
}

fn default_shell_prefix() -> Vec<String> {
    vec!["sudo".to_string(), "-E".to_string()]
}
fn default_binary() -> String {
    "nerdctl".to_string()
}
fn default_true() -> bool {
    true
}
fn default_essential_env() -> Vec<String> {
    ["PATH", "HOME", "USER", "LOGNAME", "TMPDIR", "LIMA_HOME"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Host paths
#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    /// Directory of pinned tool binaries, prepended to PATH
    #[serde(default = "default_bin_dir")]
    pub bin_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            bin_dir: default_bin_dir(),
        }
    }
}

fn default_bin_dir() -> PathBuf {
    PathBuf::from("./../_output/bin/")
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    #[serde(default = "default_start")]
    pub start_secs: u64,

    #[serde(default = "default_stop")]
    pub stop_secs: u64,

    #[serde(default = "default_remove")]
    pub remove_secs: u64,

    /// Default for any invocation that does not set its own
    #[serde(default = "default_command")]
    pub command_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            start_secs: default_start(),
            stop_secs: default_stop(),
            remove_secs: default_remove(),
            command_secs: default_command(),
        }
    }
}

impl Timeouts {
    pub fn start(&self) -> Duration {
        Duration::from_secs(self.start_secs)
    }

    pub fn stop(&self) -> Duration {
        Duration::from_secs(self.stop_secs)
    }

    pub fn remove(&self) -> Duration {
        Duration::from_secs(self.remove_secs)
    }

    pub fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }
}

fn default_start() -> u64 {
    600
}
fn default_stop() -> u64 {
    90
}
fn default_remove() -> u64 {
    60
}
fn default_command() -> u64 {
    120
}

/// Local registry bootstrap
#[derive(Debug, Deserialize, Clone)]
pub struct RegistryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_registry_name")]
    pub name: String,

    #[serde(default = "default_registry_image")]
    pub image: String,

    #[serde(default = "default_registry_port")]
    pub host_port: u16,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            name: default_registry_name(),
            image: default_registry_image(),
            host_port: default_registry_port(),
        }
    }
}

fn default_registry_name() -> String {
    "local-registry".to_string()
}
fn default_registry_image() -> String {
    "public.ecr.aws/docker/library/registry:2".to_string()
}
fn default_registry_port() -> u16 {
    5000
}

/// Suite scheduling and reporting
#[derive(Debug, Deserialize, Clone)]
pub struct SuiteConfig {
    /// Logical workers sharing the VM
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Only run cases whose name contains one of these
    #[serde(default)]
    pub focus: Vec<String>,

    /// Write a JSON report here
    #[serde(default)]
    pub report: Option<PathBuf>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            focus: Vec::new(),
            report: None,
        }
    }
}

fn default_workers() -> usize {
    1
}

impl HarnessConfig {
    /// Load configuration
    ///
    /// An explicit path must exist. Without one, `./vm-e2e.toml` and then the
    /// platform config file are tried; defaults are used if neither exists.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            return Self::from_file(&local);
        }

        if let Some(path) = config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }

        Ok(Self::default())
    }

    /// Parse a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.vm.controller.trim().is_empty() {
            return Err(Error::Config("vm.controller must not be empty".to_string()));
        }
        if self.vm.name.trim().is_empty() {
            return Err(Error::Config("vm.name must not be empty".to_string()));
        }
        if self.target.binary.trim().is_empty() {
            return Err(Error::Config("target.binary must not be empty".to_string()));
        }
        if self.suite.workers == 0 {
            return Err(Error::Config("suite.workers must be at least 1".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_lifecycle_surface() {
        let config = HarnessConfig::default();
        assert_eq!(config.vm.controller, "limactl");
        assert_eq!(config.vm.name, "fedora");
        assert_eq!(config.timeouts.start_secs, 600);
        assert_eq!(config.timeouts.stop_secs, 90);
        assert_eq!(config.timeouts.remove_secs, 60);
        assert!(!config.target.env_passthrough);
        assert!(config.target.controller_env_passthrough);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = HarnessConfig::from_toml(
            r#"
[vm]
name = "e2e"
backend = "qemu"

[timeouts]
start_secs = 300
"#,
        )
        .unwrap();
        assert_eq!(config.vm.name, "e2e");
        assert_eq!(config.vm.backend.as_deref(), Some("qemu"));
        assert_eq!(config.vm.controller, "limactl");
        assert_eq!(config.timeouts.start(), Duration::from_secs(300));
        assert_eq!(config.timeouts.stop_secs, 90);
        assert_eq!(config.target.binary, "nerdctl");
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = HarnessConfig::from_toml("[suite]\nworkers = 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_garbage_is_parse_error() {
        let err = HarnessConfig::from_toml("[vm\nname=").unwrap_err();
        assert!(matches!(err, Error::ConfigParse(_)));
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let err = HarnessConfig::load(Some(Path::new("/nonexistent/vm-e2e.toml"))).unwrap_err();
        assert!(matches!(err, Error::FileRead { .. }));
    }
}
