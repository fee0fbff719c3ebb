//! The VM-backed suite environment
//!
//! Builds the two execution options (local controller, remote target) from
//! configuration and plugs the VM lifecycle and registry bootstrap into the
//! suite hooks.
//!
//! The pinned bin dir must already be on `PATH` (see
//! [`crate::common::env::prepend_search_path`]) before `before_suite` runs.

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::common::{HarnessConfig, Result};
use crate::exec::{EnvPolicy, ExecutionOption};
use crate::registry::LocalRegistry;
use crate::vm::{LifecycleTimeouts, VmBackend, VmController, VmInstance, VmState, VmTemplate};

use super::runner::SuiteHooks;

/// Option that invokes the lifecycle binary directly on the host
pub fn controller_option(config: &HarnessConfig) -> Result<ExecutionOption> {
    let prefix = std::iter::once(config.vm.controller.clone())
        .chain(config.vm.controller_args.iter().cloned());
    let env = EnvPolicy::from_passthrough(
        config.target.controller_env_passthrough,
        &config.target.essential_env,
    );
    Ok(ExecutionOption::new(prefix, env)?.with_default_timeout(config.timeouts.command()))
}

fn lifecycle_timeouts(config: &HarnessConfig) -> LifecycleTimeouts {
    LifecycleTimeouts {
        start: config.timeouts.start(),
        stop: config.timeouts.stop(),
        remove: config.timeouts.remove(),
    }
}

/// Lifecycle controller for teardown without a validated template
///
/// Used to clean up a VM leaked by an interrupted run; only `stop` and
/// `remove` are meaningful on it.
pub fn teardown_controller(config: &HarnessConfig) -> Result<VmController> {
    Ok(VmController::new(
        controller_option(config)?,
        VmInstance {
            name: config.vm.name.clone(),
            template: config.vm.template.clone(),
            backend: VmBackend::resolve(config.vm.backend.as_deref(), &config.vm.backend_env)
                .unwrap_or_default(),
        },
        lifecycle_timeouts(config),
    ))
}

/// One VM plus the options and bootstrap that go with it
#[derive(Debug)]
pub struct VmEnvironment {
    vm: Mutex<VmController>,
    registry: Option<LocalRegistry>,
    controller: ExecutionOption,
    target: ExecutionOption,
}

impl VmEnvironment {
    /// Validate configuration and build the options
    ///
    /// Issues no commands; a bad template or backend fails here.
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let template = VmTemplate::load(&config.vm.template)?;
        let backend = VmBackend::resolve(config.vm.backend.as_deref(), &config.vm.backend_env)?;
        if let Some(declared) = &template.declared_vm_type {
            if declared != backend.as_str() {
                tracing::info!(
                    declared = %declared,
                    selected = %backend,
                    "Template vmType overridden by --vm-type"
                );
            }
        }

        let controller = controller_option(config)?;
        let vm = VmController::new(
            controller.clone(),
            VmInstance {
                name: config.vm.name.clone(),
                template: template.path,
                backend,
            },
            lifecycle_timeouts(config),
        )
        .with_extra_start_args(config.vm.extra_start_args.clone());

        let target = vm.remote_target(
            &config.target.shell_prefix,
            &config.target.binary,
            EnvPolicy::from_passthrough(config.target.env_passthrough, &config.target.essential_env),
        )?;

        let registry = config
            .registry
            .enabled
            .then(|| LocalRegistry::from_config(&config.registry));

        Ok(Self {
            vm: Mutex::new(vm),
            registry,
            controller,
            target,
        })
    }

    /// Option every case is bound to
    pub fn target(&self) -> &ExecutionOption {
        &self.target
    }

    /// Option for the lifecycle binary itself
    pub fn controller(&self) -> &ExecutionOption {
        &self.controller
    }

    pub async fn vm_state(&self) -> VmState {
        self.vm.lock().await.state()
    }

    pub async fn instance(&self) -> VmInstance {
        self.vm.lock().await.instance().clone()
    }
}

#[async_trait]
impl SuiteHooks for VmEnvironment {
    async fn before_suite(&self) -> Result<()> {
        self.vm.lock().await.start().await?;
        if let Some(registry) = &self.registry {
            registry.setup_once(&self.target).await?;
        }
        Ok(())
    }

    async fn after_suite(&self) -> Result<()> {
        self.vm.lock().await.teardown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;

    #[test]
    fn test_missing_template_fails_before_any_command() {
        let mut config = HarnessConfig::default();
        config.vm.template = "/nonexistent/lima-template/fedora.yaml".into();
        let err = VmEnvironment::from_config(&config).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_controller_option_appends_args() {
        let mut config = HarnessConfig::default();
        config.vm.controller = "sh".to_string();
        config.vm.controller_args = vec!["/tmp/fake-limactl.sh".to_string()];
        config.timeouts.command_secs = 5;
        let opt = controller_option(&config).unwrap();
        assert_eq!(opt.prefix(), ["sh", "/tmp/fake-limactl.sh"]);
        assert!(opt.passthrough());
        assert_eq!(opt.default_timeout().as_secs(), 5);
    }

    #[test]
    fn test_environment_options() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("fedora.yaml");
        std::fs::write(&template, "images: []\n").unwrap();

        let mut config = HarnessConfig::default();
        config.vm.template = template;
        config.vm.backend_env = "VM_E2E_TEST_ENV_BACKEND_UNSET".to_string();
        let env = VmEnvironment::from_config(&config).unwrap();

        assert_eq!(env.controller().prefix(), ["limactl"]);
        assert_eq!(
            env.target().prefix(),
            ["limactl", "shell", "fedora", "sudo", "-E", "nerdctl"]
        );
        assert!(env.controller().passthrough());
        assert!(!env.target().passthrough());
    }
}
