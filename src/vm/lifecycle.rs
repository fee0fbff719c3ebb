//! VM lifecycle controller
//!
//! Drives one named instance through `start`, `stop` and `remove` on the
//! lifecycle binary. Each operation gets a single timeout and no retry.
//! Teardown always issues both `stop` and `remove`, whatever state setup
//! left the instance in.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::common::{Error, Result};
use crate::exec::{CommandInvocation, EnvPolicy, ExecutionOption};

use super::backend::VmBackend;

/// The instance managed for one suite run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VmInstance {
    pub name: String,
    /// Absolute template path
    pub template: PathBuf,
    pub backend: VmBackend,
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmState {
    NotStarted,
    Starting,
    Running,
    StartFailed,
    /// `stop` succeeded, `remove` still pending
    Stopping,
    Removed,
}

impl fmt::Display for VmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VmState::NotStarted => "not started",
            VmState::Starting => "starting",
            VmState::Running => "running",
            VmState::StartFailed => "start failed",
            VmState::Stopping => "stopping",
            VmState::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// Per-operation timeouts
#[derive(Debug, Clone, Copy)]
pub struct LifecycleTimeouts {
    pub start: Duration,
    pub stop: Duration,
    pub remove: Duration,
}

impl Default for LifecycleTimeouts {
    fn default() -> Self {
        Self {
            start: Duration::from_secs(600),
            stop: Duration::from_secs(90),
            remove: Duration::from_secs(60),
        }
    }
}

/// Start/stop/remove one VM through the lifecycle binary
#[derive(Debug)]
pub struct VmController {
    controller: ExecutionOption,
    instance: VmInstance,
    timeouts: LifecycleTimeouts,
    extra_start_args: Vec<String>,
    state: VmState,
}

impl VmController {
    pub fn new(controller: ExecutionOption, instance: VmInstance, timeouts: LifecycleTimeouts) -> Self {
        Self {
            controller,
            instance,
            timeouts,
            extra_start_args: Vec::new(),
            state: VmState::NotStarted,
        }
    }

    /// Append arguments to the `start` command
    pub fn with_extra_start_args(mut self, args: Vec<String>) -> Self {
        self.extra_start_args = args;
        self
    }

    pub fn state(&self) -> VmState {
        self.state
    }

    pub fn instance(&self) -> &VmInstance {
        &self.instance
    }

    pub fn controller(&self) -> &ExecutionOption {
        &self.controller
    }

    /// Option that runs `binary` inside this VM's shell
    pub fn remote_target(
        &self,
        elevate: &[String],
        binary: &str,
        env: EnvPolicy,
    ) -> Result<ExecutionOption> {
        ExecutionOption::remote_shell(&self.controller, &self.instance.name, elevate, binary, env)
    }

    /// Arguments for `start`
    pub fn start_args(&self) -> Vec<String> {
        let mut args = vec![
            "start".to_string(),
            self.instance.template.display().to_string(),
            "--name".to_string(),
            self.instance.name.clone(),
            "--vm-type".to_string(),
            self.instance.backend.to_string(),
        ];
        args.extend(self.extra_start_args.iter().cloned());
        args
    }

    /// Provision the VM
    ///
    /// Allowed only from `NotStarted`. Any failure (non-zero exit, timeout,
    /// missing binary) leaves the controller in `StartFailed`.
    pub async fn start(&mut self) -> Result<()> {
        if self.state != VmState::NotStarted {
            return Err(Error::Internal(format!(
                "cannot start VM '{}' while it is {}",
                self.instance.name, self.state
            )));
        }

        self.state = VmState::Starting;
        tracing::info!(
            vm = %self.instance.name,
            template = %self.instance.template.display(),
            backend = %self.instance.backend,
            "Starting VM"
        );

        let result = CommandInvocation::new(&self.controller, self.start_args())
            .with_timeout(self.timeouts.start)
            .run()
            .await;

        match result {
            Ok(out) => {
                self.state = VmState::Running;
                tracing::info!(
                    vm = %self.instance.name,
                    elapsed_secs = out.duration.as_secs(),
                    "VM running"
                );
                Ok(())
            }
            Err(e) => {
                self.state = VmState::StartFailed;
                if e.is_timeout() {
                    tracing::error!(
                        vm = %self.instance.name,
                        timeout_secs = self.timeouts.start.as_secs(),
                        "VM did not come up in time"
                    );
                } else {
                    tracing::error!(vm = %self.instance.name, error = %e, "VM start failed");
                }
                Err(Error::lifecycle("start", &self.instance.name, e))
            }
        }
    }

    /// Stop the VM; attempted from any state
    pub async fn stop(&mut self) -> Result<()> {
        tracing::info!(vm = %self.instance.name, state = %self.state, "Stopping VM");
        CommandInvocation::new(&self.controller, ["stop", self.instance.name.as_str()])
            .with_timeout(self.timeouts.stop)
            .run()
            .await
            .map_err(|e| Error::lifecycle("stop", &self.instance.name, e))?;

        if self.state == VmState::Running {
            self.state = VmState::Stopping;
        }
        Ok(())
    }

    /// Remove the VM; attempted from any state
    pub async fn remove(&mut self) -> Result<()> {
        tracing::info!(vm = %self.instance.name, "Removing VM");
        CommandInvocation::new(&self.controller, ["remove", self.instance.name.as_str()])
            .with_timeout(self.timeouts.remove)
            .run()
            .await
            .map_err(|e| Error::lifecycle("remove", &self.instance.name, e))?;

        self.state = VmState::Removed;
        Ok(())
    }

    /// Stop then remove, both attempted even if the first fails
    ///
    /// Returns the first error.
    pub async fn teardown(&mut self) -> Result<()> {
        let stopped = self.stop().await;
        if let Err(e) = &stopped {
            tracing::warn!("{}", e);
        }
        let removed = self.remove().await;
        if let Err(e) = &removed {
            tracing::warn!("{}", e);
        }
        stopped.and(removed)
    }
}
