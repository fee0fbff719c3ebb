//! Local registry bootstrap
//!
//! Push/pull cases need a registry reachable from inside the VM. It is set up
//! once after the VM is running, by running a registry container through the
//! remote target.

use std::sync::OnceLock;
use std::time::Duration;

use tokio::sync::OnceCell;

use crate::common::config::RegistryConfig;
use crate::common::{Error, Result};
use crate::exec::{CommandInvocation, ExecutionOption};

/// Port the registry listens on inside its container
const CONTAINER_PORT: u16 = 5000;

/// Pulling the registry image on a fresh VM can be slow
const RUN_TIMEOUT: Duration = Duration::from_secs(300);

static ACTIVE_ADDRESS: OnceLock<String> = OnceLock::new();

/// Address of the bootstrapped registry, as seen from inside the VM
///
/// Falls back to `localhost:5000` if no registry has been set up in this
/// process.
pub fn address() -> &'static str {
    ACTIVE_ADDRESS
        .get()
        .map(String::as_str)
        .unwrap_or("localhost:5000")
}

/// A registry container managed through the remote target
#[derive(Debug)]
pub struct LocalRegistry {
    name: String,
    image: String,
    host_port: u16,
    done: OnceCell<()>,
}

impl LocalRegistry {
    pub fn new(name: impl Into<String>, image: impl Into<String>, host_port: u16) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            host_port,
            done: OnceCell::new(),
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.name.clone(), config.image.clone(), config.host_port)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `localhost:<port>`
    pub fn address(&self) -> String {
        format!("localhost:{}", self.host_port)
    }

    /// Make sure the registry container exists and is running
    ///
    /// Later calls on the same instance return immediately. An existing
    /// container (from a persistent VM) is reused.
    pub async fn setup_once(&self, target: &ExecutionOption) -> Result<()> {
        self.done
            .get_or_try_init(|| async {
                self.ensure_running(target).await?;
                let _ = ACTIVE_ADDRESS.set(self.address());
                tracing::info!(registry = %self.name, address = %self.address(), "Local registry ready");
                Ok::<(), Error>(())
            })
            .await?;
        Ok(())
    }

    async fn ensure_running(&self, target: &ExecutionOption) -> Result<()> {
        let inspect = CommandInvocation::new(
            target,
            [
                "container",
                "inspect",
                "--format",
                "{{.State.Running}}",
                self.name.as_str(),
            ],
        )
        .output()
        .await
        .map_err(|e| Error::RegistrySetup(e.to_string()))?;

        if inspect.success() {
            if inspect.stdout.trim() == "true" {
                tracing::debug!(registry = %self.name, "Registry already running");
                return Ok(());
            }
            tracing::debug!(registry = %self.name, "Registry exists, starting it");
            CommandInvocation::new(target, ["start", self.name.as_str()])
                .run()
                .await
                .map_err(|e| Error::RegistrySetup(e.to_string()))?;
            return Ok(());
        }

        CommandInvocation::new(target, self.run_args())
            .with_timeout(RUN_TIMEOUT)
            .run()
            .await
            .map_err(|e| Error::RegistrySetup(e.to_string()))?;
        Ok(())
    }

    fn run_args(&self) -> Vec<String> {
        vec![
            "run".to_string(),
            "-d".to_string(),
            "--restart=always".to_string(),
            "-p".to_string(),
            format!("{}:{}", self.host_port, CONTAINER_PORT),
            "--name".to_string(),
            self.name.clone(),
            self.image.clone(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_args_publish_port() {
        let registry = LocalRegistry::new("local-registry", "registry:2", 5001);
        assert_eq!(
            registry.run_args(),
            [
                "run",
                "-d",
                "--restart=always",
                "-p",
                "5001:5000",
                "--name",
                "local-registry",
                "registry:2"
            ]
        );
        assert_eq!(registry.address(), "localhost:5001");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_running_registry_is_reused() {
        use crate::exec::EnvPolicy;

        // `inspect` prints "true", so nothing else may be issued; a second
        // command would exit 9 and fail the setup.
        let target = ExecutionOption::new(
            [
                "sh",
                "-c",
                r#"if [ "$1" = container ]; then echo true; else exit 9; fi"#,
                "nerdctl",
            ],
            EnvPolicy::Inherit,
        )
        .unwrap();
        let registry = LocalRegistry::new("local-registry", "registry:2", 5000);
        registry.setup_once(&target).await.unwrap();
        registry.setup_once(&target).await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_failure_is_registry_error() {
        use crate::exec::EnvPolicy;

        let target =
            ExecutionOption::new(["sh", "-c", "exit 1", "nerdctl"], EnvPolicy::Inherit).unwrap();
        let registry = LocalRegistry::new("local-registry", "registry:2", 5000);
        let err = registry.setup_once(&target).await.unwrap_err();
        assert!(matches!(err, Error::RegistrySetup(_)));
    }
}
