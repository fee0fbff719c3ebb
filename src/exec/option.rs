//! Execution options
//!
//! An [`ExecutionOption`] says how to reach a binary: the argv prefix every
//! command starts with, and whether the host environment follows it. Options
//! are immutable and cheap to clone; one is built per suite and handed to
//! every case.

use std::sync::Arc;
use std::time::Duration;

use tokio::process::Command;

use crate::common::{display_command, Error, Result};

/// Default timeout for invocations that do not set one
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Environment passthrough policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvPolicy {
    /// Child sees the full host environment
    Inherit,
    /// Child environment is cleared, then only `keep` is copied from the host
    Isolated { keep: Vec<String> },
}

impl EnvPolicy {
    /// Isolated policy keeping the given variable names
    pub fn isolated<I, S>(keep: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        EnvPolicy::Isolated {
            keep: keep.into_iter().map(Into::into).collect(),
        }
    }

    /// Build from a passthrough flag and the allow-list used when it is off
    pub fn from_passthrough(passthrough: bool, keep: &[String]) -> Self {
        if passthrough {
            EnvPolicy::Inherit
        } else {
            EnvPolicy::isolated(keep.iter().cloned())
        }
    }

    pub fn passthrough(&self) -> bool {
        matches!(self, EnvPolicy::Inherit)
    }

    /// Apply the policy to a command before spawning it
    pub fn apply(&self, cmd: &mut Command) {
        if let EnvPolicy::Isolated { keep } = self {
            cmd.env_clear();
            for key in keep {
                if let Some(value) = std::env::var_os(key) {
                    cmd.env(key, value);
                }
            }
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Inner {
    prefix: Vec<String>,
    env: EnvPolicy,
    default_timeout: Duration,
}

/// Immutable description of how to invoke commands
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOption {
    inner: Arc<Inner>,
}

impl ExecutionOption {
    /// Build an option from its argv prefix and passthrough policy
    ///
    /// Fails with [`Error::EmptyPrefix`] if the prefix is empty or its first
    /// token (the program) is blank.
    pub fn new<I, S>(prefix: I, env: EnvPolicy) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefix: Vec<String> = prefix.into_iter().map(Into::into).collect();
        match prefix.first() {
            Some(program) if !program.trim().is_empty() => {}
            _ => return Err(Error::EmptyPrefix),
        }

        Ok(Self {
            inner: Arc::new(Inner {
                prefix,
                env,
                default_timeout: DEFAULT_TIMEOUT,
            }),
        })
    }

    /// Same prefix and policy with a different default timeout
    pub fn with_default_timeout(&self, timeout: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                prefix: self.inner.prefix.clone(),
                env: self.inner.env.clone(),
                default_timeout: timeout,
            }),
        }
    }

    /// Derive an option that appends `tokens` to this prefix
    ///
    /// The passthrough policy is set independently, so a remote target can
    /// suppress the host environment while the local controller keeps it.
    pub fn extend<I, S>(&self, tokens: I, env: EnvPolicy) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let prefix = self
            .inner
            .prefix
            .iter()
            .cloned()
            .chain(tokens.into_iter().map(Into::into));
        Ok(Self::new(prefix, env)?.with_default_timeout(self.inner.default_timeout))
    }

    /// Remote target: `<controller> shell <vm> <elevate...> <binary>`
    pub fn remote_shell(
        controller: &ExecutionOption,
        vm_name: &str,
        elevate: &[String],
        binary: &str,
        env: EnvPolicy,
    ) -> Result<Self> {
        if vm_name.trim().is_empty() || binary.trim().is_empty() {
            return Err(Error::Config(
                "remote target needs a VM name and a binary".to_string(),
            ));
        }
        let tokens = ["shell".to_string(), vm_name.to_string()]
            .into_iter()
            .chain(elevate.iter().cloned())
            .chain(std::iter::once(binary.to_string()));
        controller.extend(tokens, env)
    }

    pub fn prefix(&self) -> &[String] {
        &self.inner.prefix
    }

    /// First prefix token
    pub fn program(&self) -> &str {
        &self.inner.prefix[0]
    }

    pub fn env_policy(&self) -> &EnvPolicy {
        &self.inner.env
    }

    /// Whether host environment variables propagate into invocations
    pub fn passthrough(&self) -> bool {
        self.inner.env.passthrough()
    }

    pub fn default_timeout(&self) -> Duration {
        self.inner.default_timeout
    }
}

impl std::fmt::Display for ExecutionOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", display_command(self.prefix()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keep() -> Vec<String> {
        vec!["PATH".to_string(), "HOME".to_string()]
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let err = ExecutionOption::new(Vec::<String>::new(), EnvPolicy::Inherit).unwrap_err();
        assert!(matches!(err, Error::EmptyPrefix));

        let err = ExecutionOption::new(["  ", "shell"], EnvPolicy::Inherit).unwrap_err();
        assert!(matches!(err, Error::EmptyPrefix));
    }

    #[test]
    fn test_passthrough_round_trips() {
        for passthrough in [true, false] {
            let opt = ExecutionOption::new(
                ["limactl"],
                EnvPolicy::from_passthrough(passthrough, &keep()),
            )
            .unwrap();
            assert_eq!(opt.passthrough(), passthrough);
        }
    }

    #[test]
    fn test_remote_shell_wraps_controller() {
        let limactl = ExecutionOption::new(["limactl"], EnvPolicy::Inherit).unwrap();
        let nerdctl = ExecutionOption::remote_shell(
            &limactl,
            "fedora",
            &["sudo".to_string(), "-E".to_string()],
            "nerdctl",
            EnvPolicy::isolated(keep()),
        )
        .unwrap();

        assert_eq!(
            nerdctl.prefix(),
            ["limactl", "shell", "fedora", "sudo", "-E", "nerdctl"]
        );
        assert_eq!(nerdctl.program(), "limactl");
        assert!(limactl.passthrough());
        assert!(!nerdctl.passthrough());
    }

    #[test]
    fn test_policies_differ_only_in_env() {
        let a = ExecutionOption::new(["limactl", "shell", "fedora"], EnvPolicy::Inherit).unwrap();
        let b = ExecutionOption::new(
            ["limactl", "shell", "fedora"],
            EnvPolicy::isolated(keep()),
        )
        .unwrap();
        assert_eq!(a.prefix(), b.prefix());
        assert_eq!(a.default_timeout(), b.default_timeout());
        assert_ne!(a, b);
    }

    #[test]
    fn test_extend_keeps_default_timeout() {
        let base = ExecutionOption::new(["limactl"], EnvPolicy::Inherit)
            .unwrap()
            .with_default_timeout(Duration::from_secs(7));
        let derived = base.extend(["list"], EnvPolicy::Inherit).unwrap();
        assert_eq!(derived.default_timeout(), Duration::from_secs(7));
        assert_eq!(derived.to_string(), "limactl list");
    }
}
