//! Concrete command invocations
//!
//! A [`CommandInvocation`] is an option prefix plus per-call arguments. It is
//! built, run once and dropped.

use std::time::Duration;

use crate::common::{display_command, Result};

use super::option::ExecutionOption;
use super::runner::{self, CommandOutput};

/// One command to run through an [`ExecutionOption`]
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    option: ExecutionOption,
    args: Vec<String>,
    timeout: Option<Duration>,
    env: Vec<(String, String)>,
    stdin: Option<Vec<u8>>,
}

impl CommandInvocation {
    pub fn new<I, S>(option: &ExecutionOption, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            option: option.clone(),
            args: args.into_iter().map(Into::into).collect(),
            timeout: None,
            env: Vec::new(),
            stdin: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_timeout_in_seconds(self, secs: u64) -> Self {
        self.with_timeout(Duration::from_secs(secs))
    }

    /// Set a variable on this call only; applied under either passthrough policy
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Feed `input` to the process on stdin
    pub fn with_stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn option(&self) -> &ExecutionOption {
        &self.option
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Full argv: option prefix followed by the call arguments
    pub fn argv(&self) -> Vec<String> {
        self.option
            .prefix()
            .iter()
            .chain(self.args.iter())
            .cloned()
            .collect()
    }

    /// Effective timeout, falling back to the option default
    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or_else(|| self.option.default_timeout())
    }

    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn stdin(&self) -> Option<&[u8]> {
        self.stdin.as_deref()
    }

    pub fn display(&self) -> String {
        display_command(&self.argv())
    }

    /// Run and require a zero exit status
    pub async fn run(&self) -> Result<CommandOutput> {
        runner::run(self).await
    }

    /// Run and require a non-zero exit status
    pub async fn run_expect_failure(&self) -> Result<CommandOutput> {
        runner::run_expect_failure(self).await
    }

    /// Run and return whatever the process produced
    pub async fn output(&self) -> Result<CommandOutput> {
        runner::execute(self).await
    }

    /// Let a streaming command run for `window`, then stop it and keep its output
    pub async fn capture_for(&self, window: Duration) -> Result<CommandOutput> {
        runner::capture_for(self, window).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::EnvPolicy;

    #[test]
    fn test_argv_is_prefix_then_args() {
        let opt = ExecutionOption::new(["limactl", "shell", "fedora"], EnvPolicy::Inherit).unwrap();
        let inv = CommandInvocation::new(&opt, ["nerdctl", "ps", "-a"]);
        assert_eq!(
            inv.argv(),
            ["limactl", "shell", "fedora", "nerdctl", "ps", "-a"]
        );
        assert_eq!(inv.display(), "limactl shell fedora nerdctl ps -a");
    }

    #[test]
    fn test_timeout_defaults_to_option() {
        let opt = ExecutionOption::new(["limactl"], EnvPolicy::Inherit)
            .unwrap()
            .with_default_timeout(Duration::from_secs(42));
        let inv = CommandInvocation::new(&opt, ["list"]);
        assert_eq!(inv.timeout(), Duration::from_secs(42));

        let inv = inv.with_timeout_in_seconds(600);
        assert_eq!(inv.timeout(), Duration::from_secs(600));
    }
}
