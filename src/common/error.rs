//! Error types for the e2e harness
//!
//! Errors fall into four families: configuration, environment, lifecycle and
//! case assertions. The first three abort the run; assertion errors are
//! recorded per case and the suite keeps going.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum Error {
    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    #[error("Execution option requires a non-empty invocation prefix")]
    EmptyPrefix,

    // === Environment Errors ===
    #[error("Environment error: {0}")]
    Environment(String),

    #[error("Program '{program}' not found on PATH")]
    ProgramNotFound { program: String },

    // === Command Errors ===
    #[error("Failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Command `{command}` exited with code {code:?}: {stderr}")]
    CommandFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("Command `{command}` was killed after timing out ({secs}s)")]
    Timeout { command: String, secs: u64 },

    // === Lifecycle Errors ===
    #[error("VM {op} failed for '{name}': {source}")]
    Lifecycle {
        op: &'static str,
        name: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Registry setup failed: {0}")]
    RegistrySetup(String),

    #[error("Suite setup failed on the owning worker: {0}")]
    SetupAborted(String),

    // === Test Errors ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    // === IO / Serialization Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Wrap a runner error as a failed lifecycle operation
    pub fn lifecycle(op: &'static str, name: &str, source: Error) -> Self {
        Self::Lifecycle {
            op,
            name: name.to_string(),
            source: Box::new(source),
        }
    }

    /// Create a command failed error, keeping only the tail of stderr
    pub fn command_failed(command: &str, code: Option<i32>, stderr: &str) -> Self {
        Self::CommandFailed {
            command: command.to_string(),
            code,
            stderr: tail(stderr.trim(), 2048).to_string(),
        }
    }

    /// Create an assertion error
    pub fn assertion<S: Into<String>>(message: S) -> Self {
        Self::TestAssertion(message.into())
    }

    /// True if this error (or the error it wraps) is a timeout
    pub fn is_timeout(&self) -> bool {
        match self {
            Error::Timeout { .. } => true,
            Error::Lifecycle { source, .. } => source.is_timeout(),
            _ => false,
        }
    }

    /// True for errors that must abort the whole run rather than a single case
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::TestAssertion(_)
                | Error::CommandFailed { .. }
                | Error::Timeout { .. }
                | Error::Spawn { .. }
        )
    }
}

fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_timeout_is_classified() {
        let err = Error::lifecycle(
            "start",
            "fedora",
            Error::Timeout {
                command: "limactl start fedora.yaml".to_string(),
                secs: 600,
            },
        );
        assert!(err.is_timeout());
        assert!(err.is_fatal());
        assert!(err.to_string().contains("VM start failed for 'fedora'"));
    }

    #[test]
    fn test_case_errors_are_not_fatal() {
        assert!(!Error::assertion("image missing").is_fatal());
        assert!(!Error::command_failed("nerdctl ps", Some(1), "boom").is_fatal());
        assert!(Error::EmptyPrefix.is_fatal());
    }

    #[test]
    fn test_command_failed_keeps_stderr_tail() {
        let long = "x".repeat(5000);
        match Error::command_failed("nerdctl pull", Some(1), &long) {
            Error::CommandFailed { stderr, .. } => assert_eq!(stderr.len(), 2048),
            other => panic!("unexpected error: {other}"),
        }
    }
}
