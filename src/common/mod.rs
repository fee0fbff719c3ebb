//! Common utilities shared by the harness and the CLI

pub mod config;
pub mod env;
pub mod error;
pub mod logging;
pub mod paths;

pub use config::HarnessConfig;
pub use error::{Error, Result};

/// Render argv as a single shell-like line for logs and error messages
pub fn display_command<S: AsRef<str>>(argv: &[S]) -> String {
    argv.iter()
        .map(|a| {
            let a = a.as_ref();
            if a.is_empty() || a.contains(char::is_whitespace) {
                format!("'{}'", a.replace('\'', "'\\''"))
            } else {
                a.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_command_quotes_spaces() {
        let line = display_command(&["limactl", "shell", "fedora", "sh", "-c", "echo hi"]);
        assert_eq!(line, "limactl shell fedora sh -c 'echo hi'");
    }
}
