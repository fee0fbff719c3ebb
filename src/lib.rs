//! VM-backed end-to-end harness for a container CLI
//!
//! Provisions one VM per run, routes every engine command into it through the
//! lifecycle tool's remote shell, and runs an ordered case catalog with
//! one-time setup and teardown around it.

pub mod cases;
pub mod cli;
pub mod commands;
pub mod common;
pub mod exec;
pub mod registry;
pub mod suite;
pub mod vm;

// Re-export commonly used types for tests
pub use common::{Error, Result};
