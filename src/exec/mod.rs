//! Command execution primitives
//!
//! [`ExecutionOption`] describes how to reach a binary, [`CommandInvocation`]
//! adds the per-call arguments, and the runner executes it under a timeout.

mod invocation;
mod option;
pub mod runner;

pub use invocation::CommandInvocation;
pub use option::{EnvPolicy, ExecutionOption, DEFAULT_TIMEOUT};
pub use runner::CommandOutput;
