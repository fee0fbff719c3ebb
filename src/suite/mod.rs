//! Suite registration and execution
//!
//! Cases are declared in order on a [`Suite`], bound to one shared
//! [`crate::exec::ExecutionOption`], and run against a single backend with
//! one-time setup and teardown around them.

mod coordinator;
mod environment;
mod registrar;
mod report;
mod runner;

pub use coordinator::{SuiteCoordinator, TeardownRole};
pub use environment::{controller_option, teardown_controller, VmEnvironment};
pub use registrar::{CaseFactory, CaseFuture, RegisteredCase, Suite};
pub use report::{CaseResult, CaseStatus, SuiteReport};
pub use runner::{matches_focus, run_suite, RunOptions, SuiteHooks};
