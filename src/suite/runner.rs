//! Suite execution
//!
//! Workers share one coordinator and one case queue. Setup runs once before
//! any case, then workers pull cases in declaration order. The queue lock is
//! held for the whole case, so cases never overlap on the shared target even
//! with several workers. Teardown runs once after every worker is done,
//! whether or not setup succeeded.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use colored::Colorize;
use futures_util::FutureExt;
use tokio::sync::Mutex;

use crate::common::{Error, Result};

use super::coordinator::{panic_message, SuiteCoordinator, TeardownRole};
use super::registrar::{RegisteredCase, Suite};
use super::report::{CaseResult, SuiteReport};

/// Before/after hooks around the whole suite
#[async_trait]
pub trait SuiteHooks: Send + Sync {
    /// Provision the shared backend; an error aborts the run
    async fn before_suite(&self) -> Result<()>;

    /// Release the shared backend; always called
    async fn after_suite(&self) -> Result<()>;
}

/// Scheduling options
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub workers: usize,
    /// Substrings of case names to run; empty runs everything
    pub focus: Vec<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            focus: Vec::new(),
        }
    }
}

/// True if `name` is selected by `focus`
pub fn matches_focus(name: &str, focus: &[String]) -> bool {
    focus.is_empty() || focus.iter().any(|f| name.contains(f.as_str()))
}

struct WorkerOutcome {
    setup: Result<()>,
    role: TeardownRole,
    teardown: Result<()>,
}

/// Run `suite` with `hooks` around it
pub async fn run_suite(suite: Suite, hooks: Arc<dyn SuiteHooks>, options: &RunOptions) -> SuiteReport {
    let (description, cases) = suite.into_cases();

    let mut initial = Vec::with_capacity(cases.len());
    let mut selected = Vec::new();
    for (i, case) in cases.iter().enumerate() {
        if matches_focus(case.name(), &options.focus) {
            selected.push(i);
            initial.push(CaseResult::not_run(case.name()));
        } else {
            initial.push(CaseResult::skipped(case.name()));
        }
    }

    println!(
        "\n{} {} {}",
        "Running Suite:".blue().bold(),
        description.white().bold(),
        format!("({} of {} cases)", selected.len(), cases.len()).dimmed()
    );

    let cases = Arc::new(cases);
    let results = Arc::new(Mutex::new(initial));
    let queue = Arc::new(Mutex::new(selected.into_iter()));
    let coordinator = Arc::new(SuiteCoordinator::new(options.workers));

    let mut handles = Vec::with_capacity(coordinator.workers());
    for worker in 0..coordinator.workers() {
        let cases = cases.clone();
        let results = results.clone();
        let queue = queue.clone();
        let coordinator = coordinator.clone();
        let hooks = hooks.clone();

        handles.push(tokio::spawn(async move {
            let setup = coordinator.setup(|| hooks.before_suite()).await;

            if setup.is_ok() {
                loop {
                    let mut queue = queue.lock().await;
                    let Some(index) = queue.next() else {
                        break;
                    };
                    tracing::debug!(worker, case = cases[index].name(), "Running case");
                    let result = run_case(&cases[index]).await;
                    result.print_line();
                    results.lock().await[index] = result;
                }
            }

            let (role, teardown) = coordinator.teardown(|| hooks.after_suite()).await;
            WorkerOutcome {
                setup,
                role,
                teardown,
            }
        }));
    }

    let mut setup_errors = Vec::new();
    let mut teardown_error = None;
    for handle in handles {
        match handle.await {
            Ok(outcome) => {
                if let Err(e) = outcome.setup {
                    setup_errors.push(e);
                }
                if outcome.role == TeardownRole::Leader {
                    teardown_error = outcome.teardown.err();
                }
            }
            Err(e) => setup_errors.push(Error::Internal(format!("worker panicked: {}", e))),
        }
    }

    // Prefer the owner's original error over the followers' SetupAborted copies.
    let setup_error = setup_errors
        .iter()
        .find(|e| !matches!(e, Error::SetupAborted(_)))
        .or_else(|| setup_errors.first())
        .map(|e| e.to_string());

    let results = std::mem::take(&mut *results.lock().await);
    SuiteReport {
        description,
        results,
        setup_error,
        teardown_error: teardown_error.map(|e| e.to_string()),
    }
}

async fn run_case(case: &RegisteredCase) -> CaseResult {
    let started = Instant::now();
    let outcome = AssertUnwindSafe(async { case.call().await })
        .catch_unwind()
        .await;
    let elapsed = started.elapsed();

    match outcome {
        Ok(Ok(())) => CaseResult::passed(case.name(), elapsed),
        Ok(Err(e)) => {
            if e.is_fatal() {
                tracing::warn!(case = case.name(), "Case failed on a harness error: {}", e);
            }
            CaseResult::failed(case.name(), elapsed, e.to_string())
        }
        Err(panic) => CaseResult::failed(
            case.name(),
            elapsed,
            format!("panicked: {}", panic_message(panic.as_ref())),
        ),
    }
}
