//! Case registration
//!
//! A case factory takes the shared [`ExecutionOption`] and registers zero or
//! more named assertions on a [`Suite`]. Each assertion keeps its own clone
//! of the option, so nothing else is shared between cases except the backend
//! the option reaches.

use std::future::Future;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;

use crate::common::Result;
use crate::exec::ExecutionOption;

/// Future returned by a registered assertion
pub type CaseFuture = BoxFuture<'static, Result<()>>;

type CaseBody = Box<dyn Fn() -> CaseFuture + Send + Sync>;

/// Anything that can register cases against an option
pub trait CaseFactory {
    fn register(&self, option: &ExecutionOption, suite: &mut Suite);
}

impl<F> CaseFactory for F
where
    F: Fn(&ExecutionOption, &mut Suite),
{
    fn register(&self, option: &ExecutionOption, suite: &mut Suite) {
        self(option, suite)
    }
}

/// One registered assertion
pub struct RegisteredCase {
    name: String,
    body: CaseBody,
}

impl RegisteredCase {
    /// Full name including enclosing `describe` blocks
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn call(&self) -> CaseFuture {
        (self.body)()
    }
}

impl std::fmt::Debug for RegisteredCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredCase")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Ordered list of cases
#[derive(Debug)]
pub struct Suite {
    description: String,
    scope: Vec<String>,
    cases: Vec<RegisteredCase>,
}

impl Suite {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            scope: Vec::new(),
            cases: Vec::new(),
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Group cases under `name`; nested groups join with a space
    pub fn describe(&mut self, name: &str, body: impl FnOnce(&mut Suite)) {
        self.scope.push(name.to_string());
        body(self);
        self.scope.pop();
    }

    /// Register one assertion bound to `option`
    pub fn it<F, Fut>(&mut self, name: &str, option: &ExecutionOption, f: F)
    where
        F: Fn(ExecutionOption) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let option = option.clone();
        let full = self
            .scope
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(name))
            .collect::<Vec<_>>()
            .join(" ");
        self.cases.push(RegisteredCase {
            name: full,
            body: Box::new(move || f(option.clone()).boxed()),
        });
    }

    /// Let `factory` register its cases
    pub fn register<F: CaseFactory + ?Sized>(&mut self, factory: &F, option: &ExecutionOption) {
        factory.register(option, self);
    }

    pub fn cases(&self) -> &[RegisteredCase] {
        &self.cases
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    pub(crate) fn into_cases(self) -> (String, Vec<RegisteredCase>) {
        (self.description, self.cases)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::EnvPolicy;

    fn option() -> ExecutionOption {
        ExecutionOption::new(["nerdctl"], EnvPolicy::Inherit).unwrap()
    }

    fn volume_cases(opt: &ExecutionOption, suite: &mut Suite) {
        suite.describe("volume", |s| {
            s.it("creates", opt, |_| async { Ok(()) });
            s.describe("rm", |s| {
                s.it("removes", opt, |_| async { Ok(()) });
            });
        });
    }

    #[test]
    fn test_names_follow_scope_and_order() {
        let mut suite = Suite::new("E2E");
        suite.register(&volume_cases, &option());
        suite.it("info", &option(), |_| async { Ok(()) });

        let names: Vec<&str> = suite.cases().iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["volume creates", "volume rm removes", "info"]);
    }

    #[tokio::test]
    async fn test_case_receives_bound_option() {
        let bound = ExecutionOption::new(["limactl", "shell", "fedora"], EnvPolicy::Inherit).unwrap();
        let mut suite = Suite::new("E2E");
        suite.it("sees option", &bound, |opt| async move {
            assert_eq!(opt.program(), "limactl");
            Ok(())
        });
        suite.cases()[0].call().await.unwrap();
    }
}
