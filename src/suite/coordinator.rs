//! One-time setup and teardown shared by parallel workers
//!
//! The first worker to reach setup owns it; the rest wait for its outcome.
//! Teardown is a rendezvous: every worker must arrive, then exactly one of
//! them (the barrier leader) runs it while the others return immediately.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::FutureExt;
use tokio::sync::{Barrier, OnceCell};

use crate::common::{Error, Result};

/// Which role a worker played at teardown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownRole {
    Leader,
    Follower,
}

/// Synchronizes suite setup/teardown across `workers` participants
#[derive(Debug)]
pub struct SuiteCoordinator {
    workers: usize,
    setup: OnceCell<std::result::Result<(), String>>,
    teardown: Barrier,
    setup_runs: AtomicUsize,
    teardown_runs: AtomicUsize,
}

impl SuiteCoordinator {
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            workers,
            setup: OnceCell::new(),
            teardown: Barrier::new(workers),
            setup_runs: AtomicUsize::new(0),
            teardown_runs: AtomicUsize::new(0),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Run `f` once across all workers and share its outcome
    ///
    /// The owning worker gets the original error; the others get
    /// [`Error::SetupAborted`].
    pub async fn setup<F, Fut>(&self, f: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut owned_error: Option<Error> = None;
        let slot = &mut owned_error;
        let outcome = self
            .setup
            .get_or_init(|| async move {
                self.setup_runs.fetch_add(1, Ordering::SeqCst);
                // A panic must still settle the cell, or the next worker re-runs setup.
                let result = AssertUnwindSafe(async move { f().await })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|panic| {
                        Err(Error::Internal(format!(
                            "suite setup panicked: {}",
                            panic_message(panic.as_ref())
                        )))
                    });
                match result {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        let message = e.to_string();
                        *slot = Some(e);
                        Err(message)
                    }
                }
            })
            .await;

        match (outcome, owned_error) {
            (Ok(()), _) => Ok(()),
            (Err(_), Some(e)) => Err(e),
            (Err(message), None) => Err(Error::SetupAborted(message.clone())),
        }
    }

    /// Wait for every worker, then run `f` on exactly one of them
    pub async fn teardown<F, Fut>(&self, f: F) -> (TeardownRole, Result<()>)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.teardown.wait().await.is_leader() {
            self.teardown_runs.fetch_add(1, Ordering::SeqCst);
            let result = AssertUnwindSafe(async move { f().await })
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(Error::Internal(format!(
                        "suite teardown panicked: {}",
                        panic_message(panic.as_ref())
                    )))
                });
            (TeardownRole::Leader, result)
        } else {
            (TeardownRole::Follower, Ok(()))
        }
    }

    /// How many times setup actually ran
    pub fn setup_runs(&self) -> usize {
        self.setup_runs.load(Ordering::SeqCst)
    }

    /// How many times teardown actually ran
    pub fn teardown_runs(&self) -> usize {
        self.teardown_runs.load(Ordering::SeqCst)
    }
}

/// Text of a panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_setup_runs_once_for_all_workers() {
        let coord = Arc::new(SuiteCoordinator::new(4));
        let mut handles = Vec::new();
        for _ in 0..4 {
            let coord = coord.clone();
            handles.push(tokio::spawn(async move {
                coord
                    .setup(|| async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(())
                    })
                    .await
            }));
        }
        for h in handles {
            h.await.unwrap().unwrap();
        }
        assert_eq!(coord.setup_runs(), 1);
    }

    #[tokio::test]
    async fn test_setup_failure_reaches_every_worker() {
        let coord = Arc::new(SuiteCoordinator::new(3));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let coord = coord.clone();
            handles.push(tokio::spawn(async move {
                coord
                    .setup(|| async { Err(Error::Config("no template".to_string())) })
                    .await
            }));
        }

        let mut owner = 0;
        let mut aborted = 0;
        for h in handles {
            match h.await.unwrap() {
                Err(Error::Config(_)) => owner += 1,
                Err(Error::SetupAborted(msg)) => {
                    assert!(msg.contains("no template"));
                    aborted += 1;
                }
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!((owner, aborted), (1, 2));
        assert_eq!(coord.setup_runs(), 1);
    }

    async fn exploding_setup() -> Result<()> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        panic!("setup blew up")
    }

    async fn exploding_teardown() -> Result<()> {
        panic!("stop exploded")
    }

    #[tokio::test]
    async fn test_panicking_setup_settles_once() {
        let coord = Arc::new(SuiteCoordinator::new(2));
        let mut handles = Vec::new();
        for _ in 0..2 {
            let coord = coord.clone();
            handles.push(tokio::spawn(async move {
                coord
                    .setup(exploding_setup)
                    .await
            }));
        }

        let mut messages = Vec::new();
        for h in handles {
            match h.await.unwrap() {
                Err(Error::Internal(msg)) | Err(Error::SetupAborted(msg)) => messages.push(msg),
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
        assert_eq!(coord.setup_runs(), 1);
        assert!(messages.iter().all(|m| m.contains("setup blew up")), "{messages:?}");
    }

    #[tokio::test]
    async fn test_panicking_teardown_is_reported() {
        let coord = SuiteCoordinator::new(1);
        let (role, result) = coord
            .teardown(|| async { exploding_teardown().await })
            .await;
        assert_eq!(role, TeardownRole::Leader);
        assert!(matches!(result, Err(Error::Internal(msg)) if msg.contains("stop exploded")));
    }

    #[tokio::test]
    async fn test_teardown_has_single_leader() {
        let coord = Arc::new(SuiteCoordinator::new(3));
        let mut handles = Vec::new();
        for _ in 0..3 {
            let coord = coord.clone();
            handles.push(tokio::spawn(async move {
                coord.teardown(|| async { Ok(()) }).await.0
            }));
        }
        let mut leaders = 0;
        for h in handles {
            if h.await.unwrap() == TeardownRole::Leader {
                leaders += 1;
            }
        }
        assert_eq!(leaders, 1);
        assert_eq!(coord.teardown_runs(), 1);
    }
}
