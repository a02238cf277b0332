//! Idempotent, ordered teardown of scenario fixtures
//!
//! Every fixture a scenario creates registers its teardown here before the
//! next step runs. A [`CleanupHandle`] can be invoked by hand (to undo a step
//! early) and the registry still runs it at scenario end; whichever comes
//! first wins and the other is a no-op. [`CleanupRegistry::run_all`] walks
//! actions newest-first so dependents are released before what they depend
//! on.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info, warn};

use crate::{Error, Result};

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

// Poison only means a panic happened elsewhere; teardown still has to run.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

/// Render a caught panic payload as text
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A teardown step guarded so it runs at most once
pub struct CleanupAction {
    name: String,
    ran: AtomicBool,
    action: Mutex<Option<CleanupFn>>,
}

impl CleanupAction {
    fn new<F, Fut>(name: impl Into<String>, action: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let boxed: CleanupFn = Box::new(move || action().boxed());
        Self {
            name: name.into(),
            ran: AtomicBool::new(false),
            action: Mutex::new(Some(boxed)),
        }
    }

    /// Name used in logs and reports
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the action has been claimed by some caller
    pub fn has_run(&self) -> bool {
        self.ran.load(Ordering::SeqCst)
    }

    /// Run the action if nobody has yet.
    ///
    /// Returns `None` when a previous call already claimed it. A panicking
    /// action counts as run and comes back as [`Error::Internal`].
    pub async fn run(&self) -> Option<Result<()>> {
        if self.ran.swap(true, Ordering::SeqCst) {
            debug!(action = %self.name, "Cleanup already ran, skipping");
            return None;
        }

        let action = lock(&self.action).take()?;
        debug!(action = %self.name, "Running cleanup");
        let result = AssertUnwindSafe(async move { action().await })
            .catch_unwind()
            .await;
        Some(result.unwrap_or_else(|panic| {
            Err(Error::internal_with_context(
                self.name.clone(),
                format!("PANIC: {}", panic_message(panic.as_ref())),
            ))
        }))
    }
}

/// Cloneable handle to a registered [`CleanupAction`]
#[derive(Clone)]
pub struct CleanupHandle(Arc<CleanupAction>);

impl CleanupHandle {
    /// Name of the underlying action
    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Whether the action has already run
    pub fn has_run(&self) -> bool {
        self.0.has_run()
    }

    /// Run the action now; later calls and the registry's teardown become no-ops
    pub async fn run(&self) -> Option<Result<()>> {
        self.0.run().await
    }
}

/// What happened during a teardown pass
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Actions that ran and succeeded, in execution order
    pub completed: Vec<String>,
    /// Actions that were already run by hand
    pub already_ran: Vec<String>,
    /// Actions that ran and failed
    pub failed: Vec<(String, Error)>,
    /// Actions not run because cleanup is disabled
    pub skipped: Vec<String>,
}

impl CleanupReport {
    /// True if nothing failed
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// One-line tally for reports
    pub fn summary(&self) -> String {
        format!(
            "{} cleaned, {} failed, {} skipped",
            self.completed.len() + self.already_ran.len(),
            self.failed.len(),
            self.skipped.len()
        )
    }

    /// Collapse failures into a single error, if there were any
    pub fn to_error(&self) -> Option<Error> {
        if self.failed.is_empty() {
            return None;
        }
        Some(Error::CleanupFailed {
            failed: self.failed.iter().map(|(name, _)| name.clone()).collect(),
        })
    }
}

/// Ordered collection of teardown actions for one scenario
pub struct CleanupRegistry {
    actions: Mutex<Vec<Arc<CleanupAction>>>,
    skip_cleanup: bool,
}

impl CleanupRegistry {
    /// Create a registry. With `skip_cleanup`, [`run_all`](Self::run_all)
    /// leaves every resource in place; handles still run when invoked.
    pub fn new(skip_cleanup: bool) -> Self {
        Self {
            actions: Mutex::new(Vec::new()),
            skip_cleanup,
        }
    }

    /// Register a teardown action and return a handle to it
    pub fn register<F, Fut>(&self, name: impl Into<String>, action: F) -> CleanupHandle
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let action = Arc::new(CleanupAction::new(name, action));
        debug!(action = %action.name(), "Registered cleanup");
        lock(&self.actions).push(action.clone());
        CleanupHandle(action)
    }

    /// Number of registered actions
    pub fn len(&self) -> usize {
        lock(&self.actions).len()
    }

    /// True if nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run every registered action, newest first.
    ///
    /// Failures are recorded and do not stop the remaining actions. Actions
    /// registered while this runs are not included.
    pub async fn run_all(&self) -> CleanupReport {
        let actions: Vec<Arc<CleanupAction>> = lock(&self.actions).clone();
        let mut report = CleanupReport::default();

        if self.skip_cleanup {
            for action in actions.iter().rev() {
                if action.has_run() {
                    report.already_ran.push(action.name().to_string());
                } else {
                    report.skipped.push(action.name().to_string());
                }
            }
            if !report.skipped.is_empty() {
                warn!(
                    left_behind = ?report.skipped,
                    "Cleanup disabled: resources were NOT torn down"
                );
            }
            return report;
        }

        for action in actions.iter().rev() {
            match action.run().await {
                None => report.already_ran.push(action.name().to_string()),
                Some(Ok(())) => {
                    info!(action = %action.name(), "Cleaned up");
                    report.completed.push(action.name().to_string());
                }
                Some(Err(e)) => {
                    warn!(action = %action.name(), error = %e, "Cleanup failed, continuing");
                    report.failed.push((action.name().to_string(), e));
                }
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counting(
        counter: &Arc<AtomicU32>,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<()>> + Send + 'static {
        let counter = counter.clone();
        move || {
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn handle_runs_action_exactly_once() {
        for k in 1..=5 {
            let registry = CleanupRegistry::new(false);
            let counter = Arc::new(AtomicU32::new(0));
            let handle = registry.register("delete thing", counting(&counter));

            let mut ran = 0;
            for _ in 0..k {
                if handle.clone().run().await.is_some() {
                    ran += 1;
                }
            }
            let report = registry.run_all().await;

            assert_eq!(ran, 1);
            assert_eq!(counter.load(Ordering::SeqCst), 1, "k = {}", k);
            assert_eq!(report.already_ran, vec!["delete thing"]);
            assert!(report.completed.is_empty());
        }
    }

    #[tokio::test]
    async fn run_all_is_idempotent() {
        let registry = CleanupRegistry::new(false);
        let counter = Arc::new(AtomicU32::new(0));
        registry.register("a", counting(&counter));

        registry.run_all().await;
        let second = registry.run_all().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(second.already_ran, vec!["a"]);
    }

    #[tokio::test]
    async fn runs_in_reverse_registration_order() {
        let registry = CleanupRegistry::new(false);
        let observed = Arc::new(Mutex::new(Vec::new()));
        let n = 6;

        for i in 0..n {
            let observed = observed.clone();
            registry.register(format!("action-{}", i), move || async move {
                observed.lock().unwrap().push(i);
                Ok(())
            });
        }

        let report = registry.run_all().await;

        let expected: Vec<usize> = (0..n).rev().collect();
        assert_eq!(*observed.lock().unwrap(), expected);
        assert_eq!(report.completed.first().map(String::as_str), Some("action-5"));
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn failure_does_not_stop_remaining_actions() {
        let registry = CleanupRegistry::new(false);
        let counter = Arc::new(AtomicU32::new(0));

        registry.register("first", counting(&counter));
        registry.register("broken", || async {
            Err(Error::internal("delete refused"))
        });
        registry.register("last", counting(&counter));

        let report = registry.run_all().await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(report.completed, vec!["last", "first"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "broken");
        match report.to_error() {
            Some(Error::CleanupFailed { failed }) => assert_eq!(failed, vec!["broken"]),
            other => panic!("expected CleanupFailed, got {:?}", other),
        }
    }

    fn pool_store_gone() -> Result<()> {
        panic!("pool store went away")
    }

    #[tokio::test]
    async fn panicking_action_is_reported_and_older_actions_still_run() {
        let registry = CleanupRegistry::new(false);
        let counter = Arc::new(AtomicU32::new(0));

        registry.register("delete ImageRepository os-image", counting(&counter));
        let broken = registry.register("delete Pool layered", || async { pool_store_gone() });
        registry.register("delete ConfigMap overrides", counting(&counter));

        let report = registry.run_all().await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(
            report.completed,
            vec!["delete ConfigMap overrides", "delete ImageRepository os-image"]
        );
        assert_eq!(report.failed.len(), 1);
        let (name, err) = &report.failed[0];
        assert_eq!(name, "delete Pool layered");
        assert_eq!(err.kind(), crate::ErrorKind::Internal);
        assert!(err.to_string().contains("pool store went away"), "{}", err);
        assert!(broken.has_run());
        assert!(broken.run().await.is_none());
    }

    #[test]
    fn panic_payloads_render() {
        assert_eq!(panic_message(&"boom"), "boom");
        assert_eq!(panic_message(&String::from("bang")), "bang");
        assert_eq!(panic_message(&42u8), "unknown panic");
    }

    #[tokio::test]
    async fn skip_cleanup_leaves_actions_but_manual_run_works() {
        let registry = CleanupRegistry::new(true);
        let counter = Arc::new(AtomicU32::new(0));

        let manual = registry.register("manual", counting(&counter));
        registry.register("automatic", counting(&counter));

        assert!(manual.run().await.is_some());
        let report = registry.run_all().await;

        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(report.skipped, vec!["automatic"]);
        assert_eq!(report.already_ran, vec!["manual"]);
        assert!(report.completed.is_empty());
    }

    #[tokio::test]
    async fn guard_holds_across_tasks() {
        let registry = CleanupRegistry::new(false);
        let counter = Arc::new(AtomicU32::new(0));
        let handle = registry.register("shared", counting(&counter));

        let joins: Vec<_> = (0..8)
            .map(|_| {
                let h = handle.clone();
                tokio::spawn(async move { h.run().await.is_some() })
            })
            .collect();

        let mut winners = 0;
        for j in joins {
            if j.await.unwrap() {
                winners += 1;
            }
        }
        registry.run_all().await;

        assert_eq!(winners, 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
