//! Polling a resource until its observed state satisfies a predicate
//!
//! Predicates answer with a [`WaitOutcome`] rather than a boolean so that a
//! state which can never turn into success (a failed build, a degraded node)
//! ends the wait at once instead of running out the clock.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, trace};

use crate::resources::Named;
use crate::store::{ResourceStore, Versioned};
use crate::{Error, Result};

/// Default time between polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Verdict of a wait predicate on one snapshot
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Not there yet; poll again
    Continue,
    /// Condition met; stop polling and return this snapshot
    Satisfied,
    /// Condition can never be met; fail now with this reason
    Unrecoverable(String),
}

impl WaitOutcome {
    /// Shorthand for `Unrecoverable` with a formatted reason
    pub fn unrecoverable(reason: impl Into<String>) -> Self {
        WaitOutcome::Unrecoverable(reason.into())
    }
}

/// Budget and cadence for one wait
#[derive(Clone, Debug)]
pub struct WaitConfig {
    /// Human-readable label for logs and errors
    pub description: String,
    /// Maximum wall-clock time to poll
    pub timeout: Duration,
    /// Sleep between polls
    pub poll_interval: Duration,
}

impl WaitConfig {
    /// Wait with the default poll interval
    pub fn new(description: impl Into<String>, timeout: Duration) -> Self {
        Self {
            description: description.into(),
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the poll interval
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Clamp the timeout so the wait ends no later than `deadline`
    pub fn bounded_by(mut self, deadline: Instant) -> Self {
        let remaining = deadline.saturating_duration_since(Instant::now());
        self.timeout = self.timeout.min(remaining);
        self
    }
}

/// Poll `name` in `store` until `predicate` is satisfied.
///
/// The first poll happens immediately. Returns the satisfying snapshot and
/// issues no further reads after it. An `Unrecoverable` verdict returns
/// [`Error::Unrecoverable`] at once, regardless of the remaining budget. If
/// the budget runs out first, returns [`Error::Timeout`].
///
/// Fetch errors that are not retryable (including `NotFound`) are returned
/// immediately; transient ones are logged and polling continues.
pub async fn wait_for_condition<T, S, P>(
    store: &S,
    name: &str,
    config: &WaitConfig,
    predicate: P,
) -> Result<Versioned<T>>
where
    T: Named + Send + Sync,
    S: ResourceStore<T> + ?Sized,
    P: Fn(&T) -> WaitOutcome,
{
    let start = Instant::now();
    let mut polls = 0u32;

    loop {
        polls += 1;

        match store.get(name).await {
            Ok(snapshot) => match predicate(&snapshot.object) {
                WaitOutcome::Satisfied => {
                    info!(
                        kind = T::KIND,
                        name = %name,
                        polls = polls,
                        elapsed_ms = start.elapsed().as_millis(),
                        "Condition satisfied: {}",
                        config.description
                    );
                    return Ok(snapshot);
                }
                WaitOutcome::Unrecoverable(reason) => {
                    return Err(Error::Unrecoverable {
                        description: config.description.clone(),
                        reason,
                    });
                }
                WaitOutcome::Continue => {
                    trace!(kind = T::KIND, name = %name, polls = polls, "Condition not yet met");
                }
            },
            Err(e) if e.is_retryable() => {
                debug!(kind = T::KIND, name = %name, error = %e, "Poll failed (retrying)");
            }
            Err(e) => return Err(e),
        }

        if start.elapsed().saturating_add(config.poll_interval) > config.timeout {
            return Err(Error::Timeout {
                description: config.description.clone(),
                waited: start.elapsed(),
            });
        }

        tokio::time::sleep(config.poll_interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::resources::{BuildState, Pool};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn config(timeout_secs: u64) -> WaitConfig {
        WaitConfig::new("test condition", Duration::from_secs(timeout_secs))
            .with_poll_interval(Duration::from_secs(1))
    }

    /// Pool that advances one build state per read: Idle, Building, then `last`
    fn advancing_pool(last: BuildState) -> MemoryStore<Pool> {
        let store = MemoryStore::with_objects([Pool::new("layered")]);
        let reads = Arc::new(AtomicU32::new(0));
        store.set_reconciler(move |pool: &mut Pool| {
            let next = match reads.fetch_add(1, Ordering::SeqCst) {
                0 => BuildState::Idle,
                1 => BuildState::Building,
                _ => last,
            };
            let changed = pool.status.build_state != next;
            pool.status.build_state = next;
            changed
        });
        store
    }

    #[tokio::test(start_paused = true)]
    async fn returns_on_first_satisfied_poll_without_polling_again() {
        let store = advancing_pool(BuildState::Succeeded);

        let snapshot = wait_for_condition(&store, "layered", &config(60), |p: &Pool| {
            if p.status.build_state == BuildState::Building {
                WaitOutcome::Satisfied
            } else {
                WaitOutcome::Continue
            }
        })
        .await
        .unwrap();

        assert_eq!(snapshot.object.status.build_state, BuildState::Building);
        assert_eq!(store.get_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn satisfied_on_first_poll_reads_once() {
        let store = MemoryStore::with_objects([Pool::new("layered")]);
        wait_for_condition(&store, "layered", &config(60), |_: &Pool| {
            WaitOutcome::Satisfied
        })
        .await
        .unwrap();
        assert_eq!(store.get_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unrecoverable_short_circuits_the_budget() {
        let store = advancing_pool(BuildState::Failed);
        let start = Instant::now();

        let err = wait_for_condition(&store, "layered", &config(1200), |p: &Pool| {
            match p.status.build_state {
                BuildState::Failed => WaitOutcome::unrecoverable("build failed"),
                BuildState::Succeeded => WaitOutcome::Satisfied,
                _ => WaitOutcome::Continue,
            }
        })
        .await
        .unwrap_err();

        match err {
            Error::Unrecoverable { reason, .. } => assert_eq!(reason, "build failed"),
            other => panic!("expected Unrecoverable, got {:?}", other),
        }
        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(store.get_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_never_satisfied() {
        let store = MemoryStore::with_objects([Pool::new("layered")]);
        let start = Instant::now();

        let err = wait_for_condition(&store, "layered", &config(10), |_: &Pool| {
            WaitOutcome::Continue
        })
        .await
        .unwrap_err();

        match err {
            Error::Timeout { description, .. } => assert_eq!(description, "test condition"),
            other => panic!("expected Timeout, got {:?}", other),
        }
        assert!(start.elapsed() <= Duration::from_secs(10));
        // Polls at t = 0..=10; the next one would land past the budget
        assert_eq!(store.get_count(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn missing_resource_fails_immediately() {
        let store: MemoryStore<Pool> = MemoryStore::new();
        let err = wait_for_condition(&store, "missing", &config(60), |_: &Pool| {
            WaitOutcome::Satisfied
        })
        .await
        .unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(store.get_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_clamps_timeout() {
        let deadline = Instant::now() + Duration::from_secs(5);
        let clamped = config(600).bounded_by(deadline);
        assert_eq!(clamped.timeout, Duration::from_secs(5));

        let past = Instant::now();
        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(config(600).bounded_by(past).timeout, Duration::ZERO);
    }
}
