//! Conflict-tolerant read-modify-write updates
//!
//! The controller under test writes the same resources the harness does, so
//! every update races it. [`mutate_with_retry`] re-reads and re-applies the
//! mutation whenever a commit loses that race.

use tracing::{debug, warn};

use crate::resources::Named;
use crate::retry::{Backoff, RetryConfig};
use crate::store::{ResourceStore, Versioned};
use crate::{Error, Result};

/// Fetch, mutate, and commit a resource, retrying on version conflicts.
///
/// `mutate` receives a fresh copy of the latest snapshot on every attempt and
/// must be deterministic and free of side effects; it may run several times.
/// Errors other than `Conflict` are returned immediately. If every attempt in
/// the budget conflicts, the result is [`Error::ConflictExhausted`].
pub async fn mutate_with_retry<T, S, F>(
    store: &S,
    name: &str,
    config: &RetryConfig,
    mutate: F,
) -> Result<Versioned<T>>
where
    T: Named + Clone + Send + Sync,
    S: ResourceStore<T> + ?Sized,
    F: Fn(&mut T),
{
    let mut attempt = 0u32;
    let mut backoff = Backoff::new(config);

    loop {
        attempt += 1;

        let current = store.get(name).await?;
        let mut desired = current.object.clone();
        mutate(&mut desired);

        match store.update(name, desired, &current.version).await {
            Ok(committed) => {
                debug!(
                    kind = T::KIND,
                    name = %name,
                    attempt = attempt,
                    version = %committed.version,
                    "Committed update"
                );
                return Ok(committed);
            }
            Err(e) if e.is_conflict() => {
                if config.is_exhausted(attempt) {
                    warn!(
                        kind = T::KIND,
                        name = %name,
                        attempts = attempt,
                        "Conflict retries exhausted"
                    );
                    return Err(Error::ConflictExhausted {
                        kind: T::KIND.to_string(),
                        name: name.to_string(),
                        attempts: attempt,
                    });
                }

                let delay = backoff.next_delay();
                debug!(
                    kind = T::KIND,
                    name = %name,
                    attempt = attempt,
                    delay_ms = delay.as_millis(),
                    "Update conflicted, re-reading"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
