//! Runtime for the adslot booking engine.
//!
//! Reducers in `adslot-core` describe side effects; this crate runs them.
//! The booking engine commits a state transition first and only then hands the
//! transition's effects to an [`EffectRuntime`], so a slow or failing
//! notification can never hold a lock or roll back a committed transition.
//!
//! ```ignore
//! let runtime = EffectRuntime::new();
//! let effects = reducer.reduce(&mut state, action, &env);
//! store.commit(&state).await?;
//! runtime.spawn(effects);
//! ```

use adslot_core::effect::Effect;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// Bounded retry with exponential backoff
pub mod retry;

pub use retry::{retry_with_predicate, RetryPolicy};

/// Errors produced by the effect runtime
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// Effects were still running when the wait deadline passed.
    #[error("Timed out with {0} effect batches still running")]
    IdleTimeout(usize),
}

/// Run an effect tree to completion and collect the actions it produced.
///
/// `Parallel` children are joined concurrently; actions come back in child order.
pub fn run_effect<A>(effect: Effect<A>) -> BoxFuture<'static, Vec<A>>
where
    A: Send + 'static,
{
    async move {
        match effect {
            Effect::None => Vec::new(),
            Effect::Parallel(effects) => {
                futures::future::join_all(effects.into_iter().map(run_effect))
                    .await
                    .into_iter()
                    .flatten()
                    .collect()
            },
            Effect::Future(future) => future.await.into_iter().collect(),
        }
    }
    .boxed()
}

/// Executes reducer effects on background tasks and tracks how many are in flight.
///
/// Cloning is cheap; clones share the in-flight counter.
#[derive(Clone, Debug, Default)]
pub struct EffectRuntime {
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

/// Decrements the in-flight counter even if the effect task panics.
struct PendingGuard {
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.idle.notify_waiters();
        }
    }
}

impl EffectRuntime {
    /// Create a runtime with nothing in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a batch of effects onto the tokio runtime.
    ///
    /// Returns immediately. The join handle resolves to the follow-up actions
    /// the effects produced; callers that do not care may drop it.
    pub fn spawn<A, I>(&self, effects: I) -> JoinHandle<Vec<A>>
    where
        A: Send + 'static,
        I: IntoIterator<Item = Effect<A>>,
    {
        let effects: Vec<Effect<A>> = effects.into_iter().filter(|e| !e.is_none()).collect();
        let batch_size = effects.len();

        self.pending.fetch_add(1, Ordering::AcqRel);
        let guard = PendingGuard {
            pending: Arc::clone(&self.pending),
            idle: Arc::clone(&self.idle),
        };

        metrics::counter!("adslot_effects_total").increment(batch_size as u64);
        tracing::trace!(batch_size, "Spawning effect batch");

        tokio::spawn(async move {
            let _guard = guard;
            run_effect(Effect::Parallel(effects)).await
        })
    }

    /// Number of effect batches still running.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Wait until every spawned batch has finished.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::IdleTimeout`] if batches are still running after `timeout`.
    pub async fn wait_idle(&self, timeout: Duration) -> Result<(), RuntimeError> {
        let wait = async {
            loop {
                let notified = self.idle.notified();
                if self.pending() == 0 {
                    return;
                }
                notified.await;
            }
        };

        tokio::time::timeout(timeout, wait)
            .await
            .map_err(|_| RuntimeError::IdleTimeout(self.pending()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn sleep_then<A: Send + 'static>(duration: Duration, action: A) -> Effect<A> {
        Effect::Future(Box::pin(async move {
            tokio::time::sleep(duration).await;
            Some(action)
        }))
    }

    #[tokio::test]
    async fn test_run_effect_collects_actions_in_order() {
        let effect = Effect::merge(vec![
            Effect::Future(Box::pin(async {
                tokio::time::sleep(Duration::from_millis(5)).await;
                Some(1)
            })),
            Effect::None,
            Effect::merge(vec![Effect::Future(Box::pin(async { Some(2) }))]),
            Effect::Future(Box::pin(async { None })),
        ]);

        assert_eq!(run_effect(effect).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_parallel_effects_all_run() {
        let counter = Arc::new(AtomicU32::new(0));
        let effects: Vec<Effect<()>> = (0..5)
            .map(|_| {
                let counter = Arc::clone(&counter);
                Effect::fire_and_forget(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            })
            .collect();

        run_effect(Effect::merge(effects)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_spawn_tracks_pending_until_done() {
        let runtime = EffectRuntime::new();
        let handle = runtime.spawn(vec![sleep_then(Duration::from_millis(20), "done")]);

        assert_eq!(runtime.pending(), 1);
        runtime.wait_idle(Duration::from_secs(1)).await.unwrap();
        assert_eq!(runtime.pending(), 0);
        assert_eq!(handle.await.unwrap(), vec!["done"]);
    }

    #[tokio::test]
    async fn test_wait_idle_times_out() {
        let runtime = EffectRuntime::new();
        let _handle = runtime.spawn(vec![sleep_then(Duration::from_secs(5), ())]);

        let result = runtime.wait_idle(Duration::from_millis(10)).await;
        assert!(matches!(result, Err(RuntimeError::IdleTimeout(1))));
    }
}
