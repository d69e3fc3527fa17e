//! One-shot settable futures.
//!
//! A [`Deferred`] is a pending outcome cell with external `resolve`/`reject`
//! capability. The first settle wins; later calls are no-ops. Any number of
//! observers may wait on the same cell and all of them observe the same
//! outcome, including observers that subscribe after settlement.

use tokio::sync::watch;

/// A one-shot, externally settled future.
///
/// Cloning yields another handle to the same outcome cell. There is no
/// cancellation: a `Deferred` nobody settles stays pending forever, and
/// callers needing freshness replace the whole cell with a new generation.
#[derive(Debug, Clone)]
pub struct Deferred<T, E = String> {
    outcome: watch::Sender<Option<Result<T, E>>>,
}

impl<T, E> Default for Deferred<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Deferred<T, E> {
    pub fn new() -> Self {
        let (outcome, _) = watch::channel(None);
        Self { outcome }
    }

    /// Whether the cell already holds an outcome.
    pub fn is_settled(&self) -> bool {
        self.outcome.borrow().is_some()
    }

    /// Settle with a success value. Returns `false` if the cell was already
    /// settled, in which case the stored outcome is left untouched.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with a failure. Same first-call-wins rule as [`resolve`].
    ///
    /// [`resolve`]: Deferred::resolve
    pub fn reject(&self, error: E) -> bool {
        self.settle(Err(error))
    }

    fn settle(&self, result: Result<T, E>) -> bool {
        self.outcome.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(result);
            true
        })
    }
}

impl<T: Clone, E: Clone> Deferred<T, E> {
    /// Wait until the cell is settled and return a clone of the outcome.
    pub async fn wait(&self) -> Result<T, E> {
        let mut observer = self.outcome.subscribe();
        let settled = observer
            .wait_for(|slot| slot.is_some())
            .await
            .expect("outcome channel outlives waiters while the handle is borrowed");
        settled
            .clone()
            .expect("wait_for only returns once the outcome is set")
    }

    /// Return the outcome if already settled, without waiting.
    pub fn peek(&self) -> Option<Result<T, E>> {
        self.outcome.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn first_resolve_wins() {
        let deferred: Deferred<u32> = Deferred::new();

        assert!(deferred.resolve(1));
        assert!(!deferred.resolve(2));
        assert!(!deferred.reject("late".to_string()));

        assert_eq!(deferred.wait().await, Ok(1));
    }

    #[tokio::test]
    async fn reject_settles_all_observers() {
        let deferred: Deferred<u32> = Deferred::new();
        let early = {
            let handle = deferred.clone();
            tokio::spawn(async move { handle.wait().await })
        };

        assert!(deferred.reject("startup failed".to_string()));

        assert_eq!(early.await.unwrap(), Err("startup failed".to_string()));
        // A late observer sees the same settled outcome.
        assert_eq!(deferred.wait().await, Err("startup failed".to_string()));
    }

    #[tokio::test]
    async fn many_waiters_share_one_outcome() {
        let deferred: Deferred<String> = Deferred::new();
        let waiters: Vec<_> = (0..8)
            .map(|_| {
                let handle = deferred.clone();
                tokio::spawn(async move { handle.wait().await })
            })
            .collect();

        deferred.resolve("ready".to_string());

        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), Ok("ready".to_string()));
        }
    }

    #[test]
    fn peek_reports_pending_then_settled() {
        let deferred: Deferred<u32> = Deferred::new();
        assert!(deferred.peek().is_none());
        assert!(!deferred.is_settled());

        deferred.resolve(7);
        assert!(deferred.is_settled());
        assert_eq!(deferred.peek(), Some(Ok(7)));
    }
}
