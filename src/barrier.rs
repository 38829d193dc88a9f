//! Request barrier (C6): the quiescence primitive separating tool calls
//! from reloads.
//!
//! Built on a plain `std::sync::Mutex` guarding a small counter/flag plus a
//! pair of `tokio::sync::Notify`s for wakeups. The barrier's invariants (no
//! new request admitted while reloading; reload body runs only once
//! in-flight requests have drained) hold even when a scope's future is
//! dropped mid-await: release of `active_requests`/`reloading` is done by a
//! drop guard rather than by code sequenced after the body's `.await`, so
//! cancellation can never wedge the barrier for the life of the process.

use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, Notify};

use crate::errors::BrokerError;

struct State {
    active_requests: u64,
    reloading: bool,
}

/// Separates request admission from reload execution.
pub struct RequestBarrier {
    state: Mutex<State>,
    ready: Notify,
    drained: Notify,
    reload_lock: AsyncMutex<()>,
    queue_timeout: Duration,
}

/// Held for the duration of a request scope's body; decrements
/// `active_requests` and signals the drain event on drop, whether the scope
/// finished normally or its future was dropped while suspended.
struct RequestGuard<'a> {
    barrier: &'a RequestBarrier,
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        let reached_zero = {
            let mut guard = self.barrier.state.lock().expect("barrier lock poisoned");
            guard.active_requests -= 1;
            guard.active_requests == 0
        };
        if reached_zero {
            self.barrier.drained.notify_waiters();
        }
    }
}

/// Held for the duration of a reload scope's body (and its drain wait);
/// clears `reloading` and wakes waiting requests on drop, whether the scope
/// finished normally or its future was dropped while suspended.
struct ReloadGuard<'a> {
    barrier: &'a RequestBarrier,
}

impl Drop for ReloadGuard<'_> {
    fn drop(&mut self) {
        {
            let mut guard = self.barrier.state.lock().expect("barrier lock poisoned");
            guard.reloading = false;
        }
        self.barrier.ready.notify_waiters();
    }
}

impl RequestBarrier {
    pub fn new(queue_timeout: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                active_requests: 0,
                reloading: false,
            }),
            ready: Notify::new(),
            drained: Notify::new(),
            reload_lock: AsyncMutex::new(()),
            queue_timeout,
        }
    }

    pub async fn active_requests(&self) -> u64 {
        self.state.lock().expect("barrier lock poisoned").active_requests
    }

    pub async fn is_reloading(&self) -> bool {
        self.state.lock().expect("barrier lock poisoned").reloading
    }

    /// Runs `body` as a request: waits (up to `queue_timeout`) for any
    /// in-progress reload to finish, then counts itself as active for the
    /// duration of `body`. Fails `timeout` if the wait is exceeded. Release
    /// of the active-request count is guaranteed by `RequestGuard`'s `Drop`
    /// even if this call is cancelled while `body` is still running.
    pub async fn request_scope<F, Fut, T>(&self, body: F) -> Result<T, BrokerError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.wait_until_ready().await?;

        {
            let mut guard = self.state.lock().expect("barrier lock poisoned");
            guard.active_requests += 1;
        }
        let _release = RequestGuard { barrier: self };

        Ok(body().await)
    }

    /// Runs `body` as a reload: serializes against other reload attempts,
    /// blocks new requests from entering, waits for in-flight requests to
    /// drain, then runs `body`. New requests are unblocked when this call
    /// returns *or is cancelled*, since `ReloadGuard`'s `Drop` does the
    /// clearing rather than code sequenced after the body's `.await`.
    pub async fn reload_scope<F, Fut, T>(&self, body: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _reload_serialize = self.reload_lock.lock().await;

        {
            let mut guard = self.state.lock().expect("barrier lock poisoned");
            guard.reloading = true;
        }
        let _release = ReloadGuard { barrier: self };

        self.wait_until_drained().await;

        body().await
    }

    async fn wait_until_ready(&self) -> Result<(), BrokerError> {
        loop {
            let notified = self.ready.notified();
            {
                let guard = self.state.lock().expect("barrier lock poisoned");
                if !guard.reloading {
                    return Ok(());
                }
            }
            if tokio::time::timeout(self.queue_timeout, notified)
                .await
                .is_err()
            {
                return Err(BrokerError::timeout(
                    "plugin reload in progress, request timed out",
                ));
            }
        }
    }

    async fn wait_until_drained(&self) {
        loop {
            let notified = self.drained.notified();
            {
                let guard = self.state.lock().expect("barrier lock poisoned");
                if guard.active_requests == 0 {
                    return;
                }
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[tokio::test]
    async fn request_scope_runs_body() {
        let barrier = RequestBarrier::new(Duration::from_millis(500));
        let ran = barrier.request_scope(|| async { 42 }).await.unwrap();
        assert_eq!(ran, 42);
        assert_eq!(barrier.active_requests().await, 0);
    }

    #[tokio::test]
    async fn reload_waits_for_in_flight_request_to_drain() {
        let barrier = Arc::new(RequestBarrier::new(Duration::from_secs(5)));
        let reload_ran = Arc::new(AtomicBool::new(false));

        let b = barrier.clone();
        let request = tokio::spawn(async move {
            b.request_scope(|| async {
                tokio::time::sleep(Duration::from_millis(50)).await;
            })
            .await
            .unwrap();
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(barrier.active_requests().await, 1);

        let b2 = barrier.clone();
        let r2 = reload_ran.clone();
        let reload = tokio::spawn(async move {
            b2.reload_scope(|| async {
                r2.store(true, Ordering::SeqCst);
            })
            .await;
        });

        request.await.unwrap();
        reload.await.unwrap();
        assert!(reload_ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn request_during_reload_times_out() {
        let barrier = Arc::new(RequestBarrier::new(Duration::from_millis(20)));
        let b = barrier.clone();
        let reload = tokio::spawn(async move {
            b.reload_scope(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
            })
            .await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        let err = barrier
            .request_scope(|| async {})
            .await
            .expect_err("should time out while reload is in progress");
        assert_eq!(err.kind, crate::errors::ErrorKind::Timeout);
        reload.await.unwrap();
    }

    #[tokio::test]
    async fn dropping_a_request_scope_mid_body_still_releases_it() {
        let barrier = Arc::new(RequestBarrier::new(Duration::from_millis(200)));
        let b = barrier.clone();
        let task = tokio::spawn(async move {
            b.request_scope(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(barrier.active_requests().await, 1);

        // Abort while suspended inside the request body: this drops the
        // scope's future without ever reaching the code after its `.await`.
        task.abort();
        let _ = task.await;

        assert_eq!(barrier.active_requests().await, 0);

        // A reload must still be able to drain and complete afterwards.
        tokio::time::timeout(Duration::from_millis(200), barrier.reload_scope(|| async {}))
            .await
            .expect("reload should not hang after the cancelled request released its slot");
    }

    #[tokio::test]
    async fn dropping_a_reload_scope_mid_body_still_clears_reloading() {
        let barrier = Arc::new(RequestBarrier::new(Duration::from_millis(200)));
        let b = barrier.clone();
        let task = tokio::spawn(async move {
            b.reload_scope(|| async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            })
            .await
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(barrier.is_reloading().await);

        // Abort while suspended inside the reload body: this drops the
        // scope's future without ever reaching the code after its `.await`.
        task.abort();
        let _ = task.await;

        assert!(!barrier.is_reloading().await);

        // A subsequent request must not be permanently wedged behind the
        // aborted reload.
        tokio::time::timeout(Duration::from_millis(200), barrier.request_scope(|| async {}))
            .await
            .expect("request should not time out after the cancelled reload cleared itself")
            .expect("request should succeed");
    }
}
