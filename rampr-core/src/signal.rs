use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

/// One-shot, idempotent run-wide cancellation. Once raised it stays raised;
/// every VU and the pool observe it on their next loop edge.
#[derive(Debug, Default)]
pub struct AbortSignal {
    aborted: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            // `notify_waiters` only wakes already-registered waiters, so the
            // registration must happen before the flag check; an abort landing
            // between the two still wakes this waiter.
            let notified = self.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn abort_is_one_shot_and_observable() {
        let signal = Arc::new(AbortSignal::new());
        assert!(!signal.is_aborted());

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.wait().await })
        };

        signal.abort();
        signal.abort(); // idempotent
        assert!(signal.is_aborted());
        assert!(waiter.await.is_ok());
    }

    #[tokio::test]
    async fn wait_returns_immediately_when_already_aborted() {
        let signal = AbortSignal::new();
        signal.abort();
        signal.wait().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn racing_abort_always_wakes_the_waiter() {
        use std::time::Duration;

        // The abort fires while the waiter may be anywhere between its flag
        // check and parking on the notify; the waiter must never be missed.
        for _ in 0..100 {
            let signal = Arc::new(AbortSignal::new());
            let waiter = {
                let signal = signal.clone();
                tokio::spawn(async move { signal.wait().await })
            };
            signal.abort();

            match tokio::time::timeout(Duration::from_secs(5), waiter).await {
                Ok(res) => assert!(res.is_ok()),
                Err(_) => panic!("abort wakeup was lost"),
            }
        }
    }
}
