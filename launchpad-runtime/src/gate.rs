//! One-shot readiness signal: the display surface exists, launching may begin.

use tokio::sync::watch;

/// A flag flipped exactly once (false → true) and never reset.
#[derive(Debug)]
pub struct ReadinessGate {
    ready: watch::Sender<bool>,
}

impl Default for ReadinessGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessGate {
    pub fn new() -> Self {
        let (ready, _) = watch::channel(false);
        Self { ready }
    }

    /// Signal that the display surface is mounted.
    ///
    /// Returns `true` only for the call that flipped the flag; later calls are
    /// no-ops. The check-and-set runs under the channel lock, so concurrent
    /// callers cannot both observe themselves as first.
    pub fn mark_ready(&self) -> bool {
        let flipped = self.ready.send_if_modified(|ready| {
            if *ready {
                return false;
            }
            *ready = true;
            true
        });
        if flipped {
            tracing::debug!("display surface ready");
        }
        flipped
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Resolve once [`mark_ready`](Self::mark_ready) has been called.
    pub async fn wait_ready(&self) {
        let mut rx = self.ready.subscribe();
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn only_first_mark_flips() {
        let gate = ReadinessGate::new();
        assert!(!gate.is_ready());
        assert!(gate.mark_ready());
        assert!(!gate.mark_ready());
        assert!(!gate.mark_ready());
        assert!(gate.is_ready());
    }

    #[tokio::test]
    async fn concurrent_marks_flip_exactly_once() {
        let gate = Arc::new(ReadinessGate::new());
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let gate = gate.clone();
                tokio::spawn(async move { gate.mark_ready() })
            })
            .collect();

        let mut flips = 0;
        for handle in handles {
            if handle.await.expect("join") {
                flips += 1;
            }
        }
        assert_eq!(flips, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_ready_blocks_until_marked() {
        let gate = Arc::new(ReadinessGate::new());
        let waiter = {
            let gate = gate.clone();
            tokio::spawn(async move { gate.wait_ready().await })
        };

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!waiter.is_finished());

        gate.mark_ready();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter released")
            .expect("join");
    }

    #[tokio::test]
    async fn wait_ready_returns_immediately_when_already_ready() {
        let gate = ReadinessGate::new();
        gate.mark_ready();
        tokio_test::assert_ready!(tokio_test::task::spawn(gate.wait_ready()).poll());
    }
}
