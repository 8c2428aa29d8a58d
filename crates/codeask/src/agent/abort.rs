//! Cooperative cancellation for the ask loop.
//!
//! [`AbortHandle::abort`] flips a `watch` flag; the loop polls
//! [`AbortSignal::is_aborted`] between steps and races the in-flight model
//! call against [`AbortSignal::aborted`].

use std::fmt;

use tokio::sync::watch;

/// Trigger side. Cheap to clone; any clone can abort.
#[derive(Clone)]
pub struct AbortHandle {
    tx: watch::Sender<bool>,
}

/// Observer side, held by the loop.
#[derive(Clone)]
pub struct AbortSignal {
    rx: watch::Receiver<bool>,
}

/// A connected handle and signal.
pub fn abort_pair() -> (AbortHandle, AbortSignal) {
    let (tx, rx) = watch::channel(false);
    (AbortHandle { tx }, AbortSignal { rx })
}

impl AbortHandle {
    pub fn abort(&self) {
        // send_replace succeeds even with no receivers.
        self.tx.send_replace(true);
    }

    pub fn is_aborted(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl AbortSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        abort_pair().1
    }

    pub fn is_aborted(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the handle aborts. Pends forever if every handle is
    /// dropped without aborting.
    pub async fn aborted(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow_and_update() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow_and_update() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}

impl Default for AbortSignal {
    fn default() -> Self {
        Self::never()
    }
}

impl fmt::Debug for AbortSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortSignal")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

impl fmt::Debug for AbortHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbortHandle")
            .field("aborted", &self.is_aborted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn abort_wakes_waiters() {
        let (handle, signal) = abort_pair();
        assert!(!signal.is_aborted());
        let waiter = tokio::spawn({
            let signal = signal.clone();
            async move { signal.aborted().await }
        });
        handle.abort();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(signal.is_aborted());
        assert!(handle.signal().is_aborted());
    }

    #[tokio::test]
    async fn never_does_not_fire() {
        let signal = AbortSignal::never();
        let res = tokio::time::timeout(Duration::from_millis(20), signal.aborted()).await;
        assert!(res.is_err());
        assert!(!signal.is_aborted());
    }
}
