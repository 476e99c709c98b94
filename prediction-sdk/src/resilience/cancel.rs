//! Caller-driven cancellation for in-flight calls
//!
//! A [`CancellationSignal`] fires when its [`CancellationHandle`] is used or
//! when its deadline passes, whichever comes first. Both suspension points
//! of a call (the transport attempt and the back-off sleep) race against it.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Trigger side of a cancellation pair
#[derive(Debug)]
pub struct CancellationHandle {
    tx: watch::Sender<bool>,
}

impl CancellationHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observing side, cheap to clone
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    rx: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl CancellationSignal {
    /// A signal that never fires
    pub fn none() -> Self {
        Self::default()
    }

    /// A signal plus the handle that fires it
    pub fn pair() -> (CancellationHandle, Self) {
        let (tx, rx) = watch::channel(false);
        (
            CancellationHandle { tx },
            Self {
                rx: Some(rx),
                deadline: None,
            },
        )
    }

    /// Fire once `deadline` is reached
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    /// Fire once `timeout` has elapsed from now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        let flagged = self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false);
        let expired = self.deadline.map(|d| Instant::now() >= d).unwrap_or(false);
        flagged || expired
    }

    /// Why the signal fired, for error messages
    pub fn reason(&self) -> &'static str {
        match self.deadline {
            Some(d) if Instant::now() >= d => "deadline exceeded",
            _ => "cancelled by caller",
        }
    }

    /// Resolves when the signal fires; pending forever for [`CancellationSignal::none`]
    pub async fn cancelled(&self) {
        let flag = async {
            match self.rx.clone() {
                Some(mut rx) => loop {
                    if *rx.borrow_and_update() {
                        return;
                    }
                    if rx.changed().await.is_err() {
                        // handle dropped without cancelling
                        std::future::pending::<()>().await;
                    }
                },
                None => std::future::pending::<()>().await,
            }
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = flag => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => flag.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_none_never_fires() {
        let signal = CancellationSignal::none();
        assert!(!signal.is_cancelled());
        let fired = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(fired.is_err());
    }

    #[tokio::test]
    async fn test_handle_fires_waiters() {
        let (handle, signal) = CancellationSignal::pair();
        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.cancelled().await })
        };

        handle.cancel();
        let joined = tokio::time::timeout(Duration::from_secs(1), waiter).await;
        assert!(joined.is_ok());
        assert!(signal.is_cancelled());
        assert_eq!(signal.reason(), "cancelled by caller");
    }

    #[tokio::test]
    async fn test_deadline_fires() {
        let signal = CancellationSignal::none().with_timeout(Duration::from_millis(10));
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .expect("deadline should fire");
        assert!(signal.is_cancelled());
        assert_eq!(signal.reason(), "deadline exceeded");
    }

    #[tokio::test]
    async fn test_dropped_handle_does_not_fire() {
        let (handle, signal) = CancellationSignal::pair();
        drop(handle);
        let fired = tokio::time::timeout(Duration::from_millis(20), signal.cancelled()).await;
        assert!(fired.is_err());
        assert!(!signal.is_cancelled());
    }
}
