// src/exec/cancel.rs

//! Broadcast cancellation for pipeline runs.
//!
//! A [`Generation`] is the single writer: it owns a `watch` channel whose
//! value flips to `true` exactly once, when the generation is retired.
//! Every [`CancelToken`] handed out from it observes that flip, no matter how
//! deeply nested the task holding it is. Checking is a cheap borrow of the
//! channel value; waiting is `watch::Receiver::wait_for`.
//!
//! Dropping a `Generation` retires it, so a run can never outlive the
//! generation that started it.

use tokio::sync::watch;

/// Owner side of one cancellation epoch.
#[derive(Debug)]
pub struct Generation {
    tx: watch::Sender<bool>,
    epoch: u64,
}

impl Generation {
    pub fn new() -> Self {
        Self::with_epoch(0)
    }

    fn with_epoch(epoch: u64) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx, epoch }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
            epoch: self.epoch,
        }
    }

    /// Broadcast retirement to every token of this generation.
    pub fn retire(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_retired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Retire this generation and mint its successor.
    ///
    /// Retirement is broadcast before the successor exists, so no holder can
    /// ever observe two live generations.
    pub fn rotate(&mut self) -> CancelToken {
        self.retire();
        *self = Self::with_epoch(self.epoch + 1);
        self.token()
    }
}

impl Default for Generation {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Generation {
    fn drop(&mut self) {
        self.retire();
    }
}

/// Reader side: held by every task and process of a run.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
    epoch: u64,
}

impl CancelToken {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_retired(&self) -> bool {
        // A closed channel means the generation is gone.
        *self.rx.borrow() || self.rx.has_changed().is_err()
    }

    /// Resolve once the generation is retired.
    pub async fn retired(&self) {
        let mut rx = self.rx.clone();
        // Err means the sender was dropped, which also retires.
        let _ = rx.wait_for(|retired| *retired).await;
    }
}
