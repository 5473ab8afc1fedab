//! Cooperative cancellation for long-running expansion.
//!
//! The token is a channel nobody ever sends on: cancelling drops the only
//! sender, which wakes every receiver blocked in [`CancelToken::sleep`].

use crate::error::{Result, XpandError};
use crossbeam_channel::{Receiver, Sender, TryRecvError, after, bounded, select};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Shared cancellation flag with an interruptible sleep.
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: Receiver<()>,
    tx: Arc<Mutex<Option<Sender<()>>>>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self {
            rx,
            tx: Arc::new(Mutex::new(Some(tx))),
        }
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.tx.lock().take();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Block for `duration` or until cancelled. Returns `true` if cancelled.
    #[must_use]
    pub fn sleep(&self, duration: Duration) -> bool {
        if self.is_cancelled() {
            return true;
        }
        select! {
            recv(self.rx) -> _ => true,
            recv(after(duration)) -> _ => self.is_cancelled(),
        }
    }

    /// Cancel this token on the first Ctrl-C; exit on the second.
    ///
    /// The second press covers a blocking request that cannot observe the token.
    ///
    /// # Errors
    ///
    /// Returns an error if a handler is already installed for this process.
    pub fn install_interrupt_handler(&self) -> Result<()> {
        let token = self.clone();
        ctrlc::set_handler(move || {
            if token.is_cancelled() {
                std::process::exit(130);
            }
            warn!("Interrupted; finishing up (press Ctrl-C again to quit immediately)");
            token.cancel();
        })
        .map_err(|e| XpandError::with_context("installing Ctrl-C handler", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn fresh_token_is_not_cancelled() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        assert!(!token.sleep(Duration::from_millis(1)));
    }

    #[test]
    fn cancel_is_visible_to_clones() {
        let token = CancelToken::new();
        let other = token.clone();
        token.cancel();
        token.cancel();
        assert!(other.is_cancelled());
        assert!(other.sleep(Duration::from_secs(60)));
    }

    #[test]
    fn cancel_wakes_a_sleeping_thread() {
        let token = CancelToken::new();
        let sleeper = token.clone();
        let start = Instant::now();
        let handle = std::thread::spawn(move || sleeper.sleep(Duration::from_secs(60)));
        std::thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(handle.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(30));
    }
}
