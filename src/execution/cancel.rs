//! Cancellation signal for in-flight runs

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;

/// Cloneable cancel flag that can also be awaited
///
/// Every clone observes the same flag. Once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once `cancel` has been called
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Whether both tokens share one flag
    pub fn same_as(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.tx, &other.tx)
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes an operator interrupt to whatever command is running right now
///
/// Each command arms its own fresh token, so an interrupt never outlives the
/// command it stopped.
#[derive(Debug, Clone, Default)]
pub struct Interrupter {
    current: Arc<Mutex<Option<CancelToken>>>,
}

impl Interrupter {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> MutexGuard<'_, Option<CancelToken>> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Hand out a fresh token for the command about to start
    ///
    /// The token stays current until the returned guard is dropped.
    pub fn arm(&self) -> Armed {
        let token = CancelToken::new();
        *self.current() = Some(token.clone());
        Armed {
            interrupter: self.clone(),
            token,
        }
    }

    /// Cancel the running command; false when nothing is running
    pub fn interrupt(&self) -> bool {
        match self.current().take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.current().is_some()
    }
}

/// Token of one running command, disarmed on drop
#[derive(Debug)]
pub struct Armed {
    interrupter: Interrupter,
    token: CancelToken,
}

impl Armed {
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl Drop for Armed {
    fn drop(&mut self) {
        let mut current = self.interrupter.current();
        if current.as_ref().is_some_and(|t| t.same_as(&self.token)) {
            *current = None;
        }
    }
}
