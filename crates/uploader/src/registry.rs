//! In-flight transfer registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

/// Tracks in-flight transfers by backend-assigned task id.
///
/// Backends record the id on the `File` when the transfer task starts;
/// `cancel` resolves the token through it later.
#[derive(Debug, Default, Clone)]
pub(crate) struct TaskRegistry {
    next_id: Arc<AtomicU64>,
    tokens: Arc<Mutex<HashMap<u64, CancellationToken>>>,
}

impl TaskRegistry {
    /// Registers a new transfer, returning its id and cancellation token.
    pub fn register(&self) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();
        self.tokens.lock().unwrap().insert(id, token.clone());
        (id, token)
    }

    /// Drops a finished transfer.
    pub fn complete(&self, id: u64) {
        self.tokens.lock().unwrap().remove(&id);
    }

    /// Cancels a transfer if it is still in flight.
    pub fn cancel(&self, id: u64) -> bool {
        match self.tokens.lock().unwrap().get(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub fn in_flight(&self) -> usize {
        self.tokens.lock().unwrap().len()
    }
}
