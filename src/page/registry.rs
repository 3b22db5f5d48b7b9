//! Correlation registry for pending page calls.
//!
//! Tracks in-flight `callHandler` invocations and routes settlements to
//! their waiters via oneshot channels.
//!
//! - `register()` allocates an id that is not currently pending and returns
//!   the receiving half
//! - `settle(id, outcome)` delivers and removes the entry; unknown or
//!   already-settled ids are a no-op
//! - dropping the registry abandons every entry without settling it

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;

use super::PageError;
use crate::error::LockResultExt;
use crate::protocol::{CorrelationId, Settlement};

/// Ids wrap here, matching the page-side counter.
const MAX_ID: i64 = i32::MAX as i64;

pub(crate) type CallOutcome = Result<Value, PageError>;

/// Routes settlements to pending calls.
pub struct CallRegistry {
    state: std::sync::Mutex<RegistryState>,
}

struct RegistryState {
    pending: HashMap<CorrelationId, oneshot::Sender<CallOutcome>>,
    next_id: i64,
}

impl CallRegistry {
    pub fn new() -> Self {
        Self {
            state: std::sync::Mutex::new(RegistryState {
                pending: HashMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Register a new pending call.
    ///
    /// Skips ids that are still pending, so a wrapped counter never
    /// reuses a live id.
    pub(crate) fn register(&self) -> (CorrelationId, oneshot::Receiver<CallOutcome>) {
        let (tx, rx) = oneshot::channel();
        let mut state = self.state.lock().recover_poison("CallRegistry::register");

        let id = loop {
            let candidate = CorrelationId::new(state.next_id);
            state.next_id = (state.next_id + 1) % MAX_ID;
            if !state.pending.contains_key(&candidate) {
                break candidate;
            }
        };

        state.pending.insert(id, tx);
        (id, rx)
    }

    /// Settle a pending call.
    ///
    /// Returns `true` if a waiter existed for `id`.
    pub fn settle(&self, id: CorrelationId, outcome: Settlement) -> bool {
        let sender = {
            let mut state = self.state.lock().recover_poison("CallRegistry::settle");
            state.pending.remove(&id)
        };

        let Some(sender) = sender else {
            log::trace!(
                target: "webview_bridge::page::registry",
                "Ignoring settlement for unknown id {}",
                id
            );
            return false;
        };

        let result = match outcome {
            Settlement::Resolve(value) => Ok(value),
            Settlement::Reject(message) => Err(PageError::Rejected(message)),
        };
        // The caller may have stopped awaiting; the entry is gone either way.
        let _ = sender.send(result);
        true
    }

    /// Remove a pending call without settling it.
    pub fn remove(&self, id: CorrelationId) -> bool {
        let mut state = self.state.lock().recover_poison("CallRegistry::remove");
        state.pending.remove(&id).is_some()
    }

    pub fn pending_count(&self) -> usize {
        let state = self.state.lock().recover_poison("CallRegistry::pending_count");
        state.pending.len()
    }

    pub fn is_pending(&self, id: CorrelationId) -> bool {
        let state = self.state.lock().recover_poison("CallRegistry::is_pending");
        state.pending.contains_key(&id)
    }

    /// Drop every pending entry without delivering anything.
    ///
    /// Returns the number of abandoned calls.
    pub fn abandon_all(&self) -> usize {
        let mut state = self.state.lock().recover_poison("CallRegistry::abandon_all");
        let count = state.pending.len();
        state.pending.clear();
        count
    }
}

impl Default for CallRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_allocates_distinct_ids() {
        let registry = CallRegistry::new();
        let (a, _rx_a) = registry.register();
        let (b, _rx_b) = registry.register();
        assert_ne!(a, b);
        assert_eq!(registry.pending_count(), 2);
    }

    #[test]
    fn settle_delivers_and_removes_entry() {
        let registry = CallRegistry::new();
        let (id, mut rx) = registry.register();

        assert!(registry.settle(id, Settlement::Resolve(json!({"title": "Example"}))));
        assert!(!registry.is_pending(id));
        assert_eq!(rx.try_recv().unwrap().unwrap(), json!({"title": "Example"}));
    }

    #[test]
    fn second_settlement_is_a_no_op() {
        let registry = CallRegistry::new();
        let (id, mut rx) = registry.register();

        assert!(registry.settle(id, Settlement::Resolve(json!(1))));
        assert!(!registry.settle(id, Settlement::Resolve(json!(2))));
        assert!(!registry.settle(id, Settlement::Reject("late".to_string())));
        assert_eq!(rx.try_recv().unwrap().unwrap(), json!(1));
    }

    #[test]
    fn settle_unknown_id_is_a_no_op() {
        let registry = CallRegistry::new();
        assert!(!registry.settle(CorrelationId::new(99), Settlement::Resolve(json!(null))));
    }

    #[test]
    fn reject_carries_message() {
        let registry = CallRegistry::new();
        let (id, mut rx) = registry.register();

        registry.settle(id, Settlement::Reject("E_FAIL, boom".to_string()));
        match rx.try_recv().unwrap() {
            Err(PageError::Rejected(message)) => assert_eq!(message, "E_FAIL, boom"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn wrapped_counter_skips_pending_ids() {
        let registry = CallRegistry::new();
        let (first, _rx_first) = registry.register();
        assert_eq!(first, CorrelationId::new(0));

        registry
            .state
            .lock()
            .unwrap()
            .next_id = 0;

        let (next, _rx_next) = registry.register();
        assert_eq!(next, CorrelationId::new(1));
    }

    #[test]
    fn poisoned_lock_keeps_registry_usable() {
        let registry = std::sync::Arc::new(CallRegistry::new());
        let (id, mut rx) = registry.register();

        let clone = std::sync::Arc::clone(&registry);
        let _ = std::thread::spawn(move || {
            let _guard = clone.state.lock().unwrap();
            panic!("poison the registry lock");
        })
        .join();
        assert!(registry.state.is_poisoned());

        assert!(registry.is_pending(id));
        assert!(registry.settle(id, Settlement::Resolve(json!("after poison"))));
        assert_eq!(rx.try_recv().unwrap().unwrap(), json!("after poison"));
        assert_eq!(registry.pending_count(), 0);
    }

    #[test]
    fn abandon_all_drops_senders() {
        let registry = CallRegistry::new();
        let (_, mut rx) = registry.register();

        assert_eq!(registry.abandon_all(), 1);
        assert_eq!(registry.pending_count(), 0);
        assert!(matches!(
            rx.try_recv(),
            Err(tokio::sync::oneshot::error::TryRecvError::Closed)
        ));
    }
}
