// src/system/registry.rs

//! Registry of asynchronous calls whose completion callbacks are still
//! outstanding.
//!
//! Each dispatched call parks its callback here under a fresh id before the
//! process is spawned, so a completion arriving at any later point finds its
//! entry. Removal and invocation are a single take: a callback runs at most
//! once, whether the call completes, is expired by hand, or both race.

use crate::models::{CompletionCallback, ExecutionContext, ExecutionResult};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use uuid::Uuid;

struct PendingCall {
    callback: CompletionCallback,
    context: ExecutionContext,
    command: String,
    dispatched_at: Instant,
}

#[derive(Default)]
struct RegistryState {
    calls: HashMap<Uuid, PendingCall>,
    // Ids expired by hand whose completions have not arrived yet. Lets a
    // straggling completion be told apart from one that was never
    // registered.
    expired: HashSet<Uuid>,
}

/// Snapshot of one outstanding call, for inspection and cleanup decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCallInfo {
    pub id: Uuid,
    pub command: String,
    pub age: Duration,
}

/// Shared, cloneable store of pending completions.
///
/// Clones share the same underlying table, so an executor and the code
/// inspecting its backlog can hold their own handles.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of calls still waiting for their completion.
    pub fn len(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lists the outstanding calls with their rendered command lines and how
    /// long ago each was dispatched.
    pub fn pending(&self) -> Vec<PendingCallInfo> {
        self.lock()
            .calls
            .iter()
            .map(|(id, call)| PendingCallInfo {
                id: *id,
                command: call.command.clone(),
                age: call.dispatched_at.elapsed(),
            })
            .collect()
    }

    /// Drops a pending call without invoking its callback. Returns whether an
    /// entry was present. A marker is left behind so the completion, if it
    /// ever arrives, is logged as deliberately discarded rather than unknown;
    /// the arriving completion consumes the marker.
    pub fn expire(&self, id: Uuid) -> bool {
        let mut state = self.lock();
        match state.calls.remove(&id) {
            Some(call) => {
                state.expired.insert(id);
                log::debug!("Expired pending call {} ({})", id, call.command);
                true
            }
            None => false,
        }
    }

    /// Parks a callback and returns the id its completion will be delivered
    /// under. Registration happens before the process is spawned, so even an
    /// immediate completion finds its entry.
    pub(crate) fn register(
        &self,
        command: String,
        context: ExecutionContext,
        callback: CompletionCallback,
    ) -> Uuid {
        let id = Uuid::new_v4();
        let call = PendingCall {
            callback,
            context,
            command,
            dispatched_at: Instant::now(),
        };
        self.lock().calls.insert(id, call);
        id
    }

    /// Takes the entry for `id` and invokes its callback with `result`. The
    /// entry is removed under the lock and the callback runs outside it, so
    /// a callback dispatching further calls cannot deadlock the registry.
    pub(crate) fn deliver(&self, id: Uuid, result: ExecutionResult) {
        let entry = {
            let mut state = self.lock();
            let entry = state.calls.remove(&id);
            if entry.is_none() {
                if state.expired.remove(&id) {
                    log::warn!("Discarding the completion of expired call {}", id);
                } else {
                    log::error!(
                        "No pending call registered under {}; its completion was dropped",
                        id
                    );
                }
            }
            entry
        };
        if let Some(call) = entry {
            log::debug!("Delivering completion for call {} ({})", id, call.command);
            (call.callback)(call.context, result);
        }
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("CallbackRegistry")
            .field("pending", &state.calls.len())
            .field("expired", &state.expired.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;

    #[test]
    fn test_register_makes_the_call_inspectable() {
        let registry = CallbackRegistry::new();
        assert!(registry.is_empty());

        let id = registry.register(
            "sleep 30".to_string(),
            ExecutionContext::default(),
            Box::new(|_, _| {}),
        );

        assert_eq!(registry.len(), 1);
        let pending = registry.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
        assert_eq!(pending[0].command, "sleep 30");
    }

    #[test]
    fn test_deliver_invokes_the_callback_once_and_clears_the_entry() {
        let registry = CallbackRegistry::new();
        let (tx, rx) = mpsc::channel();
        let context = ExecutionContext {
            buffer: Some(7),
            ..Default::default()
        };
        let id = registry.register(
            "true".to_string(),
            context.clone(),
            Box::new(move |ctx, result| {
                tx.send((ctx, result)).unwrap();
            }),
        );

        registry.deliver(id, ExecutionResult::status_only(0));

        let (ctx, result) = rx.try_recv().unwrap();
        assert_eq!(ctx, context);
        assert_eq!(result.status, Some(0));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_deliver_for_unknown_id_is_discarded() {
        let registry = CallbackRegistry::new();
        registry.deliver(Uuid::new_v4(), ExecutionResult::status_only(0));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_expired_call_never_receives_its_completion() {
        let registry = CallbackRegistry::new();
        let invocations = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&invocations);
        let id = registry.register(
            "sleep 30".to_string(),
            ExecutionContext::default(),
            Box::new(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        assert!(registry.expire(id));
        assert!(!registry.expire(id));
        registry.deliver(id, ExecutionResult::status_only(0));

        assert_eq!(invocations.load(Ordering::SeqCst), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_straggling_completion_consumes_the_expiry_marker() {
        let registry = CallbackRegistry::new();
        let id = registry.register(
            "sleep 30".to_string(),
            ExecutionContext::default(),
            Box::new(|_, _| {}),
        );
        assert!(registry.expire(id));
        assert!(format!("{registry:?}").contains("expired: 1"));

        registry.deliver(id, ExecutionResult::status_only(0));
        assert!(format!("{registry:?}").contains("expired: 0"));

        // The same id again is now unknown, not expired.
        registry.deliver(id, ExecutionResult::status_only(0));
        assert!(format!("{registry:?}").contains("expired: 0"));
    }

    #[test]
    fn test_clones_share_the_same_table() {
        let registry = CallbackRegistry::new();
        let other = registry.clone();
        let id = registry.register(
            "true".to_string(),
            ExecutionContext::default(),
            Box::new(|_, _| {}),
        );
        assert_eq!(other.len(), 1);
        assert!(other.expire(id));
        assert!(registry.is_empty());
    }
}
