// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Listener fan-out.
//!
//! Listeners are invoked synchronously, in subscription order, with the
//! freshly committed aggregate. A panicking listener is caught and logged;
//! the remaining listeners still run and the committer never sees the panic.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::warn;

use crate::domain::state::AppState;

pub type StateListener = Arc<dyn Fn(&AppState) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

#[derive(Default)]
pub struct SubscriptionRegistry {
    listeners: RwLock<BTreeMap<SubscriptionId, StateListener>>,
    next_id: AtomicU64,
}

/// Outcome of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifyReport {
    pub delivered: usize,
    pub failed: usize,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> SubscriptionHandle
    where
        F: Fn(&AppState) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().insert(id, Arc::new(listener));
        SubscriptionHandle {
            id,
            registry: Arc::downgrade(self),
        }
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        self.listeners.write().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    pub fn notify(&self, state: &AppState) -> NotifyReport {
        // Snapshot the list so listeners may (un)subscribe while being called.
        let listeners: Vec<(SubscriptionId, StateListener)> = self
            .listeners
            .read()
            .iter()
            .map(|(id, l)| (*id, l.clone()))
            .collect();

        let mut report = NotifyReport::default();
        for (id, listener) in listeners {
            match catch_unwind(AssertUnwindSafe(|| listener(state))) {
                Ok(()) => report.delivered += 1,
                Err(panic) => {
                    report.failed += 1;
                    warn!(
                        subscription = id.0,
                        version = state.state_version,
                        "State listener panicked: {}",
                        panic_message(&*panic)
                    );
                }
            }
        }
        report
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Returned by `subscribe`; call [`SubscriptionHandle::unsubscribe`] to stop
/// receiving notifications. Dropping the handle leaves the listener
/// registered.
#[must_use = "dropping the handle makes the subscription impossible to cancel"]
pub struct SubscriptionHandle {
    id: SubscriptionId,
    registry: Weak<SubscriptionRegistry>,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Returns `false` if the listener was already gone.
    pub fn unsubscribe(self) -> bool {
        match self.registry.upgrade() {
            Some(registry) => registry.remove(self.id),
            None => false,
        }
    }
}
