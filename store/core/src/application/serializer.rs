// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Update Serializer: single-writer gate
//!
//! At most one mutation is applied to the aggregate at a time. The first
//! submitter to find the gate open becomes the *committer*: it applies its
//! own mutation, then drains every mutation that was queued while it held the
//! gate, one at a time, before releasing it. Submitters that find the gate
//! held park their mutation in the pending map and await the result of its
//! commit.
//!
//! Pending entries are keyed by admission sequence, source tag and admission
//! timestamp, so replay order is admission order.
//!
//! ## Open concern
//!
//! The pending map is unbounded. A submission storm while a commit is in
//! flight grows it without limit; the intended bound (cap or per-source
//! coalescing) is undecided.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::domain::error::StoreError;

/// Identity of a queued submission.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PendingKey {
    pub seq: u64,
    pub source: String,
    pub admitted_at: DateTime<Utc>,
}

struct Pending<M, R> {
    mutation: M,
    reply: oneshot::Sender<R>,
}

struct Gate<M, R> {
    in_flight: bool,
    pending: BTreeMap<PendingKey, Pending<M, R>>,
}

pub enum Admission<M, R> {
    /// Caller now holds the gate and must commit `M`, then drain.
    Acquired(M),
    /// Gate was held; the committer will apply the mutation and reply.
    Queued {
        key: PendingKey,
        reply: oneshot::Receiver<R>,
    },
}

pub struct UpdateSerializer<M, R> {
    gate: Mutex<Gate<M, R>>,
    next_seq: AtomicU64,
}

impl<M, R> Default for UpdateSerializer<M, R> {
    fn default() -> Self {
        Self {
            gate: Mutex::new(Gate {
                in_flight: false,
                pending: BTreeMap::new(),
            }),
            next_seq: AtomicU64::new(0),
        }
    }
}

impl<M, R> UpdateSerializer<M, R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn admit(&self, source: &str, mutation: M) -> Admission<M, R> {
        let mut gate = self.gate.lock();
        if !gate.in_flight {
            gate.in_flight = true;
            return Admission::Acquired(mutation);
        }

        let key = PendingKey {
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
            source: source.to_string(),
            admitted_at: Utc::now(),
        };
        let (tx, rx) = oneshot::channel();
        gate.pending.insert(key.clone(), Pending { mutation, reply: tx });
        metrics::gauge!("keystone_pending_updates").set(gate.pending.len() as f64);

        Admission::Queued { key, reply: rx }
    }

    /// Next queued mutation, or release the gate when the queue is empty.
    /// Both happen under the same lock so no admission can slip between.
    fn take_next(&self) -> Option<Pending<M, R>> {
        let mut gate = self.gate.lock();
        match gate.pending.pop_first() {
            Some((_, pending)) => {
                metrics::gauge!("keystone_pending_updates").set(gate.pending.len() as f64);
                Some(pending)
            }
            None => {
                gate.in_flight = false;
                None
            }
        }
    }

    /// Run `mutation` through the gate.
    ///
    /// When the gate is open, `commit` runs inline for this mutation and for
    /// everything queued behind it. Otherwise the call waits for the
    /// committer to apply it.
    pub async fn submit<F>(&self, source: &str, mutation: M, commit: F) -> Result<R, StoreError>
    where
        F: Fn(M) -> R,
    {
        match self.admit(source, mutation) {
            Admission::Acquired(mutation) => {
                let guard = InFlightGuard { serializer: self, armed: true };
                let result = commit(mutation);
                while let Some(pending) = self.take_next() {
                    let outcome = commit(pending.mutation);
                    // Receiver may have given up waiting; the commit stands.
                    let _ = pending.reply.send(outcome);
                }
                guard.disarm();
                Ok(result)
            }
            Admission::Queued { key, reply } => {
                debug!(source = %key.source, seq = key.seq, "Mutation queued behind in-flight commit");
                reply.await.map_err(|_| StoreError::CommitAbandoned)
            }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.gate.lock().pending.len()
    }

    pub fn pending_keys(&self) -> Vec<PendingKey> {
        self.gate.lock().pending.keys().cloned().collect()
    }

    pub fn in_flight(&self) -> bool {
        self.gate.lock().in_flight
    }
}

/// Releases the gate if a commit unwinds, abandoning everything queued.
struct InFlightGuard<'a, M, R> {
    serializer: &'a UpdateSerializer<M, R>,
    armed: bool,
}

impl<M, R> InFlightGuard<'_, M, R> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<M, R> Drop for InFlightGuard<'_, M, R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut gate = self.serializer.gate.lock();
        let abandoned = gate.pending.len();
        gate.pending.clear();
        gate.in_flight = false;
        warn!(abandoned, "Commit unwound; gate released and queued mutations abandoned");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_admission_queues_while_in_flight() {
        let serializer: UpdateSerializer<u32, u32> = UpdateSerializer::new();

        assert!(matches!(serializer.admit("ui", 1), Admission::Acquired(1)));
        assert!(serializer.in_flight());

        let queued = serializer.admit("sync", 2);
        let key = match queued {
            Admission::Queued { key, .. } => key,
            Admission::Acquired(_) => panic!("gate should be held"),
        };
        assert_eq!(key.source, "sync");
        assert_eq!(serializer.pending_count(), 1);

        let _third = serializer.admit("ui", 3);
        let keys = serializer.pending_keys();
        assert!(keys[0].seq < keys[1].seq);

        assert_eq!(serializer.take_next().map(|p| p.mutation), Some(2));
        assert_eq!(serializer.take_next().map(|p| p.mutation), Some(3));
        assert!(serializer.take_next().is_none());
        assert!(!serializer.in_flight());
    }

    #[tokio::test]
    async fn test_uncontended_submit_commits_inline() {
        let serializer: UpdateSerializer<u32, u32> = UpdateSerializer::new();
        let result = serializer.submit("ui", 20, |m| m + 1).await.unwrap();
        assert_eq!(result, 21);
        assert!(!serializer.in_flight());
    }

    #[tokio::test]
    async fn test_queued_submission_receives_its_own_result() {
        let serializer = Arc::new(UpdateSerializer::<u32, u32>::new());

        // Hold the gate manually, then queue a submission behind it.
        assert!(matches!(serializer.admit("holder", 0), Admission::Acquired(0)));
        let waiter = {
            let serializer = serializer.clone();
            tokio::spawn(async move { serializer.submit("queued", 5, |m| m * 10).await })
        };

        while serializer.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        // Drain as the committer would.
        while let Some(pending) = serializer.take_next() {
            let _ = pending.reply.send(pending.mutation * 10);
        }

        assert_eq!(waiter.await.unwrap().unwrap(), 50);
    }

    #[tokio::test]
    async fn test_dropped_reply_is_abandoned() {
        let serializer = Arc::new(UpdateSerializer::<u32, u32>::new());
        assert!(matches!(serializer.admit("holder", 0), Admission::Acquired(0)));

        let waiter = {
            let serializer = serializer.clone();
            tokio::spawn(async move { serializer.submit("queued", 1, |m| m).await })
        };
        while serializer.pending_count() == 0 {
            tokio::task::yield_now().await;
        }

        drop(serializer.take_next());
        assert!(matches!(waiter.await.unwrap(), Err(StoreError::CommitAbandoned)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_never_overlap() {
        let serializer = Arc::new(UpdateSerializer::<(), u64>::new());
        let version = Arc::new(Mutex::new(1u64));
        let inside = Arc::new(AtomicBool::new(false));

        let mut tasks = Vec::new();
        for i in 0..16 {
            let serializer = serializer.clone();
            let version = version.clone();
            let inside = inside.clone();
            tasks.push(tokio::spawn(async move {
                serializer
                    .submit(&format!("source-{}", i), (), |_| {
                        assert!(!inside.swap(true, Ordering::SeqCst), "two commits overlapped");
                        std::thread::sleep(Duration::from_millis(2));
                        let mut v = version.lock();
                        *v += 1;
                        let committed = *v;
                        inside.store(false, Ordering::SeqCst);
                        committed
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut versions = Vec::new();
        for task in tasks {
            versions.push(task.await.unwrap());
        }
        versions.sort_unstable();

        assert_eq!(versions, (2..=17).collect::<Vec<u64>>());
        assert!(!serializer.in_flight());
        assert_eq!(serializer.pending_count(), 0);
    }
}
