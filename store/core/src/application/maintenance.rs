// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Background maintenance tasks
//!
//! Every periodic pass (consistency audit, backup, optimization) and the bus
//! listener runs as its own tokio task with a [`CancellationToken`]. The
//! handles are collected in [`BackgroundTasks`] so shutdown can cancel and
//! join all of them.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Scheduling only; the passes themselves live on the store
//!   and are reached through a weak reference, so a running task never keeps
//!   the store alive.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskKind {
    Consistency,
    Backup,
    Optimization,
    EventListener,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskKind::Consistency => "consistency",
            TaskKind::Backup => "backup",
            TaskKind::Optimization => "optimization",
            TaskKind::EventListener => "event_listener",
        };
        f.write_str(name)
    }
}

struct TaskHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub struct BackgroundTasks {
    tasks: BTreeMap<TaskKind, TaskHandle>,
    /// Set by [`drain`](Self::drain); no task may start afterwards.
    closed: bool,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn `task`, cancelling any running task of the same kind first.
    /// Returns `false` without spawning once the set has been drained.
    pub fn spawn<F, Fut>(&mut self, kind: TaskKind, task: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.closed {
            debug!(task = %kind, "Background tasks already drained, not spawning");
            return false;
        }

        if let Some(previous) = self.tasks.remove(&kind) {
            debug!(task = %kind, "Replacing running background task");
            previous.token.cancel();
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(task(token.clone()));
        self.tasks.insert(kind, TaskHandle { token, handle });
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_running(&self, kind: TaskKind) -> bool {
        self.tasks.get(&kind).is_some_and(|t| !t.handle.is_finished())
    }

    pub fn kinds(&self) -> Vec<TaskKind> {
        self.tasks.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Cancel everything and hand back the join handles; the caller awaits
    /// them outside any lock. Later spawns are refused.
    pub fn drain(&mut self) -> Vec<(TaskKind, JoinHandle<()>)> {
        self.closed = true;
        std::mem::take(&mut self.tasks)
            .into_iter()
            .map(|(kind, task)| {
                task.token.cancel();
                (kind, task.handle)
            })
            .collect()
    }
}

/// Join drained tasks, logging any that panicked.
pub async fn join_all_tasks(handles: Vec<(TaskKind, JoinHandle<()>)>) {
    for (kind, handle) in handles {
        if let Err(e) = handle.await {
            warn!(task = %kind, "Background task ended abnormally: {}", e);
        }
    }
}

/// Run `pass` every `period` until cancelled. The first pass happens one
/// full period after start. `pass` returns `None` once its target is gone,
/// which ends the loop.
pub async fn run_periodic<F, Fut>(kind: TaskKind, period: Duration, token: CancellationToken, mut pass: F)
where
    F: FnMut() -> Option<Fut>,
    Fut: Future<Output = ()>,
{
    info!(task = %kind, period_ms = period.as_millis() as u64, "Starting background task");

    let mut tick = interval_at(Instant::now() + period, period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = tick.tick() => {
                match pass() {
                    Some(run) => run.await,
                    None => {
                        debug!(task = %kind, "Store dropped, stopping background task");
                        break;
                    }
                }
            }
            _ = token.cancelled() => {
                info!(task = %kind, "Shutdown signal received, stopping background task");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_periodic_first_tick_after_one_period() {
        let runs = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();

        let counter = runs.clone();
        let handle = tokio::spawn(run_periodic(
            TaskKind::Backup,
            Duration::from_secs(10),
            token.clone(),
            move || {
                let counter = counter.clone();
                Some(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
            },
        ));

        tokio::time::sleep(Duration::from_secs(9)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_stops_when_target_gone() {
        let handle = tokio::spawn(run_periodic(
            TaskKind::Optimization,
            Duration::from_secs(1),
            CancellationToken::new(),
            || None::<std::future::Ready<()>>,
        ));

        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("task should stop on its own")
            .unwrap();
    }

    #[tokio::test]
    async fn test_spawn_replaces_and_drain_cancels() {
        let mut tasks = BackgroundTasks::new();
        let first_cancelled = Arc::new(AtomicUsize::new(0));

        let flag = first_cancelled.clone();
        tasks.spawn(TaskKind::Consistency, move |token| async move {
            token.cancelled().await;
            flag.fetch_add(1, Ordering::SeqCst);
        });
        tasks.spawn(TaskKind::Consistency, |token| async move {
            token.cancelled().await;
        });
        tasks.spawn(TaskKind::Backup, |token| async move {
            token.cancelled().await;
        });

        assert_eq!(tasks.kinds(), vec![TaskKind::Consistency, TaskKind::Backup]);

        let handles = tasks.drain();
        assert!(tasks.is_empty());
        join_all_tasks(handles).await;

        // Nothing starts once drained.
        assert!(tasks.is_closed());
        assert!(!tasks.spawn(TaskKind::Consistency, |token| async move {
            token.cancelled().await;
        }));
        assert!(tasks.is_empty());

        // The replaced task was cancelled too, not leaked.
        for _ in 0..10 {
            if first_cancelled.load(Ordering::SeqCst) == 1 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(first_cancelled.load(Ordering::SeqCst), 1);
    }
}
