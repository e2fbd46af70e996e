// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod backup;
pub mod consistency;
pub mod maintenance;
pub mod notifier;
pub mod optimizer;
pub mod recovery;
pub mod serializer;
pub mod state_store;
pub mod validator;

// Re-export the store surface for convenience
pub use backup::{BackupManager, StateBackup};
pub use consistency::ConsistencyChecker;
pub use maintenance::{BackgroundTasks, TaskKind};
pub use notifier::{NotifyReport, StateListener, SubscriptionHandle, SubscriptionId, SubscriptionRegistry};
pub use optimizer::{OptimizationSummary, RetentionPolicy, StateOptimizer};
pub use recovery::{ComponentPatch, RecoveredContent, RecoveryManager, RecoveryPlan, RecoveryReport};
pub use serializer::{PendingKey, UpdateSerializer};
pub use state_store::{Lifecycle, StateStore, StateSyncStats};
pub use validator::StateValidator;
