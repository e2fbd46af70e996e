// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store is not initialized")]
    NotInitialized,

    #[error("state store is shutting down")]
    ShuttingDown,

    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("component '{name}' failed: {message}")]
    Component { name: String, message: String },

    #[error("component '{name}' did not respond within {timeout_ms}ms")]
    Timeout { name: String, timeout_ms: u64 },

    #[error("commit was abandoned before it could be applied")]
    CommitAbandoned,
}
