// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! # Domain synchronizer
//!
//! Incremental, crash-safe ingestion of teleport events from one domain.
//!
//! A [`DomainSynchronizer`] scans `[checkpoint, target)` batches up to the
//! domain tip. Each batch is handed to an injected [`SyncStrategy`] that
//! fetches, decodes and stages records inside a store transaction; the
//! checkpoint advance is staged in the same transaction, so a batch is either
//! fully persisted with its checkpoint or not at all. Replaying a batch after
//! a crash is harmless because records are keyed uniquely.
//!
//! ```text
//!   stopped ──run()──▶ syncing ◀──new blocks── synced
//!      ▲                  │                      ▲
//!      │                  └──── tip reached ─────┘
//!      └──── stop() / retries exhausted ─────────
//! ```

mod config;
mod strategy;
mod synchronizer;

pub use config::SynchronizerConfig;
pub use strategy::{LogSyncStrategy, SyncStrategy};
pub use synchronizer::{batch_target, DomainSynchronizer};

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("Chain error: {0}")]
    Chain(#[from] BridgeError),

    #[error("Batch [{from}, {to}) failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        from: u64,
        to: u64,
        attempts: u32,
        source: BridgeError,
    },
}

impl SyncError {
    /// Whether this error is recoverable (should retry)
    pub fn is_recoverable(&self) -> bool {
        match self {
            SyncError::Chain(e) => e.is_transient(),
            SyncError::RetriesExhausted { .. } => false,
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            SyncError::Chain(e) => e.error_type(),
            SyncError::RetriesExhausted { .. } => "retries_exhausted",
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Stopped,
    Syncing,
    Synced,
}

impl SyncStatus {
    pub fn as_metric(&self) -> i64 {
        match self {
            SyncStatus::Stopped => 0,
            SyncStatus::Syncing => 1,
            SyncStatus::Synced => 2,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Stopped => "stopped",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Synced => "synced",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_error_classification() {
        let transient = SyncError::Chain(BridgeError::TransientProviderError("reset".into()));
        assert!(transient.is_recoverable());
        assert_eq!(transient.error_type(), "transient_provider_error");

        let exhausted = SyncError::RetriesExhausted {
            from: 1,
            to: 3,
            attempts: 5,
            source: BridgeError::StorageError("commit".into()),
        };
        assert!(!exhausted.is_recoverable());
        assert_eq!(
            exhausted.to_string(),
            "Batch [1, 3) failed after 5 attempts: Storage error: commit"
        );
    }

    #[test]
    fn test_status_metric_values() {
        assert_eq!(SyncStatus::Stopped.as_metric(), 0);
        assert_eq!(SyncStatus::Syncing.as_metric(), 1);
        assert_eq!(SyncStatus::Synced.as_metric(), 2);
        assert_eq!(SyncStatus::Synced.to_string(), "synced");
    }
}
