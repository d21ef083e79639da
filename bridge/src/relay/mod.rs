// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Fast-path relaying of attested transfers through an external relay network.

mod http;
mod requester;

pub use http::HttpRelayNetwork;
pub use requester::{relay_calldata, RelayRequest, RelayRequester};

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256};
use serde::{Deserialize, Serialize};

pub type TaskId = String;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    #[error("Relay request expired at {expiry} (now {now})")]
    Expired { expiry: u64, now: u64 },
    #[error("Failed to sign relay payload: {0}")]
    Signing(String),
    #[error("Relay submission failed: {0}")]
    Submission(String),
    #[error("Relay status query failed: {0}")]
    Poll(String),
    #[error("Relay task {0} is unknown to the relay network")]
    TaskNotFound(TaskId),
    #[error("Relay task {task_id} failed: {reason}")]
    TaskFailed { task_id: TaskId, reason: String },
    #[error("Relay task {0} did not complete in time")]
    Timeout(TaskId),
    #[error("Relay task lost after {0} resubmissions")]
    ResubmissionsExhausted(u32),
    #[error("Relay wait cancelled")]
    Cancelled,
}

impl RelayError {
    pub fn error_type(&self) -> &'static str {
        match self {
            RelayError::Expired { .. } => "expired",
            RelayError::Signing(_) => "signing",
            RelayError::Submission(_) => "submission",
            RelayError::Poll(_) => "poll",
            RelayError::TaskNotFound(_) => "task_not_found",
            RelayError::TaskFailed { .. } => "task_failed",
            RelayError::Timeout(_) => "timeout",
            RelayError::ResubmissionsExhausted(_) => "resubmissions_exhausted",
            RelayError::Cancelled => "cancelled",
        }
    }
}

/// Call the relay network is asked to execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelaySubmission {
    pub chain_id: u64,
    pub target: Address,
    pub data: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayTaskStatus {
    Pending,
    Done(H256),
    Failed(String),
    NotFound,
}

#[async_trait]
pub trait RelayNetwork: Send + Sync {
    async fn submit(&self, submission: &RelaySubmission) -> Result<TaskId, RelayError>;

    async fn poll(&self, task_id: &str) -> Result<RelayTaskStatus, RelayError>;
}
