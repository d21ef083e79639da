// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Oracle attestations for fast-path minting.

mod collector;
mod oracle_client;
pub mod signatures;

pub use collector::{AttestationCollector, AttestationTarget, CollectedAttestations};
pub use oracle_client::HttpOracleClient;

use crate::error::BridgeError;
use async_trait::async_trait;
use ethers::types::{Address, Signature, H256};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttestationError {
    // Timed out before the threshold was reached
    #[error("Insufficient attestations: {collected} of {threshold} collected before timeout")]
    InsufficientAttestations { collected: usize, threshold: usize },
    #[error("Attestation collection cancelled")]
    Cancelled,
    #[error("Threshold {threshold} is not reachable with {oracles} oracles")]
    UnreachableThreshold { threshold: usize, oracles: usize },
    // The referenced transfer could not be resolved from the source domain
    #[error("Transfer not found: {0}")]
    TransferNotFound(#[from] BridgeError),
    #[error("Oracle {signer:?} request failed: {reason}")]
    OracleRequest { signer: Address, reason: String },
}

impl AttestationError {
    pub fn error_type(&self) -> &'static str {
        match self {
            AttestationError::InsufficientAttestations { .. } => "insufficient_attestations",
            AttestationError::Cancelled => "cancelled",
            AttestationError::UnreachableThreshold { .. } => "unreachable_threshold",
            AttestationError::TransferNotFound(_) => "transfer_not_found",
            AttestationError::OracleRequest { .. } => "oracle_request",
        }
    }
}

/// One oracle's signature over a GUID hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleAttestation {
    pub signer: Address,
    pub signature: Signature,
}

#[async_trait]
pub trait OracleClient: Send + Sync {
    /// Returns `None` while the oracle has not attested `guid_hash` yet
    async fn get_attestation(
        &self,
        guid_hash: H256,
    ) -> Result<Option<OracleAttestation>, AttestationError>;
}
