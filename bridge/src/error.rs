// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::events::DecodeError;
use ethers::providers::ProviderError;
use ethers::types::H256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    // The referenced transaction does not exist (or is not yet mined)
    #[error("Transaction {0:?} not found")]
    TxNotFound(H256),
    // No teleport initialization event in the referenced transaction
    #[error("No teleport initialization event in transaction {0:?}")]
    NoTeleportEventInTx(H256),
    // A log could not be decoded into a ledger record
    #[error("Failed to decode log: {0}")]
    Decode(#[from] DecodeError),
    // Transient provider error, safe to retry
    #[error("Transient provider error: {0}")]
    TransientProviderError(String),
    // Provider error
    #[error("Provider error: {0}")]
    ProviderError(String),
    // Persistence error
    #[error("Storage error: {0}")]
    StorageError(String),
    // Uncategorized error
    #[error("{0}")]
    Generic(String),
}

impl BridgeError {
    /// Returns a short string identifying the error type for metrics labels
    pub fn error_type(&self) -> &'static str {
        match self {
            BridgeError::TxNotFound(_) => "tx_not_found",
            BridgeError::NoTeleportEventInTx(_) => "no_teleport_event",
            BridgeError::Decode(_) => "decode_error",
            BridgeError::TransientProviderError(_) => "transient_provider_error",
            BridgeError::ProviderError(_) => "provider_error",
            BridgeError::StorageError(_) => "storage_error",
            BridgeError::Generic(_) => "generic",
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BridgeError::TransientProviderError(_) | BridgeError::StorageError(_)
        )
    }
}

impl From<ProviderError> for BridgeError {
    fn from(e: ProviderError) -> Self {
        match e {
            // Transport level failures (timeouts, connection resets, 5xx) are worth retrying
            ProviderError::HTTPError(_) | ProviderError::JsonRpcClientError(_) => {
                BridgeError::TransientProviderError(e.to_string())
            }
            other => BridgeError::ProviderError(other.to_string()),
        }
    }
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_type_labels() {
        let cases = vec![
            (BridgeError::TxNotFound(H256::zero()), "tx_not_found"),
            (
                BridgeError::NoTeleportEventInTx(H256::zero()),
                "no_teleport_event",
            ),
            (
                BridgeError::Decode(DecodeError::UnknownTopic(H256::zero())),
                "decode_error",
            ),
            (
                BridgeError::TransientProviderError("reset".into()),
                "transient_provider_error",
            ),
            (BridgeError::ProviderError("bad".into()), "provider_error"),
            (BridgeError::StorageError("locked".into()), "storage_error"),
            (BridgeError::Generic("x".into()), "generic"),
        ];
        for (error, expected) in cases {
            assert_eq!(error.error_type(), expected, "label for {:?}", error);
        }
    }

    #[test]
    fn test_transient_classification() {
        assert!(BridgeError::TransientProviderError("timeout".into()).is_transient());
        assert!(BridgeError::StorageError("deadlock".into()).is_transient());
        assert!(!BridgeError::ProviderError("bad request".into()).is_transient());
        assert!(!BridgeError::TxNotFound(H256::zero()).is_transient());
    }
}
