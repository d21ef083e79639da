// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Oracle signature sets.
//!
//! A blob is the concatenation of 65-byte `r || s || v` signatures over the
//! eth-signed-message digest of a GUID hash, one per oracle, ordered by
//! strictly ascending signer address.

use ethers::signers::{LocalWallet, WalletError};
use ethers::types::{Address, Signature, H256};
use ethers::utils::hash_message;
use std::collections::BTreeMap;

pub const SIGNATURE_LENGTH: usize = 65;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Not enough signatures: {count} valid, threshold {threshold}")]
    NotEnoughSignatures { count: usize, threshold: usize },
    #[error("Signature {index} is out of order")]
    SignaturesOutOfOrder { index: usize },
    #[error("Signature {index} is invalid")]
    InvalidSignature { index: usize },
    #[error("Signature blob length {0} is not a multiple of {SIGNATURE_LENGTH}")]
    MalformedSignatureBlob(usize),
}

impl SignatureError {
    pub fn error_type(&self) -> &'static str {
        match self {
            SignatureError::NotEnoughSignatures { .. } => "not_enough_signatures",
            SignatureError::SignaturesOutOfOrder { .. } => "signatures_out_of_order",
            SignatureError::InvalidSignature { .. } => "invalid_signature",
            SignatureError::MalformedSignatureBlob(_) => "malformed_signature_blob",
        }
    }
}

/// Digest oracles sign for a transfer: `keccak256("\x19Ethereum Signed Message:\n32" || guid_hash)`
pub fn attestation_digest(guid_hash: H256) -> H256 {
    hash_message(guid_hash)
}

pub fn sign_attestation(wallet: &LocalWallet, guid_hash: H256) -> Result<Signature, WalletError> {
    wallet.sign_hash(attestation_digest(guid_hash))
}

/// Recovery id byte `ecrecover` accepts on chain
pub fn is_canonical_v(v: u64) -> bool {
    v == 27 || v == 28
}

/// Recovers the signer of `guid_hash`. Signatures whose `v` is not 27 or 28
/// are rejected even where the recovery itself would succeed.
pub fn recover_signer(guid_hash: H256, signature: &Signature) -> Option<Address> {
    if !is_canonical_v(signature.v) {
        return None;
    }
    signature.recover(attestation_digest(guid_hash)).ok()
}

/// Concatenates signatures in ascending signer order
pub fn encode_signature_blob(signatures: &BTreeMap<Address, Signature>) -> Vec<u8> {
    signatures.values().flat_map(|s| s.to_vec()).collect()
}

/// Validates a signature blob for `guid_hash`.
///
/// Every signature must recover to a permitted signer, and signers must be
/// strictly increasing. Returns the recovered signers once at least
/// `threshold` of them are present.
pub fn validate_signatures<F>(
    guid_hash: H256,
    blob: &[u8],
    threshold: usize,
    is_permitted: F,
) -> Result<Vec<Address>, SignatureError>
where
    F: Fn(&Address) -> bool,
{
    if blob.len() % SIGNATURE_LENGTH != 0 {
        return Err(SignatureError::MalformedSignatureBlob(blob.len()));
    }

    let mut signers: Vec<Address> = Vec::with_capacity(blob.len() / SIGNATURE_LENGTH);
    for (index, chunk) in blob.chunks_exact(SIGNATURE_LENGTH).enumerate() {
        if !is_canonical_v(chunk[SIGNATURE_LENGTH - 1] as u64) {
            return Err(SignatureError::InvalidSignature { index });
        }
        let signer = Signature::try_from(chunk)
            .ok()
            .and_then(|signature| recover_signer(guid_hash, &signature))
            .filter(|signer| is_permitted(signer))
            .ok_or(SignatureError::InvalidSignature { index })?;
        if let Some(last) = signers.last() {
            if signer <= *last {
                return Err(SignatureError::SignaturesOutOfOrder { index });
            }
        }
        signers.push(signer);
    }

    if signers.len() < threshold {
        return Err(SignatureError::NotEnoughSignatures {
            count: signers.len(),
            threshold,
        });
    }
    Ok(signers)
}
