// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Core teleport value types.
//!
//! A [`TeleportGuid`] identifies one cross-domain transfer. Its identity hash is
//! `keccak256` over the seven fields, each encoded as a 32-byte big-endian word
//! in declared order (224 bytes). This matches the on-chain `getGUIDHash`.

use crate::events::DecodeError;
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of 32-byte words in an encoded GUID
pub const GUID_WORDS: usize = 7;
/// Length of the encoded GUID in bytes
pub const GUID_ENCODED_LEN: usize = GUID_WORDS * 32;

const NONCE_BITS: usize = 80;
const TIMESTAMP_BITS: usize = 48;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeleportGuid {
    pub source_domain: H256,
    pub target_domain: H256,
    pub receiver: H256,
    pub operator: H256,
    pub amount: u128,
    /// uint80 on chain
    pub nonce: u128,
    /// uint48 on chain
    pub timestamp: u64,
}

impl TeleportGuid {
    pub fn param_types() -> Vec<ParamType> {
        vec![
            ParamType::FixedBytes(32),
            ParamType::FixedBytes(32),
            ParamType::FixedBytes(32),
            ParamType::FixedBytes(32),
            ParamType::Uint(128),
            ParamType::Uint(NONCE_BITS),
            ParamType::Uint(TIMESTAMP_BITS),
        ]
    }

    pub fn to_tokens(&self) -> Vec<Token> {
        vec![
            Token::FixedBytes(self.source_domain.as_bytes().to_vec()),
            Token::FixedBytes(self.target_domain.as_bytes().to_vec()),
            Token::FixedBytes(self.receiver.as_bytes().to_vec()),
            Token::FixedBytes(self.operator.as_bytes().to_vec()),
            Token::Uint(U256::from(self.amount)),
            Token::Uint(U256::from(self.nonce)),
            Token::Uint(U256::from(self.timestamp)),
        ]
    }

    /// The GUID as a single tuple token, for embedding in call data
    pub fn to_tuple_token(&self) -> Token {
        Token::Tuple(self.to_tokens())
    }

    /// 224-byte word encoding
    pub fn encode(&self) -> Vec<u8> {
        abi::encode(&self.to_tokens())
    }

    pub fn hash(&self) -> H256 {
        H256::from(keccak256(self.encode()))
    }

    pub fn decode(words: &[u8]) -> Result<Self, DecodeError> {
        if words.len() < GUID_ENCODED_LEN {
            return Err(DecodeError::InvalidData(format!(
                "GUID needs {} bytes, got {}",
                GUID_ENCODED_LEN,
                words.len()
            )));
        }
        let tokens = abi::decode(&Self::param_types(), &words[..GUID_ENCODED_LEN])
            .map_err(|e| DecodeError::InvalidData(e.to_string()))?;
        Self::from_tokens(tokens)
    }

    pub fn from_tokens(tokens: Vec<Token>) -> Result<Self, DecodeError> {
        let mut it = tokens.into_iter();
        let mut next_bytes32 = |field: &'static str| -> Result<H256, DecodeError> {
            match it.next() {
                Some(Token::FixedBytes(b)) if b.len() == 32 => Ok(H256::from_slice(&b)),
                _ => Err(DecodeError::InvalidField(field)),
            }
        };
        let source_domain = next_bytes32("sourceDomain")?;
        let target_domain = next_bytes32("targetDomain")?;
        let receiver = next_bytes32("receiver")?;
        let operator = next_bytes32("operator")?;

        let mut next_uint = |field: &'static str, bits: usize| -> Result<U256, DecodeError> {
            match it.next() {
                Some(Token::Uint(v)) if v.bits() <= bits => Ok(v),
                Some(Token::Uint(_)) => Err(DecodeError::FieldOverflow(field)),
                _ => Err(DecodeError::InvalidField(field)),
            }
        };
        let amount = next_uint("amount", 128)?.as_u128();
        let nonce = next_uint("nonce", NONCE_BITS)?.as_u128();
        let timestamp = next_uint("timestamp", TIMESTAMP_BITS)?.as_u64();

        Ok(Self {
            source_domain,
            target_domain,
            receiver,
            operator,
            amount,
            nonce,
            timestamp,
        })
    }
}

/// Domain names are bytes32 strings, right-padded with zeros
pub fn domain_to_bytes32(name: &str) -> Result<H256, String> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > 32 {
        return Err(format!(
            "domain name must be 1..=32 bytes, got {} ({:?})",
            bytes.len(),
            name
        ));
    }
    let mut word = [0u8; 32];
    word[..bytes.len()].copy_from_slice(bytes);
    Ok(H256::from(word))
}

pub fn bytes32_to_domain(word: &H256) -> String {
    let bytes = word.as_bytes();
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Addresses are left-padded into a bytes32 word
pub fn address_to_bytes32(address: Address) -> H256 {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(address.as_bytes());
    H256::from(word)
}

pub fn bytes32_to_address(word: &H256) -> Address {
    Address::from_slice(&word.as_bytes()[12..])
}

/// Where a log was emitted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPosition {
    pub tx_hash: H256,
    pub block_number: u64,
    pub log_index: u64,
}

/// Persisted projection of a `TeleportInitialized` event. Created once, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub hash: H256,
    pub guid: TeleportGuid,
    pub position: EventPosition,
}

impl TransferRecord {
    pub fn new(guid: TeleportGuid, position: EventPosition) -> Self {
        Self {
            hash: guid.hash(),
            guid,
            position,
        }
    }
}

/// `Flushed(targetDomain, dai)` on the source domain's gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlushRecord {
    pub target_domain: H256,
    pub amount: U256,
    pub position: EventPosition,
}

/// `Settle(sourceDomain, batchedDaiToFlush)` on the target domain's join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRecord {
    pub source_domain: H256,
    pub amount: U256,
    pub position: EventPosition,
}

/// `Mint(hashGUID, guid, amount, maxFeePercentage, operatorFee, originator)` on the join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintObservation {
    pub hash: H256,
    pub guid: TeleportGuid,
    pub amount: U256,
    pub max_fee_percentage: U256,
    pub operator_fee: U256,
    pub originator: Address,
    pub position: EventPosition,
}

/// Snapshot of one side of the bridge invariant, taken at a finalized block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeBalanceSample {
    pub domain: String,
    pub locked_collateral: U256,
    pub minted_supply: U256,
    pub block_number: u64,
}

impl BridgeBalanceSample {
    /// `Some(minted - locked)` when the pair is undercollateralized
    pub fn deficit(&self) -> Option<U256> {
        if self.locked_collateral < self.minted_supply {
            Some(self.minted_supply - self.locked_collateral)
        } else {
            None
        }
    }
}

impl fmt::Display for TeleportGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{} nonce={} amount={}",
            bytes32_to_domain(&self.source_domain),
            bytes32_to_domain(&self.target_domain),
            self.nonce,
            self.amount
        )
    }
}
