// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Decoders for the four teleport event kinds.
//!
//! Each kind is keyed by its topic0 and mapped by a pure function from a
//! [`RawLog`] to a typed record. [`EventDecoderRegistry`] dispatches on topic.

use crate::types::{
    bytes32_to_address, EventPosition, FlushRecord, MintObservation, SettleRecord, TeleportGuid,
    TransferRecord, GUID_ENCODED_LEN,
};
use ethers::types::{Address, Bytes, Log, H256, U256};
use ethers::utils::keccak256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

const GUID_TUPLE: &str = "(bytes32,bytes32,bytes32,bytes32,uint128,uint80,uint48)";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("No decoder registered for topic {0:?}")]
    UnknownTopic(H256),
    #[error("Log has no topics")]
    MissingTopic0,
    #[error("{kind} log is missing indexed topic {index}")]
    MissingIndexedTopic { kind: EventKind, index: usize },
    #[error("Log is missing {0}")]
    MissingMetadata(&'static str),
    #[error("Invalid log data: {0}")]
    InvalidData(String),
    #[error("Invalid value for field {0}")]
    InvalidField(&'static str),
    #[error("Field {0} exceeds its on-chain width")]
    FieldOverflow(&'static str),
    #[error("Indexed GUID hash {indexed:?} does not match computed {computed:?}")]
    GuidHashMismatch { indexed: H256, computed: H256 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Init,
    Flush,
    Settle,
    Mint,
}

impl EventKind {
    pub const ALL: [EventKind; 4] = [
        EventKind::Init,
        EventKind::Flush,
        EventKind::Settle,
        EventKind::Mint,
    ];

    pub fn signature(&self) -> String {
        match self {
            EventKind::Init => format!("TeleportInitialized({})", GUID_TUPLE),
            EventKind::Flush => "Flushed(bytes32,uint256)".to_string(),
            EventKind::Settle => "Settle(bytes32,uint256)".to_string(),
            EventKind::Mint => format!(
                "Mint(bytes32,{},uint256,uint256,uint256,address)",
                GUID_TUPLE
            ),
        }
    }

    pub fn topic(&self) -> H256 {
        H256::from(keccak256(self.signature().as_bytes()))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Init => "init",
            EventKind::Flush => "flush",
            EventKind::Settle => "settle",
            EventKind::Mint => "mint",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chain-agnostic view of a log as returned by `eth_getLogs`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<H256>,
    pub data: Bytes,
    pub block_number: u64,
    pub transaction_hash: H256,
    pub log_index: u64,
}

impl RawLog {
    pub fn position(&self) -> EventPosition {
        EventPosition {
            tx_hash: self.transaction_hash,
            block_number: self.block_number,
            log_index: self.log_index,
        }
    }

    fn indexed(&self, kind: EventKind, index: usize) -> Result<H256, DecodeError> {
        self.topics
            .get(index)
            .copied()
            .ok_or(DecodeError::MissingIndexedTopic { kind, index })
    }

    fn word(&self, index: usize) -> Result<&[u8], DecodeError> {
        let start = index * 32;
        self.data.get(start..start + 32).ok_or_else(|| {
            DecodeError::InvalidData(format!(
                "expected at least {} bytes, got {}",
                start + 32,
                self.data.len()
            ))
        })
    }
}

impl TryFrom<Log> for RawLog {
    type Error = DecodeError;

    fn try_from(log: Log) -> Result<Self, Self::Error> {
        Ok(Self {
            address: log.address,
            topics: log.topics,
            data: log.data,
            block_number: log
                .block_number
                .ok_or(DecodeError::MissingMetadata("block_number"))?
                .as_u64(),
            transaction_hash: log
                .transaction_hash
                .ok_or(DecodeError::MissingMetadata("transaction_hash"))?,
            log_index: log
                .log_index
                .ok_or(DecodeError::MissingMetadata("log_index"))?
                .as_u64(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    Init(TransferRecord),
    Flush(FlushRecord),
    Settle(SettleRecord),
    Mint(MintObservation),
}

impl DecodedEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            DecodedEvent::Init(_) => EventKind::Init,
            DecodedEvent::Flush(_) => EventKind::Flush,
            DecodedEvent::Settle(_) => EventKind::Settle,
            DecodedEvent::Mint(_) => EventKind::Mint,
        }
    }
}

pub type DecodeFn = fn(&RawLog) -> Result<DecodedEvent, DecodeError>;

// TeleportInitialized(TeleportGUID teleport): the static tuple is inlined as 7 words
pub fn decode_init(log: &RawLog) -> Result<DecodedEvent, DecodeError> {
    let guid = TeleportGuid::decode(&log.data)?;
    Ok(DecodedEvent::Init(TransferRecord::new(guid, log.position())))
}

// Flushed(bytes32 indexed targetDomain, uint256 dai)
pub fn decode_flush(log: &RawLog) -> Result<DecodedEvent, DecodeError> {
    let target_domain = log.indexed(EventKind::Flush, 1)?;
    let amount = U256::from_big_endian(log.word(0)?);
    Ok(DecodedEvent::Flush(FlushRecord {
        target_domain,
        amount,
        position: log.position(),
    }))
}

// Settle(bytes32 indexed sourceDomain, uint256 batchedDaiToFlush)
pub fn decode_settle(log: &RawLog) -> Result<DecodedEvent, DecodeError> {
    let source_domain = log.indexed(EventKind::Settle, 1)?;
    let amount = U256::from_big_endian(log.word(0)?);
    Ok(DecodedEvent::Settle(SettleRecord {
        source_domain,
        amount,
        position: log.position(),
    }))
}

// Mint(bytes32 indexed hashGUID, TeleportGUID teleportGUID, uint256 amount,
//      uint256 maxFeePercentage, uint256 operatorFee, address originator)
pub fn decode_mint(log: &RawLog) -> Result<DecodedEvent, DecodeError> {
    let indexed = log.indexed(EventKind::Mint, 1)?;
    let guid = TeleportGuid::decode(&log.data)?;
    let computed = guid.hash();
    if computed != indexed {
        return Err(DecodeError::GuidHashMismatch { indexed, computed });
    }
    let tail = GUID_ENCODED_LEN / 32;
    let amount = U256::from_big_endian(log.word(tail)?);
    let max_fee_percentage = U256::from_big_endian(log.word(tail + 1)?);
    let operator_fee = U256::from_big_endian(log.word(tail + 2)?);
    let originator_word = H256::from_slice(log.word(tail + 3)?);
    if originator_word.as_bytes()[..12].iter().any(|b| *b != 0) {
        return Err(DecodeError::InvalidField("originator"));
    }
    Ok(DecodedEvent::Mint(MintObservation {
        hash: indexed,
        guid,
        amount,
        max_fee_percentage,
        operator_fee,
        originator: bytes32_to_address(&originator_word),
        position: log.position(),
    }))
}

/// Topic-keyed table of decoders
#[derive(Clone)]
pub struct EventDecoderRegistry {
    decoders: HashMap<H256, (EventKind, DecodeFn)>,
}

impl EventDecoderRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            decoders: HashMap::new(),
        };
        registry.register(EventKind::Init, decode_init);
        registry.register(EventKind::Flush, decode_flush);
        registry.register(EventKind::Settle, decode_settle);
        registry.register(EventKind::Mint, decode_mint);
        registry
    }

    pub fn register(&mut self, kind: EventKind, decoder: DecodeFn) {
        self.decoders.insert(kind.topic(), (kind, decoder));
    }

    pub fn kind_of(&self, log: &RawLog) -> Option<EventKind> {
        log.topics
            .first()
            .and_then(|t| self.decoders.get(t))
            .map(|(kind, _)| *kind)
    }

    pub fn decode(&self, log: &RawLog) -> Result<DecodedEvent, DecodeError> {
        let topic0 = log.topics.first().ok_or(DecodeError::MissingTopic0)?;
        let (_, decoder) = self
            .decoders
            .get(topic0)
            .ok_or(DecodeError::UnknownTopic(*topic0))?;
        decoder(log)
    }
}

impl Default for EventDecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
