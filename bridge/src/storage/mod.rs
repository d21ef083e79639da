// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Persistence interface for synchronized ledger records and checkpoints.
//!
//! Records and checkpoint advances are written through a [`StoreTransaction`]
//! so that a batch of records and the checkpoint that accounts for them
//! become visible together or not at all.
//!
//! [`InMemoryTransferStore`] is the only engine shipped. It keeps nothing
//! across restarts, which re-ingests from each synchronizer's start block;
//! duplicate records are absorbed by the unique keys.

mod memory;

pub use memory::InMemoryTransferStore;

use crate::error::BridgeResult;
use crate::events::{DecodedEvent, EventKind};
use crate::types::{FlushRecord, MintObservation, SettleRecord, TransferRecord};
use async_trait::async_trait;
use ethers::types::H256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerRecord {
    Transfer(TransferRecord),
    Flush(FlushRecord),
    Settle(SettleRecord),
    Mint(MintObservation),
}

/// Unique key of a persisted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKey {
    /// Transfers are unique by GUID hash
    Transfer(H256),
    /// Everything else is unique by the log that produced it
    Log {
        kind: EventKind,
        tx_hash: H256,
        log_index: u64,
    },
}

impl LedgerRecord {
    pub fn kind(&self) -> EventKind {
        match self {
            LedgerRecord::Transfer(_) => EventKind::Init,
            LedgerRecord::Flush(_) => EventKind::Flush,
            LedgerRecord::Settle(_) => EventKind::Settle,
            LedgerRecord::Mint(_) => EventKind::Mint,
        }
    }

    pub fn key(&self) -> RecordKey {
        let position = match self {
            LedgerRecord::Transfer(record) => return RecordKey::Transfer(record.hash),
            LedgerRecord::Flush(record) => &record.position,
            LedgerRecord::Settle(record) => &record.position,
            LedgerRecord::Mint(record) => &record.position,
        };
        RecordKey::Log {
            kind: self.kind(),
            tx_hash: position.tx_hash,
            log_index: position.log_index,
        }
    }
}

impl From<DecodedEvent> for LedgerRecord {
    fn from(event: DecodedEvent) -> Self {
        match event {
            DecodedEvent::Init(record) => LedgerRecord::Transfer(record),
            DecodedEvent::Flush(record) => LedgerRecord::Flush(record),
            DecodedEvent::Settle(record) => LedgerRecord::Settle(record),
            DecodedEvent::Mint(record) => LedgerRecord::Mint(record),
        }
    }
}

#[async_trait]
pub trait TransferStore: Send + Sync {
    async fn find_by_hash(&self, hash: H256) -> BridgeResult<Option<TransferRecord>>;

    /// Exclusive upper bound already processed by `(domain, name)`
    async fn find_checkpoint(&self, domain: &str, name: &str) -> BridgeResult<Option<u64>>;

    async fn begin(&self) -> BridgeResult<Box<dyn StoreTransaction>>;
}

/// A unit of atomic writes. Dropping it without `commit` discards every write.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Stages records, skipping any whose key already exists.
    /// Returns the number of records that are new.
    async fn create_many(&mut self, records: Vec<LedgerRecord>) -> BridgeResult<usize>;

    /// Stages a checkpoint advance; a lower block than the stored one is ignored
    async fn upsert_checkpoint(&mut self, domain: &str, name: &str, block: u64)
        -> BridgeResult<()>;

    async fn commit(self: Box<Self>) -> BridgeResult<()>;
}
