// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::{LedgerRecord, RecordKey, StoreTransaction, TransferStore};
use crate::error::BridgeResult;
use crate::events::EventKind;
use crate::types::TransferRecord;
use async_trait::async_trait;
use ethers::types::H256;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct LedgerState {
    transfers: HashMap<H256, TransferRecord>,
    records: HashMap<RecordKey, LedgerRecord>,
    checkpoints: HashMap<(String, String), u64>,
}

impl LedgerState {
    fn contains(&self, key: &RecordKey) -> bool {
        match key {
            RecordKey::Transfer(hash) => self.transfers.contains_key(hash),
            other => self.records.contains_key(other),
        }
    }

    fn insert(&mut self, record: LedgerRecord) -> bool {
        let key = record.key();
        if self.contains(&key) {
            return false;
        }
        match record {
            LedgerRecord::Transfer(transfer) => {
                self.transfers.insert(transfer.hash, transfer);
            }
            other => {
                self.records.insert(key, other);
            }
        }
        true
    }
}

/// Ledger store kept in process memory. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransferStore {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryTransferStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_count(&self, kind: EventKind) -> usize {
        let state = self.state.read().await;
        match kind {
            EventKind::Init => state.transfers.len(),
            kind => state.records.values().filter(|r| r.kind() == kind).count(),
        }
    }
}

#[async_trait]
impl TransferStore for InMemoryTransferStore {
    async fn find_by_hash(&self, hash: H256) -> BridgeResult<Option<TransferRecord>> {
        Ok(self.state.read().await.transfers.get(&hash).cloned())
    }

    async fn find_checkpoint(&self, domain: &str, name: &str) -> BridgeResult<Option<u64>> {
        Ok(self
            .state
            .read()
            .await
            .checkpoints
            .get(&(domain.to_string(), name.to_string()))
            .copied())
    }

    async fn begin(&self) -> BridgeResult<Box<dyn StoreTransaction>> {
        Ok(Box::new(InMemoryTransaction {
            state: self.state.clone(),
            staged: vec![],
            staged_keys: HashSet::new(),
            checkpoints: HashMap::new(),
        }))
    }
}

struct InMemoryTransaction {
    state: Arc<RwLock<LedgerState>>,
    staged: Vec<LedgerRecord>,
    staged_keys: HashSet<RecordKey>,
    checkpoints: HashMap<(String, String), u64>,
}

#[async_trait]
impl StoreTransaction for InMemoryTransaction {
    async fn create_many(&mut self, records: Vec<LedgerRecord>) -> BridgeResult<usize> {
        let state = self.state.read().await;
        let mut inserted = 0;
        for record in records {
            let key = record.key();
            if state.contains(&key) || !self.staged_keys.insert(key) {
                continue;
            }
            self.staged.push(record);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn upsert_checkpoint(
        &mut self,
        domain: &str,
        name: &str,
        block: u64,
    ) -> BridgeResult<()> {
        let entry = self
            .checkpoints
            .entry((domain.to_string(), name.to_string()))
            .or_insert(block);
        *entry = (*entry).max(block);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> BridgeResult<()> {
        let this = *self;
        let mut state = this.state.write().await;
        // A concurrent transaction may have committed the same keys since staging
        let applied = this
            .staged
            .into_iter()
            .filter(|record| state.insert(record.clone()))
            .count();
        for (key, block) in this.checkpoints {
            let current = state.checkpoints.entry(key).or_insert(block);
            *current = (*current).max(block);
        }
        debug!("Committed {} ledger records", applied);
        Ok(())
    }
}
