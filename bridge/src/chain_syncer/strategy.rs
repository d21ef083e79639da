// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::chain_reader::ChainReader;
use crate::error::BridgeResult;
use crate::events::{EventDecoderRegistry, EventKind};
use crate::metrics::BridgeMetrics;
use crate::storage::{LedgerRecord, StoreTransaction};
use async_trait::async_trait;
use ethers::types::Address;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fetches and stages the records of one batch.
///
/// Implementations must be idempotent: the same range may be handed over
/// again after a failed or interrupted batch.
#[async_trait]
pub trait SyncStrategy: Send + Sync {
    fn name(&self) -> &str;

    /// Stages the records found in `[from, to)` into `tx` and returns how many are new
    async fn sync(&self, tx: &mut dyn StoreTransaction, from: u64, to: u64)
        -> BridgeResult<usize>;
}

/// Syncs the logs of one event kind emitted by one contract
pub struct LogSyncStrategy {
    domain: String,
    kind: EventKind,
    chain: Arc<dyn ChainReader>,
    contract: Address,
    registry: EventDecoderRegistry,
    metrics: Arc<BridgeMetrics>,
}

impl LogSyncStrategy {
    pub fn new(
        domain: &str,
        kind: EventKind,
        chain: Arc<dyn ChainReader>,
        contract: Address,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            domain: domain.to_string(),
            kind,
            chain,
            contract,
            registry: EventDecoderRegistry::new(),
            metrics,
        }
    }
}

#[async_trait]
impl SyncStrategy for LogSyncStrategy {
    fn name(&self) -> &str {
        self.kind.as_str()
    }

    async fn sync(
        &self,
        tx: &mut dyn StoreTransaction,
        from: u64,
        to: u64,
    ) -> BridgeResult<usize> {
        if to <= from {
            return Ok(0);
        }
        let logs = self
            .chain
            .get_logs(self.contract, &[self.kind.topic()], from, to - 1)
            .await?;

        let mut records = Vec::with_capacity(logs.len());
        for log in &logs {
            match self.registry.decode(log) {
                Ok(event) if event.kind() == self.kind => records.push(LedgerRecord::from(event)),
                Ok(event) => {
                    debug!(
                        "[{}/{}] Ignoring {} log in tx {:?}",
                        self.domain,
                        self.kind,
                        event.kind(),
                        log.transaction_hash
                    );
                }
                // A malformed log can never decode, retrying the batch would not help
                Err(e) => {
                    warn!(
                        "[{}/{}] Skipping undecodable log {:?}#{}: {}",
                        self.domain, self.kind, log.transaction_hash, log.log_index, e
                    );
                    self.metrics
                        .sync_errors
                        .with_label_values(&[&self.domain, self.kind.as_str(), "decode_error"])
                        .inc();
                }
            }
        }
        tx.create_many(records).await
    }
}
