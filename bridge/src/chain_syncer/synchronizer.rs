// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::{SyncError, SyncResult, SyncStatus, SyncStrategy, SynchronizerConfig};
use crate::chain_reader::ChainReader;
use crate::error::{BridgeError, BridgeResult};
use crate::metrics::BridgeMetrics;
use crate::retry_with_bounded_attempts;
use crate::storage::TransferStore;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Exclusive upper bound of the next batch.
///
/// The highest scannable block is `latest - save_distance`; when it is below
/// `checkpoint` the returned target equals `checkpoint`, meaning nothing new.
pub fn batch_target(checkpoint: u64, latest: u64, batch_size: u64, save_distance: u64) -> u64 {
    match latest.checked_sub(save_distance) {
        Some(safe_tip) => checkpoint
            .saturating_add(batch_size)
            .min(safe_tip.saturating_add(1))
            .max(checkpoint),
        None => checkpoint,
    }
}

pub struct DomainSynchronizer {
    config: SynchronizerConfig,
    chain: Arc<dyn ChainReader>,
    store: Arc<dyn TransferStore>,
    strategy: Arc<dyn SyncStrategy>,
    metrics: Arc<BridgeMetrics>,
    status: watch::Sender<SyncStatus>,
    cancel: CancellationToken,
}

impl DomainSynchronizer {
    pub fn new(
        config: SynchronizerConfig,
        chain: Arc<dyn ChainReader>,
        store: Arc<dyn TransferStore>,
        strategy: Arc<dyn SyncStrategy>,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::Stopped);
        Self {
            config,
            chain,
            store,
            strategy,
            metrics,
            status,
            cancel: CancellationToken::new(),
        }
    }

    /// Ties the synchronizer to a parent shutdown token
    pub fn with_cancel(mut self, parent: &CancellationToken) -> Self {
        self.cancel = parent.child_token();
        self
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Forces `stopped`. A running loop abandons any in-flight tip read or
    /// uncommitted batch and exits; the status never leaves `stopped` again.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.set_status(SyncStatus::Stopped);
    }

    /// Syncs until stopped. Returns the last persisted checkpoint.
    pub async fn run(&self) -> SyncResult<u64> {
        self.run_loop(false).await
    }

    /// Syncs until the tip is reached once, then returns with the status left
    /// at `synced`
    pub async fn sync_once(&self) -> SyncResult<u64> {
        self.run_loop(true).await
    }

    async fn run_loop(&self, until_tip: bool) -> SyncResult<u64> {
        let label = self.config.label();
        let mut checkpoint = match self.load_checkpoint().await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                self.set_status(SyncStatus::Stopped);
                return Err(e);
            }
        };
        info!("[{}] Starting synchronizer from block {}", label, checkpoint);
        self.report_checkpoint(checkpoint);
        self.set_status(SyncStatus::Syncing);

        loop {
            if self.cancel.is_cancelled() {
                info!("[{}] Synchronizer stopped at block {}", label, checkpoint);
                break;
            }

            let latest = tokio::select! {
                _ = self.cancel.cancelled() => continue,
                latest = async {
                    retry_with_bounded_attempts!(
                        self.chain.get_latest_block_number(),
                        self.config.max_attempts,
                        self.config.retry_delay
                    )
                } => latest,
            };
            let latest = match latest {
                Ok(latest) => latest,
                Err(e) => {
                    error!("[{}] Failed to read chain tip: {:?}", label, e);
                    self.record_error(e.error_type());
                    self.set_status(SyncStatus::Stopped);
                    return Err(SyncError::Chain(e));
                }
            };

            let target = batch_target(
                checkpoint,
                latest,
                self.config.batch_size,
                self.config.save_distance_from_tip,
            );
            if target <= checkpoint {
                self.set_status(SyncStatus::Synced);
                if until_tip {
                    // stays synced so callers can reconcile against the result
                    info!("[{}] Reached tip at block {}", label, checkpoint);
                    return Ok(checkpoint);
                }
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(self.config.tip_sync_delay) => {}
                }
                continue;
            }

            self.set_status(SyncStatus::Syncing);
            let start_time = Instant::now();
            // dropping an uncommitted batch discards its writes
            let result = tokio::select! {
                _ = self.cancel.cancelled() => continue,
                result = async {
                    retry_with_bounded_attempts!(
                        self.sync_batch(checkpoint, target),
                        self.config.max_attempts,
                        self.config.retry_delay
                    )
                } => result,
            };
            match result {
                Ok(inserted) => {
                    debug!(
                        "[{}] Synced [{}, {}) with {} new records in {:?} (tip {})",
                        label,
                        checkpoint,
                        target,
                        inserted,
                        start_time.elapsed(),
                        latest
                    );
                    checkpoint = target;
                    self.report_checkpoint(checkpoint);
                    self.metrics
                        .sync_batches
                        .with_label_values(&[&self.config.domain, &self.config.name])
                        .inc();
                    self.metrics
                        .records_ingested
                        .with_label_values(&[&self.config.domain, self.strategy.name()])
                        .inc_by(inserted as u64);
                }
                Err(e) => {
                    error!(
                        "[{}] Giving up on batch [{}, {}) after {} attempts: {:?}",
                        label, checkpoint, target, self.config.max_attempts, e
                    );
                    self.set_status(SyncStatus::Stopped);
                    return Err(SyncError::RetriesExhausted {
                        from: checkpoint,
                        to: target,
                        attempts: self.config.max_attempts,
                        source: e,
                    });
                }
            }
        }

        self.set_status(SyncStatus::Stopped);
        Ok(checkpoint)
    }

    async fn load_checkpoint(&self) -> SyncResult<u64> {
        let stored = retry_with_bounded_attempts!(
            self.store
                .find_checkpoint(&self.config.domain, &self.config.name),
            self.config.max_attempts,
            self.config.retry_delay
        )?;
        Ok(stored.unwrap_or(self.config.start_block))
    }

    // One retry unit: the records of [from, to) and the checkpoint advance commit together
    async fn sync_batch(&self, from: u64, to: u64) -> BridgeResult<usize> {
        let result = async {
            let mut tx = self.store.begin().await?;
            let inserted = self.strategy.sync(tx.as_mut(), from, to).await?;
            tx.upsert_checkpoint(&self.config.domain, &self.config.name, to)
                .await?;
            tx.commit().await?;
            Ok::<_, BridgeError>(inserted)
        }
        .await;
        if let Err(e) = &result {
            warn!(
                "[{}] Batch [{}, {}) failed: {:?}",
                self.config.label(),
                from,
                to,
                e
            );
            self.record_error(e.error_type());
        }
        result
    }

    fn record_error(&self, error_type: &str) {
        self.metrics
            .sync_errors
            .with_label_values(&[&self.config.domain, &self.config.name, error_type])
            .inc();
    }

    fn report_checkpoint(&self, checkpoint: u64) {
        self.metrics
            .last_synced_block
            .with_label_values(&[&self.config.domain, &self.config.name])
            .set(checkpoint as i64);
    }

    fn set_status(&self, status: SyncStatus) {
        if status != SyncStatus::Stopped && self.cancel.is_cancelled() {
            return;
        }
        let changed = self.status.send_if_modified(|current| {
            if *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            debug!("[{}] Status -> {}", self.config.label(), status);
            self.metrics
                .synchronizer_status
                .with_label_values(&[&self.config.domain, &self.config.name])
                .set(status.as_metric());
        }
    }
}
