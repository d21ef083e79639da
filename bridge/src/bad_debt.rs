// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bad debt reconciliation.
//!
//! Mints authorized through the oracle fast path are matched against the
//! transfer records ingested from the source domain. A mint whose GUID hash
//! has no record is unbacked, and its amount is added to the target domain's
//! bad debt. Slow-path mints are backed by the elapsed delay and are ignored.
//!
//! Reconciliation only runs once the source Init synchronizer reports
//! `synced`. Against a partially synced store every not-yet-ingested transfer
//! would look unbacked.
//!
//! `synced` alone is a snapshot: Inits emitted after the synchronizer's last
//! tip read are not in the store yet. A mint with no record is therefore held
//! as pending, tagged with the source tip at the time it was seen. It is only
//! counted once the source Init checkpoint has moved past that tip and a
//! second lookup still finds no record.

use crate::chain_reader::ChainReader;
use crate::chain_syncer::SyncStatus;
use crate::error::BridgeError;
use crate::events::{decode_mint, DecodedEvent, EventKind};
use crate::metrics::{amount_as_gauge, BridgeMetrics};
use crate::monitor::{Alert, AlertSink};
use crate::storage::TransferStore;
use crate::types::{domain_to_bytes32, MintObservation};
use ethers::types::{Address, H256, U256};
use futures::FutureExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("Source domain {domain} is not synced (status {status})")]
    SourceNotSynced { domain: String, status: SyncStatus },
    #[error("Chain error: {0}")]
    Chain(BridgeError),
    #[error("Storage error: {0}")]
    Storage(BridgeError),
    #[error("Reconciliation cancelled")]
    Cancelled,
}

impl ReconcileError {
    pub fn error_type(&self) -> &'static str {
        match self {
            ReconcileError::SourceNotSynced { .. } => "source_not_synced",
            ReconcileError::Chain(e) | ReconcileError::Storage(e) => e.error_type(),
            ReconcileError::Cancelled => "cancelled",
        }
    }
}

/// Running bad debt per domain. Totals only grow, and a mint is counted at
/// most once however many reconciliation ranges cover it.
#[derive(Debug, Default)]
pub struct BadDebtAccumulator {
    totals: HashMap<String, U256>,
    counted: HashSet<(H256, u64)>,
}

impl BadDebtAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if this mint was already counted
    pub fn add(&mut self, domain: &str, mint: &MintObservation) -> bool {
        if !self
            .counted
            .insert((mint.position.tx_hash, mint.position.log_index))
        {
            return false;
        }
        let total = self.totals.entry(domain.to_string()).or_default();
        *total = total.saturating_add(mint.amount);
        true
    }

    pub fn total(&self, domain: &str) -> U256 {
        self.totals.get(domain).copied().unwrap_or_default()
    }

    pub fn contains(&self, mint: &MintObservation) -> bool {
        self.counted
            .contains(&(mint.position.tx_hash, mint.position.log_index))
    }
}

// A mint without a record, waiting for the source checkpoint to reach `covered_by`
#[derive(Debug, Clone)]
struct PendingMint {
    mint: MintObservation,
    covered_by: u64,
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub source_domain: String,
    pub target_domain: String,
    /// Emitter of `Mint` on the target domain
    pub join: Address,
    /// Originator of every fast-path mint
    pub oracle_auth: Address,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub from: u64,
    pub to: u64,
    pub oracle_mints: usize,
    pub unbacked: Vec<MintObservation>,
    pub bad_debt: U256,
}

pub struct BadDebtReconciler {
    config: ReconcilerConfig,
    source_domain_id: H256,
    source_chain: Arc<dyn ChainReader>,
    target_chain: Arc<dyn ChainReader>,
    store: Arc<dyn TransferStore>,
    source_status: watch::Receiver<SyncStatus>,
    alerts: Arc<dyn AlertSink>,
    metrics: Arc<BridgeMetrics>,
    accumulator: BadDebtAccumulator,
    pending: BTreeMap<(H256, u64), PendingMint>,
}

impl BadDebtReconciler {
    pub fn new(
        config: ReconcilerConfig,
        source_chain: Arc<dyn ChainReader>,
        target_chain: Arc<dyn ChainReader>,
        store: Arc<dyn TransferStore>,
        source_status: watch::Receiver<SyncStatus>,
        alerts: Arc<dyn AlertSink>,
        metrics: Arc<BridgeMetrics>,
    ) -> anyhow::Result<Self> {
        let source_domain_id =
            domain_to_bytes32(&config.source_domain).map_err(|e| anyhow::anyhow!(e))?;
        Ok(Self {
            config,
            source_domain_id,
            source_chain,
            target_chain,
            store,
            source_status,
            alerts,
            metrics,
            accumulator: BadDebtAccumulator::new(),
            pending: BTreeMap::new(),
        })
    }

    fn label(&self) -> String {
        format!("{}->{}", self.config.source_domain, self.config.target_domain)
    }

    pub fn bad_debt(&self) -> U256 {
        self.accumulator.total(&self.config.target_domain)
    }

    /// Unmatched mints not yet counted because the source may still ingest their Init
    pub fn pending(&self) -> Vec<MintObservation> {
        self.pending.values().map(|p| p.mint.clone()).collect()
    }

    /// Reconciles target blocks `[from, to)`. Refuses unless the source is synced.
    pub async fn reconcile(&mut self, from: u64, to: u64) -> Result<ReconcileReport, ReconcileError> {
        let status = *self.source_status.borrow();
        if status != SyncStatus::Synced {
            return Err(ReconcileError::SourceNotSynced {
                domain: self.config.source_domain.clone(),
                status,
            });
        }

        let mut report = ReconcileReport {
            from,
            to,
            oracle_mints: 0,
            unbacked: vec![],
            bad_debt: self.bad_debt(),
        };
        if to > from {
            self.collect_mints(from, to, &mut report).await?;
        }
        self.settle_pending(&mut report).await?;
        report.bad_debt = self.bad_debt();
        debug!(
            "[{}] Reconciled [{}, {}): {} oracle mints, {} unbacked, {} pending",
            self.label(),
            from,
            to,
            report.oracle_mints,
            report.unbacked.len(),
            self.pending.len()
        );
        Ok(report)
    }

    async fn collect_mints(
        &mut self,
        from: u64,
        to: u64,
        report: &mut ReconcileReport,
    ) -> Result<(), ReconcileError> {
        let logs = self
            .target_chain
            .get_logs(self.config.join, &[EventKind::Mint.topic()], from, to - 1)
            .await
            .map_err(ReconcileError::Chain)?;
        let mut source_tip = None;
        for log in logs {
            let mint = match decode_mint(&log) {
                Ok(DecodedEvent::Mint(mint)) => mint,
                Ok(_) => continue,
                Err(e) => {
                    warn!(
                        "[{}] Skipping undecodable mint in tx {:?}: {}",
                        self.label(),
                        log.transaction_hash,
                        e
                    );
                    continue;
                }
            };
            if mint.originator != self.config.oracle_auth
                || mint.guid.source_domain != self.source_domain_id
            {
                continue;
            }
            report.oracle_mints += 1;
            let key = (mint.position.tx_hash, mint.position.log_index);
            if self.accumulator.contains(&mint) || self.pending.contains_key(&key) {
                continue;
            }
            if self.is_backed(&mint).await? {
                continue;
            }
            // the Init precedes the mint, so it is at or below the current source tip
            let covered_by = match source_tip {
                Some(tip) => tip,
                None => {
                    let tip = self
                        .source_chain
                        .get_latest_block_number()
                        .await
                        .map_err(ReconcileError::Chain)?;
                    source_tip = Some(tip);
                    tip
                }
            };
            debug!(
                "[{}] Mint {:?} has no record yet, pending until source block {}",
                self.label(),
                mint.hash,
                covered_by
            );
            self.pending.insert(key, PendingMint { mint, covered_by });
        }
        Ok(())
    }

    async fn is_backed(&self, mint: &MintObservation) -> Result<bool, ReconcileError> {
        Ok(self
            .store
            .find_by_hash(mint.hash)
            .await
            .map_err(ReconcileError::Storage)?
            .is_some())
    }

    // Counts pending mints whose covering source block has been ingested with no record
    async fn settle_pending(&mut self, report: &mut ReconcileReport) -> Result<(), ReconcileError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let checkpoint = self
            .store
            .find_checkpoint(&self.config.source_domain, EventKind::Init.as_str())
            .await
            .map_err(ReconcileError::Storage)?
            .unwrap_or_default();
        let covered: Vec<(H256, u64)> = self
            .pending
            .iter()
            .filter(|(_, p)| checkpoint > p.covered_by)
            .map(|(key, _)| *key)
            .collect();
        for key in covered {
            let Some(mint) = self.pending.get(&key).map(|p| p.mint.clone()) else {
                continue;
            };
            let backed = self.is_backed(&mint).await?;
            self.pending.remove(&key);
            if backed {
                continue;
            }
            if self.accumulator.add(&self.config.target_domain, &mint) {
                self.record_unbacked(&mint);
                report.unbacked.push(mint);
            }
        }
        Ok(())
    }

    fn record_unbacked(&self, mint: &MintObservation) {
        let domain = &self.config.target_domain;
        self.metrics
            .unbacked_mints
            .with_label_values(&[domain])
            .inc();
        self.metrics
            .bad_debt
            .with_label_values(&[domain])
            .set(amount_as_gauge(self.accumulator.total(domain)));
        self.alerts.notify(Alert::UnbackedMint {
            domain: domain.clone(),
            guid_hash: mint.hash,
            amount: mint.amount,
            tx_hash: mint.position.tx_hash,
            block: mint.position.block_number,
        });
    }

    /// Waits for the source synchronizer to report `synced`, then reconciles
    pub async fn reconcile_when_synced(
        &mut self,
        from: u64,
        to: u64,
        cancel: &CancellationToken,
    ) -> Result<ReconcileReport, ReconcileError> {
        let synced = tokio::select! {
            _ = cancel.cancelled() => return Err(ReconcileError::Cancelled),
            synced = self
                .source_status
                .wait_for(|status| *status == SyncStatus::Synced)
                .map(|r| r.is_ok()) => synced,
        };
        if !synced {
            // synchronizer dropped its status channel
            return Err(ReconcileError::SourceNotSynced {
                domain: self.config.source_domain.clone(),
                status: *self.source_status.borrow(),
            });
        }
        self.reconcile(from, to).await
    }

    /// Periodically reconciles every target block made final since the last
    /// pass, starting at `start_block`.
    pub async fn run(
        mut self,
        start_block: u64,
        finalized: watch::Receiver<Option<u64>>,
        interval: Duration,
        cancel: CancellationToken,
    ) {
        info!("[{}] Bad debt reconciler started at block {}", self.label(), start_block);
        let mut next = start_block;
        loop {
            let finalized_block = *finalized.borrow();
            let to = finalized_block.map_or(next, |b| (b + 1).max(next));
            if to > next || !self.pending.is_empty() {
                match self.reconcile_when_synced(next, to, &cancel).await {
                    Ok(report) => {
                        if !report.unbacked.is_empty() {
                            warn!(
                                "[{}] {} unbacked mints in [{}, {}), bad debt now {}",
                                self.label(),
                                report.unbacked.len(),
                                next,
                                to,
                                report.bad_debt
                            );
                        }
                        next = to;
                    }
                    Err(ReconcileError::Cancelled) => break,
                    Err(e) => error!("[{}] Reconciliation failed: {:?}", self.label(), e),
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("[{}] Bad debt reconciler stopped", self.label());
    }
}
