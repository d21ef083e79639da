// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Bridge invariant monitoring.
//!
//! For a (source, target) pair the monitor samples the collateral held by the
//! source escrow and the token supply minted on the target, once per
//! finalized target block. Both alerting policies run on every sample: the
//! strict breach check and the supply change feed. Violations are reported
//! through alerts and metrics only; monitoring never stops because of one.

mod alerts;
mod invariant;

pub use alerts::{Alert, AlertSeverity, AlertSink, ChannelAlertSink, LogAlertSink};
pub use invariant::{check_strict, SupplyChangeTracker};

use crate::chain_reader::ChainReader;
use crate::error::BridgeResult;
use crate::metrics::{amount_as_gauge, BridgeMetrics};
use crate::types::BridgeBalanceSample;
use ethers::types::Address;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where the two sides of the invariant are read from
pub struct MonitoredPair {
    pub source_domain: String,
    pub source_chain: Arc<dyn ChainReader>,
    pub escrow: Address,
    pub source_token: Address,
    /// Locked collateral is read this many blocks behind the source tip
    pub source_confirmations: u64,
    pub target_domain: String,
    pub target_chain: Arc<dyn ChainReader>,
    pub target_token: Address,
}

pub struct BridgeInvariantMonitor {
    pair: MonitoredPair,
    alerts: Arc<dyn AlertSink>,
    metrics: Arc<BridgeMetrics>,
    supply_changes: SupplyChangeTracker,
    last_evaluated: Option<u64>,
}

impl BridgeInvariantMonitor {
    pub fn new(pair: MonitoredPair, alerts: Arc<dyn AlertSink>, metrics: Arc<BridgeMetrics>) -> Self {
        Self {
            pair,
            alerts,
            metrics,
            supply_changes: SupplyChangeTracker::new(),
            last_evaluated: None,
        }
    }

    fn label(&self) -> String {
        format!("{}->{}", self.pair.source_domain, self.pair.target_domain)
    }

    pub fn last_evaluated(&self) -> Option<u64> {
        self.last_evaluated
    }

    /// Pairs the target supply at `target_block` with the source collateral at
    /// the source's current finalized height, not its height when
    /// `target_block` was produced. While `run` catches up over a backlog of
    /// target blocks, older supplies are compared against current collateral.
    pub async fn sample(&self, target_block: u64) -> BridgeResult<BridgeBalanceSample> {
        let source_latest = self.pair.source_chain.get_latest_block_number().await?;
        let source_block = source_latest.saturating_sub(self.pair.source_confirmations);
        let locked_collateral = self
            .pair
            .source_chain
            .erc20_balance_of(self.pair.source_token, self.pair.escrow, Some(source_block))
            .await?;
        let minted_supply = self
            .pair
            .target_chain
            .erc20_total_supply(self.pair.target_token, Some(target_block))
            .await?;
        Ok(BridgeBalanceSample {
            domain: self.pair.target_domain.clone(),
            locked_collateral,
            minted_supply,
            block_number: target_block,
        })
    }

    /// Samples one finalized target block and raises whatever alerts it warrants
    pub async fn evaluate_block(&mut self, target_block: u64) -> BridgeResult<Vec<Alert>> {
        let sample = self.sample(target_block).await?;
        debug!(
            "[{}] Block {}: locked {} minted {}",
            self.label(),
            target_block,
            sample.locked_collateral,
            sample.minted_supply
        );
        self.metrics
            .locked_collateral
            .with_label_values(&[&self.pair.source_domain])
            .set(amount_as_gauge(sample.locked_collateral));
        self.metrics
            .minted_supply
            .with_label_values(&[&self.pair.target_domain])
            .set(amount_as_gauge(sample.minted_supply));

        let mut raised = Vec::new();
        if let Some(alert) = check_strict(&sample) {
            self.metrics
                .invariant_breaches
                .with_label_values(&[&self.pair.target_domain])
                .inc();
            raised.push(alert);
        }
        if let Some(alert) = self.supply_changes.observe(&sample) {
            self.metrics
                .supply_changes
                .with_label_values(&[&self.pair.target_domain])
                .inc();
            raised.push(alert);
        }
        for alert in &raised {
            self.alerts.notify(alert.clone());
        }
        self.last_evaluated = Some(target_block);
        Ok(raised)
    }

    /// Evaluates every block the finality watcher publishes, starting from
    /// the first one observed. Blocks skipped between two wakeups are
    /// evaluated in order.
    pub async fn run(
        mut self,
        mut finalized: watch::Receiver<Option<u64>>,
        cancel: CancellationToken,
    ) {
        info!("[{}] Invariant monitor started", self.label());
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                changed = finalized.changed() => {
                    if changed.is_err() {
                        warn!("[{}] Finality watcher gone", self.label());
                        break;
                    }
                }
            }
            let Some(finalized_block) = *finalized.borrow_and_update() else {
                continue;
            };
            let from = self.last_evaluated.map_or(finalized_block, |b| b + 1);
            for block in from..=finalized_block {
                if cancel.is_cancelled() {
                    break;
                }
                if let Err(e) = self.evaluate_block(block).await {
                    // retried on the next finality update
                    warn!("[{}] Failed to sample block {}: {:?}", self.label(), block, e);
                    break;
                }
            }
        }
        info!("[{}] Invariant monitor stopped", self.label());
    }
}
