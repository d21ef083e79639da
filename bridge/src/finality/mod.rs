// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Block-counting finality.
//!
//! A block is treated as final once `confirmations` blocks have been built on
//! top of it. The watcher polls the chain tip on a fixed interval and
//! publishes the finalized height through a `watch` channel that the
//! invariant monitor and bad-debt reconciler subscribe to.
//!
//! ```text
//!   ChainReader ──latest──▶ FinalityWatcher ──watch<Option<u64>>──▶ BridgeInvariantMonitor
//!                                                              └──▶ BadDebtReconciler
//! ```

use crate::chain_reader::ChainReader;
use crate::config::FinalityConfig;
use crate::error::BridgeResult;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub struct FinalityWatcher {
    domain: String,
    chain: Arc<dyn ChainReader>,
    config: FinalityConfig,
    finalized: watch::Sender<Option<u64>>,
}

impl FinalityWatcher {
    pub fn new(domain: &str, chain: Arc<dyn ChainReader>, config: FinalityConfig) -> Self {
        let (finalized, _) = watch::channel(None);
        Self {
            domain: domain.to_string(),
            chain,
            config,
            finalized,
        }
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Highest finalized block published so far
    pub fn finalized_block(&self) -> Option<u64> {
        *self.finalized.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.finalized.subscribe()
    }

    /// Reads the tip once. Returns the new finalized block if it advanced.
    pub async fn poll_once(&self) -> BridgeResult<Option<u64>> {
        let latest = self.chain.get_latest_block_number().await?;
        let Some(candidate) = latest.checked_sub(self.config.confirmations) else {
            debug!(
                "[{}] Tip {} is below {} confirmations",
                self.domain, latest, self.config.confirmations
            );
            return Ok(None);
        };
        let advanced = self.finalized.send_if_modified(|current| match current {
            Some(block) if *block >= candidate => false,
            _ => {
                *current = Some(candidate);
                true
            }
        });
        Ok(advanced.then_some(candidate))
    }

    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            "[{}] Finality watcher started ({} confirmations)",
            self.domain, self.config.confirmations
        );
        loop {
            match self.poll_once().await {
                Ok(Some(block)) => debug!("[{}] Finalized block {}", self.domain, block),
                Ok(None) => {}
                Err(e) => warn!("[{}] Failed to poll chain tip: {:?}", self.domain, e),
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }
        info!("[{}] Finality watcher stopped", self.domain);
    }
}
