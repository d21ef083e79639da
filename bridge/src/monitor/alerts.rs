// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use ethers::types::{H256, U256};
use serde::Serialize;
use std::fmt;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "info"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Alert {
    /// Minted supply on `domain` exceeds the collateral locked for it
    InvariantBreach {
        domain: String,
        block: u64,
        locked: U256,
        minted: U256,
        deficit: U256,
    },
    SupplyChanged {
        domain: String,
        block: u64,
        previous: U256,
        current: U256,
    },
    /// Oracle-authorized mint with no synchronized transfer behind it
    UnbackedMint {
        domain: String,
        guid_hash: H256,
        amount: U256,
        tx_hash: H256,
        block: u64,
    },
}

impl Alert {
    pub fn severity(&self) -> AlertSeverity {
        match self {
            Alert::InvariantBreach { .. } | Alert::UnbackedMint { .. } => AlertSeverity::Critical,
            Alert::SupplyChanged { .. } => AlertSeverity::Info,
        }
    }

    pub fn domain(&self) -> &str {
        match self {
            Alert::InvariantBreach { domain, .. }
            | Alert::SupplyChanged { domain, .. }
            | Alert::UnbackedMint { domain, .. } => domain,
        }
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::InvariantBreach {
                domain,
                block,
                locked,
                minted,
                deficit,
            } => write!(
                f,
                "[{}] bridge invariant violated at block {}: locked {} < minted {} (deficit {})",
                domain, block, locked, minted, deficit
            ),
            Alert::SupplyChanged {
                domain,
                block,
                previous,
                current,
            } => write!(
                f,
                "[{}] minted supply changed at block {}: {} -> {}",
                domain, block, previous, current
            ),
            Alert::UnbackedMint {
                domain,
                guid_hash,
                amount,
                tx_hash,
                block,
            } => write!(
                f,
                "[{}] mint of {} for {:#x} at block {} (tx {:#x}) has no backing transfer",
                domain, amount, guid_hash, block, tx_hash
            ),
        }
    }
}

/// Destination for alerts. Delivery is fire-and-forget.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: Alert);
}

/// Writes alerts to the log at a level matching their severity
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn notify(&self, alert: Alert) {
        match alert.severity() {
            AlertSeverity::Critical => error!("ALERT {}", alert),
            AlertSeverity::Warning => warn!("ALERT {}", alert),
            AlertSeverity::Info => info!("ALERT {}", alert),
        }
    }
}

/// Forwards alerts to a channel, for an external notifier or tests
#[derive(Debug, Clone)]
pub struct ChannelAlertSink {
    tx: mpsc::UnboundedSender<Alert>,
}

impl ChannelAlertSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Alert>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelAlertSink {
    fn notify(&self, alert: Alert) {
        if let Err(e) = self.tx.send(alert) {
            warn!("Alert receiver dropped, discarding {}", e.0);
        }
    }
}
