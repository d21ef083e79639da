// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::alerts::Alert;
use crate::types::BridgeBalanceSample;
use ethers::types::U256;
use std::collections::HashMap;

/// Strict policy: every undercollateralized sample raises an alert, with no
/// de-duplication across blocks.
pub fn check_strict(sample: &BridgeBalanceSample) -> Option<Alert> {
    sample.deficit().map(|deficit| Alert::InvariantBreach {
        domain: sample.domain.clone(),
        block: sample.block_number,
        locked: sample.locked_collateral,
        minted: sample.minted_supply,
        deficit,
    })
}

/// Change-notification policy: alerts only when a domain's minted supply
/// differs from the last value seen for it. The first observation of a
/// domain is a baseline and raises nothing.
#[derive(Debug, Default)]
pub struct SupplyChangeTracker {
    last_seen: HashMap<String, U256>,
}

impl SupplyChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, sample: &BridgeBalanceSample) -> Option<Alert> {
        let previous = self
            .last_seen
            .insert(sample.domain.clone(), sample.minted_supply)?;
        (previous != sample.minted_supply).then(|| Alert::SupplyChanged {
            domain: sample.domain.clone(),
            block: sample.block_number,
            previous,
            current: sample.minted_supply,
        })
    }

    pub fn last_seen(&self, domain: &str) -> Option<U256> {
        self.last_seen.get(domain).copied()
    }
}
