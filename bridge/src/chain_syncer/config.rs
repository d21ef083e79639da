// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::config::DomainConfig;
use std::time::Duration;

/// Settings of a single synchronizer instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynchronizerConfig {
    pub domain: String,
    /// Checkpoint key within the domain
    pub name: String,
    pub start_block: u64,
    pub batch_size: u64,
    pub tip_sync_delay: Duration,
    pub save_distance_from_tip: u64,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl SynchronizerConfig {
    pub fn for_domain(domain: &DomainConfig, name: &str) -> Self {
        Self {
            domain: domain.name.clone(),
            name: name.to_string(),
            start_block: domain.sync.start_block,
            batch_size: domain.sync.batch_size,
            tip_sync_delay: domain.sync.tip_sync_delay,
            save_distance_from_tip: domain.sync.save_distance_from_tip,
            max_attempts: domain.sync.max_attempts,
            retry_delay: domain.sync.retry_delay,
        }
    }

    /// `[domain/name]` prefix used in logs
    pub(crate) fn label(&self) -> String {
        format!("{}/{}", self.domain, self.name)
    }
}
