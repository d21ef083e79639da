// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::events::EventKind;
use crate::types::domain_to_bytes32;
use anyhow::anyhow;
use ethers::types::Address;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use std::collections::HashSet;
use std::time::Duration;
use teleport_config::Config;
use url::Url;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DomainContracts {
    // TeleportGateway, emits TeleportInitialized and Flushed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<Address>,
    // TeleportJoin, emits Mint and Settle
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<Address>,
    // TeleportOracleAuth, the originator of fast-path mints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oracle_auth: Option<Address>,
    // Holds the collateral locked on this domain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escrow: Option<Address>,
    // The bridged ERC20 token on this domain
    pub token: Address,
}

impl DomainContracts {
    /// Contract that emits events of `kind`
    pub fn emitter_of(&self, kind: EventKind) -> Option<Address> {
        match kind {
            EventKind::Init | EventKind::Flush => self.gateway,
            EventKind::Settle | EventKind::Mint => self.join,
        }
    }
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SyncConfig {
    // First block scanned when no checkpoint is persisted
    #[serde(default)]
    pub start_block: u64,
    // Maximum number of blocks per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    // Sleep between tip checks once synced
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "tip-sync-delay-ms", default = "default_tip_sync_delay")]
    pub tip_sync_delay: Duration,
    // Blocks behind the tip that are never scanned, to stay clear of reorgs
    #[serde(default)]
    pub save_distance_from_tip: u64,
    // Attempts per batch before the synchronizer gives up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "retry-delay-ms", default = "default_retry_delay")]
    pub retry_delay: Duration,
    // One synchronizer is started per listed event kind
    #[serde(default = "default_events")]
    pub events: Vec<EventKind>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            start_block: 0,
            batch_size: default_batch_size(),
            tip_sync_delay: default_tip_sync_delay(),
            save_distance_from_tip: 0,
            max_attempts: default_max_attempts(),
            retry_delay: default_retry_delay(),
            events: default_events(),
        }
    }
}

fn default_batch_size() -> u64 {
    1000
}

fn default_tip_sync_delay() -> Duration {
    Duration::from_secs(5)
}

fn default_max_attempts() -> u32 {
    5
}

fn default_retry_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_events() -> Vec<EventKind> {
    vec![EventKind::Init]
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FinalityConfig {
    // A block is final once it is this many blocks behind the tip
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "poll-interval-ms", default = "default_finality_poll_interval")]
    pub poll_interval: Duration,
}

impl Default for FinalityConfig {
    fn default() -> Self {
        Self {
            confirmations: default_confirmations(),
            poll_interval: default_finality_poll_interval(),
        }
    }
}

fn default_confirmations() -> u64 {
    12
}

fn default_finality_poll_interval() -> Duration {
    Duration::from_secs(12)
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DomainConfig {
    // Bytes32 domain identifier, e.g. ETH-MAIN-A
    pub name: String,
    pub rpc_url: String,
    pub contracts: DomainContracts,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub finality: FinalityConfig,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PairConfig {
    // Domain where collateral is locked and transfers are initiated
    pub source: String,
    // Domain where the bridged token is minted
    pub target: String,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "reconcile-interval-ms", default = "default_reconcile_interval")]
    pub reconcile_interval: Duration,
}

fn default_reconcile_interval() -> Duration {
    Duration::from_secs(60)
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct OracleConfig {
    pub signer: Address,
    pub url: Url,
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct AttestationConfig {
    pub threshold: usize,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "poll-interval-ms", default = "default_attestation_poll_interval")]
    pub poll_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "timeout-ms", default = "default_attestation_timeout")]
    pub timeout: Duration,
}

fn default_attestation_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_attestation_timeout() -> Duration {
    Duration::from_secs(300)
}

#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RelayConfig {
    pub url: Url,
    // Chain id of the domain the relay transaction executes on
    pub chain_id: u64,
    // TrustedRelay contract that receives the relay call
    pub relay_contract: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "poll-interval-ms", default = "default_relay_poll_interval")]
    pub poll_interval: Duration,
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "timeout-ms", default = "default_relay_timeout")]
    pub timeout: Duration,
    // How often an identical payload is resubmitted when the relay loses the task
    #[serde(default = "default_max_resubmissions")]
    pub max_resubmissions: u32,
}

fn default_relay_poll_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_relay_timeout() -> Duration {
    Duration::from_secs(600)
}

fn default_max_resubmissions() -> u32 {
    3
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct BridgeNodeConfig {
    // The port for the metrics server.
    pub metrics_port: u16,
    pub domains: Vec<DomainConfig>,
    #[serde(default)]
    pub pairs: Vec<PairConfig>,
    #[serde(default)]
    pub oracles: Vec<OracleConfig>,
    pub attestation: AttestationConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay: Option<RelayConfig>,
}

impl Config for BridgeNodeConfig {}

impl BridgeNodeConfig {
    pub fn domain(&self, name: &str) -> Option<&DomainConfig> {
        self.domains.iter().find(|d| d.name == name)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let mut names = HashSet::new();
        for domain in &self.domains {
            domain_to_bytes32(&domain.name).map_err(|e| anyhow!("Invalid domain: {}", e))?;
            if !names.insert(domain.name.as_str()) {
                return Err(anyhow!("Domain {} is configured twice", domain.name));
            }
            if domain.sync.batch_size == 0 {
                return Err(anyhow!("Domain {} has batch-size 0", domain.name));
            }
            if domain.sync.max_attempts == 0 {
                return Err(anyhow!("Domain {} has max-attempts 0", domain.name));
            }
            for kind in &domain.sync.events {
                if domain.contracts.emitter_of(*kind).is_none() {
                    return Err(anyhow!(
                        "Domain {} syncs {} events but has no contract emitting them",
                        domain.name,
                        kind
                    ));
                }
            }
        }

        for pair in &self.pairs {
            let source = self
                .domain(&pair.source)
                .ok_or_else(|| anyhow!("Pair references unknown domain {}", pair.source))?;
            let target = self
                .domain(&pair.target)
                .ok_or_else(|| anyhow!("Pair references unknown domain {}", pair.target))?;
            if source.name == target.name {
                return Err(anyhow!("Pair {} has identical source and target", source.name));
            }
            if source.contracts.escrow.is_none() {
                return Err(anyhow!("Pair source {} has no escrow", source.name));
            }
            if target.contracts.join.is_none() || target.contracts.oracle_auth.is_none() {
                return Err(anyhow!(
                    "Pair target {} needs join and oracle-auth contracts",
                    target.name
                ));
            }
            if !source.sync.events.contains(&EventKind::Init) {
                return Err(anyhow!(
                    "Pair source {} must sync init events for reconciliation",
                    source.name
                ));
            }
        }

        let mut signers = HashSet::new();
        for oracle in &self.oracles {
            if !signers.insert(oracle.signer) {
                return Err(anyhow!("Oracle {:?} is configured twice", oracle.signer));
            }
        }
        if self.attestation.threshold == 0 || self.attestation.threshold > self.oracles.len() {
            return Err(anyhow!(
                "Attestation threshold {} must be between 1 and the number of oracles ({})",
                self.attestation.threshold,
                self.oracles.len()
            ));
        }
        Ok(())
    }
}
