// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::attestation::{AttestationCollector, HttpOracleClient, OracleClient};
use crate::bad_debt::{BadDebtReconciler, ReconcilerConfig};
use crate::chain_reader::ChainReader;
use crate::chain_syncer::{DomainSynchronizer, LogSyncStrategy, SyncStatus, SynchronizerConfig};
use crate::config::BridgeNodeConfig;
use crate::eth_client::EthChainReader;
use crate::events::EventKind;
use crate::finality::FinalityWatcher;
use crate::metrics::BridgeMetrics;
use crate::monitor::{AlertSink, BridgeInvariantMonitor, LogAlertSink, MonitoredPair};
use crate::relay::{HttpRelayNetwork, RelayRequester};
use crate::storage::{InMemoryTransferStore, TransferStore};
use anyhow::anyhow;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

const ORACLE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RELAY_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Starts the node against the configured RPC endpoints. The returned handle
/// completes once every task has exited after `cancel` fires.
pub async fn run_bridge_node(
    config: BridgeNodeConfig,
    prometheus_registry: prometheus::Registry,
    cancel: CancellationToken,
) -> anyhow::Result<JoinHandle<()>> {
    config.validate()?;
    let metrics = Arc::new(BridgeMetrics::new(&prometheus_registry));

    let mut chains: HashMap<String, Arc<dyn ChainReader>> = HashMap::new();
    for domain in &config.domains {
        let reader = EthChainReader::new_http(&domain.name, &domain.rpc_url)
            .map_err(|e| anyhow!("Failed to create RPC client for {}: {:?}", domain.name, e))?;
        chains.insert(domain.name.clone(), Arc::new(reader));
    }
    // Records and checkpoints live in memory only, so a restart resumes every
    // synchronizer from its configured start block. A durable engine plugs in
    // behind `TransferStore`.
    let store: Arc<dyn TransferStore> = Arc::new(InMemoryTransferStore::new());

    let handles = start_bridge_node(
        &config,
        chains,
        store,
        Arc::new(LogAlertSink),
        metrics,
        &cancel,
    )?;
    Ok(tokio::spawn(async move {
        for handle in futures::future::join_all(handles).await {
            if let Err(e) = handle {
                error!("Bridge node task panicked: {:?}", e);
            }
        }
    }))
}

/// Spawns one synchronizer per (domain, event kind), and per pair a finality
/// watcher on the target, an invariant monitor and a bad debt reconciler.
pub fn start_bridge_node(
    config: &BridgeNodeConfig,
    chains: HashMap<String, Arc<dyn ChainReader>>,
    store: Arc<dyn TransferStore>,
    alerts: Arc<dyn AlertSink>,
    metrics: Arc<BridgeMetrics>,
    cancel: &CancellationToken,
) -> anyhow::Result<Vec<JoinHandle<()>>> {
    config.validate()?;
    let chain_of = |name: &str| {
        chains
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("No chain reader for domain {}", name))
    };

    let mut handles = vec![];
    let mut init_status: HashMap<String, watch::Receiver<SyncStatus>> = HashMap::new();

    for domain in &config.domains {
        let chain = chain_of(&domain.name)?;
        for kind in &domain.sync.events {
            let contract = domain
                .contracts
                .emitter_of(*kind)
                .ok_or_else(|| anyhow!("Domain {} has no {} emitter", domain.name, kind))?;
            let strategy = Arc::new(LogSyncStrategy::new(
                &domain.name,
                *kind,
                chain.clone(),
                contract,
                metrics.clone(),
            ));
            let synchronizer = DomainSynchronizer::new(
                SynchronizerConfig::for_domain(domain, kind.as_str()),
                chain.clone(),
                store.clone(),
                strategy,
                metrics.clone(),
            )
            .with_cancel(cancel);
            if *kind == EventKind::Init {
                init_status.insert(domain.name.clone(), synchronizer.subscribe());
            }
            let label = format!("{}/{}", domain.name, kind);
            handles.push(tokio::spawn(async move {
                match synchronizer.run().await {
                    Ok(checkpoint) => info!("[{}] Synchronizer exited at {}", label, checkpoint),
                    // fatal to this instance only
                    Err(e) => error!("[{}] Synchronizer aborted: {}", label, e),
                }
            }));
        }
    }

    let mut finality: HashMap<String, watch::Receiver<Option<u64>>> = HashMap::new();
    for pair in &config.pairs {
        if finality.contains_key(&pair.target) {
            continue;
        }
        let target = config
            .domain(&pair.target)
            .ok_or_else(|| anyhow!("Unknown domain {}", pair.target))?;
        let watcher =
            FinalityWatcher::new(&target.name, chain_of(&target.name)?, target.finality.clone());
        finality.insert(target.name.clone(), watcher.subscribe());
        let cancel = cancel.clone();
        handles.push(tokio::spawn(async move { watcher.run(cancel).await }));
    }

    for pair in &config.pairs {
        let source = config
            .domain(&pair.source)
            .ok_or_else(|| anyhow!("Unknown domain {}", pair.source))?;
        let target = config
            .domain(&pair.target)
            .ok_or_else(|| anyhow!("Unknown domain {}", pair.target))?;
        let finalized = finality
            .get(&target.name)
            .cloned()
            .ok_or_else(|| anyhow!("No finality watcher for {}", target.name))?;

        let monitor = BridgeInvariantMonitor::new(
            MonitoredPair {
                source_domain: source.name.clone(),
                source_chain: chain_of(&source.name)?,
                escrow: source
                    .contracts
                    .escrow
                    .ok_or_else(|| anyhow!("Domain {} has no escrow", source.name))?,
                source_token: source.contracts.token,
                source_confirmations: source.finality.confirmations,
                target_domain: target.name.clone(),
                target_chain: chain_of(&target.name)?,
                target_token: target.contracts.token,
            },
            alerts.clone(),
            metrics.clone(),
        );
        handles.push(tokio::spawn(monitor.run(finalized.clone(), cancel.clone())));

        let source_status = init_status
            .get(&source.name)
            .cloned()
            .ok_or_else(|| anyhow!("Domain {} does not sync init events", source.name))?;
        let reconciler = BadDebtReconciler::new(
            ReconcilerConfig {
                source_domain: source.name.clone(),
                target_domain: target.name.clone(),
                join: target
                    .contracts
                    .join
                    .ok_or_else(|| anyhow!("Domain {} has no join", target.name))?,
                oracle_auth: target
                    .contracts
                    .oracle_auth
                    .ok_or_else(|| anyhow!("Domain {} has no oracle-auth", target.name))?,
            },
            chain_of(&source.name)?,
            chain_of(&target.name)?,
            store.clone(),
            source_status,
            alerts.clone(),
            metrics.clone(),
        )?;
        handles.push(tokio::spawn(reconciler.run(
            target.sync.start_block,
            finalized,
            pair.reconcile_interval,
            cancel.clone(),
        )));
        info!("[{}->{}] Pair monitoring started", source.name, target.name);
    }

    Ok(handles)
}

/// Collector for transfers initiated on `source_domain`, querying every
/// configured oracle over HTTP
pub fn build_attestation_collector(
    config: &BridgeNodeConfig,
    source_domain: &str,
    chain: Arc<dyn ChainReader>,
    metrics: Arc<BridgeMetrics>,
) -> anyhow::Result<AttestationCollector> {
    let domain = config
        .domain(source_domain)
        .ok_or_else(|| anyhow!("Unknown domain {}", source_domain))?;
    let gateway = domain
        .contracts
        .gateway
        .ok_or_else(|| anyhow!("Domain {} has no gateway", source_domain))?;
    let mut oracles: BTreeMap<_, Arc<dyn OracleClient>> = BTreeMap::new();
    for oracle in &config.oracles {
        let client =
            HttpOracleClient::new(oracle.signer, oracle.url.clone(), ORACLE_REQUEST_TIMEOUT)?;
        oracles.insert(oracle.signer, Arc::new(client));
    }
    Ok(AttestationCollector::new(
        source_domain,
        chain,
        gateway,
        oracles,
        metrics,
    ))
}

pub fn build_relay_requester(
    config: &BridgeNodeConfig,
    metrics: Arc<BridgeMetrics>,
) -> anyhow::Result<Option<RelayRequester>> {
    let Some(relay) = &config.relay else {
        return Ok(None);
    };
    let network =
        HttpRelayNetwork::new(relay.url.clone(), relay.api_key.clone(), RELAY_REQUEST_TIMEOUT)?;
    Ok(Some(RelayRequester::new(Arc::new(network), relay, metrics)))
}
