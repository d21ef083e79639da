// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::signatures::{encode_signature_blob, recover_signer};
use super::{AttestationError, OracleAttestation, OracleClient};
use crate::chain_reader::ChainReader;
use crate::config::AttestationConfig;
use crate::error::BridgeError;
use crate::events::EventKind;
use crate::metrics::BridgeMetrics;
use crate::types::TeleportGuid;
use ethers::types::{Address, Bytes, Signature, H256};
use std::collections::BTreeMap;
use std::sync::Arc;
use teleport_authority_aggregation::{
    quorum_map_then_reduce_with_timeout, AsyncResult, ReduceOutput,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// What to collect attestations for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttestationTarget {
    Guid(TeleportGuid),
    /// Source domain transaction that emitted the transfer's initialization event
    TxHash(H256),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedAttestations {
    pub guid: TeleportGuid,
    /// 65-byte signatures ordered by ascending signer address
    pub signatures: Bytes,
    pub signers: Vec<Address>,
}

pub struct AttestationCollector {
    source_domain: String,
    chain: Arc<dyn ChainReader>,
    gateway: Address,
    oracles: BTreeMap<Address, Arc<dyn OracleClient>>,
    metrics: Arc<BridgeMetrics>,
}

impl AttestationCollector {
    pub fn new(
        source_domain: &str,
        chain: Arc<dyn ChainReader>,
        gateway: Address,
        oracles: BTreeMap<Address, Arc<dyn OracleClient>>,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            source_domain: source_domain.to_string(),
            chain,
            gateway,
            oracles,
            metrics,
        }
    }

    pub async fn resolve_guid(
        &self,
        target: &AttestationTarget,
    ) -> Result<TeleportGuid, AttestationError> {
        let tx_hash = match target {
            AttestationTarget::Guid(guid) => return Ok(*guid),
            AttestationTarget::TxHash(tx_hash) => *tx_hash,
        };
        let logs = self.chain.get_transaction_logs(tx_hash).await?;
        let init = logs
            .iter()
            .find(|log| {
                log.address == self.gateway && log.topics.first() == Some(&EventKind::Init.topic())
            })
            .ok_or(BridgeError::NoTeleportEventInTx(tx_hash))?;
        Ok(TeleportGuid::decode(&init.data).map_err(BridgeError::from)?)
    }

    /// Polls every oracle that has not attested yet until `threshold` distinct
    /// valid signatures are held or `timeout` elapses.
    ///
    /// `on_new_signature` is called with `(count, threshold)` after each
    /// accepted signature.
    pub async fn wait_for_attestations(
        &self,
        target: AttestationTarget,
        params: &AttestationConfig,
        on_new_signature: Option<&(dyn Fn(usize, usize) + Send + Sync)>,
        cancel: &CancellationToken,
    ) -> Result<CollectedAttestations, AttestationError> {
        let threshold = params.threshold;
        if threshold == 0 || threshold > self.oracles.len() {
            return Err(AttestationError::UnreachableThreshold {
                threshold,
                oracles: self.oracles.len(),
            });
        }
        let guid = self.resolve_guid(&target).await?;
        let guid_hash = guid.hash();
        let deadline = Instant::now() + params.timeout;
        info!(
            "[{}] Collecting {} of {} attestations for {:?}",
            self.source_domain,
            threshold,
            self.oracles.len(),
            guid_hash
        );

        let mut collected: BTreeMap<Address, Signature> = BTreeMap::new();
        loop {
            let pending: BTreeMap<Address, Arc<dyn OracleClient>> = self
                .oracles
                .iter()
                .filter(|(signer, _)| !collected.contains_key(*signer))
                .map(|(signer, client)| (*signer, client.clone()))
                .collect();

            let round = quorum_map_then_reduce_with_timeout(
                Arc::new(pending),
                collected,
                move |_signer: Address,
                      client: Arc<dyn OracleClient>|
                      -> AsyncResult<'static, Option<OracleAttestation>, AttestationError> {
                    Box::pin(async move { client.get_attestation(guid_hash).await })
                },
                |mut state: BTreeMap<Address, Signature>, signer: Address, result| {
                    match result {
                        Ok(Some(attestation)) => {
                            if attestation.signer != signer
                                || recover_signer(guid_hash, &attestation.signature)
                                    != Some(signer)
                            {
                                warn!(
                                    "[{}] Oracle {:?} returned a signature that does not recover to it",
                                    self.source_domain, signer
                                );
                                return ReduceOutput::Continue(state);
                            }
                            state.insert(signer, attestation.signature);
                            debug!(
                                "[{}] Attestation from {:?} ({}/{})",
                                self.source_domain,
                                signer,
                                state.len(),
                                threshold
                            );
                            if let Some(callback) = on_new_signature {
                                callback(state.len(), threshold);
                            }
                            if state.len() >= threshold {
                                ReduceOutput::Success(state)
                            } else {
                                ReduceOutput::Continue(state)
                            }
                        }
                        Ok(None) => ReduceOutput::Continue(state),
                        Err(e) => {
                            warn!(
                                "[{}] Oracle {:?} query failed: {:?}",
                                self.source_domain, signer, e
                            );
                            ReduceOutput::Continue(state)
                        }
                    }
                },
                deadline.saturating_duration_since(Instant::now()),
            );

            let round = tokio::select! {
                _ = cancel.cancelled() => return Err(AttestationError::Cancelled),
                round = round => round,
            };
            match round {
                Ok(signatures) => {
                    self.metrics.attestations_collected.inc();
                    info!(
                        "[{}] Collected {} attestations for {:?}",
                        self.source_domain,
                        signatures.len(),
                        guid_hash
                    );
                    return Ok(CollectedAttestations {
                        guid,
                        signatures: Bytes::from(encode_signature_blob(&signatures)),
                        signers: signatures.keys().copied().collect(),
                    });
                }
                Err(state) => collected = state,
            }

            if Instant::now() >= deadline {
                self.metrics.attestation_timeouts.inc();
                warn!(
                    "[{}] Timed out with {}/{} attestations for {:?}",
                    self.source_domain,
                    collected.len(),
                    threshold,
                    guid_hash
                );
                return Err(AttestationError::InsufficientAttestations {
                    collected: collected.len(),
                    threshold,
                });
            }
            let next_poll = (Instant::now() + params.poll_interval).min(deadline);
            tokio::select! {
                _ = cancel.cancelled() => return Err(AttestationError::Cancelled),
                _ = tokio::time::sleep_until(next_poll) => {}
            }
        }
    }
}
