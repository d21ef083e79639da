// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use super::{RelayError, RelayNetwork, RelaySubmission, RelayTaskStatus, TaskId};
use crate::config::RelayConfig;
use crate::metrics::BridgeMetrics;
use crate::types::TeleportGuid;
use crate::utils::now_unix_secs;
use ethers::abi::{self, Token};
use ethers::signers::Signer;
use ethers::types::{Address, Bytes, Signature, H256, U256};
use ethers::utils::{id, keccak256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const RELAY_FUNCTION: &str = "relay((bytes32,bytes32,bytes32,bytes32,uint128,uint80,uint48),bytes,uint256,uint256,uint256,uint8,bytes32,bytes32)";

/// A relay of an attested transfer; resubmitting the same request is idempotent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayRequest {
    pub guid: TeleportGuid,
    /// Oracle signature blob
    pub signatures: Bytes,
    pub max_fee_percentage: U256,
    /// Fee paid to the relayer, deducted from the minted amount
    pub gas_fee: U256,
    /// Unix timestamp after which the relay contract rejects the request
    pub expiry: u64,
}

impl RelayRequest {
    /// `keccak256(abi.encode(guidHash, gasFee, maxFeePercentage, expiry))`
    pub fn payload_hash(&self) -> H256 {
        H256::from(keccak256(abi::encode(&[
            Token::FixedBytes(self.guid.hash().as_bytes().to_vec()),
            Token::Uint(self.gas_fee),
            Token::Uint(self.max_fee_percentage),
            Token::Uint(U256::from(self.expiry)),
        ])))
    }
}

/// Calldata of the relay contract call for `request`, authorized by `signature`
pub fn relay_calldata(request: &RelayRequest, signature: &Signature) -> Bytes {
    let mut r = [0u8; 32];
    let mut s = [0u8; 32];
    signature.r.to_big_endian(&mut r);
    signature.s.to_big_endian(&mut s);

    let mut data = id(RELAY_FUNCTION).to_vec();
    data.extend(abi::encode(&[
        request.guid.to_tuple_token(),
        Token::Bytes(request.signatures.to_vec()),
        Token::Uint(request.max_fee_percentage),
        Token::Uint(request.gas_fee),
        Token::Uint(U256::from(request.expiry)),
        Token::Uint(U256::from(signature.v)),
        Token::FixedBytes(r.to_vec()),
        Token::FixedBytes(s.to_vec()),
    ]));
    data.into()
}

pub struct RelayRequester {
    network: Arc<dyn RelayNetwork>,
    chain_id: u64,
    relay_contract: Address,
    poll_interval: Duration,
    timeout: Duration,
    max_resubmissions: u32,
    metrics: Arc<BridgeMetrics>,
}

impl RelayRequester {
    pub fn new(
        network: Arc<dyn RelayNetwork>,
        config: &RelayConfig,
        metrics: Arc<BridgeMetrics>,
    ) -> Self {
        Self {
            network,
            chain_id: config.chain_id,
            relay_contract: config.relay_contract,
            poll_interval: config.poll_interval,
            timeout: config.timeout,
            max_resubmissions: config.max_resubmissions,
            metrics,
        }
    }

    /// Signs `request` with `payload_signer` and builds the relay call
    pub async fn build_submission<S: Signer>(
        &self,
        request: &RelayRequest,
        payload_signer: &S,
    ) -> Result<RelaySubmission, RelayError> {
        ensure_not_expired(request)?;
        let signature = payload_signer
            .sign_message(request.payload_hash())
            .await
            .map_err(|e| RelayError::Signing(e.to_string()))?;
        Ok(RelaySubmission {
            chain_id: self.chain_id,
            target: self.relay_contract,
            data: relay_calldata(request, &signature),
        })
    }

    pub async fn request_relay<S: Signer>(
        &self,
        request: &RelayRequest,
        payload_signer: &S,
    ) -> Result<TaskId, RelayError> {
        let submission = self.build_submission(request, payload_signer).await?;
        self.submit(&submission, request).await
    }

    /// Polls `task_id` until it executes, fails, or the timeout elapses
    pub async fn wait_for_relay_task(
        &self,
        task_id: &str,
        cancel: &CancellationToken,
    ) -> Result<H256, RelayError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.network.poll(task_id).await {
                Ok(RelayTaskStatus::Pending) => {}
                Ok(RelayTaskStatus::Done(tx_hash)) => {
                    self.count("executed");
                    info!("Relay task {} executed in tx {:?}", task_id, tx_hash);
                    return Ok(tx_hash);
                }
                Ok(RelayTaskStatus::Failed(reason)) => {
                    self.count("failed");
                    warn!("Relay task {} failed: {}", task_id, reason);
                    return Err(RelayError::TaskFailed {
                        task_id: task_id.to_string(),
                        reason,
                    });
                }
                Ok(RelayTaskStatus::NotFound) => {
                    return Err(RelayError::TaskNotFound(task_id.to_string()));
                }
                Err(e) => warn!("Failed to poll relay task {}: {:?}", task_id, e),
            }

            if Instant::now() >= deadline {
                self.count("timeout");
                return Err(RelayError::Timeout(task_id.to_string()));
            }
            let next_poll = (Instant::now() + self.poll_interval).min(deadline);
            tokio::select! {
                _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                _ = tokio::time::sleep_until(next_poll) => {}
            }
        }
    }

    /// Submits and waits, resubmitting the identical payload when the relay
    /// network loses track of the task.
    pub async fn relay_until_executed<S: Signer>(
        &self,
        request: &RelayRequest,
        payload_signer: &S,
        cancel: &CancellationToken,
    ) -> Result<H256, RelayError> {
        let submission = self.build_submission(request, payload_signer).await?;
        let mut resubmissions = 0;
        loop {
            let task_id = self.submit(&submission, request).await?;
            match self.wait_for_relay_task(&task_id, cancel).await {
                Err(RelayError::TaskNotFound(_)) if resubmissions < self.max_resubmissions => {
                    ensure_not_expired(request)?;
                    resubmissions += 1;
                    self.count("resubmitted");
                    warn!(
                        "Relay task {} was lost, resubmitting ({}/{})",
                        task_id, resubmissions, self.max_resubmissions
                    );
                }
                Err(RelayError::TaskNotFound(_)) => {
                    return Err(RelayError::ResubmissionsExhausted(resubmissions));
                }
                result => return result,
            }
        }
    }

    async fn submit(
        &self,
        submission: &RelaySubmission,
        request: &RelayRequest,
    ) -> Result<TaskId, RelayError> {
        let task_id = self.network.submit(submission).await?;
        self.count("submitted");
        info!(
            "Submitted relay of {:?} as task {}",
            request.guid.hash(),
            task_id
        );
        Ok(task_id)
    }

    fn count(&self, status: &str) {
        self.metrics.relay_tasks.with_label_values(&[status]).inc();
    }
}

fn ensure_not_expired(request: &RelayRequest) -> Result<(), RelayError> {
    let now = now_unix_secs();
    if request.expiry <= now {
        return Err(RelayError::Expired {
            expiry: request.expiry,
            now,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{sample_guid, sorted_test_wallets, MockRelayNetwork};
    use ethers::abi::ParamType;
    use ethers::signers::LocalWallet;
    use ethers::utils::hash_message;
    use url::Url;

    fn relay_config() -> RelayConfig {
        RelayConfig {
            url: Url::parse("http://relay.example/").unwrap(),
            chain_id: 1,
            relay_contract: Address::repeat_byte(0x99),
            api_key: None,
            poll_interval: Duration::from_millis(5),
            timeout: Duration::from_millis(200),
            max_resubmissions: 2,
        }
    }

    fn request() -> RelayRequest {
        RelayRequest {
            guid: sample_guid(1),
            signatures: Bytes::from(vec![7u8; 130]),
            max_fee_percentage: U256::from(10u64).pow(U256::from(16u64)),
            gas_fee: U256::from(1_000u64),
            expiry: now_unix_secs() + 3_600,
        }
    }

    fn requester(network: Arc<MockRelayNetwork>) -> (RelayRequester, Arc<BridgeMetrics>) {
        let metrics = Arc::new(BridgeMetrics::new_for_testing());
        (
            RelayRequester::new(network, &relay_config(), metrics.clone()),
            metrics,
        )
    }

    fn wallet() -> LocalWallet {
        sorted_test_wallets(1).remove(0)
    }

    #[tokio::test]
    async fn test_request_relay_submits_signed_calldata() {
        let network = Arc::new(MockRelayNetwork::new());
        let (requester, metrics) = requester(network.clone());
        let request = request();
        let signer = wallet();

        let task_id = requester.request_relay(&request, &signer).await.unwrap();
        assert_eq!(task_id, "task-0");

        let submissions = network.submissions();
        assert_eq!(submissions.len(), 1);
        let submission = &submissions[0];
        assert_eq!(submission.chain_id, 1);
        assert_eq!(submission.target, Address::repeat_byte(0x99));
        assert_eq!(&submission.data[..4], &id(RELAY_FUNCTION)[..]);

        let tokens = abi::decode(
            &[
                ParamType::Tuple(TeleportGuid::param_types()),
                ParamType::Bytes,
                ParamType::Uint(256),
                ParamType::Uint(256),
                ParamType::Uint(256),
                ParamType::Uint(8),
                ParamType::FixedBytes(32),
                ParamType::FixedBytes(32),
            ],
            &submission.data[4..],
        )
        .unwrap();
        assert_eq!(tokens[0], request.guid.to_tuple_token());
        assert_eq!(tokens[1], Token::Bytes(request.signatures.to_vec()));
        assert_eq!(tokens[3], Token::Uint(request.gas_fee));

        let (v, r, s) = match (&tokens[5], &tokens[6], &tokens[7]) {
            (Token::Uint(v), Token::FixedBytes(r), Token::FixedBytes(s)) => (v.as_u64(), r, s),
            other => panic!("unexpected {:?}", other),
        };
        let signature = Signature {
            r: U256::from_big_endian(r),
            s: U256::from_big_endian(s),
            v,
        };
        let recovered = signature
            .recover(hash_message(request.payload_hash()))
            .unwrap();
        assert_eq!(recovered, signer.address());
        assert_eq!(
            metrics.relay_tasks.with_label_values(&["submitted"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_payload_hash_covers_every_field() {
        let base = request();
        let h = base.payload_hash();
        assert_ne!(
            RelayRequest {
                gas_fee: base.gas_fee + 1,
                ..base.clone()
            }
            .payload_hash(),
            h
        );
        assert_ne!(
            RelayRequest {
                expiry: base.expiry + 1,
                ..base.clone()
            }
            .payload_hash(),
            h
        );
        assert_ne!(
            RelayRequest {
                guid: sample_guid(2),
                ..base.clone()
            }
            .payload_hash(),
            h
        );
        // the oracle signatures are not part of the signed payload
        assert_eq!(
            RelayRequest {
                signatures: Bytes::new(),
                ..base
            }
            .payload_hash(),
            h
        );
    }

    #[tokio::test]
    async fn test_expired_request_is_not_submitted() {
        let network = Arc::new(MockRelayNetwork::new());
        let (requester, _) = requester(network.clone());
        let request = RelayRequest {
            expiry: now_unix_secs() - 1,
            ..request()
        };
        let err = requester.request_relay(&request, &wallet()).await.unwrap_err();
        assert!(matches!(err, RelayError::Expired { .. }));
        assert!(network.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_wait_for_relay_task_outcomes() {
        let tx_hash = H256::repeat_byte(0x42);
        let network = Arc::new(
            MockRelayNetwork::new()
                .script(vec![
                    RelayTaskStatus::Pending,
                    RelayTaskStatus::Pending,
                    RelayTaskStatus::Done(tx_hash),
                ])
                .script(vec![RelayTaskStatus::Failed("reverted".into())])
                .script(vec![RelayTaskStatus::Pending]),
        );
        let (requester, metrics) = requester(network.clone());
        let cancel = CancellationToken::new();
        let request = request();
        let signer = wallet();

        let task = requester.request_relay(&request, &signer).await.unwrap();
        assert_eq!(
            requester.wait_for_relay_task(&task, &cancel).await,
            Ok(tx_hash)
        );
        assert_eq!(network.polls(&task), 3);

        let task = requester.request_relay(&request, &signer).await.unwrap();
        assert_eq!(
            requester.wait_for_relay_task(&task, &cancel).await,
            Err(RelayError::TaskFailed {
                task_id: task.clone(),
                reason: "reverted".into()
            })
        );

        let task = requester.request_relay(&request, &signer).await.unwrap();
        assert_eq!(
            requester.wait_for_relay_task(&task, &cancel).await,
            Err(RelayError::Timeout(task.clone()))
        );
        assert_eq!(metrics.relay_tasks.with_label_values(&["timeout"]).get(), 1);
        assert_eq!(
            requester.wait_for_relay_task("unknown", &cancel).await,
            Err(RelayError::TaskNotFound("unknown".into()))
        );
    }

    #[tokio::test]
    async fn test_lost_task_is_resubmitted_identically() {
        let tx_hash = H256::repeat_byte(0x43);
        let network = Arc::new(
            MockRelayNetwork::new()
                .script(vec![RelayTaskStatus::Pending, RelayTaskStatus::NotFound])
                .script(vec![RelayTaskStatus::Done(tx_hash)]),
        );
        let (requester, metrics) = requester(network.clone());

        let executed = requester
            .relay_until_executed(&request(), &wallet(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(executed, tx_hash);

        let submissions = network.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[0], submissions[1]);
        assert_eq!(
            metrics.relay_tasks.with_label_values(&["resubmitted"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_resubmissions_are_bounded() {
        let network = Arc::new(
            MockRelayNetwork::new()
                .script(vec![RelayTaskStatus::NotFound])
                .script(vec![RelayTaskStatus::NotFound])
                .script(vec![RelayTaskStatus::NotFound]),
        );
        let (requester, _) = requester(network.clone());

        let err = requester
            .relay_until_executed(&request(), &wallet(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, RelayError::ResubmissionsExhausted(2));
        assert_eq!(network.submissions().len(), 3);
    }
}
