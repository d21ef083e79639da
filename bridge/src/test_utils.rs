// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::attestation::signatures::sign_attestation;
use crate::attestation::{AttestationError, OracleAttestation, OracleClient};
use crate::chain_reader::ChainReader;
use crate::error::{BridgeError, BridgeResult};
use crate::events::{EventKind, RawLog};
use crate::relay::{RelayError, RelayNetwork, RelaySubmission, RelayTaskStatus, TaskId};
use crate::storage::{InMemoryTransferStore, LedgerRecord, StoreTransaction, TransferStore};
use crate::types::{address_to_bytes32, domain_to_bytes32, TeleportGuid, TransferRecord};
use async_trait::async_trait;
use ethers::abi::{self, Token};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, H256, U256};
use ethers::utils::keccak256;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;

static LOGGING: Once = Once::new();

pub fn init_test_logging() {
    LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug")),
            )
            .with_test_writer()
            .try_init();
    });
}

pub fn sample_guid(seed: u8) -> TeleportGuid {
    TeleportGuid {
        source_domain: domain_to_bytes32("ETH-MAIN-A").unwrap(),
        target_domain: domain_to_bytes32("OPT-MAIN-A").unwrap(),
        receiver: address_to_bytes32(Address::repeat_byte(0x10 + seed)),
        operator: address_to_bytes32(Address::repeat_byte(0x20 + seed)),
        amount: 1_000_000_000_000_000_000u128 * (seed as u128 + 1),
        nonce: seed as u128,
        timestamp: 1_650_000_000 + seed as u64,
    }
}

fn tx_hash(kind: EventKind, block: u64, log_index: u64, salt: &[u8]) -> H256 {
    let mut preimage = kind.as_str().as_bytes().to_vec();
    preimage.extend(block.to_be_bytes());
    preimage.extend(log_index.to_be_bytes());
    preimage.extend(salt);
    H256::from(keccak256(preimage))
}

pub fn init_log(guid: &TeleportGuid, block: u64, log_index: u64) -> RawLog {
    RawLog {
        address: MockChainReader::gateway(),
        topics: vec![EventKind::Init.topic()],
        data: Bytes::from(guid.encode()),
        block_number: block,
        transaction_hash: tx_hash(EventKind::Init, block, log_index, guid.hash().as_bytes()),
        log_index,
    }
}

pub fn flush_log(target_domain: H256, amount: U256, block: u64) -> RawLog {
    RawLog {
        address: MockChainReader::gateway(),
        topics: vec![EventKind::Flush.topic(), target_domain],
        data: Bytes::from(abi::encode(&[Token::Uint(amount)])),
        block_number: block,
        transaction_hash: tx_hash(EventKind::Flush, block, 0, target_domain.as_bytes()),
        log_index: 0,
    }
}

pub fn settle_log(source_domain: H256, amount: U256, block: u64) -> RawLog {
    RawLog {
        address: MockChainReader::join(),
        topics: vec![EventKind::Settle.topic(), source_domain],
        data: Bytes::from(abi::encode(&[Token::Uint(amount)])),
        block_number: block,
        transaction_hash: tx_hash(EventKind::Settle, block, 0, source_domain.as_bytes()),
        log_index: 0,
    }
}

pub fn mint_log(
    guid: &TeleportGuid,
    amount: U256,
    originator: Address,
    block: u64,
    log_index: u64,
) -> RawLog {
    let mut data = guid.encode();
    data.extend(abi::encode(&[
        Token::Uint(amount),
        Token::Uint(U256::from(10u64).pow(U256::from(16u64))),
        Token::Uint(U256::zero()),
        Token::Address(originator),
    ]));
    RawLog {
        address: MockChainReader::join(),
        topics: vec![EventKind::Mint.topic(), guid.hash()],
        data: Bytes::from(data),
        block_number: block,
        transaction_hash: tx_hash(EventKind::Mint, block, log_index, guid.hash().as_bytes()),
        log_index,
    }
}

pub fn transfer_record(guid: &TeleportGuid, block: u64) -> TransferRecord {
    TransferRecord::new(*guid, init_log(guid, block, 0).position())
}

/// Deterministic oracle keys, ordered by ascending address
pub fn sorted_test_wallets(count: usize) -> Vec<LocalWallet> {
    let mut wallets: Vec<LocalWallet> = (0..count)
        .map(|i| LocalWallet::from_bytes(&[i as u8 + 1; 32]).unwrap())
        .collect();
    wallets.sort_by_key(|w| w.address());
    wallets
}

#[derive(Default)]
struct MockChainState {
    latest_block: u64,
    tip_failures: u32,
    logs: Vec<RawLog>,
    get_logs_calls: Vec<(u64, u64)>,
    transactions: HashMap<H256, Vec<RawLog>>,
    balances: HashMap<(Address, Address), BTreeMap<u64, U256>>,
    supplies: HashMap<Address, BTreeMap<u64, U256>>,
    state_reads: Vec<Option<u64>>,
}

fn value_at(history: Option<&BTreeMap<u64, U256>>, block: Option<u64>) -> U256 {
    let Some(history) = history else {
        return U256::zero();
    };
    let found = match block {
        Some(block) => history.range(..=block).next_back(),
        None => history.iter().next_back(),
    };
    found.map(|(_, v)| *v).unwrap_or_default()
}

#[derive(Default)]
pub struct MockChainReader {
    state: Mutex<MockChainState>,
}

impl MockChainReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gateway() -> Address {
        Address::repeat_byte(0x01)
    }

    pub fn join() -> Address {
        Address::repeat_byte(0x02)
    }

    pub fn oracle_auth() -> Address {
        Address::repeat_byte(0x03)
    }

    pub fn escrow() -> Address {
        Address::repeat_byte(0x04)
    }

    pub fn token() -> Address {
        Address::repeat_byte(0x05)
    }

    pub fn set_latest_block(&self, block: u64) {
        self.state.lock().unwrap().latest_block = block;
    }

    /// The next `count` tip reads fail with a transient error
    pub fn fail_next_tip_reads(&self, count: u32) {
        self.state.lock().unwrap().tip_failures = count;
    }

    pub fn add_log(&self, log: RawLog) {
        self.state.lock().unwrap().logs.push(log);
    }

    pub fn add_transaction_logs(&self, tx_hash: H256, logs: Vec<RawLog>) {
        self.state
            .lock()
            .unwrap()
            .transactions
            .insert(tx_hash, logs);
    }

    pub fn set_balance(&self, token: Address, holder: Address, block: u64, value: U256) {
        self.state
            .lock()
            .unwrap()
            .balances
            .entry((token, holder))
            .or_default()
            .insert(block, value);
    }

    pub fn set_total_supply(&self, token: Address, block: u64, value: U256) {
        self.state
            .lock()
            .unwrap()
            .supplies
            .entry(token)
            .or_default()
            .insert(block, value);
    }

    pub fn get_logs_calls(&self) -> Vec<(u64, u64)> {
        self.state.lock().unwrap().get_logs_calls.clone()
    }

    /// Blocks requested by balance and supply reads, in call order
    pub fn state_reads(&self) -> Vec<Option<u64>> {
        self.state.lock().unwrap().state_reads.clone()
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn get_latest_block_number(&self) -> BridgeResult<u64> {
        let mut state = self.state.lock().unwrap();
        if state.tip_failures > 0 {
            state.tip_failures -= 1;
            return Err(BridgeError::TransientProviderError(
                "injected tip failure".into(),
            ));
        }
        Ok(state.latest_block)
    }

    async fn get_logs(
        &self,
        address: Address,
        topics: &[H256],
        from_block: u64,
        to_block: u64,
    ) -> BridgeResult<Vec<RawLog>> {
        let mut state = self.state.lock().unwrap();
        state.get_logs_calls.push((from_block, to_block));
        Ok(state
            .logs
            .iter()
            .filter(|log| {
                log.address == address
                    && log.block_number >= from_block
                    && log.block_number <= to_block
                    && log.topics.first().map_or(false, |t| topics.contains(t))
            })
            .cloned()
            .collect())
    }

    async fn get_transaction_logs(&self, tx_hash: H256) -> BridgeResult<Vec<RawLog>> {
        self.state
            .lock()
            .unwrap()
            .transactions
            .get(&tx_hash)
            .cloned()
            .ok_or(BridgeError::TxNotFound(tx_hash))
    }

    async fn erc20_balance_of(
        &self,
        token: Address,
        holder: Address,
        block: Option<u64>,
    ) -> BridgeResult<U256> {
        let mut state = self.state.lock().unwrap();
        state.state_reads.push(block);
        Ok(value_at(state.balances.get(&(token, holder)), block))
    }

    async fn erc20_total_supply(&self, token: Address, block: Option<u64>) -> BridgeResult<U256> {
        let mut state = self.state.lock().unwrap();
        state.state_reads.push(block);
        Ok(value_at(state.supplies.get(&token), block))
    }
}

pub struct MockOracle {
    wallet: LocalWallet,
    signing_key: Option<LocalWallet>,
    raw_recovery_id: bool,
    ready_after: u32,
    delay: Duration,
    calls: AtomicU32,
}

impl MockOracle {
    pub fn new(wallet: LocalWallet) -> Self {
        Self {
            wallet,
            signing_key: None,
            raw_recovery_id: false,
            ready_after: 0,
            delay: Duration::ZERO,
            calls: AtomicU32::new(0),
        }
    }

    /// Answers `None` to the first `calls` queries
    pub fn ready_after(mut self, calls: u32) -> Self {
        self.ready_after = calls;
        self
    }

    /// Claims to be this oracle but signs with another key
    pub fn signing_with(mut self, key: LocalWallet) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Returns `v` as the bare recovery id (0 or 1) instead of 27 or 28
    pub fn with_raw_recovery_id(mut self) -> Self {
        self.raw_recovery_id = true;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OracleClient for MockOracle {
    async fn get_attestation(
        &self,
        guid_hash: H256,
    ) -> Result<Option<OracleAttestation>, AttestationError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.ready_after {
            return Ok(None);
        }
        let key = self.signing_key.as_ref().unwrap_or(&self.wallet);
        let mut signature =
            sign_attestation(key, guid_hash).map_err(|e| AttestationError::OracleRequest {
                signer: self.address(),
                reason: e.to_string(),
            })?;
        if self.raw_recovery_id {
            signature.v -= 27;
        }
        Ok(Some(OracleAttestation {
            signer: self.address(),
            signature,
        }))
    }
}

#[derive(Default)]
struct MockRelayState {
    scripts: VecDeque<Vec<RelayTaskStatus>>,
    submissions: Vec<RelaySubmission>,
    tasks: HashMap<TaskId, VecDeque<RelayTaskStatus>>,
    polls: HashMap<TaskId, u32>,
}

/// Relay network whose tasks walk through scripted statuses.
/// Each poll consumes one status; the last one repeats.
#[derive(Default)]
pub struct MockRelayNetwork {
    state: Mutex<MockRelayState>,
}

impl MockRelayNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses of the next submitted task; unscripted tasks stay pending
    pub fn script(self, statuses: Vec<RelayTaskStatus>) -> Self {
        self.state.lock().unwrap().scripts.push_back(statuses);
        self
    }

    pub fn submissions(&self) -> Vec<RelaySubmission> {
        self.state.lock().unwrap().submissions.clone()
    }

    pub fn polls(&self, task_id: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .polls
            .get(task_id)
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RelayNetwork for MockRelayNetwork {
    async fn submit(&self, submission: &RelaySubmission) -> Result<TaskId, RelayError> {
        let mut state = self.state.lock().unwrap();
        let task_id = format!("task-{}", state.submissions.len());
        state.submissions.push(submission.clone());
        let script = state
            .scripts
            .pop_front()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| vec![RelayTaskStatus::Pending]);
        state.tasks.insert(task_id.clone(), script.into());
        Ok(task_id)
    }

    async fn poll(&self, task_id: &str) -> Result<RelayTaskStatus, RelayError> {
        let mut state = self.state.lock().unwrap();
        *state.polls.entry(task_id.to_string()).or_default() += 1;
        let Some(statuses) = state.tasks.get_mut(task_id) else {
            return Ok(RelayTaskStatus::NotFound);
        };
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        Ok(status.unwrap_or(RelayTaskStatus::NotFound))
    }
}

/// Store whose first `failures` commits fail, rolling the transaction back
pub struct FlakyStore {
    inner: InMemoryTransferStore,
    remaining_failures: AtomicU32,
    failed_commits: AtomicU32,
}

impl FlakyStore {
    pub fn new(failures: u32) -> Self {
        Self {
            inner: InMemoryTransferStore::new(),
            remaining_failures: AtomicU32::new(failures),
            failed_commits: AtomicU32::new(0),
        }
    }

    pub fn inner(&self) -> &InMemoryTransferStore {
        &self.inner
    }

    pub fn failed_commits(&self) -> u32 {
        self.failed_commits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferStore for FlakyStore {
    async fn find_by_hash(&self, hash: H256) -> BridgeResult<Option<TransferRecord>> {
        self.inner.find_by_hash(hash).await
    }

    async fn find_checkpoint(&self, domain: &str, name: &str) -> BridgeResult<Option<u64>> {
        self.inner.find_checkpoint(domain, name).await
    }

    async fn begin(&self) -> BridgeResult<Box<dyn StoreTransaction>> {
        let fail = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if fail {
            self.failed_commits.fetch_add(1, Ordering::SeqCst);
        }
        Ok(Box::new(FlakyTransaction {
            inner: self.inner.begin().await?,
            fail,
        }))
    }
}

struct FlakyTransaction {
    inner: Box<dyn StoreTransaction>,
    fail: bool,
}

#[async_trait]
impl StoreTransaction for FlakyTransaction {
    async fn create_many(&mut self, records: Vec<LedgerRecord>) -> BridgeResult<usize> {
        self.inner.create_many(records).await
    }

    async fn upsert_checkpoint(
        &mut self,
        domain: &str,
        name: &str,
        block: u64,
    ) -> BridgeResult<()> {
        self.inner.upsert_checkpoint(domain, name, block).await
    }

    async fn commit(self: Box<Self>) -> BridgeResult<()> {
        if self.fail {
            return Err(BridgeError::StorageError(
                "injected commit failure".into(),
            ));
        }
        self.inner.commit().await
    }
}
