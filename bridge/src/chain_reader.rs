// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Narrow read interface to a domain's chain.

use crate::error::BridgeResult;
use crate::events::RawLog;
use async_trait::async_trait;
use ethers::types::{Address, H256, U256};

#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Current chain tip
    async fn get_latest_block_number(&self) -> BridgeResult<u64>;

    /// Logs from `address` whose topic0 is any of `topics`, in `[from_block, to_block]` (inclusive)
    async fn get_logs(
        &self,
        address: Address,
        topics: &[H256],
        from_block: u64,
        to_block: u64,
    ) -> BridgeResult<Vec<RawLog>>;

    /// Logs emitted by a mined transaction, from its receipt
    async fn get_transaction_logs(&self, tx_hash: H256) -> BridgeResult<Vec<RawLog>>;

    /// ERC20 `balanceOf(holder)`; `None` reads at the latest block
    async fn erc20_balance_of(
        &self,
        token: Address,
        holder: Address,
        block: Option<u64>,
    ) -> BridgeResult<U256>;

    /// ERC20 `totalSupply()`; `None` reads at the latest block
    async fn erc20_total_supply(&self, token: Address, block: Option<u64>) -> BridgeResult<U256>;
}
