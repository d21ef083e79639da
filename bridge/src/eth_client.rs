// Copyright (c) Starcoin, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::chain_reader::ChainReader;
use crate::error::{BridgeError, BridgeResult};
use crate::events::RawLog;
use async_trait::async_trait;
use ethers::abi::{self, ParamType, Token};
use ethers::providers::{Http, JsonRpcClient, Middleware, Provider};
use ethers::types::{
    Address, BlockId, BlockNumber, Bytes, Filter, TransactionRequest, ValueOrArray, H256, U256,
};
use ethers::utils::id;
use std::time::Duration;
use tap::TapFallible;

const BALANCE_OF: &str = "balanceOf(address)";
const TOTAL_SUPPLY: &str = "totalSupply()";

/// [`ChainReader`] backed by an ethers JSON-RPC provider
pub struct EthChainReader<P> {
    domain: String,
    provider: Provider<P>,
}

impl EthChainReader<Http> {
    pub fn new_http(domain: &str, rpc_url: &str) -> anyhow::Result<Self> {
        let provider =
            Provider::<Http>::try_from(rpc_url)?.interval(Duration::from_millis(2000));
        Ok(Self::new(domain, provider))
    }
}

impl<P> EthChainReader<P>
where
    P: JsonRpcClient + 'static,
{
    pub fn new(domain: &str, provider: Provider<P>) -> Self {
        Self {
            domain: domain.to_string(),
            provider,
        }
    }

    async fn call_u256(&self, token: Address, data: Vec<u8>, block: Option<u64>) -> BridgeResult<U256> {
        let tx = TransactionRequest::new().to(token).data(Bytes::from(data));
        let block = block.map(|b| BlockId::Number(BlockNumber::Number(b.into())));
        let output = self
            .provider
            .call(&tx.into(), block)
            .await
            .tap_err(|e| {
                tracing::warn!("[{}] eth_call to {:?} failed: {:?}", self.domain, token, e)
            })?;
        let mut tokens = abi::decode(&[ParamType::Uint(256)], &output)
            .map_err(|e| BridgeError::ProviderError(format!("Invalid uint256 output: {}", e)))?;
        match tokens.pop() {
            Some(Token::Uint(v)) => Ok(v),
            _ => Err(BridgeError::ProviderError(
                "eth_call returned no uint256".to_string(),
            )),
        }
    }
}

#[async_trait]
impl<P> ChainReader for EthChainReader<P>
where
    P: JsonRpcClient + 'static,
{
    async fn get_latest_block_number(&self) -> BridgeResult<u64> {
        Ok(self.provider.get_block_number().await?.as_u64())
    }

    async fn get_logs(
        &self,
        address: Address,
        topics: &[H256],
        from_block: u64,
        to_block: u64,
    ) -> BridgeResult<Vec<RawLog>> {
        let filter = Filter::new()
            .address(address)
            .topic0(ValueOrArray::Array(
                topics.iter().copied().map(Some).collect::<Vec<_>>(),
            ))
            .from_block(from_block)
            .to_block(to_block);
        let logs = self.provider.get_logs(&filter).await.tap_err(|e| {
            tracing::warn!(
                "[{}] eth_getLogs [{}, {}] failed: {:?}",
                self.domain,
                from_block,
                to_block,
                e
            )
        })?;
        let logs = logs
            .into_iter()
            .map(RawLog::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(
            "[{}] Fetched {} logs from {:?} in [{}, {}]",
            self.domain,
            logs.len(),
            address,
            from_block,
            to_block
        );
        Ok(logs)
    }

    async fn get_transaction_logs(&self, tx_hash: H256) -> BridgeResult<Vec<RawLog>> {
        let receipt = self
            .provider
            .get_transaction_receipt(tx_hash)
            .await?
            .ok_or(BridgeError::TxNotFound(tx_hash))?;
        if receipt.status.map(|s| s.as_u64()) == Some(0) {
            return Err(BridgeError::Generic(format!(
                "Transaction {:?} reverted",
                tx_hash
            )));
        }
        Ok(receipt
            .logs
            .into_iter()
            .map(RawLog::try_from)
            .collect::<Result<Vec<_>, _>>()?)
    }

    async fn erc20_balance_of(
        &self,
        token: Address,
        holder: Address,
        block: Option<u64>,
    ) -> BridgeResult<U256> {
        let mut data = id(BALANCE_OF).to_vec();
        data.extend(abi::encode(&[Token::Address(holder)]));
        self.call_u256(token, data, block).await
    }

    async fn erc20_total_supply(&self, token: Address, block: Option<u64>) -> BridgeResult<U256> {
        self.call_u256(token, id(TOTAL_SUPPLY).to_vec(), block).await
    }
}
