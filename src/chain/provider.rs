//! JSON-RPC node client backed by an ethers HTTP provider

use super::{CallRequest, NodeQueryClient};
use crate::error::{AirgapError, AirgapResult};

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, H256, U256};
use tracing::debug;

/// Node client for a single HTTP endpoint. No failover and no retries.
pub struct EthersNodeClient {
    endpoint: String,
    provider: Provider<Http>,
}

impl EthersNodeClient {
    /// Create a client for `endpoint`
    pub fn new(endpoint: &str) -> AirgapResult<Self> {
        let provider = Provider::<Http>::try_from(endpoint).map_err(|e| {
            AirgapError::Config(format!("Invalid node endpoint {}: {}", endpoint, e))
        })?;
        debug!("Using node endpoint {}", endpoint);

        Ok(Self {
            endpoint: endpoint.to_string(),
            provider,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn to_u64(value: U256, operation: &str) -> AirgapResult<u64> {
    if value > U256::from(u64::MAX) {
        return Err(AirgapError::remote(
            operation,
            format!("value {} does not fit in 64 bits", value),
        ));
    }
    Ok(value.as_u64())
}

#[async_trait]
impl NodeQueryClient for EthersNodeClient {
    async fn get_nonce(&self, address: Address) -> AirgapResult<u64> {
        let count = self
            .provider
            .get_transaction_count(address, None)
            .await
            .map_err(|e| AirgapError::remote("eth_getTransactionCount", e))?;
        to_u64(count, "eth_getTransactionCount")
    }

    async fn get_gas_price(&self) -> AirgapResult<U256> {
        self.provider
            .get_gas_price()
            .await
            .map_err(|e| AirgapError::remote("eth_gasPrice", e))
    }

    async fn get_balance(&self, address: Address) -> AirgapResult<U256> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(|e| AirgapError::remote("eth_getBalance", e))
    }

    async fn estimate_gas(&self, call: &CallRequest) -> AirgapResult<u64> {
        let mut request = TransactionRequest::new()
            .from(call.from)
            .value(call.value)
            .data(call.data.clone());
        if let Some(to) = call.to {
            request = request.to(to);
        }
        let tx = TypedTransaction::Legacy(request);

        let gas = self
            .provider
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| AirgapError::remote("eth_estimateGas", e))?;
        to_u64(gas, "eth_estimateGas")
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> AirgapResult<H256> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(|e| AirgapError::remote("eth_sendRawTransaction", e))?;
        Ok(pending.tx_hash())
    }
}
