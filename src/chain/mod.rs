//! Chain module - the node queries the prepare and push phases depend on
//!
//! The workflow only needs five calls from a node: nonce, gas price, balance,
//! gas estimation and raw transaction submission. Every call is fallible and
//! is made exactly once; failures surface to the operator unchanged.

pub mod provider;

pub use provider::EthersNodeClient;

use crate::error::AirgapResult;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, H256, U256};

/// Call description used for gas estimation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallRequest {
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub data: Vec<u8>,
}

/// Queries against a blockchain node
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NodeQueryClient: Send + Sync {
    /// Number of transactions sent from `address`, i.e. its next nonce
    async fn get_nonce(&self, address: Address) -> AirgapResult<u64>;

    /// Current gas price in wei
    async fn get_gas_price(&self) -> AirgapResult<U256>;

    /// Balance of `address` in wei
    async fn get_balance(&self, address: Address) -> AirgapResult<U256>;

    /// Gas the node expects `call` to consume
    async fn estimate_gas(&self, call: &CallRequest) -> AirgapResult<u64>;

    /// Submit a signed transaction, returning its identifier
    async fn send_raw_transaction(&self, raw: Bytes) -> AirgapResult<H256>;
}
