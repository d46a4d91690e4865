//! Gas limit, gas price and fee arithmetic

use super::amount::AmountSpec;
use crate::chain::{CallRequest, NodeQueryClient};
use crate::error::{AirgapError, AirgapResult};

use ethers::types::U256;
use tracing::debug;

/// Gas consumed by a plain value transfer without payload
pub const BASE_TRANSFER_GAS: u64 = 21_000;

const WEI_PER_GWEI: u64 = 1_000_000_000;

/// Gas resolution policy for the prepare phase
#[derive(Debug, Clone, Default)]
pub struct GasPolicy {
    /// Refuse gas prices above this ceiling, in wei
    max_gas_price: Option<U256>,
}

impl GasPolicy {
    /// Create a policy with an optional gas price ceiling in gwei
    pub fn new(max_gas_price_gwei: Option<u64>) -> Self {
        Self {
            max_gas_price: max_gas_price_gwei
                .map(|gwei| U256::from(gwei) * U256::from(WEI_PER_GWEI)),
        }
    }

    /// Explicit price if given, otherwise the node's current price
    pub async fn resolve_gas_price(
        &self,
        explicit: Option<U256>,
        node: &dyn NodeQueryClient,
    ) -> AirgapResult<U256> {
        let price = match explicit {
            Some(price) => price,
            None => node.get_gas_price().await?,
        };

        if let Some(max) = self.max_gas_price {
            if price > max {
                return Err(AirgapError::Validation(format!(
                    "gas price {} wei exceeds the configured ceiling of {} wei",
                    price, max
                )));
            }
        }

        debug!("Gas price: {} wei", price);
        Ok(price)
    }

    /// Gas limit in priority order: explicit override, node estimate when the
    /// call carries a payload, base transfer cost otherwise
    pub async fn resolve_gas_limit(
        &self,
        explicit: Option<u64>,
        call: &CallRequest,
        node: &dyn NodeQueryClient,
    ) -> AirgapResult<u64> {
        let limit = match explicit {
            Some(limit) => limit,
            None if !call.data.is_empty() => node.estimate_gas(call).await?,
            None => BASE_TRANSFER_GAS,
        };

        debug!("Gas limit: {}", limit);
        Ok(limit)
    }

    /// Total cost in wei
    pub fn calculate_cost(gas_limit: u64, gas_price: U256) -> AirgapResult<U256> {
        gas_price
            .checked_mul(U256::from(gas_limit))
            .ok_or_else(|| AirgapError::Validation("gas cost overflows 256 bits".to_string()))
    }

    /// Value left after reserving the full fee from `balance`
    pub fn value_from_balance(
        balance: U256,
        gas_limit: u64,
        gas_price: U256,
    ) -> AirgapResult<U256> {
        let fee = Self::calculate_cost(gas_limit, gas_price)?;
        balance
            .checked_sub(fee)
            .ok_or(AirgapError::InsufficientFunds { balance, fee })
    }

    /// Resolve the transferred value for `amount`
    pub async fn resolve_value(
        &self,
        amount: AmountSpec,
        call: &CallRequest,
        gas_limit: u64,
        gas_price: U256,
        node: &dyn NodeQueryClient,
    ) -> AirgapResult<U256> {
        match amount {
            AmountSpec::Exact(value) => Ok(value),
            AmountSpec::EntireBalance => {
                let balance = node.get_balance(call.from).await?;
                let value = Self::value_from_balance(balance, gas_limit, gas_price)?;
                debug!("Entire balance {} wei leaves {} wei after fees", balance, value);
                Ok(value)
            }
        }
    }
}
