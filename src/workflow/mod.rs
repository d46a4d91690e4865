//! The three phases: prepare online, sign offline, push online
//!
//! Each phase is a function of explicit inputs. Files carry the transaction
//! between machines; nothing else is shared.

pub mod summary;

pub use summary::Summary;

use crate::chain::{CallRequest, NodeQueryClient};
use crate::error::{AirgapError, AirgapResult};
use crate::signer::{DerivationPath, SigningBackend};
use crate::tx::{AmountSpec, BroadcastTransaction, GasPolicy, SignedTransaction, UnsignedTransaction};

use ethers::types::{Address, U256};
use ethers::utils::to_checksum;
use std::str::FromStr;
use tracing::{debug, info};

/// Everything the prepare phase needs from the operator
#[derive(Debug, Clone)]
pub struct PrepareRequest {
    pub amount: AmountSpec,
    pub sender: Address,
    /// `None` creates a contract
    pub recipient: Option<Address>,
    pub nonce: Option<u64>,
    pub gas_limit: Option<u64>,
    pub gas_price: Option<U256>,
    pub payload: Vec<u8>,
}

/// Where the sender address comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SenderSource {
    Address(Address),
    /// Ask the hardware device for the address at this path
    DevicePath(DerivationPath),
}

impl SenderSource {
    pub fn parse(input: &str) -> AirgapResult<Self> {
        if DerivationPath::looks_like_path(input) {
            Ok(SenderSource::DevicePath(input.parse()?))
        } else {
            Ok(SenderSource::Address(parse_address(input)?))
        }
    }
}

/// Parse a `0x`-prefixed 20-byte hex address
pub fn parse_address(input: &str) -> AirgapResult<Address> {
    let input = input.trim();
    let digits = input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .ok_or_else(|| AirgapError::Validation(format!("invalid address {}: missing 0x", input)))?;
    if digits.len() != 40 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AirgapError::Validation(format!(
            "invalid address {}: expected 40 hex digits",
            input
        )));
    }
    let address = Address::from_str(digits)
        .map_err(|e| AirgapError::Validation(format!("invalid address {}: {}", input, e)))?;

    // mixed case carries an EIP-55 checksum; single case carries none
    let mixed_case = digits.chars().any(|c| c.is_ascii_uppercase())
        && digits.chars().any(|c| c.is_ascii_lowercase());
    if mixed_case && to_checksum(&address, None) != format!("0x{}", digits) {
        return Err(AirgapError::Validation(format!(
            "invalid address {}: EIP-55 checksum mismatch",
            input
        )));
    }
    Ok(address)
}

/// Recipient address, or `None` for `""`, `0x` or `create`
pub fn parse_recipient(input: &str) -> AirgapResult<Option<Address>> {
    match input.trim() {
        "" | "0x" | "create" => Ok(None),
        other => parse_address(other).map(Some),
    }
}

/// Hex payload with optional `0x` prefix; empty means no payload
pub fn parse_payload(input: &str) -> AirgapResult<Vec<u8>> {
    let input = input.trim();
    let digits = input.strip_prefix("0x").unwrap_or(input);
    hex::decode(digits).map_err(|e| AirgapError::Validation(format!("invalid payload hex: {}", e)))
}

/// Build an unsigned transaction from operator input and node state
pub async fn prepare(
    request: &PrepareRequest,
    policy: &GasPolicy,
    node: &dyn NodeQueryClient,
) -> AirgapResult<UnsignedTransaction> {
    let nonce = match request.nonce {
        Some(nonce) => nonce,
        None => node.get_nonce(request.sender).await?,
    };
    debug!("Nonce for {:?}: {}", request.sender, nonce);

    let gas_price = policy.resolve_gas_price(request.gas_price, node).await?;

    // entire-balance value is unknown until the fee is; estimate with zero
    let estimate_value = match request.amount {
        AmountSpec::Exact(value) => value,
        AmountSpec::EntireBalance => U256::zero(),
    };
    let call = CallRequest {
        from: request.sender,
        to: request.recipient,
        value: estimate_value,
        data: request.payload.clone(),
    };
    let gas_limit = policy
        .resolve_gas_limit(request.gas_limit, &call, node)
        .await?;

    let value = policy
        .resolve_value(request.amount, &call, gas_limit, gas_price, node)
        .await?;

    info!(
        "Prepared transaction: nonce {}, gas {} at {} wei, value {} wei",
        nonce, gas_limit, gas_price, value
    );

    Ok(UnsignedTransaction::new(
        nonce,
        gas_price,
        gas_limit,
        request.recipient,
        value,
        request.payload.clone(),
    ))
}

/// Sign `unsigned` and report the address the signature recovers to
pub async fn sign(
    unsigned: &UnsignedTransaction,
    backend: &dyn SigningBackend,
) -> AirgapResult<(SignedTransaction, Address)> {
    let signed = unsigned.sign(backend).await?;
    let signer = signed.sender()?;
    info!("Transaction signed by {:?}", signer);
    Ok((signed, signer))
}

/// Submit a signed transaction
pub async fn push(
    signed: SignedTransaction,
    node: &dyn NodeQueryClient,
) -> AirgapResult<BroadcastTransaction> {
    signed.push(node).await
}
