//! Transaction record and its Unsigned -> Signed -> Broadcast lifecycle
//!
//! A record is never mutated once built. Signing produces a new
//! [`SignedTransaction`] carrying every prior field plus the signature, and
//! pushing consumes the signed value into a terminal [`BroadcastTransaction`].

use super::codec;
use crate::chain::NodeQueryClient;
use crate::error::{AirgapError, AirgapResult};
use crate::signer::{SigningBackend, SigningRequest};

use ethers::types::{Address, Bytes, H256, U256};
use tracing::{debug, info};

/// Offset added to the recovery id in the legacy `v` field
pub const LEGACY_V_OFFSET: u64 = 27;

/// Recoverable secp256k1 signature triple
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    /// Always 0 or 1
    pub recovery_id: u8,
    pub r: [u8; 32],
    pub s: [u8; 32],
}

impl Signature {
    pub fn new(recovery_id: u8, r: [u8; 32], s: [u8; 32]) -> AirgapResult<Self> {
        if recovery_id > 1 {
            return Err(AirgapError::Signing(format!(
                "recovery id must be 0 or 1, got {}",
                recovery_id
            )));
        }
        Ok(Self { recovery_id, r, s })
    }

    /// Build from the wire `v` value
    pub fn from_v(v: u64, r: [u8; 32], s: [u8; 32]) -> AirgapResult<Self> {
        match v {
            27 | 28 => Ok(Self {
                recovery_id: (v - LEGACY_V_OFFSET) as u8,
                r,
                s,
            }),
            other => Err(AirgapError::MalformedEncoding(format!(
                "unsupported signature v value {}",
                other
            ))),
        }
    }

    /// Wire `v` value
    pub fn v(&self) -> u64 {
        LEGACY_V_OFFSET + self.recovery_id as u64
    }

    pub fn to_ethers(&self) -> ethers::types::Signature {
        ethers::types::Signature {
            r: U256::from_big_endian(&self.r),
            s: U256::from_big_endian(&self.s),
            v: self.v(),
        }
    }

    /// Recover the address that produced this signature over `digest`
    pub fn recover(&self, digest: [u8; 32]) -> AirgapResult<Address> {
        self.to_ethers()
            .recover(H256::from(digest))
            .map_err(|e| AirgapError::Signing(format!("signature recovery failed: {}", e)))
    }
}

/// Map any common `v` convention (0/1, 27/28, EIP-155) onto a 0/1 recovery id
pub fn normalize_recovery_id(v: u64) -> Option<u8> {
    match v {
        0 | 1 => Some(v as u8),
        27 | 28 => Some((v - LEGACY_V_OFFSET) as u8),
        v if v >= 35 => Some(((v - 35) % 2) as u8),
        _ => None,
    }
}

/// The value entity shared by every lifecycle state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: u64,
    /// `None` signals contract creation
    pub recipient: Option<Address>,
    pub value: U256,
    pub payload: Vec<u8>,
    pub signature: Option<Signature>,
}

impl TransactionRecord {
    pub fn state(&self) -> TxState {
        if self.signature.is_some() {
            TxState::Signed
        } else {
            TxState::Unsigned
        }
    }

    /// Total fee the sender commits to: gas price times gas limit
    pub fn max_fee(&self) -> U256 {
        self.gas_price.saturating_mul(U256::from(self.gas_limit))
    }
}

/// Lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Unsigned,
    Signed,
    Broadcast,
}

impl std::fmt::Display for TxState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TxState::Unsigned => write!(f, "unsigned"),
            TxState::Signed => write!(f, "signed"),
            TxState::Broadcast => write!(f, "broadcast"),
        }
    }
}

fn transition_error(from: TxState, to: TxState) -> AirgapError {
    AirgapError::InvalidStateTransition {
        from: from.to_string(),
        to: to.to_string(),
    }
}

/// A record without a signature, produced by the prepare phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    record: TransactionRecord,
}

impl UnsignedTransaction {
    pub fn new(
        nonce: u64,
        gas_price: U256,
        gas_limit: u64,
        recipient: Option<Address>,
        value: U256,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            record: TransactionRecord {
                nonce,
                gas_price,
                gas_limit,
                recipient,
                value,
                payload,
                signature: None,
            },
        }
    }

    pub fn from_record(record: TransactionRecord) -> AirgapResult<Self> {
        match record.state() {
            TxState::Unsigned => Ok(Self { record }),
            state => Err(transition_error(state, TxState::Unsigned)),
        }
    }

    pub fn decode(bytes: &[u8]) -> AirgapResult<Self> {
        Self::from_record(codec::decode(bytes)?)
    }

    pub fn record(&self) -> &TransactionRecord {
        &self.record
    }

    /// The byte sequence whose digest gets signed
    pub fn encoding(&self) -> Vec<u8> {
        codec::encode(&self.record, false)
    }

    pub fn digest(&self) -> [u8; 32] {
        codec::signing_digest(&self.record)
    }

    /// Attach a signature, yielding a new signed value
    pub fn with_signature(&self, signature: Signature) -> SignedTransaction {
        SignedTransaction {
            record: TransactionRecord {
                signature: Some(signature),
                ..self.record.clone()
            },
            signature,
        }
    }

    /// Ask `backend` to sign the digest of the unsigned encoding
    pub async fn sign(&self, backend: &dyn SigningBackend) -> AirgapResult<SignedTransaction> {
        let encoding = self.encoding();
        let request = SigningRequest {
            digest: codec::keccak256(&encoding),
            encoding: &encoding,
        };
        debug!("Requesting signature over 0x{}", hex::encode(request.digest));

        let signature = backend.sign(&request).await?;
        Ok(self.with_signature(signature))
    }
}

/// A record carrying a signature; immutable from here on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    record: TransactionRecord,
    signature: Signature,
}

impl SignedTransaction {
    pub fn from_record(record: TransactionRecord) -> AirgapResult<Self> {
        match record.signature {
            Some(signature) => Ok(Self { record, signature }),
            None => Err(AirgapError::IncompleteTransaction(
                "signature is missing".to_string(),
            )),
        }
    }

    pub fn decode(bytes: &[u8]) -> AirgapResult<Self> {
        Self::from_record(codec::decode(bytes)?)
    }

    pub fn record(&self) -> &TransactionRecord {
        &self.record
    }

    pub fn signature(&self) -> Signature {
        self.signature
    }

    pub fn encoding(&self) -> Vec<u8> {
        codec::encode(&self.record, true)
    }

    /// Digest of the unsigned part, as it was signed
    pub fn digest(&self) -> [u8; 32] {
        codec::signing_digest(&self.record)
    }

    /// Hash of the full signed encoding, which the network uses as the id
    pub fn hash(&self) -> H256 {
        H256::from(codec::keccak256(&self.encoding()))
    }

    /// Address recovered from the signature
    pub fn sender(&self) -> AirgapResult<Address> {
        self.signature().recover(self.digest())
    }

    /// Submit the signed encoding; the returned value is terminal
    pub async fn push(self, node: &dyn NodeQueryClient) -> AirgapResult<BroadcastTransaction> {
        let raw = Bytes::from(self.encoding());
        let tx_id = node.send_raw_transaction(raw).await?;
        info!("Transaction submitted: {:?}", tx_id);

        Ok(BroadcastTransaction {
            signed: self,
            tx_id,
        })
    }
}

/// Terminal state: the network accepted the transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastTransaction {
    signed: SignedTransaction,
    tx_id: H256,
}

impl BroadcastTransaction {
    pub fn tx_id(&self) -> H256 {
        self.tx_id
    }

    pub fn signed(&self) -> &SignedTransaction {
        &self.signed
    }

    pub fn state(&self) -> TxState {
        TxState::Broadcast
    }
}
