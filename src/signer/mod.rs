//! Signing backends
//!
//! Every backend offers one capability: turn the digest of an unsigned
//! transaction into a recoverable signature. [`KeySource`] is the closed set
//! of backends the CLI can select; a new device generation is a new
//! [`ResponseFormat`] or a new variant here, never a change to the workflow.

pub mod device;
pub mod keystore;
pub mod path;
pub mod transport;

pub use device::{DeviceOptions, HardwareDevice, ResponseFormat};
pub use keystore::PassphraseKeystore;
pub use path::DerivationPath;
pub use transport::{DeviceTransport, TcpTransport};

use crate::error::AirgapResult;
use crate::tx::Signature;

use async_trait::async_trait;

/// What a backend is asked to sign
#[derive(Debug, Clone, Copy)]
pub struct SigningRequest<'a> {
    /// Keccak-256 of `encoding`
    pub digest: [u8; 32],
    /// Unsigned transaction encoding, for devices that parse and display it
    pub encoding: &'a [u8],
}

/// Produces a signature over a transaction digest
#[async_trait]
pub trait SigningBackend: Send + Sync {
    async fn sign(&self, request: &SigningRequest<'_>) -> AirgapResult<Signature>;
}

/// Key sources selectable from the command line
pub enum KeySource {
    Keystore(PassphraseKeystore),
    Device(HardwareDevice),
}

#[async_trait]
impl SigningBackend for KeySource {
    async fn sign(&self, request: &SigningRequest<'_>) -> AirgapResult<Signature> {
        match self {
            KeySource::Keystore(keystore) => keystore.sign(request).await,
            KeySource::Device(device) => device.sign(request).await,
        }
    }
}
