//! airgap-tx - Ethereum transactions prepared online, signed offline and
//! broadcast online again
//!
//! The library holds the wire codec, the transaction lifecycle, the signing
//! backends and the node interface. The `airgap-tx` binary wires them to a
//! command line.

pub mod chain;
pub mod config;
pub mod error;
pub mod signer;
pub mod tx;
pub mod workflow;

pub use error::{AirgapError, AirgapResult};
