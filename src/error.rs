//! Error types for airgap-tx

use ethers::types::U256;
use thiserror::Error;

/// Main error type for every phase of the workflow
#[derive(Error, Debug)]
pub enum AirgapError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient funds: balance {balance} wei does not cover fee {fee} wei")]
    InsufficientFunds { balance: U256, fee: U256 },

    #[error("Malformed encoding: {0}")]
    MalformedEncoding(String),

    #[error("Incomplete transaction: {0}")]
    IncompleteTransaction(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Node error during {operation}: {message}")]
    Remote { operation: String, message: String },

    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Signing error: {0}")]
    Signing(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures reported by (or while reaching) a hardware signing device
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("no device available: {0}")]
    Unavailable(String),

    #[error("device refused the PIN")]
    AuthenticationFailed,

    #[error("timeout after {secs}s waiting for {operation}")]
    Timeout { operation: String, secs: u64 },

    #[error("request rejected on the device")]
    Rejected,

    #[error("device returned status 0x{0:04x}")]
    Status(u16),

    #[error("malformed device response: {0}")]
    MalformedResponse(String),
}

/// Coarse failure category, used for reporting and exit codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Encoding,
    Remote,
    Device,
    Signing,
    Config,
    Io,
}

impl AirgapError {
    /// Category this error belongs to
    pub fn category(&self) -> ErrorCategory {
        match self {
            AirgapError::Validation(_) | AirgapError::InsufficientFunds { .. } => {
                ErrorCategory::Validation
            }
            AirgapError::MalformedEncoding(_)
            | AirgapError::IncompleteTransaction(_)
            | AirgapError::InvalidStateTransition { .. } => ErrorCategory::Encoding,
            AirgapError::Remote { .. } => ErrorCategory::Remote,
            AirgapError::Device(_) => ErrorCategory::Device,
            AirgapError::Signing(_) | AirgapError::AuthenticationFailed(_) => {
                ErrorCategory::Signing
            }
            AirgapError::Config(_) => ErrorCategory::Config,
            AirgapError::Io(_) => ErrorCategory::Io,
        }
    }

    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Validation => 2,
            ErrorCategory::Encoding => 3,
            ErrorCategory::Remote => 4,
            ErrorCategory::Device => 5,
            ErrorCategory::Signing => 6,
            ErrorCategory::Config => 7,
            ErrorCategory::Io => 8,
        }
    }

    pub(crate) fn remote(operation: &str, err: impl std::fmt::Display) -> Self {
        AirgapError::Remote {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type for airgap operations
pub type AirgapResult<T> = Result<T, AirgapError>;

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;
