//! Transaction representation, wire format and fee policy

pub mod amount;
pub mod codec;
pub mod file;
pub mod gas;
pub mod record;

pub use amount::AmountSpec;
pub use gas::GasPolicy;
pub use record::{
    BroadcastTransaction, Signature, SignedTransaction, TransactionRecord, TxState,
    UnsignedTransaction,
};
