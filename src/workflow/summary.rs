//! Human-readable transaction summary shown before each phase acts

use crate::tx::TransactionRecord;

use ethers::types::Address;
use ethers::utils::{format_ether, to_checksum};
use std::fmt;

const RULE: &str = "==========================================================";

/// Labeled view of a record and, when known, its sender
pub struct Summary<'a> {
    record: &'a TransactionRecord,
    sender: Option<Address>,
}

impl<'a> Summary<'a> {
    pub fn new(record: &'a TransactionRecord) -> Self {
        Self {
            record,
            sender: None,
        }
    }

    pub fn with_sender(mut self, sender: Address) -> Self {
        self.sender = Some(sender);
        self
    }
}

fn line(f: &mut fmt::Formatter<'_>, label: &str, value: impl fmt::Display) -> fmt::Result {
    writeln!(f, "{:>16}: {}", label, value)
}

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let record = self.record;
        writeln!(f, "{}", RULE)?;
        line(f, "Gas limit", record.gas_limit)?;
        line(f, "Gas price (wei)", record.gas_price)?;
        line(f, "Max fee (wei)", record.max_fee())?;
        line(f, "Value (wei)", record.value)?;
        line(f, "Value (ether)", format_ether(record.value))?;
        match self.sender {
            Some(sender) => line(f, "Sender", to_checksum(&sender, None))?,
            None => line(f, "Sender", "(known after signing)")?,
        }
        line(f, "Nonce", record.nonce)?;
        match record.recipient {
            Some(recipient) => line(f, "Recipient", to_checksum(&recipient, None))?,
            None => line(f, "Recipient", "(contract creation)")?,
        }
        if record.payload.is_empty() {
            line(f, "Payload", "(none)")?;
        } else {
            line(f, "Payload", format!("0x{}", hex::encode(&record.payload)))?;
        }
        write!(f, "{}", RULE)
    }
}
