//! Amount parsing: literal values in wei or ether, or the whole balance

use crate::error::{AirgapError, AirgapResult};

use ethers::types::U256;
use ethers::utils::parse_ether;

/// Keyword selecting the entire available balance
pub const ENTIRE_BALANCE_KEYWORD: &str = "max";

/// How the transferred value is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmountSpec {
    /// A literal value in wei
    Exact(U256),
    /// Balance minus the maximum fee
    EntireBalance,
}

impl AmountSpec {
    /// Parse an operator-supplied amount.
    ///
    /// With `major_unit` the input is read as ether (10^18 wei) and may carry
    /// decimals; otherwise it must be a whole number of wei.
    pub fn parse(input: &str, major_unit: bool) -> AirgapResult<Self> {
        let input = input.trim();

        if input.eq_ignore_ascii_case(ENTIRE_BALANCE_KEYWORD) {
            return Ok(AmountSpec::EntireBalance);
        }
        if input.starts_with('-') {
            return Err(AirgapError::Validation(format!(
                "amount must not be negative: {}",
                input
            )));
        }
        if input.is_empty() {
            return Err(AirgapError::Validation("amount is empty".to_string()));
        }

        let wei = if major_unit {
            parse_ether(input)
                .map_err(|e| AirgapError::Validation(format!("invalid ether amount {}: {}", input, e)))?
        } else {
            U256::from_dec_str(input).map_err(|e| {
                AirgapError::Validation(format!("invalid wei amount {}: {}", input, e))
            })?
        };

        Ok(AmountSpec::Exact(wei))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_major_unit() {
        let amount = AmountSpec::parse("2.5", true).unwrap();
        assert_eq!(
            amount,
            AmountSpec::Exact(U256::from(2_500_000_000_000_000_000u64))
        );
    }

    #[test]
    fn test_parse_wei() {
        assert_eq!(
            AmountSpec::parse("1000", false).unwrap(),
            AmountSpec::Exact(U256::from(1000))
        );
        assert!(AmountSpec::parse("1.5", false).is_err());
    }

    #[test]
    fn test_parse_entire_balance() {
        assert_eq!(AmountSpec::parse("max", false).unwrap(), AmountSpec::EntireBalance);
        assert_eq!(AmountSpec::parse("MAX", true).unwrap(), AmountSpec::EntireBalance);
    }

    #[test]
    fn test_rejects_negative_and_garbage() {
        assert!(matches!(
            AmountSpec::parse("-1", true),
            Err(AirgapError::Validation(_))
        ));
        assert!(AmountSpec::parse("ten", false).is_err());
        assert!(AmountSpec::parse("", false).is_err());
    }
}
