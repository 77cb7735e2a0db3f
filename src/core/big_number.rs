//! Arbitrary-precision numeric wrapper for monetary and gas values.

use std::fmt;
use std::str::FromStr;

use ethers::types::U256;
use serde::{Deserialize, Serialize};

use super::defaults::HEX_PREFIX;
use super::errors::WalletError;

/// Largest `n` with `10^n` below `2^256`.
const MAX_DECIMAL_EXPONENT: usize = 77;

fn exceeds_256_bits() -> WalletError {
    WalletError::Normalization("Number exceeds 256 bits".to_string())
}

/// Unsigned 256-bit value. The only numeric shape accepted for gas and value
/// fields; plain integers and strings must be wrapped first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct BigNumber(U256);

impl BigNumber {
    /// Parses a decimal, `0x` hex or scientific (`1e18`) string.
    pub fn new(value: &str) -> Result<Self, WalletError> {
        value.parse()
    }

    pub fn zero() -> Self {
        Self(U256::zero())
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Lowercase `0x` hex with no leading zeros, the shape injected providers expect.
    pub fn to_hex_string(&self) -> String {
        format!("{:#x}", self.0)
    }

    fn parse_scientific(mantissa: &str, exponent: &str) -> Result<Self, WalletError> {
        let exponent: usize = exponent
            .parse()
            .map_err(|_| WalletError::Normalization(format!("Invalid exponent: {}", exponent)))?;
        let (whole, fraction) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        let fraction = fraction.trim_end_matches('0');
        if fraction.len() > exponent {
            return Err(WalletError::Normalization(format!(
                "{}e{} is not an integer",
                mantissa, exponent
            )));
        }
        let digits = format!("{}{}", whole, fraction);
        let base = U256::from_dec_str(&digits)
            .map_err(|e| WalletError::Normalization(format!("Invalid number {}: {}", mantissa, e)))?;
        if base.is_zero() {
            return Ok(Self::zero());
        }
        let scale_exponent = exponent - fraction.len();
        if scale_exponent > MAX_DECIMAL_EXPONENT {
            return Err(exceeds_256_bits());
        }
        base.checked_mul(U256::exp10(scale_exponent))
            .map(Self)
            .ok_or_else(exceeds_256_bits)
    }
}

impl FromStr for BigNumber {
    type Err = WalletError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        if value.is_empty() {
            return Err(WalletError::Normalization("Empty number".to_string()));
        }
        if let Some(hex) = value.strip_prefix(HEX_PREFIX) {
            return U256::from_str_radix(hex, 16)
                .map(Self)
                .map_err(|e| WalletError::Normalization(format!("Invalid hex number {}: {}", value, e)));
        }
        if let Some((mantissa, exponent)) = value.split_once(['e', 'E']) {
            return Self::parse_scientific(mantissa, exponent);
        }
        U256::from_dec_str(value)
            .map(Self)
            .map_err(|e| WalletError::Normalization(format!("Invalid number {}: {}", value, e)))
    }
}

impl From<u64> for BigNumber {
    fn from(value: u64) -> Self {
        Self(U256::from(value))
    }
}

impl From<U256> for BigNumber {
    fn from(value: U256) -> Self {
        Self(value)
    }
}

impl fmt::Display for BigNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
