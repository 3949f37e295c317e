pub mod approval;
pub mod rpc;
pub mod token;
pub mod tx;

use std::fmt;

use alloy_primitives::{keccak256, Address, U256};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use serde::Serialize;
use thiserror::Error;

pub use rpc::HttpJsonRpc;
pub use token::Erc20Token;

const BALANCE_PLACES: i32 = 4;

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("private key is not valid hex: {0}")]
    Hex(#[from] hex::FromHexError),
    #[error("private key is not a valid secp256k1 scalar")]
    InvalidKey,
    #[error("invalid address {0}")]
    InvalidAddress(String),
}

// Operator wallet: the signing key and the address derived from it
#[derive(Clone)]
pub struct Wallet {
    key: SigningKey,
    address: Address,
}

impl Wallet {
    pub fn from_private_key(private_key: &str) -> Result<Self, WalletError> {
        let trimmed = private_key.trim();
        let raw = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);
        let bytes = hex::decode(raw)?;
        let key = SigningKey::from_slice(&bytes).map_err(|_| WalletError::InvalidKey)?;

        let public = key.verifying_key().to_encoded_point(false);
        let digest = keccak256(&public.as_bytes()[1..]);
        Ok(Self {
            key,
            address: Address::from_slice(&digest[12..]),
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn checksummed(&self) -> String {
        self.address.to_checksum(None)
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.key
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.checksummed())
            .finish_non_exhaustive()
    }
}

// A token balance as reported by `/api/status`: a number when the read
// worked, otherwise an inline `error(...)` string.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Balance {
    Amount(f64),
    Error(String),
}

impl Balance {
    pub fn failed(reason: impl fmt::Display) -> Self {
        Balance::Error(format!("error({reason})"))
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Balance::Amount(amount) => write!(f, "{amount}"),
            Balance::Error(message) => f.write_str(message),
        }
    }
}

pub fn parse_address(raw: &str) -> Result<Address, WalletError> {
    raw.trim()
        .parse::<Address>()
        .map_err(|_| WalletError::InvalidAddress(raw.to_string()))
}

fn hex_digits<'a>(raw: &'a str, field: &str) -> Result<&'a str, String> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .ok_or_else(|| format!("{field} must be 0x-prefixed hex"))?;
    if digits.is_empty() {
        return Err(format!("{field} returned no data"));
    }
    Ok(digits)
}

pub(crate) fn parse_word(raw: &str, field: &str) -> Result<U256, String> {
    let digits = hex_digits(raw, field)?;
    U256::from_str_radix(digits, 16).map_err(|error| format!("failed to parse {field}: {error}"))
}

pub(crate) fn parse_small_word(raw: &str, field: &str) -> Result<u8, String> {
    let digits = hex_digits(raw, field)?.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }
    u8::from_str_radix(digits, 16).map_err(|error| format!("failed to parse {field}: {error}"))
}

// raw / 10^decimals, rounded to four places
pub fn format_units(raw: U256, decimals: u8) -> Result<f64, String> {
    let digits = raw.to_string();
    let places = usize::from(decimals);
    let padded = format!("{digits:0>width$}", width = places + 1);
    let (whole, fraction) = padded.split_at(padded.len() - places);
    let value: f64 = format!("{whole}.{fraction}0")
        .parse()
        .map_err(|error| format!("failed to scale amount: {error}"))?;
    let scale = 10f64.powi(BALANCE_PLACES);
    Ok((value * scale).round() / scale)
}

// "5.25" with 18 decimals -> 5250000000000000000
pub fn parse_units(amount: &str, decimals: u8) -> Result<U256, String> {
    let trimmed = amount.trim();
    let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let places = usize::from(decimals);
    let valid = |part: &str| part.bytes().all(|byte| byte.is_ascii_digit());
    if (whole.is_empty() && fraction.is_empty()) || !valid(whole) || !valid(fraction) {
        return Err(format!("{amount} is not a decimal amount"));
    }
    if fraction.len() > places {
        return Err(format!("{amount} has more than {decimals} decimal places"));
    }
    let digits = format!("{whole}{fraction:0<places$}");
    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 10).map_err(|error| format!("{amount} is out of range: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_derived_from_private_key() {
        let wallet = Wallet::from_private_key(
            "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318",
        )
        .unwrap();
        assert_eq!(
            wallet.checksummed(),
            "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23"
        );
    }

    #[test]
    fn key_without_prefix_is_accepted() {
        let key = format!("{:0>64}", "1");
        let wallet = Wallet::from_private_key(&key).unwrap();
        assert_eq!(
            wallet.checksummed(),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
    }

    #[test]
    fn bad_keys_are_rejected() {
        assert!(matches!(
            Wallet::from_private_key("not-hex"),
            Err(WalletError::Hex(_))
        ));
        assert!(matches!(
            Wallet::from_private_key(&"0".repeat(64)),
            Err(WalletError::InvalidKey)
        ));
    }

    #[test]
    fn debug_output_hides_the_key() {
        let wallet = Wallet::from_private_key(&format!("{:0>64}", "1")).unwrap();
        let printed = format!("{wallet:?}");
        assert!(printed.contains("0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"));
        assert!(!printed.contains("SigningKey"));
    }

    #[test]
    fn units_are_scaled_and_rounded() {
        let raw = U256::from(1_234_567_890_000_000_000u128);
        assert_eq!(format_units(raw, 18).unwrap(), 1.2346);
        assert_eq!(format_units(U256::from(5u64), 0).unwrap(), 5.0);
        assert_eq!(format_units(U256::from(5u64), 2).unwrap(), 0.05);
        assert_eq!(format_units(U256::ZERO, 18).unwrap(), 0.0);
    }

    #[test]
    fn decimal_amounts_are_parsed_to_base_units() {
        assert_eq!(
            parse_units("5", 18).unwrap(),
            U256::from(5_000_000_000_000_000_000u128)
        );
        assert_eq!(parse_units("5.25", 2).unwrap(), U256::from(525u64));
        assert_eq!(parse_units("0.0", 6).unwrap(), U256::ZERO);
        assert!(parse_units("1.234", 2).is_err());
        assert!(parse_units("five", 18).is_err());
        assert!(parse_units(".", 18).is_err());
    }

    #[test]
    fn rpc_words_are_parsed() {
        let word = format!("0x{:0>64}", "de0b6b3a7640000");
        assert_eq!(
            parse_word(&word, "balanceOf").unwrap(),
            U256::from(1_000_000_000_000_000_000u128)
        );
        assert_eq!(parse_small_word(&format!("0x{:0>64}", "12"), "decimals").unwrap(), 18);
        assert!(parse_word("0x", "balanceOf").is_err());
        assert!(parse_small_word("12", "decimals").is_err());
    }

    #[test]
    fn balance_serializes_as_number_or_string() {
        assert_eq!(serde_json::to_string(&Balance::Amount(12.5)).unwrap(), "12.5");
        assert_eq!(
            serde_json::to_string(&Balance::failed("connection refused")).unwrap(),
            "\"error(connection refused)\""
        );
    }
}
