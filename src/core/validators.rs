//! Pure predicates over single values.
//!
//! Every validator either confirms the value or fails with
//! [`WalletError::Validation`] naming the offending field. None of them
//! mutate their input or perform I/O.

use std::any::Any;

use once_cell::sync::Lazy;
use regex::Regex;
use sha3::{Digest, Keccak256};

use super::big_number::BigNumber;
use super::defaults::{derivation_path as path, ADDRESS_LENGTH, HEX_PREFIX, MAX_SAFE_INTEGER};
use super::errors::WalletError;

static HEX_SEQUENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:0x)?[0-9a-fA-F]*$").expect("Hardcoded regex should always compile"));

static ADDRESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:0x)?[0-9a-fA-F]{40}$").expect("Hardcoded regex should always compile"));

/// Validates an address: 20 bytes of hex, prefix optional. Mixed-case input
/// must carry a valid EIP-55 checksum; all-lower or all-upper is accepted.
pub fn address_validator(address: &str) -> Result<(), WalletError> {
    if !ADDRESS.is_match(address) {
        return Err(WalletError::validation(
            "address",
            format!("`{}` is not a {} byte hex address", address, ADDRESS_LENGTH),
        ));
    }
    let body = address.strip_prefix(HEX_PREFIX).unwrap_or(address);
    let is_all_lower = !body.chars().any(|c| c.is_ascii_uppercase());
    let is_all_upper = !body.chars().any(|c| c.is_ascii_lowercase());
    if is_all_lower || is_all_upper {
        return Ok(());
    }
    if !is_eip55_checksum_valid(body) {
        return Err(WalletError::validation(
            "address",
            format!("`{}` has an invalid EIP-55 checksum", address),
        ));
    }
    Ok(())
}

fn is_eip55_checksum_valid(body: &str) -> bool {
    let hash = Keccak256::digest(body.to_lowercase().as_bytes());
    body.chars().enumerate().all(|(i, ch)| {
        let nibble = (hash[i / 2] >> (4 * (1 - (i % 2)))) & 0x0f;
        match ch {
            'a'..='f' => nibble < 8,
            'A'..='F' => nibble >= 8,
            _ => true,
        }
    })
}

/// Validates a hex sequence. The prefix is optional, the body may be empty.
pub fn hex_sequence_validator(value: &str) -> Result<(), WalletError> {
    if !HEX_SEQUENCE.is_match(value) {
        return Err(WalletError::validation(
            "hexSequence",
            format!("`{}` contains non-hex characters", value),
        ));
    }
    Ok(())
}

/// Passes only for [`BigNumber`] instances. Numeric-looking integers and
/// strings fail, even when they would parse.
pub fn big_number_validator(value: &dyn Any) -> Result<(), WalletError> {
    if value.downcast_ref::<BigNumber>().is_some() {
        return Ok(());
    }
    Err(WalletError::validation("bigNumber", "value is not a BigNumber instance"))
}

/// Integers a JSON double represents exactly.
pub fn safe_integer_validator(value: u64) -> Result<(), WalletError> {
    if value > MAX_SAFE_INTEGER {
        return Err(WalletError::validation(
            "safeInteger",
            format!("{} is above {}", value, MAX_SAFE_INTEGER),
        ));
    }
    Ok(())
}

/// Validates the derivation path grammar: header `m`, up to five numeric
/// segments, the first three hardened.
pub fn derivation_path_validator(value: &str) -> Result<(), WalletError> {
    let invalid = |reason: String| WalletError::validation("derivationPath", reason);

    let mut segments = value.split(path::DELIMITER);
    if segments.next() != Some(path::HEADER_KEY) {
        return Err(invalid(format!("`{}` must start with `{}/`", value, path::HEADER_KEY)));
    }
    let segments: Vec<&str> = segments.collect();
    if segments.is_empty() || segments.len() > path::MAX_SEGMENTS {
        return Err(invalid(format!(
            "`{}` must have between 1 and {} segments",
            value,
            path::MAX_SEGMENTS
        )));
    }
    for (position, segment) in segments.iter().enumerate() {
        let hardened = segment.ends_with(path::HARDENED_MARK);
        let digits = segment.trim_end_matches(path::HARDENED_MARK);
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid(format!("segment `{}` is not a number", segment)));
        }
        if digits.parse::<u32>().map_or(true, |n| n >= path::HARDENED_OFFSET) {
            return Err(invalid(format!("segment `{}` is out of range", segment)));
        }
        if position < path::HARDENED_SEGMENTS && !hardened {
            return Err(invalid(format!("segment `{}` must be hardened", segment)));
        }
        if position >= path::HARDENED_SEGMENTS && hardened {
            return Err(invalid(format!("segment `{}` must not be hardened", segment)));
        }
    }
    Ok(())
}

/// Raw message payloads must carry at least one byte.
pub fn message_data_validator(data: &[u8]) -> Result<(), WalletError> {
    if data.is_empty() {
        return Err(WalletError::validation("messageData", "payload is empty"));
    }
    Ok(())
}
