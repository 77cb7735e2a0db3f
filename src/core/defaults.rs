//! Shared constants used across validators, normalizers and backends.

/// Prefix tag carried by every canonical hex sequence.
pub const HEX_PREFIX: &str = "0x";

/// Address width in bytes.
pub const ADDRESS_LENGTH: usize = 20;

/// Chain id used when neither the caller nor the wallet configured one.
pub const DEFAULT_CHAIN_ID: u64 = 1;

/// Largest integer a JSON double can hold without loss (2^53 - 1).
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// Number of hardware addresses derived when the caller does not ask for more.
pub const DEFAULT_ADDRESS_COUNT: usize = 10;

/// Derivation path grammar: `m/44'/60'/0'/0/0`.
pub mod derivation_path {
    pub const HEADER_KEY: &str = "m";
    pub const DELIMITER: char = '/';
    pub const HARDENED_MARK: char = '\'';
    pub const PURPOSE: u32 = 44;
    pub const COIN_MAINNET: u32 = 60;
    pub const COIN_TESTNET: u32 = 1;
    pub const ACCOUNT: u32 = 0;
    pub const CHANGE: u32 = 0;
    pub const INDEX: u32 = 0;
    /// Segments that must carry the hardened mark.
    pub const HARDENED_SEGMENTS: usize = 3;
    pub const MAX_SEGMENTS: usize = 5;
    /// Bit set on hardened BIP32 indices.
    pub const HARDENED_OFFSET: u32 = 0x8000_0000;
}

/// Signature constants.
pub mod signature {
    /// Recovery param `0` maps to this marker.
    pub const RECOVERY_ODD: u64 = 27;
    /// Recovery param `1` maps to this marker.
    pub const RECOVERY_EVEN: u64 = 28;
    /// `r || s || v` byte length.
    pub const LENGTH: usize = 65;
}

/// Metamask replies with these messages when the user closes the popup.
pub mod metamask {
    pub const CANCEL_MSG_SIGN: &str = "User denied message signature";
    pub const CANCEL_TX_SIGN: &str = "User denied transaction signature";
    /// Signed once so the account public key can be recovered.
    pub const PUBLIC_KEY_RECOVERY_MESSAGE: &str =
        "Please sign this message so that we can recover your public key";
}

/// Trezor service constraints.
pub mod trezor {
    pub const FIRMWARE_MIN: &str = "1.5.2";
    /// `Failure.code` values meaning the user backed out.
    pub const FAILURE_ACTION_CANCELLED: u32 = 4;
    pub const FAILURE_PIN_CANCELLED: u32 = 6;
}

/// Ledger status words.
pub mod ledger {
    pub const SW_OK: u16 = 0x9000;
    /// "Conditions of use not satisfied", what the Ethereum app replies on reject.
    pub const SW_DENIED_BY_USER: u16 = 0x6985;
}
