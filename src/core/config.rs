use serde::{Deserialize, Serialize};
use std::path::Path;

use super::defaults::{derivation_path, trezor, DEFAULT_ADDRESS_COUNT, DEFAULT_CHAIN_ID};
use super::errors::WalletError;
use super::normalizers::derivation_path_normalizer;

/// Trezor service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrezorConfig {
    /// Minimum firmware sent along with every payload
    #[serde(default = "TrezorConfig::default_required_firmware")]
    pub required_firmware: String,
}

impl TrezorConfig {
    fn default_required_firmware() -> String { trezor::FIRMWARE_MIN.to_string() }
}

impl Default for TrezorConfig {
    fn default() -> Self {
        Self { required_firmware: Self::default_required_firmware() }
    }
}

/// Ledger transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// HID read timeout (seconds)
    #[serde(default = "LedgerConfig::default_timeout_secs")]
    pub timeout_secs: u64,
}

impl LedgerConfig {
    fn default_timeout_secs() -> u64 { 30 }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { timeout_secs: Self::default_timeout_secs() }
    }
}

/// wallet配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Chain id used when neither the call nor the provider sets one
    #[serde(default = "WalletConfig::default_chain_id")]
    pub default_chain_id: u64,

    /// Number of addresses derived from a hardware wallet's root key
    #[serde(default = "WalletConfig::default_address_count")]
    pub address_count: usize,

    /// Account-level path exported from hardware wallets
    #[serde(default = "WalletConfig::default_root_derivation_path")]
    pub root_derivation_path: String,

    #[serde(default)]
    pub trezor: TrezorConfig,

    #[serde(default)]
    pub ledger: LedgerConfig,
}

impl WalletConfig {
    fn default_chain_id() -> u64 { DEFAULT_CHAIN_ID }
    fn default_address_count() -> usize { DEFAULT_ADDRESS_COUNT }
    fn default_root_derivation_path() -> String { root_derivation_path(false) }

    /// Parses a TOML document; missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, WalletError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| WalletError::Config(format!("Invalid wallet config: {}", e)))?;
        config.validated()
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            WalletError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Applies `WALLET_CHAIN_ID`, `WALLET_ADDRESS_COUNT` and
    /// `WALLET_ROOT_DERIVATION_PATH` on top of `self`.
    pub fn with_env_overrides(mut self) -> Result<Self, WalletError> {
        if let Ok(chain_id) = std::env::var("WALLET_CHAIN_ID") {
            self.default_chain_id = chain_id
                .parse()
                .map_err(|_| WalletError::Config(format!("Invalid WALLET_CHAIN_ID: {}", chain_id)))?;
        }
        if let Ok(count) = std::env::var("WALLET_ADDRESS_COUNT") {
            self.address_count = count
                .parse()
                .map_err(|_| WalletError::Config(format!("Invalid WALLET_ADDRESS_COUNT: {}", count)))?;
        }
        if let Ok(path) = std::env::var("WALLET_ROOT_DERIVATION_PATH") {
            self.root_derivation_path = path;
        }
        self.validated()
    }

    fn validated(mut self) -> Result<Self, WalletError> {
        if self.address_count == 0 {
            return Err(WalletError::Config("address_count must be at least 1".to_string()));
        }
        self.root_derivation_path = derivation_path_normalizer(&self.root_derivation_path)
            .map_err(|e| WalletError::Config(e.to_string()))?;
        Ok(self)
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            default_chain_id: Self::default_chain_id(),
            address_count: Self::default_address_count(),
            root_derivation_path: Self::default_root_derivation_path(),
            trezor: TrezorConfig::default(),
            ledger: LedgerConfig::default(),
        }
    }
}

/// Account-level root `m/44'/60'/0'/0`, coin type 1 on testnets.
pub fn root_derivation_path(testnet: bool) -> String {
    let coin_type = if testnet { derivation_path::COIN_TESTNET } else { derivation_path::COIN_MAINNET };
    format!(
        "{header}{d}{purpose}{h}{d}{coin_type}{h}{d}{account}{h}{d}{change}",
        header = derivation_path::HEADER_KEY,
        d = derivation_path::DELIMITER,
        h = derivation_path::HARDENED_MARK,
        purpose = derivation_path::PURPOSE,
        account = derivation_path::ACCOUNT,
        change = derivation_path::CHANGE,
    )
}
