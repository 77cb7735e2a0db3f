//! 硬件wallet集成模块
//!
//! 此模块提供与硬件wallet（Trezor, Ledger）的集成。两种设备都只导出账户级公钥
//! 和 chain code，具体地址在本地派生。

pub mod ledger;
pub mod trezor;

use crate::core::config::{root_derivation_path, WalletConfig};
use crate::core::defaults::derivation_path::{DELIMITER, HARDENED_MARK, HARDENED_OFFSET, HEADER_KEY};
use crate::core::errors::WalletError;
use crate::wallet::HardwareOptions;

/// Options for opening a hardware wallet.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    /// Account-level path exported from the device.
    pub root_derivation_path: String,
    /// Firmware floor sent to the Trezor service; `None` keeps the default.
    pub required_firmware: Option<String>,
    /// Ledger HID read timeout (seconds).
    pub timeout_secs: u64,
    pub wallet: HardwareOptions,
}

impl OpenOptions {
    pub fn from_config(config: &WalletConfig) -> Self {
        Self {
            root_derivation_path: config.root_derivation_path.clone(),
            required_firmware: Some(config.trezor.required_firmware.clone()),
            timeout_secs: config.ledger.timeout_secs,
            wallet: HardwareOptions::from_config(config),
        }
    }

    /// Switches to the testnet coin type (`m/44'/1'/0'/0`).
    pub fn testnet(mut self) -> Self {
        self.root_derivation_path = root_derivation_path(true);
        self
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.wallet.chain_id = Some(chain_id);
        self
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::from_config(&WalletConfig::default())
    }
}

/// Parses `m/44'/60'/0'/0/0` into BIP32 indices.
pub fn parse_bip32_path(path: &str) -> Result<Vec<u32>, WalletError> {
    let mut segments = path.split(DELIMITER);
    if segments.next() != Some(HEADER_KEY) {
        return Err(WalletError::Normalization(format!("Invalid derivation path: {}", path)));
    }
    segments
        .map(|segment| {
            let (number, hardened) = match segment.strip_suffix(HARDENED_MARK) {
                Some(number) => (number, true),
                None => (segment, false),
            };
            let index: u32 = number
                .parse()
                .map_err(|_| WalletError::Normalization(format!("Invalid path segment: {}", segment)))?;
            Ok(if hardened { index | HARDENED_OFFSET } else { index })
        })
        .collect()
}
