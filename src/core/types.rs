//! Wallet identity tags and the argument objects passed through the pipeline.

use serde::{Deserialize, Serialize};

use super::big_number::BigNumber;

/// Top-level wallet kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletType {
    Software,
    Hardware,
}

/// Concrete backend the wallet is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WalletSubtype {
    /// Keystore / private key / mnemonic held in memory.
    Software,
    Trezor,
    Ledger,
    /// Browser-injected provider.
    Metamask,
}

impl WalletSubtype {
    pub fn wallet_type(&self) -> WalletType {
        match self {
            WalletSubtype::Trezor | WalletSubtype::Ledger => WalletType::Hardware,
            WalletSubtype::Software | WalletSubtype::Metamask => WalletType::Software,
        }
    }
}

/// Structured form of a derivation path. Trailing segments are optional so
/// account-level roots (`m/44'/60'/0'/0`) round-trip too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DerivationPathObject {
    pub purpose: Option<u32>,
    pub coin_type: Option<u32>,
    pub account: Option<u32>,
    pub change: Option<u32>,
    pub address_index: Option<u32>,
}

/// Transaction fields accepted by `sign`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionObject {
    pub chain_id: Option<u64>,
    pub gas_price: Option<BigNumber>,
    pub gas_limit: Option<BigNumber>,
    pub nonce: Option<u64>,
    /// Absent for contract deployments.
    pub to: Option<String>,
    pub value: Option<BigNumber>,
    pub input_data: Option<String>,
}

/// Arguments for `sign_message`: either a UTF-8 message or raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SignMessageArgs {
    pub message: Option<String>,
    pub message_data: Option<Vec<u8>>,
}

impl SignMessageArgs {
    pub fn message(message: impl Into<String>) -> Self {
        Self { message: Some(message.into()), message_data: None }
    }

    pub fn data(data: impl Into<Vec<u8>>) -> Self {
        Self { message: None, message_data: Some(data.into()) }
    }
}

/// Arguments for `verify_message`. `address` defaults to the wallet's own.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VerifyMessageArgs {
    pub message: String,
    pub signature: String,
    pub address: Option<String>,
}

/// Who is signing: hardware backends need the path, the others the address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerIdentity {
    DerivationPath(String),
    Address(String),
}

/// Validated transaction handed to a backend, `chain_id` already resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignTransactionRequest {
    pub identity: SignerIdentity,
    pub chain_id: u64,
    pub gas_price: BigNumber,
    pub gas_limit: BigNumber,
    pub nonce: Option<u64>,
    /// Lowercase, prefixed.
    pub to: Option<String>,
    pub value: BigNumber,
    /// Prefixed hex, `0x` when empty.
    pub input_data: String,
}

/// Validated message handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignMessageRequest {
    pub identity: SignerIdentity,
    /// Bytes to sign. UTF-8 messages are passed through as their bytes.
    pub payload: Vec<u8>,
}

/// Validated verification request handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyMessageRequest {
    pub message: String,
    /// Prefixed hex.
    pub signature: String,
    /// Lowercase, prefixed.
    pub address: String,
    pub public_key: Option<String>,
}
