//! Ledger 硬件wallet集成
//!
//! 每次操作都通过 [`LedgerConnector::connect`] 打开一个新的以太坊应用会话。
//! 设备不支持验签，消息验证在本地通过签名恢复完成。
//!
//! 启用 `ledger` feature 后提供基于 USB HID 的参考连接器 [`HidLedgerConnector`]。

#[cfg(feature = "ledger")]
pub mod apdu;
#[cfg(feature = "ledger")]
pub mod device;
#[cfg(feature = "ledger")]
pub mod transport;

#[cfg(feature = "ledger")]
pub use device::HidLedgerConnector;
#[cfg(feature = "ledger")]
pub use transport::LedgerTransport;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::info;

use crate::core::defaults::ledger::SW_DENIED_BY_USER;
use crate::core::errors::{Vendor, WalletError};
use crate::core::helpers::{failure_warning, join_signature, warning};
use crate::core::messages::{message, Component, Kind, Operation};
use crate::core::normalizers::{hex_sequence_normalizer, recovery_param_normalizer};
use crate::core::transaction::{build_transaction, signed_rlp_hex, unsigned_rlp_hex};
use crate::core::types::{
    SignMessageRequest, SignTransactionRequest, SignerIdentity, VerifyMessageRequest, WalletSubtype,
};
use crate::crypto::signature_utils::{parse_public_key, recover_public_key, verify_message_signature};
use crate::wallet::{GenericWallet, HardwareAccount, WalletBackend};

use super::OpenOptions;

/// Failure reported by the Ledger Ethereum app or its transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Ledger failure{}: {message}", .status.map(|sw| format!(" ({:04X})", sw)).unwrap_or_default())]
pub struct LedgerFailure {
    /// APDU status word, absent for transport-level failures.
    pub status: Option<u16>,
    pub message: String,
}

impl LedgerFailure {
    pub fn new(status: Option<u16>, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    pub fn is_cancellation(&self) -> bool {
        self.status == Some(SW_DENIED_BY_USER)
    }
}

/// `getAddress` response. Hex values carry no `0x` tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAddress {
    pub public_key: String,
    pub address: String,
    pub chain_code: Option<String>,
}

/// `{r, s, v}` as sent by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerSignature {
    pub r: String,
    pub s: String,
    pub v: Value,
}

/// 以太坊应用会话
#[async_trait]
pub trait LedgerSession: Send + Sync {
    async fn get_address(
        &self,
        path: &str,
        display: bool,
        chain_code: bool,
    ) -> Result<LedgerAddress, LedgerFailure>;

    /// Signs an unsigned RLP-encoded transaction (hex, no tag).
    async fn sign_transaction(&self, path: &str, raw_tx_hex: &str) -> Result<LedgerSignature, LedgerFailure>;

    async fn sign_personal_message(&self, path: &str, message_hex: &str) -> Result<LedgerSignature, LedgerFailure>;
}

/// Ledger 设备连接
#[async_trait]
pub trait LedgerConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn LedgerSession>, LedgerFailure>;
}

fn translate_failure(operation: Operation, failure: LedgerFailure) -> WalletError {
    if failure.is_cancellation() {
        failure_warning(Component::Ledger, operation, Kind::UserCancel, &failure.message);
        WalletError::VendorCancellation(message(Component::Ledger, operation, Kind::UserCancel).to_string())
    } else {
        failure_warning(Component::Ledger, operation, Kind::GenericError, &failure.message);
        WalletError::transport(Vendor::Ledger, failure)
    }
}

fn derivation_path(identity: &SignerIdentity) -> Result<&str, WalletError> {
    match identity {
        SignerIdentity::DerivationPath(path) => Ok(path.as_str()),
        SignerIdentity::Address(_) => Err(WalletError::validation("derivationPath", "is required")),
    }
}

/// Ledger wallet backend
pub struct LedgerBackend {
    connector: Arc<dyn LedgerConnector>,
}

impl LedgerBackend {
    pub fn new(connector: Arc<dyn LedgerConnector>) -> Self {
        Self { connector }
    }

    async fn session(&self, operation: Operation) -> Result<Box<dyn LedgerSession>, WalletError> {
        self.connector
            .connect()
            .await
            .map_err(|failure| translate_failure(operation, failure))
    }
}

#[async_trait]
impl WalletBackend for LedgerBackend {
    fn subtype(&self) -> WalletSubtype {
        WalletSubtype::Ledger
    }

    async fn sign_transaction(&self, request: SignTransactionRequest) -> Result<String, WalletError> {
        let path = derivation_path(&request.identity)?;
        let tx = build_transaction(&request)?;
        let raw_tx = hex_sequence_normalizer(&unsigned_rlp_hex(&tx), false);

        let session = self.session(Operation::Sign).await?;
        warning(Component::Ledger, Operation::Sign, Kind::ConfirmOnDevice, path);
        let signature = session
            .sign_transaction(path, &raw_tx)
            .await
            .map_err(|failure| translate_failure(Operation::Sign, failure))?;

        let v = recovery_param_normalizer(&signature.v)?;
        info!("✅ Ledger signed transaction, chain id {}", request.chain_id);
        signed_rlp_hex(&tx, &signature.r, &signature.s, v)
    }

    async fn sign_message(&self, request: SignMessageRequest) -> Result<String, WalletError> {
        let path = derivation_path(&request.identity)?;
        let session = self.session(Operation::SignMessage).await?;
        warning(Component::Ledger, Operation::SignMessage, Kind::ConfirmOnDevice, path);
        let signature = session
            .sign_personal_message(path, &hex::encode(&request.payload))
            .await
            .map_err(|failure| translate_failure(Operation::SignMessage, failure))?;

        info!("✅ Ledger signed message");
        join_signature(&signature.r, &signature.s, &signature.v)
    }

    fn verifies_with_public_key(&self) -> bool {
        true
    }

    /// The device cannot verify, so the signer is recovered locally and
    /// compared against the wallet's public key, or its address when the
    /// key is unknown.
    async fn verify_message(&self, request: VerifyMessageRequest) -> Result<bool, WalletError> {
        match &request.public_key {
            Some(public_key) => {
                let recovered = recover_public_key(request.message.as_bytes(), &request.signature)?;
                Ok(recovered == parse_public_key(public_key)?)
            }
            None => verify_message_signature(request.message.as_bytes(), &request.signature, &request.address),
        }
    }
}

/// Exports the account public key and chain code from the Ledger and opens
/// a wallet on top of them.
pub async fn open(connector: Arc<dyn LedgerConnector>, options: OpenOptions) -> Result<GenericWallet, WalletError> {
    let backend = LedgerBackend::new(connector);
    let session = backend.session(Operation::Open).await?;
    let exported = session
        .get_address(&options.root_derivation_path, false, true)
        .await
        .map_err(|failure| translate_failure(Operation::Open, failure))?;
    let chain_code = exported.chain_code.ok_or_else(|| {
        warning(Component::Ledger, Operation::Open, Kind::GenericError, "missing chain code");
        WalletError::Crypto(message(Component::Ledger, Operation::Open, Kind::GenericError).to_string())
    })?;
    info!("✅ Ledger account exported for {}", options.root_derivation_path);

    GenericWallet::hardware(
        Arc::new(backend),
        HardwareAccount {
            root_derivation_path: options.root_derivation_path,
            public_key: exported.public_key,
            chain_code,
        },
        options.wallet,
    )
}
