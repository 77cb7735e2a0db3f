//! Trezor 硬件wallet集成
//!
//! 钱包通过 [`TrezorConnector`] 与 Trezor 服务通信：每个请求是一个带操作类型
//! 和最低固件版本的 payload，响应在用户于设备上确认后返回。
//!
//! 启用 `trezor` feature 后提供基于 USB HID 的参考连接器 [`HidTrezorConnector`]。

pub mod helpers;
pub mod messages;
pub mod payloads;

#[cfg(feature = "trezor")]
pub mod device;
#[cfg(feature = "trezor")]
pub mod transport;

#[cfg(feature = "trezor")]
pub use device::HidTrezorConnector;
#[cfg(feature = "trezor")]
pub use transport::TrezorTransport;

pub use helpers::{window_features_serializer, TrezorFailure};

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use crate::core::errors::WalletError;
use crate::core::helpers::warning;
use crate::core::messages::{message, Component, Kind, Operation};
use crate::core::normalizers::{
    address_normalizer, hex_sequence_normalizer, multiple_of_two_hex_normalizer, recovery_param_normalizer,
};
use crate::core::transaction::{build_transaction, signed_rlp_hex};
use crate::core::types::{
    SignMessageRequest, SignTransactionRequest, SignerIdentity, VerifyMessageRequest, WalletSubtype,
};
use crate::wallet::{GenericWallet, HardwareAccount, WalletBackend};

use self::helpers::translate_failure;
use self::payloads::{
    MessageSignatureResponse, PublicKeyResponse, SignatureComponents, TrezorParams, TrezorPayload,
    PAYLOAD_SIGNMSG, PAYLOAD_SIGNTX, PAYLOAD_VERIFYMSG, PAYLOAD_XPUB,
};
use super::OpenOptions;

/// Trezor 服务连接
#[async_trait]
pub trait TrezorConnector: Send + Sync {
    /// Sends one payload and waits for the service's response.
    async fn payload_listener(&self, payload: TrezorPayload) -> Result<Value, TrezorFailure>;
}

/// Trezor wallet backend
pub struct TrezorBackend {
    connector: Arc<dyn TrezorConnector>,
    required_firmware: Option<String>,
}

impl TrezorBackend {
    pub fn new(connector: Arc<dyn TrezorConnector>, required_firmware: Option<String>) -> Self {
        Self { connector, required_firmware }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        operation: Operation,
        payload_type: payloads::PayloadType,
        params: TrezorParams,
    ) -> Result<T, WalletError> {
        let payload = TrezorPayload::new(payload_type, self.required_firmware.as_deref(), params);
        let response = self
            .connector
            .payload_listener(payload)
            .await
            .map_err(|failure| translate_failure(operation, failure))?;
        Ok(serde_json::from_value(response)?)
    }
}

fn derivation_path(identity: &SignerIdentity) -> Result<String, WalletError> {
    match identity {
        SignerIdentity::DerivationPath(path) => Ok(path.clone()),
        SignerIdentity::Address(_) => Err(WalletError::validation("derivationPath", "is required")),
    }
}

#[async_trait]
impl WalletBackend for TrezorBackend {
    fn subtype(&self) -> WalletSubtype {
        WalletSubtype::Trezor
    }

    async fn sign_transaction(&self, request: SignTransactionRequest) -> Result<String, WalletError> {
        if request.to.is_none() && hex_sequence_normalizer(&request.input_data, false).is_empty() {
            return Err(WalletError::validation(
                "inputData",
                message(Component::Trezor, Operation::Sign, Kind::ContractDeployment),
            ));
        }
        let tx = build_transaction(&request)?;
        let params = TrezorParams::SignTransaction {
            path: derivation_path(&request.identity)?,
            nonce: multiple_of_two_hex_normalizer(&format!("{:x}", request.nonce.unwrap_or_default())),
            gas_price: multiple_of_two_hex_normalizer(&request.gas_price.to_hex_string()),
            gas_limit: multiple_of_two_hex_normalizer(&request.gas_limit.to_hex_string()),
            to: request.to.as_deref().map(|to| address_normalizer(to, false)),
            value: multiple_of_two_hex_normalizer(&request.value.to_hex_string()),
            data: hex_sequence_normalizer(&request.input_data, false),
            chain_id: request.chain_id,
        };

        let signature: SignatureComponents = self.call(Operation::Sign, PAYLOAD_SIGNTX, params).await?;
        let v = recovery_param_normalizer(&signature.v)?;
        info!("✅ Trezor signed transaction, chain id {}", request.chain_id);
        signed_rlp_hex(&tx, &signature.r, &signature.s, v)
    }

    async fn sign_message(&self, request: SignMessageRequest) -> Result<String, WalletError> {
        let params = TrezorParams::SignMessage {
            path: derivation_path(&request.identity)?,
            message: hex::encode(&request.payload),
            hex: true,
        };
        let response: MessageSignatureResponse =
            self.call(Operation::SignMessage, PAYLOAD_SIGNMSG, params).await?;
        info!("✅ Trezor signed message for {}", address_normalizer(&response.address, true));
        Ok(hex_sequence_normalizer(&response.signature, true))
    }

    async fn verify_message(&self, request: VerifyMessageRequest) -> Result<bool, WalletError> {
        let params = TrezorParams::VerifyMessage {
            address: address_normalizer(&request.address, false),
            message: request.message,
            signature: hex_sequence_normalizer(&request.signature, false),
        };
        let response: Value = self.call(Operation::VerifyMessage, PAYLOAD_VERIFYMSG, params).await?;
        let valid = match &response {
            Value::Bool(valid) => *valid,
            other => other.get("success").and_then(Value::as_bool).unwrap_or(false),
        };
        if !valid {
            return Err(WalletError::Crypto(
                message(Component::Trezor, Operation::VerifyMessage, Kind::SignatureInvalid).to_string(),
            ));
        }
        warning(Component::Trezor, Operation::VerifyMessage, Kind::ProprietarySignature, &request.address);
        Ok(true)
    }
}

/// Exports the account public key from the Trezor service and opens a wallet
/// on top of it.
pub async fn open(connector: Arc<dyn TrezorConnector>, options: OpenOptions) -> Result<GenericWallet, WalletError> {
    let backend = TrezorBackend::new(connector, options.required_firmware.clone());
    let response: PublicKeyResponse = backend
        .call(
            Operation::Open,
            PAYLOAD_XPUB,
            TrezorParams::ExportPublicKey { path: options.root_derivation_path.clone() },
        )
        .await?;
    info!("✅ Trezor account exported for {}", options.root_derivation_path);

    GenericWallet::hardware(
        Arc::new(backend),
        HardwareAccount {
            root_derivation_path: options.root_derivation_path,
            public_key: response.public_key,
            chain_code: response.chain_code,
        },
        options.wallet,
    )
}
