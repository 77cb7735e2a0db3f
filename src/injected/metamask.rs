//! Metamask wallet backend
//!
//! Metamask never hands out raw signatures for transactions: it signs and
//! broadcasts in one step. The signed payload is read back from the node
//! by transaction hash.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use tracing::info;

use super::{callback_result, detect, InjectedProvider, ProviderError};
use crate::core::config::WalletConfig;
use crate::core::defaults::metamask::{CANCEL_MSG_SIGN, CANCEL_TX_SIGN, PUBLIC_KEY_RECOVERY_MESSAGE};
use crate::core::errors::{Vendor, WalletError};
use crate::core::helpers::{failure_warning, warning};
use crate::core::lazy::LazyField;
use crate::core::messages::{message, Component, Kind, Operation};
use crate::core::normalizers::{address_normalizer, hex_sequence_normalizer, multiple_of_two_hex_normalizer};
use crate::core::types::{
    SignMessageRequest, SignTransactionRequest, SignerIdentity, VerifyMessageRequest, WalletSubtype,
};
use crate::core::validators::{address_validator, hex_sequence_validator, safe_integer_validator};
use crate::crypto::signature_utils::{public_key_hex, recover_public_key, verify_message_signature};
use crate::wallet::{GenericWallet, WalletBackend, WalletParts};

/// Options for [`open`].
#[derive(Debug, Clone)]
pub struct MetamaskOptions {
    /// Overrides the chain id reported by the provider.
    pub chain_id: Option<u64>,
    /// Used when neither the call nor the provider sets a chain id.
    pub default_chain_id: u64,
}

impl MetamaskOptions {
    pub fn from_config(config: &WalletConfig) -> Self {
        Self { chain_id: None, default_chain_id: config.default_chain_id }
    }
}

impl Default for MetamaskOptions {
    fn default() -> Self {
        Self::from_config(&WalletConfig::default())
    }
}

/// Maps a provider failure onto the cancellation or transport error.
fn translate_error(operation: Operation, cancel_message: &str, error: ProviderError) -> WalletError {
    if error.message.contains(cancel_message) {
        failure_warning(Component::Metamask, operation, Kind::UserCancel, &error.message);
        WalletError::VendorCancellation(message(Component::Metamask, operation, Kind::UserCancel).to_string())
    } else {
        failure_warning(Component::Metamask, operation, Kind::GenericError, &error.message);
        WalletError::transport(Vendor::Metamask, error)
    }
}

fn parse_address(field: &'static str, value: &str) -> Result<Address, WalletError> {
    address_validator(value)?;
    Address::from_str(&address_normalizer(value, false)).map_err(|e| WalletError::validation(field, e.to_string()))
}

/// Provider-facing transaction. The nonce is left to Metamask unless the
/// caller forced one.
fn provider_transaction(from: &str, request: &SignTransactionRequest) -> Result<TransactionRequest, WalletError> {
    let data = hex::decode(multiple_of_two_hex_normalizer(&request.input_data))?;
    let mut tx = TransactionRequest::new()
        .from(parse_address("from", from)?)
        .gas(request.gas_limit.as_u256())
        .gas_price(request.gas_price.as_u256())
        .value(request.value.as_u256())
        .data(Bytes::from(data))
        .chain_id(request.chain_id);
    if let Some(to) = &request.to {
        tx = tx.to(parse_address("to", to)?);
    }
    if let Some(nonce) = request.nonce {
        safe_integer_validator(nonce)?;
        warning(Component::Metamask, Operation::Sign, Kind::NonceOverride, &nonce.to_string());
        tx = tx.nonce(U256::from(nonce));
    }
    Ok(tx)
}

pub struct MetamaskBackend;

impl MetamaskBackend {
    async fn personal_sign(
        provider: &Arc<dyn InjectedProvider>,
        payload: &[u8],
        address: &str,
    ) -> Result<String, WalletError> {
        let message_hex = hex_sequence_normalizer(&hex::encode(payload), true);
        let address = address_normalizer(address, true);
        let signature = callback_result(|cb| provider.sign(message_hex, address, cb))
            .await
            .map_err(|e| translate_error(Operation::SignMessage, CANCEL_MSG_SIGN, e))?;
        hex_sequence_validator(&signature)?;
        Ok(hex_sequence_normalizer(&signature, true))
    }
}

fn address_identity(identity: &SignerIdentity) -> Result<&str, WalletError> {
    match identity {
        SignerIdentity::Address(address) => Ok(address.as_str()),
        SignerIdentity::DerivationPath(_) => Err(WalletError::validation("from", "is required")),
    }
}

#[async_trait]
impl WalletBackend for MetamaskBackend {
    fn subtype(&self) -> WalletSubtype {
        WalletSubtype::Metamask
    }

    async fn sign_transaction(&self, request: SignTransactionRequest) -> Result<String, WalletError> {
        let from = address_identity(&request.identity)?;
        let tx = provider_transaction(from, &request)?;
        let provider = detect()?;

        let hash = callback_result(|cb| provider.send_transaction(tx, cb))
            .await
            .map_err(|e| translate_error(Operation::Sign, CANCEL_TX_SIGN, e))?;
        hex_sequence_validator(&hash)?;
        let hash = hex_sequence_normalizer(&hash, true);

        let signed = callback_result(|cb| provider.get_transaction(hash.clone(), cb))
            .await
            .map_err(|e| translate_error(Operation::Sign, CANCEL_TX_SIGN, e))?
            .ok_or_else(|| {
                warning(Component::Metamask, Operation::Sign, Kind::GenericError, &hash);
                WalletError::transport(Vendor::Metamask, format!("Transaction {} not found", hash))
            })?;
        info!("✅ Metamask signed transaction {}", hash);
        Ok(format!("0x{}", hex::encode(signed.rlp())))
    }

    async fn sign_message(&self, request: SignMessageRequest) -> Result<String, WalletError> {
        let provider = detect()?;
        let address = address_identity(&request.identity)?;
        Self::personal_sign(&provider, &request.payload, address).await
    }

    async fn verify_message(&self, request: VerifyMessageRequest) -> Result<bool, WalletError> {
        verify_message_signature(request.message.as_bytes(), &request.signature, &request.address)
    }
}

/// Opens a wallet on the injected provider's selected account.
pub fn open(options: MetamaskOptions) -> Result<GenericWallet, WalletError> {
    let provider = detect()?;
    let selected = provider.selected_address().ok_or_else(|| {
        warning(Component::Metamask, Operation::Open, Kind::NotAvailable, "no selected address");
        WalletError::ProviderUnavailable(message(Component::Metamask, Operation::Open, Kind::NotAvailable).to_string())
    })?;
    address_validator(&selected)?;
    let address = address_normalizer(&selected, true);

    let public_key = {
        let address = address.clone();
        LazyField::new("publicKey", move || {
            let address = address.clone();
            async move {
                let provider = detect()?;
                let message = PUBLIC_KEY_RECOVERY_MESSAGE.as_bytes();
                let signature = MetamaskBackend::personal_sign(&provider, message, &address).await?;
                Ok::<_, WalletError>(public_key_hex(&recover_public_key(message, &signature)?))
            }
        })
    };

    info!("✅ Metamask wallet opened for {}", address);
    Ok(GenericWallet::new(WalletParts {
        backend: Arc::new(MetamaskBackend),
        address: LazyField::resolved("address", address),
        public_key,
        derivation_path: LazyField::unavailable("derivationPath"),
        other_addresses: LazyField::unavailable("otherAddresses"),
        chain_id: options.chain_id.or_else(|| provider.chain_id()),
        default_chain_id: options.default_chain_id,
    }))
}
