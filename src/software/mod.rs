//! Software wallet
//!
//! Keys live in process memory. Signing is delegated to a [`SigningCallback`];
//! [`LocalSigner`] is the stock callback built on an ethers `LocalWallet`.

mod signer;

pub use signer::{LocalSigner, SigningCallback};

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::core::config::WalletConfig;
use crate::core::errors::WalletError;
use crate::core::helpers::warning;
use crate::core::lazy::LazyField;
use crate::core::messages::{Component, Kind, Operation};
use crate::core::normalizers::{address_normalizer, hex_sequence_normalizer};
use crate::core::transaction::build_transaction;
use crate::core::types::{
    SignMessageRequest, SignTransactionRequest, VerifyMessageRequest, WalletSubtype,
};
use crate::crypto::signature_utils::verify_message_signature;
use crate::wallet::{GenericWallet, WalletBackend, WalletParts};

/// Options shared by the software constructors.
#[derive(Debug, Clone)]
pub struct SoftwareOptions {
    /// Chain id configured by the network provider, if any.
    pub chain_id: Option<u64>,
    pub default_chain_id: u64,
}

impl SoftwareOptions {
    pub fn from_config(config: &WalletConfig) -> Self {
        Self { chain_id: None, default_chain_id: config.default_chain_id }
    }
}

impl Default for SoftwareOptions {
    fn default() -> Self {
        Self::from_config(&WalletConfig::default())
    }
}

pub struct SoftwareBackend {
    callback: Arc<dyn SigningCallback>,
}

impl SoftwareBackend {
    pub fn new(callback: Arc<dyn SigningCallback>) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl WalletBackend for SoftwareBackend {
    fn subtype(&self) -> WalletSubtype {
        WalletSubtype::Software
    }

    async fn sign_transaction(&self, request: SignTransactionRequest) -> Result<String, WalletError> {
        let tx = build_transaction(&request)?;
        let signed = self.callback.sign_transaction(&tx).await.map_err(|e| {
            warning(Component::Software, Operation::Sign, Kind::GenericError, &e.to_string());
            e
        })?;
        Ok(hex_sequence_normalizer(&signed, true))
    }

    async fn sign_message(&self, request: SignMessageRequest) -> Result<String, WalletError> {
        let signature = self.callback.sign_message(&request.payload).await.map_err(|e| {
            warning(Component::Software, Operation::SignMessage, Kind::GenericError, &e.to_string());
            e
        })?;
        Ok(hex_sequence_normalizer(&signature, true))
    }

    async fn verify_message(&self, request: VerifyMessageRequest) -> Result<bool, WalletError> {
        verify_message_signature(request.message.as_bytes(), &request.signature, &request.address)
    }
}

/// Wraps any signing callback into a software wallet.
pub fn open(callback: Arc<dyn SigningCallback>, options: SoftwareOptions) -> GenericWallet {
    let address = {
        let callback = callback.clone();
        LazyField::new("address", move || {
            let callback = callback.clone();
            async move { Ok::<_, WalletError>(address_normalizer(&callback.address().await?, true)) }
        })
    };
    let public_key = {
        let callback = callback.clone();
        LazyField::new("publicKey", move || {
            let callback = callback.clone();
            async move { callback.public_key().await }
        })
    };
    let derivation_path = match callback.derivation_path() {
        Some(path) => LazyField::resolved("derivationPath", path),
        None => LazyField::unavailable("derivationPath"),
    };

    debug!("opening software wallet");
    GenericWallet::new(WalletParts {
        backend: Arc::new(SoftwareBackend::new(callback)),
        address,
        public_key,
        derivation_path,
        other_addresses: LazyField::unavailable("otherAddresses"),
        chain_id: options.chain_id,
        default_chain_id: options.default_chain_id,
    })
}

pub fn open_with_private_key(private_key: &str, options: SoftwareOptions) -> Result<GenericWallet, WalletError> {
    let signer = LocalSigner::from_private_key(private_key)?;
    info!("✅ Software wallet opened from private key");
    Ok(open(Arc::new(signer), options))
}

pub fn open_with_mnemonic(
    phrase: &str,
    derivation_path: &str,
    options: SoftwareOptions,
) -> Result<GenericWallet, WalletError> {
    let signer = LocalSigner::from_mnemonic(phrase, derivation_path)?;
    info!("✅ Software wallet opened from mnemonic");
    Ok(open(Arc::new(signer), options))
}
