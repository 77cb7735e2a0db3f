//! Generic wallet entity
//!
//! One [`GenericWallet`] type serves every wallet kind. The backend is bound
//! once at construction; identity fields resolve lazily and are memoized.

mod backend;

pub use backend::WalletBackend;

use std::sync::Arc;

use tracing::{debug, info};

use crate::core::config::WalletConfig;
use crate::core::errors::WalletError;
use crate::core::helpers::{
    message_or_data_validator, message_verification_object_validator, transaction_object_validator,
    transaction_request, warning,
};
use crate::core::lazy::LazyField;
use crate::core::messages::{Component, Kind, Operation};
use crate::core::normalizers::{
    address_normalizer, derivation_path_normalizer, derivation_path_to_object, hex_sequence_normalizer,
};
use crate::core::types::{
    SignMessageArgs, SignMessageRequest, SignerIdentity, TransactionObject, VerifyMessageArgs,
    VerifyMessageRequest, WalletSubtype, WalletType,
};
use crate::crypto::derivation::{DerivedAddress, ExtendedPublicKey};
use crate::crypto::signature_utils::{address_from_public_key, public_key_hex};

/// Account material exported once from a hardware device.
#[derive(Debug, Clone)]
pub struct HardwareAccount {
    /// Account-level path the key was exported for, e.g. `m/44'/60'/0'/0`.
    pub root_derivation_path: String,
    pub public_key: String,
    pub chain_code: String,
}

#[derive(Debug, Clone)]
pub struct HardwareOptions {
    pub address_count: usize,
    /// Which derived address the wallet signs with.
    pub address_index: u32,
    /// Chain id configured by the network provider, if any.
    pub chain_id: Option<u64>,
    /// Used when neither the call nor the provider sets a chain id.
    pub default_chain_id: u64,
}

impl Default for HardwareOptions {
    fn default() -> Self {
        Self::from_config(&WalletConfig::default())
    }
}

impl HardwareOptions {
    /// Takes the address count and fallback chain id from `config`. The
    /// provider chain id stays unset.
    pub fn from_config(config: &WalletConfig) -> Self {
        Self {
            address_count: config.address_count,
            address_index: 0,
            chain_id: None,
            default_chain_id: config.default_chain_id,
        }
    }
}

/// Identity fields and backend of a wallet under construction.
pub struct WalletParts {
    pub backend: Arc<dyn WalletBackend>,
    pub address: LazyField<String>,
    pub public_key: LazyField<String>,
    pub derivation_path: LazyField<String>,
    pub other_addresses: LazyField<Vec<DerivedAddress>>,
    pub chain_id: Option<u64>,
    pub default_chain_id: u64,
}

pub struct GenericWallet {
    subtype: WalletSubtype,
    backend: Arc<dyn WalletBackend>,
    chain_id: Option<u64>,
    default_chain_id: u64,
    address: LazyField<String>,
    public_key: LazyField<String>,
    derivation_path: LazyField<String>,
    other_addresses: LazyField<Vec<DerivedAddress>>,
}

impl std::fmt::Debug for GenericWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenericWallet")
            .field("subtype", &self.subtype)
            .field("chain_id", &self.chain_id)
            .field("address", &self.address)
            .field("derivation_path", &self.derivation_path)
            .finish()
    }
}

impl GenericWallet {
    pub fn new(parts: WalletParts) -> Self {
        let subtype = parts.backend.subtype();
        debug!(subtype = ?subtype, chain_id = ?parts.chain_id, "wallet instance created");
        Self {
            subtype,
            backend: parts.backend,
            chain_id: parts.chain_id,
            default_chain_id: parts.default_chain_id,
            address: parts.address,
            public_key: parts.public_key,
            derivation_path: parts.derivation_path,
            other_addresses: parts.other_addresses,
        }
    }

    /// Builds a hardware wallet from the exported account key. Addresses are
    /// derived locally, the first time they are needed.
    pub fn hardware(
        backend: Arc<dyn WalletBackend>,
        account: HardwareAccount,
        options: HardwareOptions,
    ) -> Result<Self, WalletError> {
        let root_path = derivation_path_normalizer(&account.root_derivation_path)?;
        if derivation_path_to_object(&root_path)?.address_index.is_some() {
            return Err(WalletError::validation(
                "rootDerivationPath",
                format!("`{}` already names an address; the root leaves room for its index", root_path),
            ));
        }
        let xpub = Arc::new(ExtendedPublicKey::from_hex(&account.public_key, &account.chain_code)?);
        if options.address_count == 0 || options.address_index as usize >= options.address_count {
            return Err(WalletError::validation(
                "addressIndex",
                format!("must be below the address count ({})", options.address_count),
            ));
        }
        let index = options.address_index;

        let selected = {
            let xpub = xpub.clone();
            move || {
                let xpub = xpub.clone();
                async move { xpub.derive_child(index) }
            }
        };

        let address = {
            let selected = selected.clone();
            LazyField::new("address", move || {
                let resolve = selected();
                async move {
                    let child = resolve.await?;
                    Ok::<_, WalletError>(address_from_public_key(&child.public_key))
                }
            })
        };
        let public_key = LazyField::new("publicKey", move || {
            let resolve = selected();
            async move {
                let child = resolve.await?;
                Ok::<_, WalletError>(public_key_hex(&child.public_key))
            }
        });
        let derivation_path = {
            let root_path = root_path.clone();
            LazyField::new("derivationPath", move || {
                let path = format!("{}/{}", root_path, index);
                async move { derivation_path_normalizer(&path) }
            })
        };
        let other_addresses = {
            let count = options.address_count;
            LazyField::new("otherAddresses", move || {
                let xpub = xpub.clone();
                let root_path = root_path.clone();
                async move { xpub.derive_addresses(&root_path, count) }
            })
        };

        Ok(Self::new(WalletParts {
            backend,
            address,
            public_key,
            derivation_path,
            other_addresses,
            chain_id: options.chain_id,
            default_chain_id: options.default_chain_id,
        }))
    }

    pub fn wallet_type(&self) -> WalletType {
        self.subtype.wallet_type()
    }

    pub fn subtype(&self) -> WalletSubtype {
        self.subtype
    }

    /// Chain id configured at construction, if any.
    pub fn chain_id(&self) -> Option<u64> {
        self.chain_id
    }

    pub async fn address(&self) -> Result<String, WalletError> {
        self.address.get().await
    }

    pub async fn public_key(&self) -> Result<String, WalletError> {
        self.public_key.get().await
    }

    /// Hardware wallets only.
    pub async fn derivation_path(&self) -> Result<String, WalletError> {
        self.derivation_path.get().await
    }

    /// Every address derived from the exported account key (hardware only).
    pub async fn other_addresses(&self) -> Result<Vec<DerivedAddress>, WalletError> {
        self.other_addresses.get().await
    }

    async fn identity(&self) -> Result<SignerIdentity, WalletError> {
        match self.wallet_type() {
            WalletType::Hardware => Ok(SignerIdentity::DerivationPath(self.derivation_path().await?)),
            WalletType::Software => Ok(SignerIdentity::Address(self.address().await?)),
        }
    }

    /// Signs a transaction. The chain id comes from the argument, then the
    /// provider-configured chain id, then the configured default (mainnet
    /// unless overridden).
    pub async fn sign(&self, tx: TransactionObject) -> Result<String, WalletError> {
        transaction_object_validator(&tx)?;
        let chain_id = tx.chain_id.or(self.chain_id).unwrap_or(self.default_chain_id);
        let identity = self.identity().await?;
        let request = transaction_request(&tx, chain_id, identity);

        info!(subtype = ?self.subtype, chain_id, "signing transaction");
        let signed = self.backend.sign_transaction(request).await?;
        Ok(hex_sequence_normalizer(&signed, true))
    }

    pub async fn sign_message(&self, args: SignMessageArgs) -> Result<String, WalletError> {
        let payload = message_or_data_validator(&args)?;
        let identity = self.identity().await?;

        info!(subtype = ?self.subtype, bytes = payload.len(), "signing message");
        let signature = self.backend.sign_message(SignMessageRequest { identity, payload }).await?;
        Ok(hex_sequence_normalizer(&signature, true))
    }

    /// Never fails: any error is logged as a warning and reported as `false`.
    pub async fn verify_message(&self, args: VerifyMessageArgs) -> bool {
        match self.try_verify_message(args).await {
            Ok(valid) => valid,
            Err(e) => {
                warning(Component::Wallet, Operation::VerifyMessage, Kind::SignatureInvalid, &e.to_string());
                false
            }
        }
    }

    async fn try_verify_message(&self, mut args: VerifyMessageArgs) -> Result<bool, WalletError> {
        if args.address.is_none() {
            args.address = Some(self.address().await?);
        }
        message_verification_object_validator(&args)?;
        let public_key = if self.backend.verifies_with_public_key() {
            Some(self.public_key().await?)
        } else {
            None
        };

        let request = VerifyMessageRequest {
            address: address_normalizer(args.address.as_deref().unwrap_or_default(), true),
            signature: hex_sequence_normalizer(&args.signature, true),
            message: args.message,
            public_key,
        };
        self.backend.verify_message(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::big_number::BigNumber;
    use crate::core::types::{SignTransactionRequest, WalletSubtype};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use secp256k1::{PublicKey, Secp256k1, SecretKey};

    #[derive(Default)]
    struct RecordingBackend {
        requests: Mutex<Vec<SignTransactionRequest>>,
    }

    #[async_trait]
    impl WalletBackend for RecordingBackend {
        fn subtype(&self) -> WalletSubtype {
            WalletSubtype::Ledger
        }

        async fn sign_transaction(&self, request: SignTransactionRequest) -> Result<String, WalletError> {
            self.requests.lock().push(request);
            Ok("f86b".to_string())
        }

        async fn sign_message(&self, _request: SignMessageRequest) -> Result<String, WalletError> {
            Ok("abcd".to_string())
        }

        async fn verify_message(&self, _request: VerifyMessageRequest) -> Result<bool, WalletError> {
            Err(WalletError::Crypto("device rejected".into()))
        }
    }

    fn account() -> HardwareAccount {
        let secret = SecretKey::from_slice(&[3u8; 32]).unwrap();
        let public_key = PublicKey::from_secret_key(&Secp256k1::new(), &secret);
        HardwareAccount {
            root_derivation_path: "m/44'/60'/0'/0".into(),
            public_key: hex::encode(public_key.serialize()),
            chain_code: hex::encode([5u8; 32]),
        }
    }

    fn transfer() -> TransactionObject {
        TransactionObject {
            gas_price: Some(BigNumber::from(1u64)),
            gas_limit: Some(BigNumber::from(21_000u64)),
            to: Some("0x3535353535353535353535353535353535353535".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_hardware_identity() {
        let backend = Arc::new(RecordingBackend::default());
        let wallet = GenericWallet::hardware(backend, account(), HardwareOptions::default()).unwrap();

        assert_eq!(wallet.wallet_type(), WalletType::Hardware);
        assert_eq!(wallet.subtype(), WalletSubtype::Ledger);
        assert_eq!(wallet.derivation_path().await.unwrap(), "m/44'/60'/0'/0/0");

        let others = wallet.other_addresses().await.unwrap();
        assert_eq!(others.len(), 10);
        assert_eq!(others[0].address, wallet.address().await.unwrap());
        assert_eq!(others[0].public_key, wallet.public_key().await.unwrap());
    }

    #[tokio::test]
    async fn test_sign_chain_id_precedence() {
        let backend = Arc::new(RecordingBackend::default());
        let options = HardwareOptions { chain_id: Some(3), ..HardwareOptions::default() };
        let wallet = GenericWallet::hardware(backend.clone(), account(), options).unwrap();

        let signed = wallet.sign(transfer()).await.unwrap();
        assert_eq!(signed, "0xf86b");
        wallet.sign(TransactionObject { chain_id: Some(26765), ..transfer() }).await.unwrap();

        let requests = backend.requests.lock();
        assert_eq!(requests[0].chain_id, 3);
        assert_eq!(requests[1].chain_id, 26765);
        assert_eq!(
            requests[0].identity,
            SignerIdentity::DerivationPath("m/44'/60'/0'/0/0".into())
        );
    }

    #[tokio::test]
    async fn test_verify_message_swallows_backend_errors() {
        let backend = Arc::new(RecordingBackend::default());
        let wallet = GenericWallet::hardware(backend, account(), HardwareOptions::default()).unwrap();
        let valid = wallet
            .verify_message(VerifyMessageArgs {
                message: "hello".into(),
                signature: "0xabcd".into(),
                address: None,
            })
            .await;
        assert!(!valid);
    }

    #[test]
    fn test_address_index_must_be_in_range() {
        let backend = Arc::new(RecordingBackend::default());
        let options = HardwareOptions { address_count: 2, address_index: 2, ..HardwareOptions::default() };
        let err = GenericWallet::hardware(backend, account(), options).unwrap_err();
        assert!(matches!(err, WalletError::Validation { field: "addressIndex", .. }));
    }
}
