//! Generic wallet behaviour shared by every backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use wallet_signer_core::core::big_number::BigNumber;
use wallet_signer_core::core::lazy::{CellState, LazyField};
use wallet_signer_core::core::types::{
    SignMessageRequest, SignTransactionRequest, VerifyMessageRequest, WalletSubtype,
};
use wallet_signer_core::wallet::HardwareAccount;
use wallet_signer_core::{
    GenericWallet, HardwareOptions, TransactionObject, VerifyMessageArgs, WalletBackend, WalletConfig,
    WalletError,
};

/// Counts `WARN` events.
struct WarningCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for WarningCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct ScriptedBackend {
    calls: Mutex<Vec<SignTransactionRequest>>,
    verify: fn() -> Result<bool, WalletError>,
}

impl ScriptedBackend {
    fn new(verify: fn() -> Result<bool, WalletError>) -> Arc<Self> {
        Arc::new(Self { calls: Mutex::new(Vec::new()), verify })
    }
}

#[async_trait]
impl WalletBackend for ScriptedBackend {
    fn subtype(&self) -> WalletSubtype {
        WalletSubtype::Trezor
    }

    async fn sign_transaction(&self, request: SignTransactionRequest) -> Result<String, WalletError> {
        self.calls.lock().push(request);
        Ok("F86B".into())
    }

    async fn sign_message(&self, _request: SignMessageRequest) -> Result<String, WalletError> {
        Ok("00".repeat(65))
    }

    async fn verify_message(&self, _request: VerifyMessageRequest) -> Result<bool, WalletError> {
        (self.verify)()
    }
}

fn account() -> HardwareAccount {
    let secret = SecretKey::from_slice(&[7u8; 32]).unwrap();
    let public_key = PublicKey::from_secret_key(&Secp256k1::new(), &secret);
    HardwareAccount {
        root_derivation_path: "m/44'/60'/0'/0".into(),
        public_key: hex::encode(public_key.serialize()),
        chain_code: hex::encode([3u8; 32]),
    }
}

fn transfer() -> TransactionObject {
    TransactionObject {
        gas_price: Some(BigNumber::from(20_000_000_000u64)),
        gas_limit: Some(BigNumber::from(21_000u64)),
        to: Some("0x3535353535353535353535353535353535353535".into()),
        value: Some(BigNumber::new("1e18").unwrap()),
        ..Default::default()
    }
}

fn verify_args() -> VerifyMessageArgs {
    VerifyMessageArgs { message: "hello".into(), signature: format!("0x{}", "00".repeat(65)), address: None }
}

#[tokio::test]
async fn test_chain_id_falls_back_to_mainnet() {
    let backend = ScriptedBackend::new(|| Ok(true));
    let options = HardwareOptions { address_count: 10, ..HardwareOptions::default() };
    let wallet = GenericWallet::hardware(backend.clone(), account(), options).unwrap();

    assert_eq!(wallet.chain_id(), None);
    assert_eq!(wallet.other_addresses().await.unwrap().len(), 10);

    let signed = wallet.sign(transfer()).await.unwrap();
    assert_eq!(signed, "0xf86b");
    assert_eq!(backend.calls.lock()[0].chain_id, 1);
}

#[tokio::test]
async fn test_explicit_chain_id_wins() {
    let backend = ScriptedBackend::new(|| Ok(true));
    let options = HardwareOptions { address_count: 10, chain_id: Some(3), ..HardwareOptions::default() };
    let wallet = GenericWallet::hardware(backend.clone(), account(), options).unwrap();

    wallet.sign(TransactionObject { chain_id: Some(26765), ..transfer() }).await.unwrap();
    assert_eq!(backend.calls.lock()[0].chain_id, 26765);
}

#[tokio::test]
async fn test_configured_default_chain_id() {
    let config = WalletConfig::from_toml_str("default_chain_id = 3").unwrap();
    let backend = ScriptedBackend::new(|| Ok(true));
    let wallet = GenericWallet::hardware(backend.clone(), account(), HardwareOptions::from_config(&config)).unwrap();

    wallet.sign(transfer()).await.unwrap();
    wallet.sign(TransactionObject { chain_id: Some(26765), ..transfer() }).await.unwrap();

    let calls = backend.calls.lock();
    assert_eq!(calls[0].chain_id, 3);
    assert_eq!(calls[1].chain_id, 26765);
}

#[tokio::test]
async fn test_provider_chain_id_beats_configured_default() {
    let config = WalletConfig::from_toml_str("default_chain_id = 3").unwrap();
    let backend = ScriptedBackend::new(|| Ok(true));
    let options = HardwareOptions { chain_id: Some(5), ..HardwareOptions::from_config(&config) };
    let wallet = GenericWallet::hardware(backend.clone(), account(), options).unwrap();

    wallet.sign(transfer()).await.unwrap();
    assert_eq!(backend.calls.lock()[0].chain_id, 5);
}

#[test]
fn test_hardware_root_must_leave_room_for_index() {
    let backend = ScriptedBackend::new(|| Ok(true));
    let account = HardwareAccount { root_derivation_path: "m/44'/60'/0'/0/0".into(), ..account() };
    let err = GenericWallet::hardware(backend, account, HardwareOptions::default()).err().unwrap();
    assert!(matches!(err, WalletError::Validation { field: "rootDerivationPath", .. }));
}

#[tokio::test]
async fn test_deployment_without_data_never_reaches_backend() {
    let backend = ScriptedBackend::new(|| Ok(true));
    let wallet = GenericWallet::hardware(backend.clone(), account(), HardwareOptions::default()).unwrap();

    let err = wallet.sign(TransactionObject { to: None, ..transfer() }).await.unwrap_err();
    assert!(matches!(err, WalletError::Validation { .. }));

    let empty = TransactionObject { to: None, input_data: Some("0x".into()), ..transfer() };
    let err = wallet.sign(empty).await.unwrap_err();
    assert!(matches!(err, WalletError::Validation { field: "inputData", .. }));
    assert!(backend.calls.lock().is_empty());
}

#[tokio::test]
async fn test_missing_gas_price_is_rejected() {
    let backend = ScriptedBackend::new(|| Ok(true));
    let wallet = GenericWallet::hardware(backend.clone(), account(), HardwareOptions::default()).unwrap();

    let err = wallet.sign(TransactionObject { gas_price: None, ..transfer() }).await.unwrap_err();
    assert!(err.is_input_error());
    assert!(backend.calls.lock().is_empty());
}

#[tokio::test]
async fn test_verify_failure_warns_once() {
    let warnings = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarningCounter(warnings.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let backend = ScriptedBackend::new(|| Err(WalletError::Crypto("device unplugged".into())));
    let wallet = GenericWallet::hardware(backend, account(), HardwareOptions::default()).unwrap();

    assert!(!wallet.verify_message(verify_args()).await);
    assert_eq!(warnings.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_verify_mismatch_is_silent() {
    let warnings = Arc::new(AtomicUsize::new(0));
    let subscriber = tracing_subscriber::registry().with(WarningCounter(warnings.clone()));
    let _guard = tracing::subscriber::set_default(subscriber);

    let backend = ScriptedBackend::new(|| Ok(false));
    let wallet = GenericWallet::hardware(backend, account(), HardwareOptions::default()).unwrap();

    assert!(!wallet.verify_message(verify_args()).await);
    assert_eq!(warnings.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_lazy_field_resolves_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let field = {
        let calls = calls.clone();
        LazyField::new("address", move || {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
                Ok::<_, WalletError>("0xabc".to_string())
            }
        })
    };

    assert_eq!(field.state(), CellState::Unresolved);
    let (a, b) = tokio::join!(field.get(), field.get());
    assert_eq!(a.unwrap(), "0xabc");
    assert_eq!(b.unwrap(), "0xabc");
    assert_eq!(field.get().await.unwrap(), "0xabc");
    assert_eq!(field.state(), CellState::Resolved);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_lazy_field_retries_after_failure() {
    let calls = Arc::new(AtomicUsize::new(0));
    let field = {
        let calls = calls.clone();
        LazyField::new("publicKey", move || {
            let attempt = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(WalletError::Crypto("not yet".into()))
                } else {
                    Ok("0x04".to_string())
                }
            }
        })
    };

    assert!(field.get().await.is_err());
    assert_eq!(field.state(), CellState::Unresolved);
    assert_eq!(field.get().await.unwrap(), "0x04");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
