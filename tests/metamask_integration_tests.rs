//! Injected provider wallet, driven through the process-wide handle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Transaction, TransactionRequest};
use serial_test::serial;

use wallet_signer_core::injected::metamask::{self, MetamaskOptions};
use wallet_signer_core::injected::{
    install_provider, uninstall_provider, InjectedProvider, ProviderCallback, ProviderError,
};
use wallet_signer_core::{SignMessageArgs, VerifyMessageArgs, WalletError, WalletSubtype, WalletType};

const KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

/// Signs on a worker thread, the way a browser answers asynchronously.
struct ThreadedProvider {
    wallet: LocalWallet,
    unlocked: bool,
    sign_calls: AtomicUsize,
}

impl ThreadedProvider {
    fn new(unlocked: bool) -> Arc<Self> {
        Arc::new(Self { wallet: KEY.parse().unwrap(), unlocked, sign_calls: AtomicUsize::new(0) })
    }
}

impl InjectedProvider for ThreadedProvider {
    fn selected_address(&self) -> Option<String> {
        self.unlocked.then(|| format!("{:?}", self.wallet.address()))
    }

    fn chain_id(&self) -> Option<u64> {
        Some(5)
    }

    fn sign(&self, message_hex: String, _address: String, callback: ProviderCallback<String>) {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        let wallet = self.wallet.clone();
        std::thread::spawn(move || {
            let message = hex::decode(message_hex.trim_start_matches("0x")).unwrap();
            let signature = futures::executor::block_on(wallet.sign_message(message));
            callback(signature.map(|s| s.to_string()).map_err(|e| ProviderError::new(e.to_string())));
        });
    }

    fn send_transaction(&self, _tx: TransactionRequest, callback: ProviderCallback<String>) {
        callback(Err(ProviderError::new("MetaMask Tx Signature: User denied transaction signature.")));
    }

    fn get_transaction(&self, _hash: String, callback: ProviderCallback<Option<Transaction>>) {
        callback(Ok(None));
    }
}

#[test]
#[serial]
fn test_open_without_provider() {
    uninstall_provider();
    let err = metamask::open(MetamaskOptions::default()).unwrap_err();
    assert!(matches!(err, WalletError::ProviderUnavailable(_)));
}

#[test]
#[serial]
fn test_open_locked_provider() {
    install_provider(ThreadedProvider::new(false));
    let err = metamask::open(MetamaskOptions::default()).unwrap_err();
    assert!(matches!(err, WalletError::ProviderUnavailable(_)));
    uninstall_provider();
}

#[tokio::test]
#[serial]
async fn test_message_round_trip_and_public_key() {
    install_provider(ThreadedProvider::new(true));
    let wallet = metamask::open(MetamaskOptions::default()).unwrap();

    assert_eq!(wallet.wallet_type(), WalletType::Software);
    assert_eq!(wallet.subtype(), WalletSubtype::Metamask);
    assert_eq!(wallet.chain_id(), Some(5));
    assert!(wallet.public_key().await.unwrap().starts_with("0x04"));

    let signature = wallet.sign_message(SignMessageArgs::message("from the page")).await.unwrap();
    let args = VerifyMessageArgs { message: "from the page".into(), signature, address: None };
    assert!(wallet.verify_message(args).await);
    uninstall_provider();
}

#[tokio::test]
#[serial]
async fn test_provider_removed_after_open() {
    install_provider(ThreadedProvider::new(true));
    let wallet = metamask::open(MetamaskOptions { chain_id: Some(1), ..MetamaskOptions::default() }).unwrap();
    uninstall_provider();

    let err = wallet.sign_message(SignMessageArgs::message("late")).await.unwrap_err();
    assert!(matches!(err, WalletError::ProviderUnavailable(_)));
    assert_eq!(wallet.chain_id(), Some(1));
}

#[tokio::test]
#[serial]
async fn test_denied_transaction_is_cancellation() {
    use wallet_signer_core::core::big_number::BigNumber;
    use wallet_signer_core::TransactionObject;

    install_provider(ThreadedProvider::new(true));
    let wallet = metamask::open(MetamaskOptions::default()).unwrap();
    let err = wallet
        .sign(TransactionObject {
            gas_price: Some(BigNumber::from(1u64)),
            gas_limit: Some(BigNumber::from(21_000u64)),
            to: Some("0x3535353535353535353535353535353535353535".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(err.is_cancellation());
    uninstall_provider();
}

#[tokio::test]
#[serial]
async fn test_verify_never_prompts_the_provider() {
    let provider = ThreadedProvider::new(true);
    install_provider(provider.clone());
    let wallet = metamask::open(MetamaskOptions::default()).unwrap();

    let signature = wallet.sign_message(SignMessageArgs::message("no prompt")).await.unwrap();
    let before = provider.sign_calls.load(Ordering::SeqCst);
    assert_eq!(before, 1);

    let args = VerifyMessageArgs { message: "no prompt".into(), signature, address: None };
    assert!(wallet.verify_message(args.clone()).await);
    assert!(!wallet.verify_message(VerifyMessageArgs { message: "other".into(), ..args }).await);
    assert_eq!(provider.sign_calls.load(Ordering::SeqCst), before);
    uninstall_provider();
}
