//! Injected provider wallets
//!
//! The host installs a process-wide provider handle (the in-page Metamask
//! object in a browser, anything callback-driven elsewhere). Every call
//! checks the handle first and fails fast when it is missing.

pub mod metamask;

use std::sync::Arc;

use ethers::types::{Transaction, TransactionRequest};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::core::errors::WalletError;
use crate::core::helpers::warning;
use crate::core::messages::{message, Component, Kind, Operation};

/// Error passed to a provider callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub message: String,
}

impl ProviderError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Completion callback handed to the provider.
pub type ProviderCallback<T> = Box<dyn FnOnce(Result<T, ProviderError>) + Send>;

/// Callback-style surface of an injected provider.
pub trait InjectedProvider: Send + Sync {
    /// Currently selected account, `None` while the provider is locked.
    fn selected_address(&self) -> Option<String>;

    /// Network the provider is connected to.
    fn chain_id(&self) -> Option<u64> {
        None
    }

    /// `personal_sign` over a `0x` hex message.
    fn sign(&self, message_hex: String, address: String, callback: ProviderCallback<String>);

    /// Signs and broadcasts; the callback receives the transaction hash.
    fn send_transaction(&self, tx: TransactionRequest, callback: ProviderCallback<String>);

    /// Looks up a transaction by hash, `None` when unknown.
    fn get_transaction(&self, hash: String, callback: ProviderCallback<Option<Transaction>>);
}

static PROVIDER: Lazy<RwLock<Option<Arc<dyn InjectedProvider>>>> = Lazy::new(|| RwLock::new(None));

/// Installs the global provider handle, replacing any previous one.
pub fn install_provider(provider: Arc<dyn InjectedProvider>) {
    *PROVIDER.write() = Some(provider);
    info!("✅ Injected provider installed");
}

/// Removes the global provider handle.
pub fn uninstall_provider() -> Option<Arc<dyn InjectedProvider>> {
    let previous = PROVIDER.write().take();
    debug!(was_installed = previous.is_some(), "injected provider removed");
    previous
}

/// Returns the installed provider, warning and failing when there is none.
pub fn detect() -> Result<Arc<dyn InjectedProvider>, WalletError> {
    match PROVIDER.read().clone() {
        Some(provider) => Ok(provider),
        None => {
            warning(Component::Metamask, Operation::Detect, Kind::NotAvailable, "no provider installed");
            Err(WalletError::ProviderUnavailable(
                message(Component::Metamask, Operation::Detect, Kind::NotAvailable).to_string(),
            ))
        }
    }
}

/// Turns one callback-style provider call into a future.
pub(crate) async fn callback_result<T, F>(call: F) -> Result<T, ProviderError>
where
    T: Send + 'static,
    F: FnOnce(ProviderCallback<T>),
{
    let (sender, receiver) = oneshot::channel();
    call(Box::new(move |result| {
        // The caller may have given up; nothing to deliver to then.
        let _ = sender.send(result);
    }));
    receiver
        .await
        .map_err(|_| ProviderError::new("The provider dropped the request without answering"))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    struct Locked;

    impl InjectedProvider for Locked {
        fn selected_address(&self) -> Option<String> {
            None
        }

        fn sign(&self, _message_hex: String, _address: String, callback: ProviderCallback<String>) {
            callback(Err(ProviderError::new("locked")));
        }

        fn send_transaction(&self, _tx: TransactionRequest, _callback: ProviderCallback<String>) {}

        fn get_transaction(&self, _hash: String, callback: ProviderCallback<Option<Transaction>>) {
            callback(Ok(None));
        }
    }

    #[test]
    #[serial]
    fn test_detect_without_provider() {
        uninstall_provider();
        let err = detect().err().unwrap();
        assert!(matches!(err, WalletError::ProviderUnavailable(_)));
    }

    #[test]
    #[serial]
    fn test_install_and_uninstall() {
        install_provider(Arc::new(Locked));
        assert!(detect().is_ok());
        assert!(uninstall_provider().is_some());
        assert!(detect().is_err());
    }

    #[tokio::test]
    async fn test_callback_result() {
        let provider = Locked;
        let signed = callback_result(|cb| provider.sign("0x00".into(), "0x00".into(), cb)).await;
        assert_eq!(signed, Err(ProviderError::new("locked")));

        let found = callback_result(|cb| provider.get_transaction("0x00".into(), cb)).await;
        assert!(matches!(found, Ok(None)));

        // Dropping the callback without calling it surfaces as an error.
        let dropped = callback_result(|cb| provider.send_transaction(TransactionRequest::new(), cb)).await;
        assert!(dropped.is_err());
    }
}
