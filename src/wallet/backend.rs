use async_trait::async_trait;

use crate::core::errors::WalletError;
use crate::core::types::{SignMessageRequest, SignTransactionRequest, VerifyMessageRequest, WalletSubtype};

/// Operations every wallet backend provides.
///
/// Requests arrive validated and normalized; backends only talk to their
/// signer and canonicalize what comes back.
#[async_trait]
pub trait WalletBackend: Send + Sync {
    fn subtype(&self) -> WalletSubtype;

    /// Returns the signed transaction (or its hash, for providers that
    /// broadcast on sign) as hex.
    async fn sign_transaction(&self, request: SignTransactionRequest) -> Result<String, WalletError>;

    /// Returns the `r || s || v` signature as hex.
    async fn sign_message(&self, request: SignMessageRequest) -> Result<String, WalletError>;

    /// Whether `verify_message` reads `request.public_key`. Resolving the key
    /// may need vendor I/O, so it is only looked up when this is true.
    fn verifies_with_public_key(&self) -> bool {
        false
    }

    async fn verify_message(&self, request: VerifyMessageRequest) -> Result<bool, WalletError>;
}
