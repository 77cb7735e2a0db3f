use async_trait::async_trait;
use ethers::signers::{LocalWallet, MnemonicBuilder, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use secp256k1::{PublicKey, Secp256k1, SecretKey};
use tracing::debug;
use zeroize::Zeroizing;

use crate::core::errors::WalletError;
use crate::core::normalizers::{derivation_path_normalizer, hex_sequence_normalizer};
use crate::crypto::signature_utils::public_key_hex;

/// Caller-supplied signer behind a software wallet.
#[async_trait]
pub trait SigningCallback: Send + Sync {
    async fn address(&self) -> Result<String, WalletError>;

    async fn public_key(&self) -> Result<String, WalletError>;

    /// Path the key was derived from, when it came from a mnemonic.
    fn derivation_path(&self) -> Option<String> {
        None
    }

    /// Returns the RLP-encoded signed transaction as hex.
    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<String, WalletError>;

    /// Signs `payload` as an EIP-191 personal message, returning `r || s || v` hex.
    async fn sign_message(&self, payload: &[u8]) -> Result<String, WalletError>;
}

/// In-memory signer over an ethers `LocalWallet`.
pub struct LocalSigner {
    wallet: LocalWallet,
    public_key: PublicKey,
    derivation_path: Option<String>,
}

impl LocalSigner {
    pub fn from_private_key(private_key: &str) -> Result<Self, WalletError> {
        let key = Zeroizing::new(hex_sequence_normalizer(private_key.trim(), false));
        let wallet: LocalWallet = key
            .parse()
            .map_err(|e| WalletError::Crypto(format!("Invalid private key: {}", e)))?;
        Self::from_wallet(wallet, None)
    }

    pub fn from_mnemonic(phrase: &str, derivation_path: &str) -> Result<Self, WalletError> {
        let path = derivation_path_normalizer(derivation_path)?;
        let phrase = Zeroizing::new(phrase.trim().to_string());
        bip39::Mnemonic::parse(phrase.as_str())
            .map_err(|e| WalletError::validation("mnemonic", e.to_string()))?;
        let wallet = MnemonicBuilder::<ethers::signers::coins_bip39::English>::default()
            .phrase(phrase.as_str())
            .derivation_path(&path)
            .map_err(|e| WalletError::Crypto(format!("Failed to set derivation path: {}", e)))?
            .build()
            .map_err(|e| WalletError::Crypto(format!("Failed to build wallet: {}", e)))?;
        debug!("Using derivation path: {}", path);
        Self::from_wallet(wallet, Some(path))
    }

    fn from_wallet(wallet: LocalWallet, derivation_path: Option<String>) -> Result<Self, WalletError> {
        let secret_bytes = Zeroizing::new(wallet.signer().to_bytes().to_vec());
        let secret = SecretKey::from_slice(&secret_bytes)
            .map_err(|e| WalletError::Crypto(format!("Invalid secret key: {}", e)))?;
        let public_key = PublicKey::from_secret_key(&Secp256k1::new(), &secret);
        Ok(Self { wallet, public_key, derivation_path })
    }
}

impl std::fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &self.wallet.address())
            .field("derivation_path", &self.derivation_path)
            .finish()
    }
}

#[async_trait]
impl SigningCallback for LocalSigner {
    async fn address(&self) -> Result<String, WalletError> {
        Ok(format!("{:?}", self.wallet.address()))
    }

    async fn public_key(&self) -> Result<String, WalletError> {
        Ok(public_key_hex(&self.public_key))
    }

    fn derivation_path(&self) -> Option<String> {
        self.derivation_path.clone()
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<String, WalletError> {
        let chain_id = tx.chain_id().map(|id| id.as_u64()).unwrap_or_else(|| self.wallet.chain_id());
        let signer = self.wallet.clone().with_chain_id(chain_id);
        let signature = signer
            .sign_transaction(tx)
            .await
            .map_err(|e| WalletError::Crypto(format!("Failed to sign transaction: {}", e)))?;
        Ok(format!("0x{}", hex::encode(tx.rlp_signed(&signature))))
    }

    async fn sign_message(&self, payload: &[u8]) -> Result<String, WalletError> {
        let signature = self
            .wallet
            .sign_message(payload)
            .await
            .map_err(|e| WalletError::Crypto(format!("Failed to sign message: {}", e)))?;
        Ok(format!("0x{}", signature))
    }
}
