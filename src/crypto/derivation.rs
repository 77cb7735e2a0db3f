//! BIP32 public child derivation
//!
//! Hardware wallets only export the account-level public key and chain code;
//! the per-index addresses are derived locally with non-hardened CKDpub.

use hmac::{Hmac, Mac};
use secp256k1::{PublicKey, Scalar, Secp256k1};
use sha2::Sha512;

use crate::core::defaults::derivation_path::HARDENED_OFFSET;
use crate::core::errors::WalletError;
use crate::core::normalizers::hex_sequence_normalizer;

use super::signature_utils::{address_from_public_key, public_key_hex};

type HmacSha512 = Hmac<Sha512>;

/// Extended public key: `(public key, chain code)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtendedPublicKey {
    pub public_key: PublicKey,
    pub chain_code: [u8; 32],
}

/// One derived account entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedAddress {
    pub index: u32,
    pub derivation_path: String,
    pub public_key: String,
    pub address: String,
}

impl ExtendedPublicKey {
    /// Builds from vendor hex output.
    pub fn from_hex(public_key: &str, chain_code: &str) -> Result<Self, WalletError> {
        let key_bytes = hex::decode(hex_sequence_normalizer(public_key, false))?;
        let public_key = PublicKey::from_slice(&key_bytes)
            .map_err(|e| WalletError::Crypto(format!("Invalid root public key: {}", e)))?;

        let code_bytes = hex::decode(hex_sequence_normalizer(chain_code, false))?;
        let chain_code: [u8; 32] = code_bytes
            .as_slice()
            .try_into()
            .map_err(|_| WalletError::Crypto(format!("Chain code must be 32 bytes, got {}", code_bytes.len())))?;

        Ok(Self { public_key, chain_code })
    }

    /// 非硬化子公钥派生
    pub fn derive_child(&self, index: u32) -> Result<Self, WalletError> {
        if index >= HARDENED_OFFSET {
            return Err(WalletError::Crypto(
                "Hardened derivation needs the private key".to_string(),
            ));
        }

        // HMAC-SHA512(chain_code, serP(K) || index)
        let mut mac = HmacSha512::new_from_slice(&self.chain_code)
            .map_err(|e| WalletError::Crypto(format!("HMAC initialization failed: {}", e)))?;
        mac.update(&self.public_key.serialize());
        mac.update(&index.to_be_bytes());
        let result = mac.finalize().into_bytes();

        let mut tweak = [0u8; 32];
        tweak.copy_from_slice(&result[..32]);
        let tweak = Scalar::from_be_bytes(tweak)
            .map_err(|_| WalletError::Crypto(format!("Invalid tweak at index {}", index)))?;
        let public_key = self
            .public_key
            .add_exp_tweak(&Secp256k1::verification_only(), &tweak)
            .map_err(|e| WalletError::Crypto(format!("Child derivation failed: {}", e)))?;

        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&result[32..]);

        Ok(Self { public_key, chain_code })
    }

    /// Derives `count` consecutive children under `root_path`.
    pub fn derive_addresses(&self, root_path: &str, count: usize) -> Result<Vec<DerivedAddress>, WalletError> {
        (0..count as u32)
            .map(|index| {
                let child = self.derive_child(index)?;
                Ok(DerivedAddress {
                    index,
                    derivation_path: format!("{}/{}", root_path, index),
                    public_key: public_key_hex(&child.public_key),
                    address: address_from_public_key(&child.public_key),
                })
            })
            .collect()
    }
}
