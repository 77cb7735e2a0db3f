//! Signature helpers shared by every backend: recovery id normalization,
//! address derivation from public keys and EIP-191 message verification.

use std::str::FromStr;

use ethers::types::{Address, Signature};
use ethers::utils::hash_message;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId};
use secp256k1::{Message, PublicKey, Secp256k1};
use sha3::{Digest, Keccak256};

use crate::core::defaults::signature;
use crate::core::errors::WalletError;
use crate::core::normalizers::{address_normalizer, hex_sequence_normalizer};

/// For Ethers style signature (r,s,v) where v may be 0/1, 27/28 or eip155, return normalized v (27/28)
pub fn normalize_v(v: u64) -> u8 {
    match v {
        27 | 28 => v as u8,
        // 0/1 and EIP-155 (chain_id * 2 + 35 / 36) both keep parity in the low bit
        0 | 1 => 27 + v as u8,
        _ => 27u8 + (((v + 1) & 1) as u8),
    }
}

/// Lowercase `0x` address of an uncompressed or compressed secp256k1 key.
pub fn address_from_public_key(public_key: &PublicKey) -> String {
    let uncompressed = public_key.serialize_uncompressed();
    let hash = Keccak256::digest(&uncompressed[1..]);
    format!("0x{}", hex::encode(&hash[12..]))
}

/// `0x04`-prefixed uncompressed public key hex.
pub fn public_key_hex(public_key: &PublicKey) -> String {
    format!("0x{}", hex::encode(public_key.serialize_uncompressed()))
}

/// Parses a `0x` hex public key (33 or 65 bytes).
pub fn parse_public_key(value: &str) -> Result<PublicKey, WalletError> {
    let bytes = hex::decode(hex_sequence_normalizer(value, false))?;
    PublicKey::from_slice(&bytes).map_err(|e| WalletError::Crypto(format!("Invalid public key: {}", e)))
}

/// Parses an `r || s || v` signature, normalizing `v` to 27/28.
pub fn parse_signature(value: &str) -> Result<Signature, WalletError> {
    let body = hex_sequence_normalizer(value, false);
    if body.len() != signature::LENGTH * 2 {
        return Err(WalletError::validation(
            "signature",
            format!("expected {} bytes, got {} hex characters", signature::LENGTH, body.len()),
        ));
    }
    let mut parsed = Signature::from_str(&body)
        .map_err(|e| WalletError::Crypto(format!("Invalid signature: {}", e)))?;
    parsed.v = normalize_v(parsed.v) as u64;
    Ok(parsed)
}

/// Recovers the signer of an EIP-191 personal message.
pub fn recover_message_signer(message: &[u8], signature: &str) -> Result<String, WalletError> {
    let parsed = parse_signature(signature)?;
    let address = parsed
        .recover(message)
        .map_err(|e| WalletError::Crypto(format!("Signature recovery failed: {}", e)))?;
    Ok(format!("{:?}", address))
}

/// Recovers the full public key behind an EIP-191 personal message signature.
pub fn recover_public_key(message: &[u8], signature: &str) -> Result<PublicKey, WalletError> {
    let parsed = parse_signature(signature)?;
    let recovery_id = RecoveryId::from_i32((parsed.v - signature::RECOVERY_ODD) as i32)
        .map_err(|e| WalletError::Crypto(format!("Invalid recovery id: {}", e)))?;

    let mut compact = [0u8; 64];
    parsed.r.to_big_endian(&mut compact[..32]);
    parsed.s.to_big_endian(&mut compact[32..]);
    let recoverable = RecoverableSignature::from_compact(&compact, recovery_id)
        .map_err(|e| WalletError::Crypto(format!("Invalid signature: {}", e)))?;

    let digest = hash_message(message);
    let message = Message::from_slice(digest.as_bytes())
        .map_err(|e| WalletError::Crypto(format!("Invalid digest: {}", e)))?;
    Secp256k1::verification_only()
        .recover_ecdsa(&message, &recoverable)
        .map_err(|e| WalletError::Crypto(format!("Public key recovery failed: {}", e)))
}

/// True when `signature` over `message` was produced by `address`.
pub fn verify_message_signature(message: &[u8], signature: &str, address: &str) -> Result<bool, WalletError> {
    let expected = Address::from_str(&address_normalizer(address, false))
        .map_err(|e| WalletError::validation("address", e.to_string()))?;
    let parsed = parse_signature(signature)?;
    Ok(parsed.verify(message, expected).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::signers::{LocalWallet, Signer};

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn test_normalize_v() {
        assert_eq!(normalize_v(0), 27);
        assert_eq!(normalize_v(1), 28);
        assert_eq!(normalize_v(27), 27);
        assert_eq!(normalize_v(28), 28);
        // chain id 1: 37 / 38
        assert_eq!(normalize_v(37), 27);
        assert_eq!(normalize_v(38), 28);
    }

    #[test]
    fn test_address_from_public_key_matches_ethers() {
        let wallet: LocalWallet = KEY.parse().unwrap();
        let secret = secp256k1::SecretKey::from_slice(&hex::decode(&KEY[2..]).unwrap()).unwrap();
        let public_key = PublicKey::from_secret_key(&secp256k1::Secp256k1::new(), &secret);
        assert_eq!(address_from_public_key(&public_key), format!("{:?}", wallet.address()));
        assert!(public_key_hex(&public_key).starts_with("0x04"));
        assert_eq!(parse_public_key(&public_key_hex(&public_key)).unwrap(), public_key);
    }

    #[tokio::test]
    async fn test_recover_and_verify() {
        let wallet: LocalWallet = KEY.parse().unwrap();
        let signature = wallet.sign_message("hello").await.unwrap().to_string();
        let address = format!("{:?}", wallet.address());

        assert_eq!(recover_message_signer(b"hello", &signature).unwrap(), address);
        assert!(verify_message_signature(b"hello", &signature, &address).unwrap());
        assert!(!verify_message_signature(b"other", &signature, &address).unwrap());
    }

    #[tokio::test]
    async fn test_recover_public_key() {
        let wallet: LocalWallet = KEY.parse().unwrap();
        let signature = wallet.sign_message(b"purser").await.unwrap().to_string();
        let public_key = recover_public_key(b"purser", &signature).unwrap();
        assert_eq!(address_from_public_key(&public_key), format!("{:?}", wallet.address()));
    }

    #[test]
    fn test_parse_signature_rejects_bad_length() {
        assert!(parse_signature("0xabcdef").is_err());
    }
}
