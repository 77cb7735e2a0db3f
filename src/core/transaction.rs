//! Legacy (EIP-155) transaction assembly on top of ethers types.

use std::str::FromStr;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Signature, TransactionRequest, U256};

use super::errors::WalletError;
use super::normalizers::{hex_sequence_normalizer, multiple_of_two_hex_normalizer};
use super::types::SignTransactionRequest;

/// Builds the unsigned legacy transaction described by `request`.
pub fn build_transaction(request: &SignTransactionRequest) -> Result<TypedTransaction, WalletError> {
    let data = hex::decode(multiple_of_two_hex_normalizer(&request.input_data))?;

    let mut tx = TransactionRequest::new()
        .gas_price(request.gas_price.as_u256())
        .gas(request.gas_limit.as_u256())
        .value(request.value.as_u256())
        .nonce(U256::from(request.nonce.unwrap_or_default()))
        .data(Bytes::from(data))
        .chain_id(request.chain_id);

    if let Some(to) = &request.to {
        let to = Address::from_str(&hex_sequence_normalizer(to, false))
            .map_err(|e| WalletError::validation("to", e.to_string()))?;
        tx = tx.to(to);
    }

    Ok(TypedTransaction::Legacy(tx))
}

/// Unsigned RLP payload, `0x`-prefixed. This is what the Ledger app signs.
pub fn unsigned_rlp_hex(tx: &TypedTransaction) -> String {
    format!("0x{}", hex::encode(tx.rlp()))
}

/// Serializes `tx` with the signature components returned by a device.
pub fn signed_rlp_hex(tx: &TypedTransaction, r: &str, s: &str, v: u64) -> Result<String, WalletError> {
    let parse = |value: &str| -> Result<U256, WalletError> {
        U256::from_str_radix(&hex_sequence_normalizer(value, false), 16)
            .map_err(|e| WalletError::Normalization(format!("Invalid signature component: {}", e)))
    };
    let signature = Signature { r: parse(r)?, s: parse(s)?, v };
    Ok(format!("0x{}", hex::encode(tx.rlp_signed(&signature))))
}
